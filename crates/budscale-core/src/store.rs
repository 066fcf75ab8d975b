//! The ordered region collection and the standard-reference selection.
//!
//! [`AnnotationStore`] is the single owner of both pieces of state. Every
//! mutation goes through it so that two invariants always hold after a
//! call returns:
//!
//! - labels are `"Bud " + letters(i)` for each region's position `i`,
//!   with no gaps and no duplicates;
//! - the standard reference either is unset or points at a region that
//!   is present in the collection.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::label::region_label;
use crate::types::{MIN_REGION_SIZE, Rect, Region, RegionId};

/// Why [`AnnotationStore::add_region`] did not store a region.
///
/// Rejection is not an error for the session: the draw gesture simply
/// produces nothing.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RegionRejected {
    /// Width or height is at or below [`MIN_REGION_SIZE`].
    #[error("region {w}x{h} is too small (both sides must exceed {MIN_REGION_SIZE}px)")]
    TooSmall {
        /// Rejected width.
        w: f64,
        /// Rejected height.
        h: f64,
    },

    /// A coordinate or dimension is NaN or infinite.
    #[error("region geometry is not finite")]
    NotFinite,

    /// The top-left corner lies left of or above the image origin.
    #[error("region origin ({x}, {y}) is negative")]
    NegativeOrigin {
        /// Rejected left edge.
        x: f64,
        /// Rejected top edge.
        y: f64,
    },
}

/// Errors from selecting the standard region.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StandardError {
    /// No region with this id is in the collection.
    #[error("unknown region {0}")]
    UnknownRegion(RegionId),
}

/// Result of [`AnnotationStore::delete_region`].
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct RemoveOutcome {
    /// The removed region, or `None` if the id was not present.
    pub removed: Option<Region>,
    /// `true` if the removed region was the standard, which is now unset.
    pub standard_cleared: bool,
}

impl RemoveOutcome {
    /// Whether a report computed before the deletion is no longer valid.
    #[must_use]
    pub const fn invalidates_report(&self) -> bool {
        self.standard_cleared
    }
}

/// Ordered region collection plus the out-of-band standard reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    regions: Vec<Region>,
    standard: Option<RegionId>,
}

impl AnnotationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions in drawing order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Number of stored regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if no regions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Look up a region by id.
    #[must_use]
    pub fn get(&self, id: &RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id() == id)
    }

    /// The current standard reference, if set.
    #[must_use]
    pub const fn standard_id(&self) -> Option<&RegionId> {
        self.standard.as_ref()
    }

    /// The region currently marked as standard.
    #[must_use]
    pub fn standard(&self) -> Option<&Region> {
        self.standard.as_ref().and_then(|id| self.get(id))
    }

    /// Append a new region and relabel the collection.
    ///
    /// # Errors
    ///
    /// Returns [`RegionRejected`] if the geometry is not finite, the
    /// origin is negative, or either side is at most [`MIN_REGION_SIZE`]
    /// pixels. Nothing is stored in that case.
    pub fn add_region(&mut self, x: f64, y: f64, w: f64, h: f64) -> Result<Region, RegionRejected> {
        let rect = Rect::new(x, y, w, h);
        if !rect.is_finite() {
            return Err(RegionRejected::NotFinite);
        }
        if x < 0.0 || y < 0.0 {
            return Err(RegionRejected::NegativeOrigin { x, y });
        }
        if w <= MIN_REGION_SIZE || h <= MIN_REGION_SIZE {
            return Err(RegionRejected::TooSmall { w, h });
        }

        self.regions.push(Region::new(RegionId::unique(), rect));
        self.relabel();

        // The push above guarantees a last element.
        let added = self.regions[self.regions.len() - 1].clone();
        debug!(id = %added.id(), label = added.label(), "region added");
        Ok(added)
    }

    /// Remove the region with `id`, if present, and relabel the rest.
    ///
    /// Deleting an absent id is a no-op. Deleting the standard region
    /// also clears the standard reference.
    pub fn delete_region(&mut self, id: &RegionId) -> RemoveOutcome {
        let Some(index) = self.regions.iter().position(|r| r.id() == id) else {
            debug!(%id, "delete ignored: region not present");
            return RemoveOutcome {
                removed: None,
                standard_cleared: false,
            };
        };

        let removed = self.regions.remove(index);
        self.relabel();

        let standard_cleared = self.standard.as_ref() == Some(id);
        if standard_cleared {
            self.standard = None;
        }
        debug!(%id, standard_cleared, remaining = self.regions.len(), "region deleted");

        RemoveOutcome {
            removed: Some(removed),
            standard_cleared,
        }
    }

    /// Mark the region with `id` as the standard.
    ///
    /// Idempotent when `id` is already the standard.
    ///
    /// # Errors
    ///
    /// Returns [`StandardError::UnknownRegion`] if no region has this id;
    /// the current standard is left unchanged.
    pub fn set_standard(&mut self, id: &RegionId) -> Result<(), StandardError> {
        if self.get(id).is_none() {
            return Err(StandardError::UnknownRegion(id.clone()));
        }
        debug!(%id, "standard set");
        self.standard = Some(id.clone());
        Ok(())
    }

    /// Remove every region and clear the standard in one step.
    pub fn clear_all(&mut self) {
        self.regions.clear();
        self.standard = None;
        debug!("all regions cleared");
    }

    /// Replace the whole collection with an externally supplied one.
    ///
    /// Incoming labels are discarded and re-derived by position. Regions
    /// that break the geometry invariants (non-finite values, a negative
    /// origin, or a non-positive side), empty ids, and repeated ids are
    /// dropped. `standard_id` is adopted only if it names a region that
    /// survived; otherwise the standard is cleared.
    pub fn replace_snapshot(&mut self, regions: Vec<Region>, standard_id: Option<RegionId>) {
        let incoming = regions.len();
        let mut seen = HashSet::with_capacity(incoming);
        let accepted: Vec<Region> = regions
            .into_iter()
            .filter(|r| {
                let rect = r.rect();
                rect.is_finite()
                    && rect.x >= 0.0
                    && rect.y >= 0.0
                    && rect.w > 0.0
                    && rect.h > 0.0
                    && !r.id().is_empty()
                    && seen.insert(r.id().clone())
            })
            .collect();

        if accepted.len() != incoming {
            warn!(
                dropped = incoming - accepted.len(),
                "snapshot contained invalid or duplicate regions"
            );
        }

        let requested = standard_id.is_some();
        self.standard = standard_id.filter(|id| accepted.iter().any(|r| r.id() == id));
        if requested && self.standard.is_none() {
            warn!("snapshot standard does not match any region; cleared");
        }
        self.regions = accepted;
        self.relabel();
        debug!(count = self.regions.len(), "snapshot applied");
    }

    fn relabel(&mut self) {
        for (index, region) in self.regions.iter_mut().enumerate() {
            region.set_label(region_label(index));
        }
    }
}
