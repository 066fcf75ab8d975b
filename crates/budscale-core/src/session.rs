//! Session state: one owned object holding everything a user edits.
//!
//! [`Session`] owns the [`AnnotationStore`], the calibration settings, the
//! loaded image's dimensions, and the open draw gesture. Callers receive
//! `&Session` for reads and `&mut Session` for mutations; there is no
//! shared global state, and exclusive borrows serialize every mutation.
//!
//! External snapshots arriving while a gesture is open are ignored
//! outright. Only the latest external state matters, so nothing is queued:
//! the next push after the gesture ends is applied normally.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::{self, CalibrationError, CalibrationSettings, Report};
use crate::document::SessionDocument;
use crate::gesture::DrawGesture;
use crate::prompt::{self, PromptError};
use crate::store::{AnnotationStore, RegionRejected, RemoveOutcome, StandardError};
use crate::types::{Dimensions, Rect, Region, RegionId};

/// Errors from session operations that need a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No image has been loaded yet.
    #[error("no image loaded")]
    NoImage,
}

/// What happened to an externally pushed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub enum SnapshotOutcome {
    /// The snapshot replaced the local state.
    Applied,
    /// A draw gesture was open, so the snapshot had no effect.
    IgnoredDuringGesture,
}

/// Whether a previously computed report still reflects the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportState {
    /// No report has been computed.
    #[default]
    NotComputed,
    /// The last report matches the current state.
    Fresh,
    /// The state changed after the last report was computed.
    Stale,
}

/// All per-user editing state.
#[derive(Debug, Clone)]
pub struct Session {
    owner: String,
    image: Option<Dimensions>,
    store: AnnotationStore,
    calibration: CalibrationSettings,
    gesture: Option<DrawGesture>,
    report: ReportState,
}

impl Session {
    /// Create an empty session for an opaque owner identity.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            image: None,
            store: AnnotationStore::new(),
            calibration: CalibrationSettings::default(),
            gesture: None,
            report: ReportState::NotComputed,
        }
    }

    /// Owner identity.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Dimensions of the loaded image.
    #[must_use]
    pub const fn image(&self) -> Option<Dimensions> {
        self.image
    }

    /// Read access to the region collection.
    #[must_use]
    pub const fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// Regions in drawing order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        self.store.regions()
    }

    /// Current standard reference.
    #[must_use]
    pub const fn standard_id(&self) -> Option<&RegionId> {
        self.store.standard_id()
    }

    /// Declared standard size.
    #[must_use]
    pub const fn calibration(&self) -> CalibrationSettings {
        self.calibration
    }

    /// Freshness of the last computed report.
    #[must_use]
    pub const fn report_state(&self) -> ReportState {
        self.report
    }

    /// Returns `true` while a draw gesture is open.
    #[must_use]
    pub const fn is_drawing(&self) -> bool {
        self.gesture.is_some()
    }

    /// The live rectangle of the open gesture.
    #[must_use]
    pub fn gesture_rect(&self) -> Option<Rect> {
        self.gesture.as_ref().map(DrawGesture::rect)
    }

    /// Load a new image, discarding every region and the standard.
    pub fn load_image(&mut self, dimensions: Dimensions) {
        self.image = Some(dimensions);
        self.gesture = None;
        self.store.clear_all();
        self.invalidate_report();
        info!(
            width = dimensions.width,
            height = dimensions.height,
            "image loaded"
        );
    }

    /// Open a draw gesture at `(x, y)`, replacing any gesture already open.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoImage`] if no image is loaded.
    pub fn begin_gesture(&mut self, x: f64, y: f64) -> Result<(), SessionError> {
        let bounds = self.image.ok_or(SessionError::NoImage)?;
        self.gesture = Some(DrawGesture::begin(bounds, x, y));
        Ok(())
    }

    /// Move the open gesture's free corner; returns the live rectangle.
    ///
    /// Returns `None` if no gesture is open.
    pub fn update_gesture(&mut self, x: f64, y: f64) -> Option<Rect> {
        let gesture = self.gesture.as_mut()?;
        gesture.update(x, y);
        Some(gesture.rect())
    }

    /// Close the open gesture at `(x, y)` and commit its rectangle.
    ///
    /// Returns the stored region, or `None` if no gesture was open or the
    /// rectangle was rejected (for example, too small).
    pub fn end_gesture(&mut self, x: f64, y: f64) -> Option<Region> {
        let mut gesture = self.gesture.take()?;
        gesture.update(x, y);
        let rect = gesture.rect();
        match self.add_region(rect.x, rect.y, rect.w, rect.h) {
            Ok(region) => Some(region),
            Err(reason) => {
                debug!(%reason, "gesture discarded");
                None
            }
        }
    }

    /// Abandon the open gesture without committing anything.
    pub fn cancel_gesture(&mut self) {
        self.gesture = None;
    }

    /// Add a region directly. See [`AnnotationStore::add_region`].
    ///
    /// # Errors
    ///
    /// Returns [`RegionRejected`] when the rectangle is not accepted.
    pub fn add_region(&mut self, x: f64, y: f64, w: f64, h: f64) -> Result<Region, RegionRejected> {
        let region = self.store.add_region(x, y, w, h)?;
        self.invalidate_report();
        Ok(region)
    }

    /// Delete a region. See [`AnnotationStore::delete_region`].
    pub fn delete_region(&mut self, id: &RegionId) -> RemoveOutcome {
        let outcome = self.store.delete_region(id);
        if outcome.removed.is_some() {
            self.invalidate_report();
        }
        if outcome.invalidates_report() {
            info!(%id, "standard region deleted; set a new standard before comparing");
        }
        outcome
    }

    /// Mark a region as the standard.
    ///
    /// # Errors
    ///
    /// Returns [`StandardError::UnknownRegion`] if the id is not present.
    pub fn set_standard(&mut self, id: &RegionId) -> Result<(), StandardError> {
        let unchanged = self.store.standard_id() == Some(id);
        self.store.set_standard(id)?;
        if !unchanged {
            self.invalidate_report();
        }
        Ok(())
    }

    /// Remove every region and the standard.
    pub fn clear_all(&mut self) {
        self.store.clear_all();
        self.invalidate_report();
    }

    /// Set the declared standard size.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidCalibrationInput`] unless both
    /// values are finite and strictly positive; the settings are then
    /// left unchanged.
    pub fn set_calibration(&mut self, width_cm: f64, height_cm: f64) -> Result<(), CalibrationError> {
        let settings = CalibrationSettings::new(width_cm, height_cm)?;
        if settings != self.calibration {
            self.calibration = settings;
            self.invalidate_report();
        }
        Ok(())
    }

    /// Compute the dimension report from the current state.
    ///
    /// # Errors
    ///
    /// See [`calibration::compute_report`].
    pub fn compute_report(&mut self) -> Result<Report, CalibrationError> {
        let report = calibration::compute_report(
            self.store.regions(),
            self.store.standard_id(),
            self.calibration.width_cm,
            self.calibration.height_cm,
        )?;
        self.report = ReportState::Fresh;
        info!(
            standard = %report.standard.label,
            rows = report.rows.len(),
            "dimension report computed"
        );
        Ok(report)
    }

    /// Build the analysis prompt for the current state.
    ///
    /// # Errors
    ///
    /// See [`prompt::build_prompt`]. With no image loaded the dimensions
    /// are treated as empty.
    pub fn build_prompt(&self) -> Result<String, PromptError> {
        prompt::build_prompt(
            self.store.regions(),
            self.store.standard_id(),
            &self.calibration,
            self.image.unwrap_or(Dimensions::new(0, 0)),
        )
    }

    /// Replace the regions and standard with an external snapshot.
    ///
    /// Ignored while a gesture is open.
    pub fn replace_snapshot(
        &mut self,
        regions: Vec<Region>,
        standard_id: Option<RegionId>,
    ) -> SnapshotOutcome {
        if self.gesture.is_some() {
            debug!("external snapshot ignored: draw gesture in progress");
            return SnapshotOutcome::IgnoredDuringGesture;
        }
        self.store.replace_snapshot(regions, standard_id);
        self.invalidate_report();
        SnapshotOutcome::Applied
    }

    /// Adopt a whole stored document: regions, standard, and sizes.
    ///
    /// Ignored as a unit while a gesture is open, so calibration settings
    /// never change without the regions they belong to.
    pub fn apply_snapshot(&mut self, document: SessionDocument) -> SnapshotOutcome {
        if self.gesture.is_some() {
            debug!("external document ignored: draw gesture in progress");
            return SnapshotOutcome::IgnoredDuringGesture;
        }
        self.calibration = document.calibration();
        self.replace_snapshot(document.annotations, document.standard_bud_id)
    }

    /// The document to persist for the current state.
    ///
    /// `last_update_ms` is left unset for the writer to fill in.
    #[must_use]
    pub fn snapshot(&self) -> SessionDocument {
        SessionDocument {
            user_id: self.owner.clone(),
            annotations: self.store.regions().to_vec(),
            standard_bud_id: self.store.standard_id().cloned(),
            standard_width_cm: Some(self.calibration.width_cm),
            standard_height_cm: Some(self.calibration.height_cm),
            last_update_ms: None,
        }
    }

    const fn invalidate_report(&mut self) {
        if matches!(self.report, ReportState::Fresh) {
            self.report = ReportState::Stale;
        }
    }
}
