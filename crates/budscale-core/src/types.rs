//! Shared types for the budscale annotation engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Regions whose width or height is at or below this many pixels are
/// discarded instead of stored.
pub const MIN_REGION_SIZE: f64 = 5.0;

/// Opaque identifier of a region.
///
/// Any non-empty string is a valid id, so documents written by other
/// clients load unchanged. Ids generated here are random v4 UUIDs, so a
/// deleted region's id cannot come back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn unique() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Build an identifier from a fixed value (tests, fixtures).
    #[must_use]
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value).to_string())
    }

    /// The id as stored.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns `true` for the empty string, which never names a region.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error parsing a [`RegionId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("region id must not be empty")]
pub struct EmptyRegionId;

impl FromStr for RegionId {
    type Err = EmptyRegionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(EmptyRegionId)
        } else {
            Ok(Self(s.to_owned()))
        }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An axis-aligned rectangle in image-pixel coordinates.
///
/// `(x, y)` is the top-left corner; `w` and `h` extend right and down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (pixels from the left of the image).
    pub x: f64,
    /// Top edge (pixels from the top of the image).
    pub y: f64,
    /// Width in pixels.
    pub w: f64,
    /// Height in pixels.
    pub h: f64,
}

impl Rect {
    /// Create a rectangle from its top-left corner and size.
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Normalize two opposite corners into a rectangle with
    /// non-negative size, whichever direction the corners were given in.
    #[must_use]
    pub fn from_corners(ax: f64, ay: f64, bx: f64, by: f64) -> Self {
        Self {
            x: ax.min(bx),
            y: ay.min(by),
            w: (bx - ax).abs(),
            h: (by - ay).abs(),
        }
    }

    /// Centre point `(x, y)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Area in square pixels.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Returns `true` if every component is a finite number.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

/// A user-drawn region of interest ("bud").
///
/// The label is derived from the region's position in its collection and
/// is rewritten by the store on every insertion or deletion; it cannot be
/// set from outside the crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    id: RegionId,
    #[serde(flatten)]
    rect: Rect,
    #[serde(default)]
    label: String,
}

impl Region {
    pub(crate) fn new(id: RegionId, rect: Rect) -> Self {
        Self {
            id,
            rect,
            label: String::new(),
        }
    }

    /// The region's stable identifier.
    #[must_use]
    pub const fn id(&self) -> &RegionId {
        &self.id
    }

    /// Pixel geometry.
    #[must_use]
    pub const fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Positional label, e.g. `"Bud C"`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = label;
    }
}
