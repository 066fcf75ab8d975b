//! Pixel-to-centimetre calibration from a single reference region.
//!
//! The standard region's pixel size and its declared real-world size give
//! an independent pixels-per-centimetre factor for each axis:
//!
//! ```text
//! ppc_w = standard.w / width_cm
//! ppc_h = standard.h / height_cm
//! ```
//!
//! Every region (the standard included) is then converted with
//! `real_w = w / ppc_w`, `real_h = h / ppc_h`, `area = real_w * real_h`.
//! Axes are never assumed to share a scale.
//!
//! No rounding happens here. Values are full `f64` so that two reports
//! built from the same inputs compare equal; rounding to two decimals is
//! a presentation concern handled by the export crate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Region, RegionId};

/// Real-world size of whichever region is the standard.
///
/// Kept independently of any region, so it survives changing the
/// standard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSettings {
    /// Declared width of the standard in centimetres.
    pub width_cm: f64,
    /// Declared height of the standard in centimetres.
    pub height_cm: f64,
}

impl CalibrationSettings {
    /// Default declared width.
    pub const DEFAULT_WIDTH_CM: f64 = 1.0;
    /// Default declared height.
    pub const DEFAULT_HEIGHT_CM: f64 = 1.0;

    /// Create validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::InvalidCalibrationInput`] unless both
    /// values are finite and strictly positive.
    pub fn new(width_cm: f64, height_cm: f64) -> Result<Self, CalibrationError> {
        validate_input(width_cm, height_cm)?;
        Ok(Self {
            width_cm,
            height_cm,
        })
    }

    /// Returns `true` if both values are finite and strictly positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        validate_input(self.width_cm, self.height_cm).is_ok()
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            width_cm: Self::DEFAULT_WIDTH_CM,
            height_cm: Self::DEFAULT_HEIGHT_CM,
        }
    }
}

/// Reasons a report cannot be produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum CalibrationError {
    /// No region has been marked as the standard.
    #[error("no standard region selected; set a standard first")]
    NoStandardSelected,

    /// The standard reference names a region that is not in the collection.
    #[error("standard region {0} not found")]
    StandardNotFound(RegionId),

    /// A declared dimension is zero, negative, or not a finite number.
    #[error("invalid standard size {width_cm} cm x {height_cm} cm; both must be positive numbers")]
    InvalidCalibrationInput {
        /// Declared width as given.
        width_cm: f64,
        /// Declared height as given.
        height_cm: f64,
    },
}

/// Calibration summary for the standard region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardSummary {
    /// Standard region id.
    pub id: RegionId,
    /// Standard region label at the time of computation.
    pub label: String,
    /// Standard width in pixels.
    pub pixel_width: f64,
    /// Standard height in pixels.
    pub pixel_height: f64,
    /// Declared real width in centimetres.
    pub width_cm: f64,
    /// Declared real height in centimetres.
    pub height_cm: f64,
    /// Horizontal pixels per centimetre.
    pub ppc_width: f64,
    /// Vertical pixels per centimetre.
    pub ppc_height: f64,
}

/// Real-world measurements for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// Region id.
    pub id: RegionId,
    /// Region label at the time of computation.
    pub label: String,
    /// Real width in centimetres.
    pub width_cm: f64,
    /// Real height in centimetres.
    pub height_cm: f64,
    /// Real area in square centimetres.
    pub area_cm2: f64,
    /// Whether this row is the standard itself.
    pub is_standard: bool,
}

/// Dimension comparison report, one row per region in collection order.
///
/// Derived on demand and never stored with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Scale factors and the standard's sizes.
    pub standard: StandardSummary,
    /// Per-region measurements.
    pub rows: Vec<ReportRow>,
}

/// Compute the dimension report for `regions`.
///
/// # Errors
///
/// - [`CalibrationError::NoStandardSelected`] if `standard_id` is `None`.
/// - [`CalibrationError::StandardNotFound`] if no region has that id.
/// - [`CalibrationError::InvalidCalibrationInput`] if either declared
///   dimension is not a finite, strictly positive number.
pub fn compute_report(
    regions: &[Region],
    standard_id: Option<&RegionId>,
    width_cm: f64,
    height_cm: f64,
) -> Result<Report, CalibrationError> {
    let id = standard_id.ok_or(CalibrationError::NoStandardSelected)?;
    let standard = regions
        .iter()
        .find(|r| r.id() == id)
        .ok_or_else(|| CalibrationError::StandardNotFound(id.clone()))?;
    validate_input(width_cm, height_cm)?;

    let pixel_width = standard.rect().w;
    let pixel_height = standard.rect().h;
    let ppc_width = pixel_width / width_cm;
    let ppc_height = pixel_height / height_cm;

    let rows = regions
        .iter()
        .map(|r| {
            let real_w = r.rect().w / ppc_width;
            let real_h = r.rect().h / ppc_height;
            ReportRow {
                id: r.id().clone(),
                label: r.label().to_owned(),
                width_cm: real_w,
                height_cm: real_h,
                area_cm2: real_w * real_h,
                is_standard: r.id() == id,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        standard = standard.label(),
        ppc_width,
        ppc_height,
        rows = rows.len(),
        "report computed"
    );

    Ok(Report {
        standard: StandardSummary {
            id: id.clone(),
            label: standard.label().to_owned(),
            pixel_width,
            pixel_height,
            width_cm,
            height_cm,
            ppc_width,
            ppc_height,
        },
        rows,
    })
}

fn validate_input(width_cm: f64, height_cm: f64) -> Result<(), CalibrationError> {
    let ok = |v: f64| v.is_finite() && v > 0.0;
    if ok(width_cm) && ok(height_cm) {
        Ok(())
    } else {
        Err(CalibrationError::InvalidCalibrationInput {
            width_cm,
            height_cm,
        })
    }
}
