//! Natural-language prompt describing the annotated regions.
//!
//! Region geometry is expressed relative to the image so that the prompt
//! reads the same whatever resolution the image was drawn at:
//!
//! ```text
//! center_x% = (x + w / 2) / image_width  * 100
//! center_y% = (y + h / 2) / image_height * 100
//! width%    = w / image_width  * 100
//! height%   = h / image_height * 100
//! ```

use std::fmt::Write;

use crate::calibration::CalibrationSettings;
use crate::types::{Dimensions, Region, RegionId};

/// Longest prompt the analysis endpoint accepts, in characters.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Errors from building a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    /// The image has a zero-sized axis, so relative positions are undefined.
    #[error("image dimensions {width}x{height} are empty")]
    EmptyImage {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },

    /// There is nothing to describe.
    #[error("no regions to analyze")]
    NoRegions,
}

/// A region's position and size relative to the image, in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlacement {
    /// Region label.
    pub label: String,
    /// Area in square pixels.
    pub area_px: f64,
    /// Horizontal centre as a percentage of image width.
    pub center_x_pct: f64,
    /// Vertical centre as a percentage of image height.
    pub center_y_pct: f64,
    /// Width as a percentage of image width.
    pub width_pct: f64,
    /// Height as a percentage of image height.
    pub height_pct: f64,
}

impl RegionPlacement {
    /// Relative placement of `region` on an image of size `image`.
    ///
    /// `image` must be non-empty; [`build_prompt`] checks this before
    /// calling.
    #[must_use]
    pub fn of(region: &Region, image: Dimensions) -> Self {
        let iw = f64::from(image.width);
        let ih = f64::from(image.height);
        let rect = region.rect();
        let (cx, cy) = rect.center();
        Self {
            label: region.label().to_owned(),
            area_px: rect.area(),
            center_x_pct: cx / iw * 100.0,
            center_y_pct: cy / ih * 100.0,
            width_pct: rect.w / iw * 100.0,
            height_pct: rect.h / ih * 100.0,
        }
    }
}

/// Build the analysis prompt for the current annotations.
///
/// # Errors
///
/// Returns [`PromptError::EmptyImage`] if either image axis is zero and
/// [`PromptError::NoRegions`] if `regions` is empty.
pub fn build_prompt(
    regions: &[Region],
    standard_id: Option<&RegionId>,
    calibration: &CalibrationSettings,
    image: Dimensions,
) -> Result<String, PromptError> {
    if image.is_empty() {
        return Err(PromptError::EmptyImage {
            width: image.width,
            height: image.height,
        });
    }
    if regions.is_empty() {
        return Err(PromptError::NoRegions);
    }

    let standard_label = standard_id
        .and_then(|id| regions.iter().find(|r| r.id() == id))
        .map(Region::label);

    let mut prompt = String::from(
        "You are a botanist and crop analyst reviewing an image of plant material. \
         Bounding boxes drawn by the user mark the buds of interest. ",
    );

    // Writing into a String cannot fail.
    match standard_label {
        Some(label) => {
            let _ = write!(
                prompt,
                "The reference bud for size comparison is {label}, declared as \
                 {:.2} cm x {:.2} cm. ",
                calibration.width_cm, calibration.height_cm,
            );
        }
        None => {
            let _ = write!(
                prompt,
                "No reference bud has been set; the declared reference size is \
                 {:.2} cm x {:.2} cm. ",
                calibration.width_cm, calibration.height_cm,
            );
        }
    }

    prompt.push_str("Annotated buds:");
    for region in regions {
        let p = RegionPlacement::of(region, image);
        let _ = write!(
            prompt,
            "\n- {} (area {:.0} px\u{b2}): centred at about ({:.1}%, {:.1}%) of the image, \
             spanning {:.1}% of its width and {:.1}% of its height.",
            p.label, p.area_px, p.center_x_pct, p.center_y_pct, p.width_pct, p.height_pct,
        );
    }

    let reference = standard_label.unwrap_or("the reference bud");
    let _ = write!(
        prompt,
        "\n\nDescribe the morphology, colour, and apparent developmental stage of \
         each labelled bud. Compare {reference} with the other buds, using the \
         declared real-world size to judge their perceived size. Finish with one \
         sentence on next steps for a dimension study of this sample.",
    );

    Ok(prompt)
}
