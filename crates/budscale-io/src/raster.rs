//! Raster image probing and overlay rendering.
//!
//! The annotated image sent for analysis is the loaded photo with every
//! region outlined: blue for the standard, red for the rest.

use std::io::Cursor;

use budscale_core::{Dimensions, Region, RegionId};
use image::{ImageEncoder, ImageReader, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as PixelRect;

/// Outline colour for the standard region.
pub const STANDARD_COLOR: Rgba<u8> = Rgba([0x25, 0x63, 0xEB, 0xFF]);
/// Outline colour for every other region.
pub const REGION_COLOR: Rgba<u8> = Rgba([0xEF, 0x44, 0x44, 0xFF]);
/// Outline thickness in pixels.
pub const OUTLINE_WIDTH: i32 = 4;

/// Errors from decoding or encoding raster images.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The format is unrecognized or the data is corrupt.
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncode(#[source] image::ImageError),
}

/// Read the image dimensions from the header without decoding pixels.
///
/// # Errors
///
/// Returns [`RasterError::EmptyInput`] if `bytes` is empty and
/// [`RasterError::Decode`] if the format is not recognized.
pub fn image_dimensions(bytes: &[u8]) -> Result<Dimensions, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::EmptyInput);
    }
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RasterError::Decode(image::ImageError::IoError(e)))?
        .into_dimensions()
        .map_err(RasterError::Decode)?;
    Ok(Dimensions::new(width, height))
}

/// Draw region outlines over the image and re-encode it as PNG.
///
/// Outlines are centred on each region's edge, so a 4 px stroke extends
/// 2 px to either side. Parts that fall outside the image are clipped.
///
/// # Errors
///
/// Returns [`RasterError::EmptyInput`] or [`RasterError::Decode`] if the
/// image cannot be read and [`RasterError::PngEncode`] if encoding fails.
pub fn render_overlay(
    bytes: &[u8],
    regions: &[Region],
    standard_id: Option<&RegionId>,
) -> Result<Vec<u8>, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::EmptyInput);
    }
    let mut canvas = image::load_from_memory(bytes)
        .map_err(RasterError::Decode)?
        .to_rgba8();

    for region in regions {
        let color = if Some(region.id()) == standard_id {
            STANDARD_COLOR
        } else {
            REGION_COLOR
        };
        outline(&mut canvas, region, color);
    }

    encode_png(&canvas)
}

/// Encode an RGBA image as PNG bytes.
///
/// # Errors
///
/// Returns [`RasterError::PngEncode`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(RasterError::PngEncode)?;
    Ok(png_bytes)
}

fn outline(canvas: &mut RgbaImage, region: &Region, color: Rgba<u8>) {
    let rect = region.rect();
    #[expect(clippy::cast_possible_truncation)]
    let (left, top) = (rect.x.round() as i32, rect.y.round() as i32);
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (width, height) = (rect.w.round().max(1.0) as u32, rect.h.round().max(1.0) as u32);

    let half = OUTLINE_WIDTH / 2;
    for inset in -half..OUTLINE_WIDTH - half {
        // Negative insets grow the rectangle outwards.
        let grow = u32::try_from(-inset * 2).unwrap_or(0);
        let shrink = u32::try_from(inset * 2).unwrap_or(0);
        let (Some(w), Some(h)) = (
            (width + grow).checked_sub(shrink).filter(|w| *w > 0),
            (height + grow).checked_sub(shrink).filter(|h| *h > 0),
        ) else {
            continue;
        };
        draw_hollow_rect_mut(
            canvas,
            PixelRect::at(left + inset, top + inset).of_size(w, h),
            color,
        );
    }
}
