//! In-progress draw gesture.
//!
//! A gesture starts at a pointer-down position and follows the pointer
//! until release. The live rectangle is always normalized (non-negative
//! size) and clamped to the image, so a drag that leaves the image ends
//! on its border.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Rect};

/// A rectangle being dragged out by the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawGesture {
    bounds: Dimensions,
    start: (f64, f64),
    current: (f64, f64),
}

impl DrawGesture {
    /// Start a gesture at `(x, y)` on an image of size `bounds`.
    #[must_use]
    pub fn begin(bounds: Dimensions, x: f64, y: f64) -> Self {
        let start = clamp_point(bounds, x, y);
        Self {
            bounds,
            start,
            current: start,
        }
    }

    /// Move the free corner to `(x, y)`.
    pub fn update(&mut self, x: f64, y: f64) {
        self.current = clamp_point(self.bounds, x, y);
    }

    /// The rectangle spanned so far.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::from_corners(self.start.0, self.start.1, self.current.0, self.current.1)
    }
}

/// Clamp a pointer position into `[0, width] x [0, height]`.
///
/// Non-finite input collapses to the origin on that axis.
fn clamp_point(bounds: Dimensions, x: f64, y: f64) -> (f64, f64) {
    let clamp = |v: f64, max: u32| {
        if v.is_finite() {
            v.clamp(0.0, f64::from(max))
        } else {
            0.0
        }
    };
    (clamp(x, bounds.width), clamp(y, bounds.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: Dimensions = Dimensions::new(200, 100);

    #[test]
    fn fresh_gesture_is_empty() {
        let g = DrawGesture::begin(BOUNDS, 10.0, 20.0);
        assert_eq!(g.rect(), Rect::new(10.0, 20.0, 0.0, 0.0));
    }

    #[test]
    fn drag_down_right() {
        let mut g = DrawGesture::begin(BOUNDS, 10.0, 20.0);
        g.update(40.0, 70.0);
        assert_eq!(g.rect(), Rect::new(10.0, 20.0, 30.0, 50.0));
    }

    #[test]
    fn drag_up_left_normalizes() {
        let mut g = DrawGesture::begin(BOUNDS, 40.0, 70.0);
        g.update(10.0, 20.0);
        assert_eq!(g.rect(), Rect::new(10.0, 20.0, 30.0, 50.0));
    }

    #[test]
    fn drag_outside_image_is_clamped() {
        let mut g = DrawGesture::begin(BOUNDS, 150.0, 50.0);
        g.update(500.0, -30.0);
        assert_eq!(g.rect(), Rect::new(150.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn non_finite_position_collapses_to_origin() {
        let mut g = DrawGesture::begin(BOUNDS, 30.0, 30.0);
        g.update(f64::NAN, 60.0);
        assert_eq!(g.rect(), Rect::new(0.0, 30.0, 30.0, 30.0));
    }
}
