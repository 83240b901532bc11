//! Pixel-space geometry shared by observations and overlap zones.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A point in camera pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box in camera pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center x-coordinate.
    #[inline]
    pub fn cx(&self) -> f64 {
        self.x + self.width / 2.0
    }

    /// Center y-coordinate.
    #[inline]
    pub fn cy(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Zero or negative area, or non-finite coordinates.
    pub fn is_degenerate(&self) -> bool {
        !(self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Bottom-center of the box, where a standing person touches the floor.
    ///
    /// Overlap zones are drawn on the floor, so this is the point tested
    /// against overlap polygons.
    pub fn foot_point(&self) -> Point {
        Point::new(self.cx(), self.y2())
    }

    /// Center of the box.
    pub fn center(&self) -> Point {
        Point::new(self.cx(), self.cy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foot_point_is_bottom_center() {
        let bbox = BoundingBox::new(100.0, 50.0, 40.0, 120.0);
        assert_eq!(bbox.foot_point(), Point::new(120.0, 170.0));
        assert_eq!(bbox.center(), Point::new(120.0, 110.0));
    }

    #[test]
    fn test_degenerate_boxes() {
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 10.0).is_degenerate());
        assert!(BoundingBox::new(0.0, 0.0, 10.0, -1.0).is_degenerate());
        assert!(BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0).is_degenerate());
        assert!(!BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_degenerate());
    }
}
