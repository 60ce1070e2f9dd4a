//! Geometry primitives in graph-layout coordinates.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in graph-layout coordinates.
///
/// Invariant: `min_x <= max_x` and `min_y <= max_y`. The constructor
/// normalizes swapped corners so the invariant holds for any input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    /// Create a bounding box from two corners, normalizing min/max per axis.
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// Build from an origin and a size (width/height may be negative).
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Inclusive containment on both min and max edges.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// True when the two rectangles overlap (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow the rectangle by `margin` units in every direction.
    pub fn expand(&self, margin: f32) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }
}

/// Current pan/zoom state of the visible region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub zoom: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32, zoom: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            zoom,
        }
    }

    /// The literal viewport rectangle, before any buffer-zone expansion.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_origin_size(self.x, self.y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_swapped_corners() {
        let b = BoundingBox::new(10.0, 20.0, -10.0, -20.0);
        assert_eq!(b.min_x, -10.0);
        assert_eq!(b.max_x, 10.0);
        assert_eq!(b.min_y, -20.0);
        assert_eq!(b.max_y, 20.0);
    }

    #[test]
    fn contains_is_inclusive_on_both_edges() {
        let b = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        assert!(b.contains(0.0, 0.0));
        assert!(b.contains(100.0, 100.0));
        assert!(b.contains(50.0, 50.0));
        assert!(!b.contains(100.1, 50.0));
        assert!(!b.contains(-0.1, 50.0));
    }

    #[test]
    fn intersects_counts_touching_edges() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let c = BoundingBox::new(10.5, 10.5, 20.0, 20.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn expand_grows_every_side() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0).expand(5.0);
        assert_eq!(b.min_x, -5.0);
        assert_eq!(b.max_y, 15.0);
        assert_eq!(b.width(), 20.0);
    }

    #[test]
    fn viewport_bounds_round_trip() {
        let vp = Viewport::new(-50.0, -50.0, 100.0, 80.0, 1.0);
        let b = vp.bounds();
        assert_eq!(b.min_x, -50.0);
        assert_eq!(b.max_x, 50.0);
        assert_eq!(b.height(), 80.0);
        assert_eq!(b.center(), (0.0, -10.0));
    }
}
