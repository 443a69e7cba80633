// src/geometry.rs
//
// Bounding-box primitives for collision inference.
//
// The overlap ratio divides the intersection area by the SMALLER of the two
// box areas, not the union. A box substantially contained in another scores
// close to 1.0 even when the larger box dwarfs it. That is the sensitivity
// wanted for partially-occluded or close-proximity vehicles; do not replace
// this with an IoU-style union ratio.

use crate::types::ZoneConfig;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel coordinates. Valid only when
/// x1 < x2 and y1 < y2; anything else is degenerate and overlaps nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Symmetric overlap ratio in [0, 1]: intersection area over the smaller
/// box's area. Degenerate or zero-area boxes yield exactly 0; the guards
/// run before any division.
pub fn overlap_ratio(a: &BoundingBox, b: &BoundingBox) -> f32 {
    if !a.is_valid() || !b.is_valid() {
        return 0.0;
    }

    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let iw = ix2 - ix1;
    let ih = iy2 - iy1;
    if iw <= 0.0 || ih <= 0.0 {
        return 0.0;
    }

    let smaller = a.area().min(b.area());
    if smaller <= 0.0 {
        return 0.0;
    }

    (iw * ih) / smaller
}

/// Static zone representing the ego vehicle's own footprint, derived from
/// the frame dimensions. Recomputed by the caller only when dimensions
/// change.
pub fn ego_zone(frame_width: usize, frame_height: usize, cfg: &ZoneConfig) -> BoundingBox {
    let w = frame_width as f32;
    let h = frame_height as f32;
    BoundingBox::new(
        w * cfg.x_start_ratio,
        h * cfg.y_start_ratio,
        w * cfg.x_end_ratio,
        h - cfg.bottom_margin_px,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2)
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = bx(0.0, 0.0, 100.0, 50.0);
        let b = bx(40.0, 10.0, 140.0, 90.0);
        assert_eq!(overlap_ratio(&a, &b), overlap_ratio(&b, &a));
        assert!(overlap_ratio(&a, &b) > 0.0);
    }

    #[test]
    fn identical_box_overlaps_fully() {
        let a = bx(12.5, 7.0, 300.0, 220.0);
        assert_eq!(overlap_ratio(&a, &a), 1.0);
    }

    #[test]
    fn disjoint_boxes_do_not_overlap() {
        let a = bx(0.0, 0.0, 10.0, 10.0);
        let b = bx(20.0, 20.0, 30.0, 30.0);
        assert_eq!(overlap_ratio(&a, &b), 0.0);
    }

    #[test]
    fn edge_touching_boxes_do_not_overlap() {
        // Shared edge: intersection width is exactly zero
        let a = bx(0.0, 0.0, 10.0, 10.0);
        let b = bx(10.0, 0.0, 20.0, 10.0);
        assert_eq!(overlap_ratio(&a, &b), 0.0);
    }

    #[test]
    fn degenerate_boxes_yield_zero_not_panic() {
        let inverted = bx(50.0, 50.0, 10.0, 10.0);
        let line = bx(0.0, 0.0, 0.0, 100.0);
        let valid = bx(0.0, 0.0, 100.0, 100.0);
        assert_eq!(overlap_ratio(&inverted, &valid), 0.0);
        assert_eq!(overlap_ratio(&valid, &inverted), 0.0);
        assert_eq!(overlap_ratio(&line, &valid), 0.0);
        assert_eq!(overlap_ratio(&line, &line), 0.0);
    }

    #[test]
    fn contained_box_scores_by_smaller_area() {
        // Small box fully inside a large one: min-area denominator gives 1.0,
        // where an IoU-style union ratio would give a small value
        let big = bx(0.0, 0.0, 1000.0, 1000.0);
        let small = bx(100.0, 100.0, 200.0, 200.0);
        assert_eq!(overlap_ratio(&big, &small), 1.0);
    }

    #[test]
    fn partial_overlap_reference_values() {
        // intersection 20x40 = 800, smaller area 40x40 = 1600 -> 0.5
        let zone = bx(30.0, 60.0, 70.0, 100.0);
        let vehicle = bx(50.0, 60.0, 90.0, 100.0);
        assert_eq!(overlap_ratio(&zone, &vehicle), 0.5);
    }

    #[test]
    fn ego_zone_uses_frame_fractions() {
        let cfg = ZoneConfig {
            x_start_ratio: 0.30,
            y_start_ratio: 0.60,
            x_end_ratio: 0.70,
            bottom_margin_px: 10.0,
        };
        let zone = ego_zone(1280, 720, &cfg);
        assert!((zone.x1 - 384.0).abs() < 0.01);
        assert!((zone.y1 - 432.0).abs() < 0.01);
        assert!((zone.x2 - 896.0).abs() < 0.01);
        assert_eq!(zone.y2, 710.0);
        assert!(zone.is_valid());
    }
}
