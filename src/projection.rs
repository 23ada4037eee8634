//! Calibrated scale and perspective projection of distance rings.
//!
//! Everything in here is plain data and pure functions. The viewport is in
//! pixels of the selected display, y grows downward, and the anchor point is
//! where the player's feet are on screen.

use std::fmt;
use std::ops::RangeInclusive;
use tracing::warn;

/// Vertical gap between the top of a ring and its distance label.
pub const LABEL_MARGIN_PX: f64 = 15.0;

/// Rings at or beyond this distance sit on the horizon line.
pub const SATURATION_DISTANCE_M: f64 = 50.0;

pub const HORIZON_OFFSET_RANGE: RangeInclusive<f64> = 0.0..=0.8;
pub const COMPRESSION_RANGE: RangeInclusive<f64> = 0.1..=1.0;
pub const ANCHOR_HEIGHT_RANGE: RangeInclusive<f64> = 0.6..=0.95;

/// Scale factor derived from an interactive calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    pub pixels_per_meter: f64,
    pub reference_distance_m: f64,
    pub reference_radius_px: f64,
}

impl CalibrationState {
    /// Build from a measured radius for a known reference distance.
    pub fn from_reference(reference_distance_m: f64, reference_radius_px: f64) -> Option<Self> {
        if !is_positive(reference_distance_m) || !is_positive(reference_radius_px) {
            return None;
        }
        Some(Self {
            pixels_per_meter: reference_radius_px / reference_distance_m,
            reference_distance_m,
            reference_radius_px,
        })
    }

    /// Build from a stored scale. The reference radius is derived so that
    /// `pixels_per_meter == reference_radius_px / reference_distance_m`.
    pub fn from_scale(pixels_per_meter: f64, reference_distance_m: f64) -> Option<Self> {
        if !is_positive(pixels_per_meter) || !is_positive(reference_distance_m) {
            return None;
        }
        Some(Self {
            pixels_per_meter,
            reference_distance_m,
            reference_radius_px: pixels_per_meter * reference_distance_m,
        })
    }

    pub fn is_calibrated(&self) -> bool {
        is_positive(self.pixels_per_meter)
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            pixels_per_meter: 100.0,
            reference_distance_m: 10.0,
            reference_radius_px: 1000.0,
        }
    }
}

/// Which perspective slider a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerspectiveField {
    HorizonOffset,
    Compression,
    AnchorHeight,
}

impl PerspectiveField {
    pub fn range(self) -> RangeInclusive<f64> {
        match self {
            PerspectiveField::HorizonOffset => HORIZON_OFFSET_RANGE,
            PerspectiveField::Compression => COMPRESSION_RANGE,
            PerspectiveField::AnchorHeight => ANCHOR_HEIGHT_RANGE,
        }
    }

    /// Slider resolution used by keyboard adjustment.
    pub fn step(self) -> f64 {
        match self {
            PerspectiveField::HorizonOffset | PerspectiveField::Compression => 0.1,
            PerspectiveField::AnchorHeight => 0.05,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PerspectiveField::HorizonOffset => "horizon",
            PerspectiveField::Compression => "compression",
            PerspectiveField::AnchorHeight => "anchor",
        }
    }
}

impl fmt::Display for PerspectiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveConfig {
    pub enabled: bool,
    /// Fraction of the viewport height between the anchor and the horizon.
    pub horizon_offset: f64,
    /// Vertical radius multiplier (1.0 = circle).
    pub compression: f64,
    /// Anchor position as a fraction of the viewport height from the top.
    pub anchor_height: f64,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            horizon_offset: 0.3,
            compression: 0.2,
            anchor_height: 0.85,
        }
    }
}

impl PerspectiveConfig {
    pub fn get(&self, field: PerspectiveField) -> f64 {
        match field {
            PerspectiveField::HorizonOffset => self.horizon_offset,
            PerspectiveField::Compression => self.compression,
            PerspectiveField::AnchorHeight => self.anchor_height,
        }
    }

    /// Set a field, clamping into its slider range. Returns the stored value.
    pub fn set(&mut self, field: PerspectiveField, value: f64) -> f64 {
        let range = field.range();
        let value = value.clamp(*range.start(), *range.end());
        match field {
            PerspectiveField::HorizonOffset => self.horizon_offset = value,
            PerspectiveField::Compression => self.compression = value,
            PerspectiveField::AnchorHeight => self.anchor_height = value,
        }
        value
    }
}

/// One configured distance. `color_index` is the ring's slot in the
/// configured list, so skipped entries do not shift the colors of later ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRing {
    pub distance_m: f64,
    pub color_index: usize,
}

impl DistanceRing {
    pub fn is_renderable(&self) -> bool {
        is_positive(self.distance_m)
    }
}

/// Assign color slots to a plain distance list. Nothing is dropped here.
pub fn rings_from_distances(distances: &[f64]) -> Vec<DistanceRing> {
    distances
        .iter()
        .enumerate()
        .map(|(color_index, &distance_m)| DistanceRing {
            distance_m,
            color_index,
        })
        .collect()
}

/// Pixel geometry of the selected display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportGeometry {
    pub width: i32,
    pub height: i32,
    pub anchor_x: i32,
    pub anchor_y: i32,
    pub crosshair_y: i32,
}

impl ViewportGeometry {
    pub fn new(width: i32, height: i32, anchor_height: f64) -> Self {
        Self {
            width,
            height,
            anchor_x: width / 2,
            anchor_y: (f64::from(height) * anchor_height).round() as i32,
            crosshair_y: height / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedRing {
    pub distance_m: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub radius_x: f64,
    pub radius_y: f64,
    pub label_x: f64,
    pub label_y: f64,
    pub color_index: usize,
}

/// Normalized progress of a distance toward the saturation cap, in `[0, 1]`.
pub fn distance_factor(distance_m: f64) -> f64 {
    (distance_m / SATURATION_DISTANCE_M).clamp(0.0, 1.0)
}

pub fn horizon_y(viewport: &ViewportGeometry, perspective: &PerspectiveConfig) -> f64 {
    f64::from(viewport.anchor_y) - f64::from(viewport.height) * perspective.horizon_offset
}

/// Project every renderable ring into screen space.
///
/// Output order follows input order. No sorting by distance is done, so a
/// later near ring may be drawn under an earlier far one.
pub fn project(
    rings: &[DistanceRing],
    calibration: &CalibrationState,
    perspective: &PerspectiveConfig,
    viewport: &ViewportGeometry,
) -> Vec<RenderedRing> {
    if !calibration.is_calibrated() {
        warn!(
            "Refusing to project rings with scale {} px/m",
            calibration.pixels_per_meter
        );
        return Vec::new();
    }

    let anchor_x = f64::from(viewport.anchor_x);
    let anchor_y = f64::from(viewport.anchor_y);
    let horizon = horizon_y(viewport, perspective);

    rings
        .iter()
        .filter(|ring| ring.is_renderable())
        .map(|ring| {
            let d = ring.distance_m;
            let base = d * calibration.pixels_per_meter;

            let (center_y, radius_x, radius_y) = if perspective.enabled {
                let factor = distance_factor(d);
                (
                    anchor_y - factor * (anchor_y - horizon),
                    base,
                    base * perspective.compression,
                )
            } else {
                (anchor_y, base, base)
            };

            RenderedRing {
                distance_m: d,
                center_x: anchor_x,
                center_y,
                radius_x,
                radius_y,
                label_x: anchor_x,
                label_y: center_y - radius_y - LABEL_MARGIN_PX,
                color_index: ring.color_index,
            }
        })
        .collect()
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn scenario_calibration() -> CalibrationState {
        CalibrationState::from_reference(10.0, 150.0).unwrap()
    }

    fn scenario_viewport() -> ViewportGeometry {
        ViewportGeometry::new(1600, 1000, 0.85)
    }

    #[test]
    fn calibration_scale_is_radius_over_distance() {
        for (d, r) in [(10.0, 150.0), (3.0, 10.0), (0.5, 1234.0), (42.0, 85.0)] {
            let calib = CalibrationState::from_reference(d, r).unwrap();
            assert!((calib.pixels_per_meter - r / d).abs() < EPS);
        }
    }

    #[test]
    fn calibration_rejects_non_positive_inputs() {
        assert!(CalibrationState::from_reference(0.0, 100.0).is_none());
        assert!(CalibrationState::from_reference(10.0, -1.0).is_none());
        assert!(CalibrationState::from_scale(f64::NAN, 10.0).is_none());
    }

    #[test]
    fn from_scale_keeps_invariant() {
        let calib = CalibrationState::from_scale(15.0, 10.0).unwrap();
        let derived = calib.reference_radius_px / calib.reference_distance_m;
        assert!((derived - calib.pixels_per_meter).abs() < EPS);
    }

    #[test]
    fn viewport_anchor_and_crosshair() {
        let vp = scenario_viewport();
        assert_eq!(vp.anchor_x, 800);
        assert_eq!(vp.anchor_y, 850);
        assert_eq!(vp.crosshair_y, 500);
    }

    #[test]
    fn flat_projection_is_centred_circles() {
        let persp = PerspectiveConfig {
            enabled: false,
            ..PerspectiveConfig::default()
        };
        let vp = scenario_viewport();
        let out = project(
            &rings_from_distances(&[5.0, 25.0]),
            &scenario_calibration(),
            &persp,
            &vp,
        );

        assert_eq!(out.len(), 2);
        for (ring, expected) in out.iter().zip([75.0, 375.0]) {
            assert!((ring.radius_x - expected).abs() < EPS);
            assert!((ring.radius_y - expected).abs() < EPS);
            assert!((ring.center_x - 800.0).abs() < EPS);
            assert!((ring.center_y - 850.0).abs() < EPS);
            assert!((ring.label_y - (850.0 - expected - LABEL_MARGIN_PX)).abs() < EPS);
        }
    }

    #[test]
    fn perspective_scenario_matches_expected_geometry() {
        let persp = PerspectiveConfig {
            enabled: true,
            horizon_offset: 0.3,
            compression: 0.2,
            anchor_height: 0.85,
        };
        let vp = scenario_viewport();
        assert!((horizon_y(&vp, &persp) - 550.0).abs() < EPS);

        let out = project(
            &rings_from_distances(&[5.0, 25.0]),
            &scenario_calibration(),
            &persp,
            &vp,
        );

        assert!((out[0].center_y - 820.0).abs() < EPS);
        assert!((out[0].radius_y - 15.0).abs() < EPS);
        assert!((out[0].radius_x - 75.0).abs() < EPS);
        assert!((out[1].center_y - 700.0).abs() < EPS);
        assert!((out[1].radius_y - 75.0).abs() < EPS);
        assert!((out[1].radius_x - 375.0).abs() < EPS);
        assert!((out[1].label_y - (700.0 - 75.0 - LABEL_MARGIN_PX)).abs() < EPS);
    }

    #[test]
    fn compression_only_touches_vertical_radius() {
        let calib = CalibrationState::from_scale(12.5, 10.0).unwrap();
        let vp = scenario_viewport();
        for c in [0.1, 0.35, 0.7, 1.0] {
            let persp = PerspectiveConfig {
                compression: c,
                ..PerspectiveConfig::default()
            };
            let out = project(&rings_from_distances(&[8.0]), &calib, &persp, &vp);
            assert!((out[0].radius_x - 100.0).abs() < EPS);
            assert!((out[0].radius_y - 100.0 * c).abs() < EPS);
        }
    }

    #[test]
    fn distance_factor_saturates_at_fifty_meters() {
        let mut previous = 0.0;
        for step in 1..=500 {
            let d = step as f64 * 0.1;
            let factor = distance_factor(d);
            assert!(factor >= previous);
            previous = factor;
        }
        assert_eq!(distance_factor(50.0), 1.0);
        assert_eq!(distance_factor(75.0), 1.0);
        assert_eq!(distance_factor(1000.0), 1.0);
    }

    #[test]
    fn far_rings_stop_at_the_horizon() {
        let vp = scenario_viewport();
        let persp = PerspectiveConfig::default();
        let out = project(
            &rings_from_distances(&[50.0, 120.0]),
            &scenario_calibration(),
            &persp,
            &vp,
        );
        let horizon = horizon_y(&vp, &persp);
        assert!((out[0].center_y - horizon).abs() < EPS);
        assert!((out[1].center_y - horizon).abs() < EPS);
    }

    #[test]
    fn non_positive_distances_are_dropped_duplicates_kept() {
        let rings = rings_from_distances(&[0.0, -5.0, 10.0, 10.0]);
        let out = project(
            &rings,
            &scenario_calibration(),
            &PerspectiveConfig::default(),
            &scenario_viewport(),
        );

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].distance_m, 10.0);
        assert_eq!(out[0].center_y, out[1].center_y);
        assert_eq!(out[0].radius_x, out[1].radius_x);
        // Color slots follow the configured list, skipped entries included.
        assert_eq!(out[0].color_index, 2);
        assert_eq!(out[1].color_index, 3);
    }

    #[test]
    fn uncalibrated_scale_renders_nothing() {
        let calib = CalibrationState {
            pixels_per_meter: 0.0,
            reference_distance_m: 10.0,
            reference_radius_px: 0.0,
        };
        let out = project(
            &rings_from_distances(&[5.0]),
            &calib,
            &PerspectiveConfig::default(),
            &scenario_viewport(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn perspective_set_clamps_to_slider_range() {
        let mut persp = PerspectiveConfig::default();
        assert_eq!(persp.set(PerspectiveField::HorizonOffset, 2.0), 0.8);
        assert_eq!(persp.set(PerspectiveField::Compression, 0.0), 0.1);
        assert_eq!(persp.set(PerspectiveField::AnchorHeight, 0.7), 0.7);
        assert_eq!(persp.get(PerspectiveField::AnchorHeight), 0.7);
    }
}
