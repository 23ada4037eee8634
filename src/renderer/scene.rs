//! Surface-independent description of one frame.

use crate::color::{ring_color, RgbColor, CROSSHAIR_COLOR, GUIDE_COLOR};
use crate::projection::{project, rings_from_distances, RenderedRing, ViewportGeometry};
use crate::settings::Settings;

/// Gap between the top of the calibration guide and its caption.
pub const GUIDE_CAPTION_MARGIN_PX: f64 = 50.0;
pub const CROSSHAIR_DOT_RADIUS_PX: f64 = 2.0;
pub const ANCHOR_DOT_RADIUS_PX: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RingShape {
    pub geometry: RenderedRing,
    pub color: RgbColor,
}

/// Text centred horizontally on `x`, vertically on `y`. May span lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: RgbColor,
}

/// A small filled dot (crosshair, anchor).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub color: RgbColor,
}

/// Everything a surface needs to draw one frame, in viewport pixels.
/// Surfaces clear and redraw the whole scene every time.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub viewport: ViewportGeometry,
    pub rings: Vec<RingShape>,
    pub labels: Vec<Label>,
    pub markers: Vec<Marker>,
}

impl Scene {
    pub fn blank(viewport: ViewportGeometry) -> Self {
        Self {
            viewport,
            rings: Vec::new(),
            labels: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// Distance rings with their labels, plus the crosshair.
    pub fn overlay(settings: &Settings, viewport: ViewportGeometry) -> Self {
        let projected = project(
            &rings_from_distances(&settings.distances),
            &settings.calibration,
            &settings.perspective,
            &viewport,
        );

        let mut scene = Self::blank(viewport);
        for ring in projected {
            let color = ring_color(&settings.colors, ring.color_index);
            scene.labels.push(Label {
                x: ring.label_x,
                y: ring.label_y,
                text: format_distance(ring.distance_m),
                color,
            });
            scene.rings.push(RingShape {
                geometry: ring,
                color,
            });
        }
        scene.markers.push(crosshair(&viewport));
        scene
    }

    /// The calibration guide: a circle of `radius_px` on the anchor.
    pub fn calibration(viewport: ViewportGeometry, distance_m: f64, radius_px: f64) -> Self {
        let anchor_x = f64::from(viewport.anchor_x);
        let anchor_y = f64::from(viewport.anchor_y);

        let mut scene = Self::blank(viewport);
        scene.rings.push(RingShape {
            geometry: RenderedRing {
                distance_m,
                center_x: anchor_x,
                center_y: anchor_y,
                radius_x: radius_px,
                radius_y: radius_px,
                label_x: anchor_x,
                label_y: anchor_y - radius_px - GUIDE_CAPTION_MARGIN_PX,
                color_index: 0,
            },
            color: GUIDE_COLOR,
        });
        scene.markers.push(Marker {
            x: anchor_x,
            y: anchor_y,
            radius: ANCHOR_DOT_RADIUS_PX,
            color: GUIDE_COLOR,
        });
        scene.markers.push(crosshair(&viewport));
        scene.labels.push(Label {
            x: anchor_x,
            y: anchor_y - radius_px - GUIDE_CAPTION_MARGIN_PX,
            text: format!(
                "Calibration: {}\nScroll to resize\nCircle centre = your feet",
                format_distance(distance_m)
            ),
            color: CROSSHAIR_COLOR,
        });
        scene
    }

    pub fn is_blank(&self) -> bool {
        self.rings.is_empty() && self.labels.is_empty() && self.markers.is_empty()
    }
}

fn crosshair(viewport: &ViewportGeometry) -> Marker {
    Marker {
        x: f64::from(viewport.anchor_x),
        y: f64::from(viewport.crosshair_y),
        radius: CROSSHAIR_DOT_RADIUS_PX,
        color: CROSSHAIR_COLOR,
    }
}

/// "25m" for whole numbers, "12.5m" otherwise.
pub fn format_distance(distance_m: f64) -> String {
    if distance_m.fract() == 0.0 && distance_m.abs() < 1e15 {
        format!("{}m", distance_m as i64)
    } else {
        format!("{}m", distance_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{CalibrationState, PerspectiveConfig};

    fn settings() -> Settings {
        Settings {
            calibration: CalibrationState::from_reference(10.0, 150.0).unwrap(),
            distances: vec![5.0, 0.0, 25.0],
            perspective: PerspectiveConfig {
                enabled: false,
                ..PerspectiveConfig::default()
            },
            ..Settings::default()
        }
    }

    #[test]
    fn overlay_has_ring_label_pairs_and_crosshair() {
        let vp = ViewportGeometry::new(1000, 1000, 0.85);
        let scene = Scene::overlay(&settings(), vp);

        assert_eq!(scene.rings.len(), 2);
        assert_eq!(scene.labels.len(), 2);
        assert_eq!(scene.labels[0].text, "5m");
        assert_eq!(scene.labels[1].text, "25m");
        // Slot 2 keeps its own color even though slot 1 is skipped.
        let colors = Settings::default().colors;
        assert_eq!(scene.rings[1].color, colors[2]);
        assert_eq!(scene.labels[1].color, colors[2]);

        assert_eq!(scene.markers.len(), 1);
        assert_eq!(scene.markers[0].x, 500.0);
        assert_eq!(scene.markers[0].y, 500.0);
    }

    #[test]
    fn calibration_scene_centres_guide_on_anchor() {
        let vp = ViewportGeometry::new(1000, 1000, 0.85);
        let scene = Scene::calibration(vp, 10.0, 120.0);

        assert_eq!(scene.rings.len(), 1);
        let guide = scene.rings[0].geometry;
        assert_eq!((guide.center_x, guide.center_y), (500.0, 850.0));
        assert_eq!((guide.radius_x, guide.radius_y), (120.0, 120.0));
        assert_eq!(scene.labels[0].y, 850.0 - 120.0 - GUIDE_CAPTION_MARGIN_PX);
        assert!(scene.labels[0].text.starts_with("Calibration: 10m"));
        assert_eq!(scene.markers.len(), 2);
    }

    #[test]
    fn distance_formatting() {
        assert_eq!(format_distance(10.0), "10m");
        assert_eq!(format_distance(12.5), "12.5m");
        assert_eq!(format_distance(0.25), "0.25m");
    }

    #[test]
    fn blank_scene() {
        assert!(Scene::blank(ViewportGeometry::new(10, 10, 0.85)).is_blank());
    }
}
