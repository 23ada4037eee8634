//! Headless surface: writes one frame as plain text, one shape per line,
//! for scripts or an external drawing tool.

use anyhow::{Context, Result};
use std::io::{self, Write};
use tracing::info;

use crate::app::App;
use crate::events::AppEvent;
use crate::renderer::Scene;

pub fn write_scene<W: Write>(out: &mut W, scene: &Scene) -> io::Result<()> {
    let vp = &scene.viewport;
    writeln!(
        out,
        "viewport {}x{} anchor={},{} crosshair={},{}",
        vp.width, vp.height, vp.anchor_x, vp.anchor_y, vp.anchor_x, vp.crosshair_y
    )?;

    for ring in &scene.rings {
        let g = &ring.geometry;
        writeln!(
            out,
            "ring {} center={:.1},{:.1} radius={:.1}x{:.1} label={:.1},{:.1} color={}",
            g.distance_m,
            g.center_x,
            g.center_y,
            g.radius_x,
            g.radius_y,
            g.label_x,
            g.label_y,
            ring.color
        )?;
    }

    for marker in &scene.markers {
        writeln!(
            out,
            "marker {:.1},{:.1} r={} color={}",
            marker.x, marker.y, marker.radius, marker.color
        )?;
    }

    for label in &scene.labels {
        writeln!(
            out,
            "label {:.1},{:.1} color={} {:?}",
            label.x, label.y, label.color, label.text
        )?;
    }

    Ok(())
}

/// Print the overlay for the selected display and return.
pub fn run(app: &mut App) -> Result<()> {
    if !app.overlay_enabled() {
        app.dispatch(AppEvent::OverlayToggle);
    }
    let vp = app.viewport();
    info!(
        "Projecting for {} ({}x{})",
        app.current_display().name,
        vp.width,
        vp.height
    );
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_scene(&mut out, &app.scene()).context("Failed to write scene")?;
    out.flush()?;
    Ok(())
}
