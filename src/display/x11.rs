//! Display enumeration through the X11 RandR extension.

use std::fmt::Display;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::xproto::ConnectionExt as _;

use super::{DisplayEnumerator, DisplayGeometry};
use crate::error::OverlayError;

/// Lists active RandR monitors of an X server.
#[derive(Debug, Default)]
pub struct RandrEnumerator {
    /// X display name, `None` for `$DISPLAY`.
    pub display_name: Option<String>,
}

fn enumeration_error(stage: &str, err: impl Display) -> OverlayError {
    OverlayError::DisplayEnumeration(format!("X11 {}: {}", stage, err))
}

impl DisplayEnumerator for RandrEnumerator {
    fn list_displays(&self) -> Result<Vec<DisplayGeometry>, OverlayError> {
        let (conn, screen_num) = x11rb::connect(self.display_name.as_deref())
            .map_err(|e| enumeration_error("connect", e))?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| enumeration_error("setup", format!("no screen {}", screen_num)))?
            .root;

        let reply = conn
            .randr_get_monitors(root, true)
            .map_err(|e| enumeration_error("RandR request", e))?
            .reply()
            .map_err(|e| enumeration_error("RandR reply", e))?;

        let mut displays = Vec::with_capacity(reply.monitors.len());
        for monitor in reply.monitors {
            let name = conn
                .get_atom_name(monitor.name)
                .ok()
                .and_then(|cookie| cookie.reply().ok())
                .map(|r| String::from_utf8_lossy(&r.name).into_owned())
                .unwrap_or_else(|| format!("monitor-{}", displays.len()));

            debug!(
                "RandR monitor {} primary={} {}x{}+{}+{}",
                name, monitor.primary, monitor.width, monitor.height, monitor.x, monitor.y
            );

            displays.push(DisplayGeometry {
                name,
                x: i32::from(monitor.x),
                y: i32::from(monitor.y),
                width: u32::from(monitor.width),
                height: u32::from(monitor.height),
            });
        }

        Ok(displays)
    }

    fn name(&self) -> &'static str {
        "x11-randr"
    }
}
