pub mod print;
pub mod terminal;

#[cfg(feature = "x11")]
pub mod x11;

use clap::ValueEnum;
use std::fmt;
use tracing::{info, warn};

use crate::error::OverlayError;
use crate::projection::ViewportGeometry;

/// Where the overlay is rendered.
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq)]
pub enum DisplayMode {
    /// Interactive preview in the terminal
    #[default]
    Terminal,
    /// Print the projected geometry once and exit
    Print,
}

/// Position and size of one physical display, in desktop pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayGeometry {
    pub fn viewport(&self, anchor_height: f64) -> ViewportGeometry {
        ViewportGeometry::new(
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
            anchor_height,
        )
    }
}

impl fmt::Display for DisplayGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}x{} at ({}, {})",
            self.name, self.width, self.height, self.x, self.y
        )
    }
}

/// Source of the display list.
pub trait DisplayEnumerator {
    fn list_displays(&self) -> Result<Vec<DisplayGeometry>, OverlayError>;

    fn name(&self) -> &'static str;
}

/// Single full-screen display of a configured size. Used when nothing
/// better is available.
pub struct FallbackDisplay {
    pub width: u32,
    pub height: u32,
}

impl FallbackDisplay {
    pub fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry {
            name: "Primary display".to_string(),
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }
}

impl DisplayEnumerator for FallbackDisplay {
    fn list_displays(&self) -> Result<Vec<DisplayGeometry>, OverlayError> {
        Ok(vec![self.geometry()])
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// Pick the best enumerator for this session.
pub fn platform_enumerator() -> Option<Box<dyn DisplayEnumerator>> {
    #[cfg(feature = "x11")]
    {
        if std::env::var_os("DISPLAY").is_some() {
            return Some(Box::new(x11::RandrEnumerator::default()));
        }
    }
    None
}

/// Enumerate displays, sorted top-to-bottom then left-to-right.
///
/// Never returns an empty list: enumeration failures and empty results fall
/// back to the single configured display.
pub fn detect_displays(
    enumerator: Option<&dyn DisplayEnumerator>,
    fallback: &FallbackDisplay,
) -> Vec<DisplayGeometry> {
    let listed = match enumerator {
        Some(enumerator) => match enumerator.list_displays() {
            Ok(displays) if !displays.is_empty() => Some(displays),
            Ok(_) => {
                warn!("{} reported no displays", enumerator.name());
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        },
        None => None,
    };

    let mut displays = listed.unwrap_or_else(|| vec![fallback.geometry()]);
    displays.sort_by_key(|d| (d.y, d.x));

    info!("Found {} display(s)", displays.len());
    for (i, geometry) in displays.iter().enumerate() {
        info!("  {}: {}", i, geometry);
    }
    displays
}
