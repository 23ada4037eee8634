use palette::{IntoColor, Lab, Srgb};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Ring colors used when the settings file has none.
pub const DEFAULT_RING_COLORS: [&str; 5] = ["#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF"];

/// Color of the calibration guide circle.
pub const GUIDE_COLOR: RgbColor = RgbColor { r: 255, g: 0, b: 0 };

pub const CROSSHAIR_COLOR: RgbColor = RgbColor {
    r: 255,
    g: 255,
    b: 255,
};

/// RGB color, stored in settings as a hex string like "#FF0000"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    /// Parse from hex string like "#FF0000", "FF0000" or "#F00"
    pub fn from_hex(hex: &str) -> Option<Self> {
        let rgb: Srgb<u8> = hex.trim().parse().ok()?;
        Some(Self {
            r: rgb.red,
            g: rgb.green,
            b: rgb.blue,
        })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Black or white, whichever reads better drawn around this color.
    pub fn outline(self) -> RgbColor {
        let lab: Lab = Srgb::new(self.r, self.g, self.b)
            .into_format::<f32>()
            .into_color();
        if lab.l > 60.0 {
            RgbColor { r: 0, g: 0, b: 0 }
        } else {
            RgbColor {
                r: 255,
                g: 255,
                b: 255,
            }
        }
    }
}

impl fmt::Display for RgbColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for RgbColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| format!("Invalid color '{}': expected #RRGGBB", s))
    }
}

impl<'de> Deserialize<'de> for RgbColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RgbColor::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<RgbColor> for ratatui::style::Color {
    fn from(c: RgbColor) -> Self {
        ratatui::style::Color::Rgb(c.r, c.g, c.b)
    }
}

pub fn default_ring_colors() -> Vec<RgbColor> {
    DEFAULT_RING_COLORS
        .iter()
        .filter_map(|hex| RgbColor::from_hex(hex))
        .collect()
}

/// Color for a ring slot, cycling through the palette.
pub fn ring_color(colors: &[RgbColor], color_index: usize) -> RgbColor {
    if colors.is_empty() {
        return GUIDE_COLOR;
    }
    colors[color_index % colors.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_and_without_hash() {
        assert_eq!(
            RgbColor::from_hex("#FF8000"),
            Some(RgbColor { r: 255, g: 128, b: 0 })
        );
        assert_eq!(
            RgbColor::from_hex("00ff00"),
            Some(RgbColor { r: 0, g: 255, b: 0 })
        );
        assert!(RgbColor::from_hex("#GG0000").is_none());
        assert!(RgbColor::from_hex("red").is_none());
    }

    #[test]
    fn hex_is_uppercase_with_hash() {
        let c = RgbColor { r: 10, g: 171, b: 255 };
        assert_eq!(c.to_hex(), "#0AABFF");
        assert_eq!(RgbColor::from_hex(&c.to_hex()), Some(c));
    }

    #[test]
    fn defaults_match_five_slot_palette() {
        let colors = default_ring_colors();
        assert_eq!(colors.len(), 5);
        assert_eq!(colors[0], RgbColor { r: 255, g: 0, b: 0 });
        assert_eq!(ring_color(&colors, 7), colors[2]);
    }

    #[test]
    fn outline_contrasts_with_color() {
        assert_eq!(
            RgbColor { r: 255, g: 255, b: 0 }.outline(),
            RgbColor { r: 0, g: 0, b: 0 }
        );
        assert_eq!(
            RgbColor { r: 0, g: 0, b: 255 }.outline(),
            RgbColor { r: 255, g: 255, b: 255 }
        );
    }
}
