use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::color::{default_ring_colors, RgbColor};
use crate::error::OverlayError;
use crate::projection::{
    CalibrationState, PerspectiveConfig, ANCHOR_HEIGHT_RANGE, COMPRESSION_RANGE,
    HORIZON_OFFSET_RANGE,
};

pub const DEFAULT_DISTANCES: [f64; 5] = [1.0, 5.0, 10.0, 25.0, 40.0];

/// Display selection and the size used when no display can be enumerated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    pub monitor: usize,
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            monitor: 0,
            fallback_width: 1920,
            fallback_height: 1080,
        }
    }
}

/// Everything persisted between sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub calibration: CalibrationState,
    /// Configured ring distances in meters. Non-positive entries are kept
    /// here and skipped at render time.
    pub distances: Vec<f64>,
    pub colors: Vec<RgbColor>,
    pub perspective: PerspectiveConfig,
    pub display: DisplaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            calibration: CalibrationState::default(),
            distances: DEFAULT_DISTANCES.to_vec(),
            colors: default_ring_colors(),
            perspective: PerspectiveConfig::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults per key.
    ///
    /// Never fails: a missing file yields defaults, a file that does not
    /// parse as TOML yields defaults, and any single missing or invalid key
    /// yields that key's default.
    pub fn load(path: &Path) -> Self {
        match read_table(path) {
            Ok(Some(table)) => {
                info!("Loaded settings from {}", path.display());
                Self::from_table(&table)
            }
            Ok(None) => {
                info!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Build settings from an already parsed TOML table.
    pub fn from_table(table: &toml::Table) -> Self {
        let defaults = Self::default();

        let reference_distance = lookup(table, "calibration", "reference_distance", |v: &f64| {
            v.is_finite() && *v > 0.0
        })
        .unwrap_or(defaults.calibration.reference_distance_m);
        let calibration = lookup(table, "calibration", "pixels_per_meter", |v: &f64| {
            v.is_finite() && *v > 0.0
        })
        .and_then(|ppm| CalibrationState::from_scale(ppm, reference_distance))
        .or_else(|| {
            CalibrationState::from_scale(defaults.calibration.pixels_per_meter, reference_distance)
        })
        .unwrap_or(defaults.calibration);

        let distances = lookup(table, "rings", "distances", |v: &Vec<f64>| {
            v.iter().all(|d| d.is_finite())
        })
        .unwrap_or(defaults.distances);
        let colors = lookup(table, "rings", "colors", |v: &Vec<RgbColor>| !v.is_empty())
            .unwrap_or(defaults.colors);

        let perspective = PerspectiveConfig {
            enabled: lookup(table, "perspective", "enabled", |_: &bool| true)
                .unwrap_or(defaults.perspective.enabled),
            horizon_offset: lookup(table, "perspective", "horizon_offset", |v: &f64| {
                HORIZON_OFFSET_RANGE.contains(v)
            })
            .unwrap_or(defaults.perspective.horizon_offset),
            compression: lookup(table, "perspective", "compression", |v: &f64| {
                COMPRESSION_RANGE.contains(v)
            })
            .unwrap_or(defaults.perspective.compression),
            anchor_height: lookup(table, "perspective", "anchor_height", |v: &f64| {
                ANCHOR_HEIGHT_RANGE.contains(v)
            })
            .unwrap_or(defaults.perspective.anchor_height),
        };

        let display = DisplaySettings {
            monitor: lookup(table, "display", "monitor", |_: &usize| true)
                .unwrap_or(defaults.display.monitor),
            fallback_width: lookup(table, "display", "fallback_width", |v: &u32| *v > 0)
                .unwrap_or(defaults.display.fallback_width),
            fallback_height: lookup(table, "display", "fallback_height", |v: &u32| *v > 0)
                .unwrap_or(defaults.display.fallback_height),
        };

        Self {
            calibration,
            distances,
            colors,
            perspective,
            display,
        }
    }

    /// Write settings to `path`.
    ///
    /// If the existing file parses, its comments and any unknown keys are
    /// kept; otherwise the commented template is used as the base. The new
    /// content goes to a sibling temp file which is then renamed over the
    /// target, so a failed write never leaves a truncated settings file.
    pub fn save(&self, path: &Path) -> Result<(), OverlayError> {
        let save_err = |source| OverlayError::SettingsSave {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(save_err)?;
        }

        let mut doc = fs::read_to_string(path)
            .ok()
            .and_then(|content| content.parse::<toml_edit::DocumentMut>().ok())
            .or_else(|| Self::generate_template().parse().ok())
            .unwrap_or_default();
        self.write_into(&mut doc);

        let tmp = temp_path(path);
        fs::write(&tmp, doc.to_string()).map_err(save_err)?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            save_err(e)
        })?;

        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    fn write_into(&self, doc: &mut toml_edit::DocumentMut) {
        for section in ["calibration", "rings", "perspective", "display"] {
            if !doc.contains_key(section) {
                doc[section] = toml_edit::table();
            }
        }

        doc["calibration"]["pixels_per_meter"] =
            toml_edit::value(self.calibration.pixels_per_meter);
        doc["calibration"]["reference_distance"] =
            toml_edit::value(self.calibration.reference_distance_m);

        doc["rings"]["distances"] =
            toml_edit::value(self.distances.iter().copied().collect::<toml_edit::Array>());
        doc["rings"]["colors"] = toml_edit::value(
            self.colors
                .iter()
                .map(|c| c.to_hex())
                .collect::<toml_edit::Array>(),
        );

        doc["perspective"]["enabled"] = toml_edit::value(self.perspective.enabled);
        doc["perspective"]["horizon_offset"] = toml_edit::value(self.perspective.horizon_offset);
        doc["perspective"]["compression"] = toml_edit::value(self.perspective.compression);
        doc["perspective"]["anchor_height"] = toml_edit::value(self.perspective.anchor_height);

        doc["display"]["monitor"] = toml_edit::value(self.display.monitor as i64);
        doc["display"]["fallback_width"] = toml_edit::value(i64::from(self.display.fallback_width));
        doc["display"]["fallback_height"] =
            toml_edit::value(i64::from(self.display.fallback_height));
    }

    /// Get the default XDG settings path (~/.config/rangerings/settings.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rangerings").join("settings.toml"))
    }

    /// Path given on the command line, else the XDG path, else the working directory.
    pub fn resolve_path(cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(Self::default_path)
            .unwrap_or_else(|| PathBuf::from("rangerings.toml"))
    }

    /// Write the commented template to `path`, creating parent directories.
    pub fn init_default_config(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::generate_template())?;
        Ok(())
    }

    /// Generate a commented TOML settings template
    pub fn generate_template() -> String {
        r##"# rangerings settings
# Written back automatically whenever something changes in the overlay.

[calibration]
# Scale from the last completed calibration (pixels per meter on screen)
pixels_per_meter = 100.0
# Reference distance used for that calibration, in meters
reference_distance = 10.0

[rings]
# Ring distances in meters, drawn in this order.
# Zero or negative entries are kept but not drawn.
distances = [1.0, 5.0, 10.0, 25.0, 40.0]
# Ring colors, cycled by position in the distance list
colors = ["#FF0000", "#00FF00", "#0000FF", "#FFFF00", "#FF00FF"]

[perspective]
# Draw ellipses that climb toward a horizon instead of flat circles
enabled = true
# Horizon height above the anchor, as a fraction of screen height (0.0-0.8)
horizon_offset = 0.3
# Vertical squash of each ring (0.1 = flat, 1.0 = circle)
compression = 0.2
# Anchor (feet) position from the top, as a fraction of screen height (0.6-0.95)
anchor_height = 0.85

[display]
# Index of the display to draw on, sorted top-to-bottom then left-to-right
monitor = 0
# Screen size assumed when displays cannot be enumerated
fallback_width = 1920
fallback_height = 1080
"##
        .to_string()
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>, OverlayError> {
    let load_err = |message: String| OverlayError::SettingsLoad {
        path: path.to_path_buf(),
        message,
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(load_err(e.to_string())),
    };

    content
        .parse::<toml::Table>()
        .map(Some)
        .map_err(|e| load_err(e.to_string()))
}

/// Read `[section] key` as `T`, returning None when it is missing, has the
/// wrong type, or fails `valid`.
fn lookup<T: DeserializeOwned>(
    table: &toml::Table,
    section: &str,
    key: &str,
    valid: impl Fn(&T) -> bool,
) -> Option<T> {
    let value = table.get(section)?.get(key)?;
    match value.clone().try_into::<T>() {
        Ok(v) if valid(&v) => Some(v),
        Ok(_) => {
            warn!("Setting {}.{} is out of range, using default", section, key);
            None
        }
        Err(e) => {
            warn!("Setting {}.{} is invalid ({}), using default", section, key, e);
            None
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "settings.toml".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rangerings-settings-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn custom_settings() -> Settings {
        Settings {
            calibration: CalibrationState::from_reference(10.0, 150.0).unwrap(),
            distances: vec![5.0, 0.0, 25.0, 12.5],
            colors: vec![
                RgbColor { r: 1, g: 2, b: 3 },
                RgbColor {
                    r: 200,
                    g: 100,
                    b: 50,
                },
            ],
            perspective: PerspectiveConfig {
                enabled: false,
                horizon_offset: 0.5,
                compression: 0.35,
                anchor_height: 0.9,
            },
            display: DisplaySettings {
                monitor: 2,
                fallback_width: 2560,
                fallback_height: 1440,
            },
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = scratch_dir("missing");
        assert_eq!(Settings::load(&dir.join("nope.toml")), Settings::default());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = scratch_dir("corrupt");
        let path = dir.join("settings.toml");
        fs::write(&path, "this is = = not toml [[[").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("nested").join("settings.toml");
        let settings = custom_settings();

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path);

        assert_eq!(loaded.distances, settings.distances);
        assert_eq!(loaded.colors, settings.colors);
        assert_eq!(loaded.perspective, settings.perspective);
        assert_eq!(loaded.display, settings.display);
        assert_eq!(
            loaded.calibration.pixels_per_meter,
            settings.calibration.pixels_per_meter
        );
        assert_eq!(
            loaded.calibration.reference_distance_m,
            settings.calibration.reference_distance_m
        );
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn bad_keys_fall_back_individually() {
        let table: toml::Table = r##"
            [calibration]
            pixels_per_meter = "fast"
            reference_distance = 20

            [rings]
            distances = [3, 6.5]
            colors = ["#ZZZZZZ"]

            [perspective]
            enabled = false
            horizon_offset = 0.95
            compression = 0.5

            [display]
            monitor = -1
        "##
        .parse()
        .unwrap();

        let settings = Settings::from_table(&table);
        let defaults = Settings::default();

        assert_eq!(settings.calibration.pixels_per_meter, 100.0);
        assert_eq!(settings.calibration.reference_distance_m, 20.0);
        assert_eq!(settings.distances, vec![3.0, 6.5]);
        assert_eq!(settings.colors, defaults.colors);
        assert!(!settings.perspective.enabled);
        assert_eq!(
            settings.perspective.horizon_offset,
            defaults.perspective.horizon_offset
        );
        assert_eq!(settings.perspective.compression, 0.5);
        assert_eq!(
            settings.perspective.anchor_height,
            defaults.perspective.anchor_height
        );
        assert_eq!(settings.display.monitor, 0);
    }

    #[test]
    fn save_keeps_user_comments() {
        let dir = scratch_dir("comments");
        let path = dir.join("settings.toml");
        fs::write(
            &path,
            "# my notes\n[rings]\n# close range only\ndistances = [1.0]\n",
        )
        .unwrap();

        custom_settings().save(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();

        assert!(content.contains("# my notes"));
        assert!(content.contains("# close range only"));
        assert_eq!(Settings::load(&path).distances, vec![5.0, 0.0, 25.0, 12.5]);
    }

    #[test]
    fn template_parses_to_defaults() {
        let table: toml::Table = Settings::generate_template().parse().unwrap();
        assert_eq!(Settings::from_table(&table), Settings::default());
    }

    #[test]
    fn save_into_unwritable_location_reports_error() {
        let dir = scratch_dir("unwritable");
        let blocker = dir.join("file");
        fs::write(&blocker, "x").unwrap();
        // A regular file where a directory is expected.
        let path = blocker.join("settings.toml");
        assert!(matches!(
            Settings::default().save(&path),
            Err(OverlayError::SettingsSave { .. })
        ));
    }
}
