use std::path::PathBuf;
use thiserror::Error;

/// Failures the overlay can run into.
///
/// Only [`OverlayError::Surface`] is fatal. Everything else is either shown to
/// the user as a notice or logged and recovered from.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Non-numeric or non-positive value where a positive number is required.
    #[error("invalid number '{input}': {reason}")]
    InvalidNumericInput { input: String, reason: &'static str },

    #[error("failed to load settings from {}: {message}", path.display())]
    SettingsLoad { path: PathBuf, message: String },

    #[error("failed to save settings to {}: {source}", path.display())]
    SettingsSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("display enumeration failed: {0}")]
    DisplayEnumeration(String),

    #[error("render surface unavailable: {0}")]
    Surface(String),
}

impl OverlayError {
    pub fn invalid_number(input: &str, reason: &'static str) -> Self {
        OverlayError::InvalidNumericInput {
            input: input.to_string(),
            reason,
        }
    }

    /// Whether this error should be surfaced to the user rather than only logged.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, OverlayError::InvalidNumericInput { .. })
    }
}
