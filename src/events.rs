//! Application events.
//!
//! Every input source (terminal keys, mouse wheel, the control socket)
//! produces these, and `App::dispatch` is the only thing that consumes them.

use crate::error::OverlayError;
use crate::projection::PerspectiveField;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    // === Calibration ===
    /// Begin calibration (F1)
    CalibrationStart,

    /// Reference distance typed at the calibration prompt
    CalibrationDistance(String),

    /// Mouse wheel ticks while calibrating; positive grows the guide
    WheelDelta(i32),

    /// Accept the current guide radius (Enter)
    CalibrationConfirm,

    /// Abandon calibration (Esc)
    CalibrationCancel,

    // === Overlay ===
    /// Show or hide the distance rings (F2)
    OverlayToggle,

    /// Replace the ring distance list
    DistancesApplied(Vec<f64>),

    PerspectiveToggled(bool),

    PerspectiveParamChanged(PerspectiveField, f64),

    /// New anchor height ratio
    AnchorChanged(f64),

    /// Switch to another enumerated display
    DisplaySelected(usize),

    // === Lifecycle ===
    /// Dismiss the notice currently shown
    Acknowledge,

    Quit,
}

impl AppEvent {
    /// Events that still go through while a notice is waiting to be dismissed.
    pub fn passes_notice(&self) -> bool {
        matches!(self, AppEvent::Acknowledge | AppEvent::Quit)
    }

    pub fn description(&self) -> &'static str {
        match self {
            AppEvent::CalibrationStart => "Start calibration",
            AppEvent::CalibrationDistance(_) => "Calibration distance entered",
            AppEvent::WheelDelta(_) => "Resize calibration guide",
            AppEvent::CalibrationConfirm => "Confirm calibration",
            AppEvent::CalibrationCancel => "Cancel calibration",
            AppEvent::OverlayToggle => "Toggle overlay visibility",
            AppEvent::DistancesApplied(_) => "Apply ring distances",
            AppEvent::PerspectiveToggled(_) => "Toggle perspective",
            AppEvent::PerspectiveParamChanged(..) => "Change perspective parameter",
            AppEvent::AnchorChanged(_) => "Move anchor",
            AppEvent::DisplaySelected(_) => "Select display",
            AppEvent::Acknowledge => "Dismiss notice",
            AppEvent::Quit => "Quit",
        }
    }
}

/// Parse a finite number.
pub fn parse_number(input: &str) -> Result<f64, OverlayError> {
    let trimmed = input.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| OverlayError::invalid_number(trimmed, "not a number"))?;
    if !value.is_finite() {
        return Err(OverlayError::invalid_number(trimmed, "not a finite number"));
    }
    Ok(value)
}

/// Parse a finite number greater than zero.
pub fn parse_positive(input: &str) -> Result<f64, OverlayError> {
    let value = parse_number(input)?;
    if value <= 0.0 {
        return Err(OverlayError::invalid_number(
            input.trim(),
            "must be greater than zero",
        ));
    }
    Ok(value)
}

/// Parse a distance list separated by whitespace and/or commas.
///
/// Every entry must be a number. Zero and negative entries are accepted and
/// simply not drawn, so a slot can be switched off without losing its color.
pub fn parse_distance_list(input: &str) -> Result<Vec<f64>, OverlayError> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(parse_number)
        .collect()
}
