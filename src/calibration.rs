//! Interactive calibration: pick a reference distance, resize a guide circle
//! until it matches that distance in game, confirm.

use tracing::{debug, info};

use crate::error::OverlayError;
use crate::events::parse_positive;
use crate::projection::CalibrationState;

pub const INITIAL_GUIDE_RADIUS_PX: f64 = 100.0;
pub const GUIDE_RADIUS_STEP_PX: f64 = 5.0;
pub const MIN_GUIDE_RADIUS_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationPhase {
    Idle,
    AwaitingDistanceInput,
    Adjusting { distance_m: f64, radius_px: f64 },
    Confirmed(CalibrationState),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CalibrationSession {
    phase: CalibrationPhase,
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationSession {
    pub fn new() -> Self {
        Self {
            phase: CalibrationPhase::Idle,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// True while the procedure owns the input (prompting or adjusting).
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            CalibrationPhase::AwaitingDistanceInput | CalibrationPhase::Adjusting { .. }
        )
    }

    pub fn is_awaiting_distance(&self) -> bool {
        self.phase == CalibrationPhase::AwaitingDistanceInput
    }

    /// Reference distance and current guide radius while adjusting.
    pub fn guide(&self) -> Option<(f64, f64)> {
        match self.phase {
            CalibrationPhase::Adjusting {
                distance_m,
                radius_px,
            } => Some((distance_m, radius_px)),
            _ => None,
        }
    }

    /// Begin a calibration. Returns false if one is already running.
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            debug!("Calibration already in progress");
            return false;
        }
        self.phase = CalibrationPhase::AwaitingDistanceInput;
        true
    }

    /// Feed the reference distance typed by the user.
    ///
    /// Empty input cancels quietly. Anything that is not a positive number
    /// cancels and is returned as an error for the user to see.
    pub fn submit_distance(&mut self, input: &str) -> Result<(), OverlayError> {
        if !self.is_awaiting_distance() {
            debug!("Ignoring distance input outside of calibration prompt");
            return Ok(());
        }

        if input.trim().is_empty() {
            self.phase = CalibrationPhase::Cancelled;
            return Ok(());
        }

        match parse_positive(input) {
            Ok(distance_m) => {
                self.phase = CalibrationPhase::Adjusting {
                    distance_m,
                    radius_px: INITIAL_GUIDE_RADIUS_PX,
                };
                Ok(())
            }
            Err(e) => {
                self.phase = CalibrationPhase::Cancelled;
                Err(e)
            }
        }
    }

    /// Grow or shrink the guide by `steps` wheel ticks. Returns the new
    /// radius, or None when not adjusting.
    pub fn adjust(&mut self, steps: i32) -> Option<f64> {
        if let CalibrationPhase::Adjusting { radius_px, .. } = &mut self.phase {
            *radius_px =
                (*radius_px + f64::from(steps) * GUIDE_RADIUS_STEP_PX).max(MIN_GUIDE_RADIUS_PX);
            return Some(*radius_px);
        }
        None
    }

    pub fn confirm(&mut self) -> Option<CalibrationState> {
        let CalibrationPhase::Adjusting {
            distance_m,
            radius_px,
        } = self.phase
        else {
            return None;
        };

        let state = CalibrationState::from_reference(distance_m, radius_px)?;
        info!(
            "Calibrated {} px for {} m: {:.3} px/m",
            radius_px, distance_m, state.pixels_per_meter
        );
        self.phase = CalibrationPhase::Confirmed(state);
        Some(state)
    }

    /// Abort from any active phase. Returns false if nothing was running.
    pub fn cancel(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.phase = CalibrationPhase::Cancelled;
        true
    }

    /// Return to Idle once a Confirmed or Cancelled outcome has been handled.
    pub fn settle(&mut self) {
        if matches!(
            self.phase,
            CalibrationPhase::Confirmed(_) | CalibrationPhase::Cancelled
        ) {
            self.phase = CalibrationPhase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjusting(distance: &str) -> CalibrationSession {
        let mut session = CalibrationSession::new();
        assert!(session.start());
        session.submit_distance(distance).unwrap();
        session
    }

    #[test]
    fn full_procedure_yields_radius_over_distance() {
        let mut session = adjusting("10");
        // 100 -> 150 px
        assert_eq!(session.adjust(10), Some(150.0));

        let state = session.confirm().unwrap();
        assert!((state.pixels_per_meter - 15.0).abs() < 1e-9);
        assert_eq!(session.phase(), CalibrationPhase::Confirmed(state));

        session.settle();
        assert_eq!(session.phase(), CalibrationPhase::Idle);
    }

    #[test]
    fn ratio_holds_for_many_inputs() {
        for (distance, steps) in [(1.5, -18), (7.0, 3), (33.3, 100), (250.0, 0)] {
            let mut session = adjusting(&distance.to_string());
            let radius = session.adjust(steps).unwrap();
            assert!(radius >= MIN_GUIDE_RADIUS_PX);
            let state = session.confirm().unwrap();
            assert!((state.pixels_per_meter - radius / distance).abs() < 1e-9);
        }
    }

    #[test]
    fn radius_is_floored() {
        let mut session = adjusting("5");
        assert_eq!(session.adjust(-1000), Some(MIN_GUIDE_RADIUS_PX));
        assert_eq!(session.adjust(-1), Some(MIN_GUIDE_RADIUS_PX));
        assert_eq!(session.adjust(1), Some(MIN_GUIDE_RADIUS_PX + GUIDE_RADIUS_STEP_PX));
    }

    #[test]
    fn invalid_distance_cancels_with_error() {
        let mut session = CalibrationSession::new();
        session.start();
        let err = session.submit_distance("ten").unwrap_err();
        assert!(matches!(err, OverlayError::InvalidNumericInput { .. }));
        assert_eq!(session.phase(), CalibrationPhase::Cancelled);

        session.settle();
        session.start();
        assert!(session.submit_distance("-3").is_err());
        assert_eq!(session.phase(), CalibrationPhase::Cancelled);
    }

    #[test]
    fn empty_distance_cancels_quietly() {
        let mut session = CalibrationSession::new();
        session.start();
        assert!(session.submit_distance("   ").is_ok());
        assert_eq!(session.phase(), CalibrationPhase::Cancelled);
    }

    #[test]
    fn cancel_while_adjusting_produces_nothing() {
        let mut session = adjusting("10");
        session.adjust(4);
        assert!(session.cancel());
        assert!(session.confirm().is_none());
        session.settle();
        assert!(!session.is_active());
    }

    #[test]
    fn start_is_ignored_while_active() {
        let mut session = adjusting("10");
        assert!(!session.start());
        assert_eq!(session.guide(), Some((10.0, INITIAL_GUIDE_RADIUS_PX)));
    }

    #[test]
    fn wheel_outside_adjusting_is_ignored() {
        let mut session = CalibrationSession::new();
        assert_eq!(session.adjust(3), None);
        session.start();
        assert_eq!(session.adjust(3), None);
        assert!(session.confirm().is_none());
    }
}
