//! Application state and the single event dispatch.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationPhase, CalibrationSession};
use crate::display::{DisplayGeometry, FallbackDisplay};
use crate::error::OverlayError;
use crate::events::AppEvent;
use crate::projection::{PerspectiveField, ViewportGeometry};
use crate::renderer::{format_distance, Scene};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// A modal message. While one is shown only Acknowledge and Quit get through.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

/// What the surface should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Redraw,
    Unchanged,
    Quit,
}

pub struct App {
    settings: Settings,
    settings_path: PathBuf,
    displays: Vec<DisplayGeometry>,
    viewport: ViewportGeometry,
    overlay_enabled: bool,
    calibration: CalibrationSession,
    notice: Option<Notice>,
}

impl App {
    pub fn new(mut settings: Settings, settings_path: PathBuf, displays: Vec<DisplayGeometry>) -> Self {
        let displays = if displays.is_empty() {
            vec![FallbackDisplay {
                width: settings.display.fallback_width,
                height: settings.display.fallback_height,
            }
            .geometry()]
        } else {
            displays
        };

        if settings.display.monitor >= displays.len() {
            warn!(
                "Configured display {} not found ({} available), using display 0",
                settings.display.monitor,
                displays.len()
            );
            settings.display.monitor = 0;
        }

        let viewport =
            displays[settings.display.monitor].viewport(settings.perspective.anchor_height);
        debug!("Viewport {:?}", viewport);

        Self {
            settings,
            settings_path,
            displays,
            viewport,
            // Rings stay hidden until toggled on.
            overlay_enabled: false,
            calibration: CalibrationSession::new(),
            notice: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn displays(&self) -> &[DisplayGeometry] {
        &self.displays
    }

    pub fn current_display(&self) -> &DisplayGeometry {
        &self.displays[self.settings.display.monitor]
    }

    pub fn viewport(&self) -> ViewportGeometry {
        self.viewport
    }

    pub fn overlay_enabled(&self) -> bool {
        self.overlay_enabled
    }

    pub fn calibration(&self) -> &CalibrationSession {
        &self.calibration
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// Apply one event. This is the only place application state changes.
    pub fn dispatch(&mut self, event: AppEvent) -> Outcome {
        if self.notice.is_some() && !event.passes_notice() {
            debug!("Notice pending, ignoring: {}", event.description());
            return Outcome::Unchanged;
        }
        debug!("Event: {}", event.description());

        match event {
            AppEvent::CalibrationStart => {
                if !self.calibration.start() {
                    return Outcome::Unchanged;
                }
                self.overlay_enabled = false;
                info!("Calibration started");
                Outcome::Redraw
            }

            AppEvent::CalibrationDistance(input) => {
                if !self.calibration.is_awaiting_distance() {
                    return Outcome::Unchanged;
                }
                let result = self.calibration.submit_distance(&input);
                if self.calibration.phase() == CalibrationPhase::Cancelled {
                    self.calibration.settle();
                    info!("Calibration cancelled");
                }
                if let Err(e) = result {
                    self.report(e);
                }
                Outcome::Redraw
            }

            AppEvent::WheelDelta(steps) => match self.calibration.adjust(steps) {
                Some(radius) => {
                    debug!("Guide radius {}", radius);
                    Outcome::Redraw
                }
                None => Outcome::Unchanged,
            },

            AppEvent::CalibrationConfirm => {
                let Some(state) = self.calibration.confirm() else {
                    return Outcome::Unchanged;
                };
                self.settings.calibration = state;
                self.persist();
                self.calibration.settle();
                self.notice = Some(Notice {
                    kind: NoticeKind::Info,
                    title: "Calibration complete".to_string(),
                    message: format!(
                        "{} = {:.0} px ({:.2} px per meter)",
                        format_distance(state.reference_distance_m),
                        state.reference_radius_px,
                        state.pixels_per_meter
                    ),
                });
                Outcome::Redraw
            }

            AppEvent::CalibrationCancel => {
                if !self.calibration.cancel() {
                    return Outcome::Unchanged;
                }
                self.calibration.settle();
                info!("Calibration cancelled");
                Outcome::Redraw
            }

            AppEvent::OverlayToggle => {
                if self.calibration.is_active() {
                    debug!("Overlay toggle ignored during calibration");
                    return Outcome::Unchanged;
                }
                self.overlay_enabled = !self.overlay_enabled;
                info!(
                    "Overlay {}",
                    if self.overlay_enabled { "shown" } else { "hidden" }
                );
                Outcome::Redraw
            }

            AppEvent::DistancesApplied(distances) => {
                info!("Ring distances: {:?}", distances);
                self.settings.distances = distances;
                self.persist();
                Outcome::Redraw
            }

            AppEvent::PerspectiveToggled(enabled) => {
                self.settings.perspective.enabled = enabled;
                info!("Perspective {}", if enabled { "on" } else { "off" });
                self.persist();
                Outcome::Redraw
            }

            AppEvent::PerspectiveParamChanged(field, value) => self.set_perspective(field, value),

            AppEvent::AnchorChanged(value) => {
                self.set_perspective(PerspectiveField::AnchorHeight, value)
            }

            AppEvent::DisplaySelected(index) => {
                let Some(selected) = self.displays.get(index) else {
                    warn!(
                        "Display {} does not exist ({} available)",
                        index,
                        self.displays.len()
                    );
                    return Outcome::Unchanged;
                };
                info!("Selected display {}: {}", index, selected);
                self.settings.display.monitor = index;
                self.recompute_viewport();
                self.persist();
                Outcome::Redraw
            }

            AppEvent::Acknowledge => match self.notice.take() {
                Some(_) => Outcome::Redraw,
                None => Outcome::Unchanged,
            },

            AppEvent::Quit => Outcome::Quit,
        }
    }

    fn set_perspective(&mut self, field: PerspectiveField, value: f64) -> Outcome {
        if !value.is_finite() {
            warn!("Ignoring non-finite {} value", field);
            return Outcome::Unchanged;
        }
        let stored = self.settings.perspective.set(field, value);
        debug!("{} = {}", field, stored);
        if field == PerspectiveField::AnchorHeight {
            self.recompute_viewport();
        }
        self.persist();
        Outcome::Redraw
    }

    fn recompute_viewport(&mut self) {
        self.viewport =
            self.current_display().viewport(self.settings.perspective.anchor_height);
        debug!("Viewport {:?}", self.viewport);
    }

    /// Show user-facing errors as a notice, log everything else.
    pub fn report(&mut self, error: OverlayError) {
        if error.is_user_facing() {
            warn!("{}", error);
            self.notice = Some(Notice {
                kind: NoticeKind::Error,
                title: "Invalid input".to_string(),
                message: error.to_string(),
            });
        } else {
            warn!("{}", error);
        }
    }

    fn persist(&self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            warn!("{}", e);
        }
    }

    /// Flush settings one last time.
    pub fn shutdown(&mut self) {
        if self.calibration.cancel() {
            self.calibration.settle();
        }
        self.persist();
        info!("Settings flushed to {}", self.settings_path.display());
    }

    /// The frame to draw right now.
    pub fn scene(&self) -> Scene {
        if let Some((distance_m, radius_px)) = self.calibration.guide() {
            Scene::calibration(self.viewport, distance_m, radius_px)
        } else if self.overlay_enabled && !self.calibration.is_active() {
            Scene::overlay(&self.settings, self.viewport)
        } else {
            Scene::blank(self.viewport)
        }
    }

    /// One-line state summary for the control channel.
    pub fn status_line(&self) -> String {
        let p = &self.settings.perspective;
        let distances: Vec<String> = self
            .settings
            .distances
            .iter()
            .map(|d| d.to_string())
            .collect();
        format!(
            "overlay={} calibrating={} px_per_m={:.3} ref={} distances={} perspective={} horizon={} compression={} anchor={} monitor={} notice={}",
            if self.overlay_enabled { "visible" } else { "hidden" },
            self.calibration.is_active(),
            self.settings.calibration.pixels_per_meter,
            format_distance(self.settings.calibration.reference_distance_m),
            distances.join(","),
            if p.enabled { "on" } else { "off" },
            p.horizon_offset,
            p.compression,
            p.anchor_height,
            self.settings.display.monitor,
            self.notice.is_some(),
        )
    }
}
