use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Clear, Paragraph, Wrap};
use std::io::{self, stdout};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{App, Notice, NoticeKind, Outcome};
use crate::error::OverlayError;
use crate::events::{parse_distance_list, AppEvent};
use crate::ipc::{self, IpcCommand};
use crate::projection::PerspectiveField;
use crate::renderer::braille::{BrailleCanvas, GridMapping};
use crate::renderer::{format_distance, Scene};

type Term = Terminal<CrosstermBackend<io::Stdout>>;

pub async fn run(app: &mut App) -> Result<()> {
    let mut terminal = setup().map_err(|e| OverlayError::Surface(e.to_string()))?;

    let result = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.shutdown();
    ipc::cleanup();
    result
}

fn setup() -> io::Result<Term> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

async fn run_app(terminal: &mut Term, app: &mut App) -> Result<()> {
    let (ipc_tx, mut ipc_rx) = mpsc::channel::<IpcCommand>(16);
    tokio::spawn(async move {
        if let Err(e) = ipc::start_server(ipc_tx).await {
            warn!("IPC server stopped: {}", e);
        }
    });

    let (signal_tx, mut signal_rx) = mpsc::channel::<&'static str>(1);
    tokio::spawn(async move {
        let name = shutdown_signal().await;
        let _ = signal_tx.send(name).await;
    });

    let mut prompt: Option<Prompt> = None;
    let mut dirty = true;
    let poll_interval = Duration::from_millis(16);

    loop {
        if sync_prompt(&mut prompt, app) {
            dirty = true;
        }

        if dirty {
            terminal.draw(|frame| draw(frame, app, prompt.as_ref()))?;
            dirty = false;
        }

        if signal_received(&mut signal_rx) {
            return Ok(());
        }

        // Process IPC commands (non-blocking)
        while let Ok(cmd) = ipc_rx.try_recv() {
            match ipc::process_ipc_command(cmd, app) {
                Outcome::Quit => return Ok(()),
                Outcome::Redraw => dirty = true,
                Outcome::Unchanged => {}
            }
        }

        if !event::poll(poll_interval)? {
            continue;
        }

        let outcome = match event::read()? {
            Event::Key(key) => handle_key(key, app, &mut prompt),
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => app.dispatch(AppEvent::WheelDelta(1)),
                MouseEventKind::ScrollDown => app.dispatch(AppEvent::WheelDelta(-1)),
                _ => Outcome::Unchanged,
            },
            Event::Resize(..) => Outcome::Redraw,
            _ => Outcome::Unchanged,
        };

        match outcome {
            Outcome::Quit => return Ok(()),
            Outcome::Redraw => dirty = true,
            Outcome::Unchanged => {}
        }
    }
}

/// Resolves on SIGINT or SIGTERM with the signal's name. Never resolves if
/// neither handler can be installed.
async fn shutdown_signal() -> &'static str {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            None
        }
    };

    tokio::select! {
        Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
        Some(()) = async {
            match terminate.as_mut() {
                Some(stream) => stream.recv().await,
                None => None,
            }
        } => "SIGTERM",
        else => std::future::pending().await,
    }
}

fn signal_received(rx: &mut mpsc::Receiver<&'static str>) -> bool {
    match rx.try_recv() {
        Ok(name) => {
            info!("Received {}, shutting down", name);
            true
        }
        Err(_) => false,
    }
}

/// Open the distance prompt when a calibration is waiting for one, close it
/// when the calibration moved on. Returns true if anything changed.
fn sync_prompt(prompt: &mut Option<Prompt>, app: &App) -> bool {
    let awaiting = app.calibration().is_awaiting_distance() && app.notice().is_none();
    match prompt {
        Some(p) if p.kind == PromptKind::CalibrationDistance && !awaiting => {
            *prompt = None;
            true
        }
        None if awaiting => {
            *prompt = Some(Prompt::calibration(
                app.settings().calibration.reference_distance_m,
            ));
            true
        }
        _ => false,
    }
}

fn handle_key(key: KeyEvent, app: &mut App, prompt: &mut Option<Prompt>) -> Outcome {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return app.dispatch(AppEvent::Quit);
    }

    if app.notice().is_some() {
        return app.dispatch(AppEvent::Acknowledge);
    }

    if let Some(p) = prompt.as_mut() {
        let kind = p.kind;
        return match p.handle_key(key) {
            PromptInput::Editing => Outcome::Redraw,
            PromptInput::Submit(input) => {
                *prompt = None;
                match kind {
                    PromptKind::CalibrationDistance => {
                        app.dispatch(AppEvent::CalibrationDistance(input))
                    }
                    PromptKind::Distances => match parse_distance_list(&input) {
                        Ok(distances) => app.dispatch(AppEvent::DistancesApplied(distances)),
                        Err(e) => {
                            app.report(e);
                            Outcome::Redraw
                        }
                    },
                }
            }
            PromptInput::Cancel => {
                *prompt = None;
                match kind {
                    PromptKind::CalibrationDistance => app.dispatch(AppEvent::CalibrationCancel),
                    PromptKind::Distances => Outcome::Redraw,
                }
            }
        };
    }

    match map_key(key, app) {
        KeyAction::Event(event) => app.dispatch(event),
        KeyAction::EditDistances => {
            *prompt = Some(Prompt::distances(&app.settings().distances));
            Outcome::Redraw
        }
        KeyAction::None => Outcome::Unchanged,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum KeyAction {
    Event(AppEvent),
    EditDistances,
    None,
}

/// Keys outside of prompts and notices.
fn map_key(key: KeyEvent, app: &App) -> KeyAction {
    let perspective = &app.settings().perspective;
    let nudge = |field: PerspectiveField, direction: f64| {
        let value = perspective.get(field) + direction * field.step();
        // Keep slider values tidy: 0.3 - 0.1 should be 0.2.
        let value = (value * 100.0).round() / 100.0;
        match field {
            PerspectiveField::AnchorHeight => AppEvent::AnchorChanged(value),
            _ => AppEvent::PerspectiveParamChanged(field, value),
        }
    };

    let event = match key.code {
        KeyCode::F(1) | KeyCode::Char('k') => AppEvent::CalibrationStart,
        KeyCode::F(2) | KeyCode::Char('o') => AppEvent::OverlayToggle,
        KeyCode::Esc if app.calibration().is_active() => AppEvent::CalibrationCancel,
        KeyCode::Esc | KeyCode::Char('q') => AppEvent::Quit,
        KeyCode::Enter => AppEvent::CalibrationConfirm,
        KeyCode::Up | KeyCode::Char('+') | KeyCode::Char('=') => AppEvent::WheelDelta(1),
        KeyCode::Down | KeyCode::Char('-') => AppEvent::WheelDelta(-1),
        KeyCode::Char('p') => AppEvent::PerspectiveToggled(!perspective.enabled),
        KeyCode::Char('[') => nudge(PerspectiveField::HorizonOffset, -1.0),
        KeyCode::Char(']') => nudge(PerspectiveField::HorizonOffset, 1.0),
        KeyCode::Char('{') => nudge(PerspectiveField::Compression, -1.0),
        KeyCode::Char('}') => nudge(PerspectiveField::Compression, 1.0),
        KeyCode::Char('<') => nudge(PerspectiveField::AnchorHeight, -1.0),
        KeyCode::Char('>') => nudge(PerspectiveField::AnchorHeight, 1.0),
        KeyCode::Char('m') => {
            let next = (app.settings().display.monitor + 1) % app.displays().len().max(1);
            AppEvent::DisplaySelected(next)
        }
        KeyCode::Char('d') if !app.calibration().is_active() => return KeyAction::EditDistances,
        _ => return KeyAction::None,
    };
    KeyAction::Event(event)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    CalibrationDistance,
    Distances,
}

#[derive(Debug, Clone, PartialEq)]
enum PromptInput {
    Editing,
    Submit(String),
    Cancel,
}

/// Single-line text input drawn over the overlay.
#[derive(Debug, Clone)]
struct Prompt {
    kind: PromptKind,
    input: String,
}

impl Prompt {
    fn calibration(last_distance_m: f64) -> Self {
        Self {
            kind: PromptKind::CalibrationDistance,
            input: last_distance_m.to_string(),
        }
    }

    fn distances(distances: &[f64]) -> Self {
        let list: Vec<String> = distances.iter().map(|d| d.to_string()).collect();
        Self {
            kind: PromptKind::Distances,
            input: list.join(", "),
        }
    }

    fn title(&self) -> &'static str {
        match self.kind {
            PromptKind::CalibrationDistance => " Reference distance (m) ",
            PromptKind::Distances => " Ring distances (m) ",
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> PromptInput {
        match key.code {
            KeyCode::Enter => PromptInput::Submit(std::mem::take(&mut self.input)),
            KeyCode::Esc => PromptInput::Cancel,
            KeyCode::Backspace => {
                self.input.pop();
                PromptInput::Editing
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input.clear();
                PromptInput::Editing
            }
            KeyCode::Char(c) if !c.is_control() => {
                self.input.push(c);
                PromptInput::Editing
            }
            _ => PromptInput::Editing,
        }
    }
}

fn draw(frame: &mut Frame, app: &App, prompt: Option<&Prompt>) {
    let area = frame.area();

    // Clear with transparent/reset background for terminal transparency support
    let block = Block::default().style(Style::default().bg(Color::Reset));
    frame.render_widget(block, area);

    let canvas_area = Rect {
        y: area.y + 1,
        height: area.height.saturating_sub(1),
        ..area
    };
    render_scene(frame.buffer_mut(), canvas_area, &app.scene());

    render_status(frame, area, app);

    if let Some(prompt) = prompt {
        render_prompt(frame, area, prompt);
    }
    if let Some(notice) = app.notice() {
        render_notice(frame, area, notice);
    }
}

/// Draw a scene scaled to fit `area`.
fn render_scene(buf: &mut Buffer, area: Rect, scene: &Scene) {
    if area.width == 0 || area.height == 0 || scene.is_blank() {
        return;
    }

    let mut canvas = BrailleCanvas::new(area.width as usize, area.height as usize);
    let mapping = GridMapping::fit(&scene.viewport, canvas.grid_w, canvas.grid_h);

    for ring in &scene.rings {
        let g = &ring.geometry;
        let (cx, cy) = mapping.to_grid(g.center_x, g.center_y);
        canvas.clear();
        canvas.ellipse(cx, cy, g.radius_x * mapping.scale, g.radius_y * mapping.scale);
        canvas.render(buf, area, ring.color.into());
    }

    for marker in &scene.markers {
        let (x, y) = mapping.to_grid(marker.x, marker.y);
        canvas.clear();
        canvas.disc(x, y, marker.radius * mapping.scale);
        canvas.render(buf, area, marker.color.into());
    }

    for label in &scene.labels {
        let style = Style::default()
            .fg(label.color.into())
            .bg(label.color.outline().into());
        let (col, row) = mapping.to_cell(label.x, label.y);
        let lines: Vec<&str> = label.text.lines().collect();
        let first_row = row - (lines.len() as i64) / 2;
        for (i, line) in lines.iter().enumerate() {
            let width = line.chars().count() as i64;
            put_text(buf, area, col - width / 2, first_row + i as i64, line, style);
        }
    }
}

/// Write `text` at a cell position relative to `area`, clipped to it.
fn put_text(buf: &mut Buffer, area: Rect, col: i64, row: i64, text: &str, style: Style) {
    if row < 0 || row >= i64::from(area.height) || col >= i64::from(area.width) {
        return;
    }
    let skip = (-col).max(0) as usize;
    let col = col.max(0);
    let visible: String = text.chars().skip(skip).collect();
    if visible.is_empty() {
        return;
    }
    let max_width = (i64::from(area.width) - col) as usize;
    buf.set_stringn(
        area.x + col as u16,
        area.y + row as u16,
        visible,
        max_width,
        style,
    );
}

fn status_text(app: &App) -> String {
    if let Some((distance_m, radius_px)) = app.calibration().guide() {
        return format!(
            " Calibrating {}: wheel/+/- resize ({:.0} px) | Enter confirm | Esc cancel ",
            format_distance(distance_m),
            radius_px
        );
    }

    let settings = app.settings();
    let p = &settings.perspective;
    format!(
        " [k]calibrate | [o]verlay: {} | [p]erspective: {} h{:.2} c{:.2} a{:.2} | [d]istances | [m]onitor: {} | {:.1} px/m | [q]uit ",
        if app.overlay_enabled() { "on" } else { "off" },
        if p.enabled { "on" } else { "off" },
        p.horizon_offset,
        p.compression,
        p.anchor_height,
        app.current_display().name,
        settings.calibration.pixels_per_meter,
    )
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let status = status_text(app);

    for (i, ch) in status.chars().enumerate() {
        if i < area.width as usize {
            let cell = frame.buffer_mut().cell_mut((area.x + i as u16, area.y));
            if let Some(cell) = cell {
                cell.set_char(ch);
                cell.set_fg(Color::DarkGray);
            }
        }
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_prompt(frame: &mut Frame, area: Rect, prompt: &Prompt) {
    let rect = centered(area, 50, 3);
    let block = Block::bordered()
        .title(prompt.title())
        .border_style(Style::default().fg(Color::Yellow));
    let input = Paragraph::new(format!("{}_", prompt.input)).block(block);

    frame.render_widget(Clear, rect);
    frame.render_widget(input, rect);
}

fn render_notice(frame: &mut Frame, area: Rect, notice: &Notice) {
    let color = match notice.kind {
        NoticeKind::Info => Color::Green,
        NoticeKind::Error => Color::Red,
    };
    let rect = centered(area, 56, 7);
    let block = Block::bordered()
        .title(format!(" {} ", notice.title))
        .border_style(Style::default().fg(color));
    let body = Text::from(vec![
        Line::from(notice.message.as_str()),
        Line::default(),
        Line::from("press any key").style(Style::default().fg(Color::DarkGray)),
    ]);
    let paragraph = Paragraph::new(body)
        .block(block)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    debug!("Showing notice: {}", notice.title);
    frame.render_widget(Clear, rect);
    frame.render_widget(paragraph, rect);
}
