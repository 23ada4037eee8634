use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::app::{App, NoticeKind, Outcome};
use crate::events::{parse_distance_list, parse_number, AppEvent};
use crate::projection::PerspectiveField;

/// What a control line asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Events dispatched in order, as if typed at the terminal
    Events(Vec<AppEvent>),
    Status,
    ListMonitors,
    Ping,
}

/// Commands sent from IPC server to the event loop
pub struct IpcCommand {
    pub request: Request,
    pub reply: oneshot::Sender<String>,
}

/// Get the socket path for IPC
pub fn socket_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(dir).join("rangerings.sock")
    } else {
        PathBuf::from("/tmp/rangerings.sock")
    }
}

/// Parse a protocol line into a Request
pub fn parse_request(line: &str) -> Result<Request> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let events = |events: Vec<AppEvent>| -> Result<Request> { Ok(Request::Events(events)) };

    match parts.as_slice() {
        ["calibrate"] => events(vec![AppEvent::CalibrationStart]),
        ["calibrate", distance] => events(vec![
            AppEvent::CalibrationStart,
            AppEvent::CalibrationDistance(distance.to_string()),
        ]),
        ["distance", distance] => events(vec![AppEvent::CalibrationDistance(distance.to_string())]),
        ["wheel", steps] => {
            let steps: i32 = steps.parse().context("Invalid wheel steps")?;
            events(vec![AppEvent::WheelDelta(steps)])
        }
        ["confirm"] => events(vec![AppEvent::CalibrationConfirm]),
        ["cancel"] => events(vec![AppEvent::CalibrationCancel]),
        ["toggle"] => events(vec![AppEvent::OverlayToggle]),
        ["distances", rest @ ..] => {
            let distances = parse_distance_list(&rest.join(" "))?;
            events(vec![AppEvent::DistancesApplied(distances)])
        }
        ["perspective", "on"] => events(vec![AppEvent::PerspectiveToggled(true)]),
        ["perspective", "off"] => events(vec![AppEvent::PerspectiveToggled(false)]),
        ["horizon", val] => events(vec![AppEvent::PerspectiveParamChanged(
            PerspectiveField::HorizonOffset,
            parse_number(val)?,
        )]),
        ["compression", val] => events(vec![AppEvent::PerspectiveParamChanged(
            PerspectiveField::Compression,
            parse_number(val)?,
        )]),
        ["anchor", val] => events(vec![AppEvent::AnchorChanged(parse_number(val)?)]),
        ["monitor", index] => {
            let index: usize = index.parse().context("Invalid monitor index")?;
            events(vec![AppEvent::DisplaySelected(index)])
        }
        ["ack"] => events(vec![AppEvent::Acknowledge]),
        ["quit"] => events(vec![AppEvent::Quit]),
        ["status"] => Ok(Request::Status),
        ["list", "monitors"] => Ok(Request::ListMonitors),
        ["ping"] => Ok(Request::Ping),
        _ => Err(anyhow::anyhow!("Unknown command: {}", line)),
    }
}

/// Parse a protocol line into an IpcCommand
fn parse_command(line: &str, reply: oneshot::Sender<String>) -> Result<IpcCommand> {
    Ok(IpcCommand {
        request: parse_request(line)?,
        reply,
    })
}

/// Apply an IPC command to the app and answer the client
pub fn process_ipc_command(cmd: IpcCommand, app: &mut App) -> Outcome {
    let IpcCommand { request, reply } = cmd;

    let (outcome, response) = match request {
        Request::Events(events) => {
            let had_notice = app.notice().is_some();
            let mut outcome = Outcome::Unchanged;
            for event in events {
                match app.dispatch(event) {
                    Outcome::Quit => {
                        outcome = Outcome::Quit;
                        break;
                    }
                    Outcome::Redraw => outcome = Outcome::Redraw,
                    Outcome::Unchanged => {}
                }
            }
            let response = match (outcome, app.notice()) {
                (Outcome::Quit, _) => "ok: quitting".to_string(),
                (_, Some(notice)) if notice.kind == NoticeKind::Error => {
                    format!("err: {}", notice.message)
                }
                (Outcome::Unchanged, Some(notice)) if had_notice => {
                    format!("err: notice pending ({}), send 'ack' first", notice.title)
                }
                (_, Some(notice)) => format!("ok: {}: {}", notice.title, notice.message),
                (Outcome::Redraw, None) => format!("ok: {}", app.status_line()),
                (Outcome::Unchanged, None) => "ok: unchanged".to_string(),
            };
            (outcome, response)
        }
        Request::Status => (Outcome::Unchanged, format!("ok: {}", app.status_line())),
        Request::ListMonitors => {
            let selected = app.settings().display.monitor;
            let names: Vec<String> = app
                .displays()
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let mark = if i == selected { "*" } else { "" };
                    format!("{}{}={}x{}+{}+{}", mark, i, d.width, d.height, d.x, d.y)
                })
                .collect();
            (Outcome::Unchanged, format!("ok: {}", names.join(",")))
        }
        Request::Ping => (Outcome::Unchanged, "ok: pong".to_string()),
    };

    let _ = reply.send(response);
    outcome
}

/// Handle a single client connection
async fn handle_client(stream: UnixStream, cmd_tx: mpsc::Sender<IpcCommand>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();
    buf_reader.read_line(&mut line).await?;
    let line = line.trim();

    if line.is_empty() {
        return Ok(());
    }

    let (reply_tx, reply_rx) = oneshot::channel();

    let command = match parse_command(line, reply_tx) {
        Ok(cmd) => cmd,
        Err(e) => {
            writer
                .write_all(format!("err: {}\n", e).as_bytes())
                .await?;
            return Ok(());
        }
    };

    cmd_tx
        .send(command)
        .await
        .map_err(|_| anyhow::anyhow!("Event loop has shut down"))?;

    let response = reply_rx
        .await
        .unwrap_or_else(|_| "err: internal error".to_string());

    writer
        .write_all(format!("{}\n", response).as_bytes())
        .await?;
    Ok(())
}

/// Start the IPC server, listening for commands on a Unix socket
pub async fn start_server(cmd_tx: mpsc::Sender<IpcCommand>) -> Result<()> {
    let path = socket_path();

    // Remove stale socket from previous run
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path).context("Failed to bind IPC socket")?;

    info!("IPC server listening on {}", path.display());

    loop {
        let (stream, _) = listener.accept().await?;
        let cmd_tx = cmd_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, cmd_tx).await {
                debug!("IPC client error: {}", e);
            }
        });
    }
}

/// Remove the socket file on shutdown
pub fn cleanup() {
    let _ = std::fs::remove_file(socket_path());
}

/// Send a command to a running rangerings instance (client mode)
pub async fn send_command(line: &str) -> Result<String> {
    let path = socket_path();

    let stream = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        UnixStream::connect(&path),
    )
    .await
    .context("Connection timed out")?
    .context("Could not connect to rangerings. Is it running?")?;

    let (reader, mut writer) = stream.into_split();

    writer.write_all(format!("{}\n", line).as_bytes()).await?;
    writer.shutdown().await?;

    let mut buf_reader = BufReader::new(reader);
    let mut response = String::new();

    tokio::time::timeout(
        std::time::Duration::from_secs(2),
        buf_reader.read_line(&mut response),
    )
    .await
    .context("Response timed out")?
    .context("Failed to read response")?;

    Ok(response.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayGeometry;
    use crate::settings::Settings;

    fn events(line: &str) -> Vec<AppEvent> {
        match parse_request(line).unwrap() {
            Request::Events(events) => events,
            other => panic!("expected events, got {:?}", other),
        }
    }

    #[test]
    fn calibration_commands() {
        assert_eq!(events("calibrate"), vec![AppEvent::CalibrationStart]);
        assert_eq!(
            events("calibrate 12.5"),
            vec![
                AppEvent::CalibrationStart,
                AppEvent::CalibrationDistance("12.5".into())
            ]
        );
        // Validation happens in the calibration itself so bad input gets a notice.
        assert_eq!(
            events("distance abc"),
            vec![AppEvent::CalibrationDistance("abc".into())]
        );
        assert_eq!(events("wheel -3"), vec![AppEvent::WheelDelta(-3)]);
        assert!(parse_request("wheel up").is_err());
        assert_eq!(events("confirm"), vec![AppEvent::CalibrationConfirm]);
        assert_eq!(events("cancel"), vec![AppEvent::CalibrationCancel]);
    }

    #[test]
    fn overlay_commands() {
        assert_eq!(
            events("distances 5, 10 25"),
            vec![AppEvent::DistancesApplied(vec![5.0, 10.0, 25.0])]
        );
        assert!(parse_request("distances 5 x").is_err());
        assert_eq!(events("perspective off"), vec![AppEvent::PerspectiveToggled(false)]);
        assert!(parse_request("perspective maybe").is_err());
        assert_eq!(
            events("horizon 0.4"),
            vec![AppEvent::PerspectiveParamChanged(
                PerspectiveField::HorizonOffset,
                0.4
            )]
        );
        assert!(parse_request("compression nan").is_err());
        assert_eq!(events("anchor 0.9"), vec![AppEvent::AnchorChanged(0.9)]);
        assert_eq!(events("monitor 1"), vec![AppEvent::DisplaySelected(1)]);
        assert!(parse_request("monitor -1").is_err());
    }

    #[test]
    fn query_commands() {
        assert_eq!(parse_request("status").unwrap(), Request::Status);
        assert_eq!(parse_request("list monitors").unwrap(), Request::ListMonitors);
        assert_eq!(parse_request(" ping ").unwrap(), Request::Ping);
        assert!(parse_request("bogus").is_err());
    }

    fn app(name: &str) -> App {
        let dir = std::env::temp_dir().join(format!(
            "rangerings-ipc-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        App::new(
            Settings::default(),
            dir.join("settings.toml"),
            vec![DisplayGeometry {
                name: "DP-1".into(),
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            }],
        )
    }

    fn run(app: &mut App, line: &str) -> (Outcome, String) {
        let (tx, mut rx) = oneshot::channel();
        let outcome = process_ipc_command(parse_command(line, tx).unwrap(), app);
        (outcome, rx.try_recv().unwrap())
    }

    #[test]
    fn replies_follow_app_state() {
        let mut app = app("replies");
        assert_eq!(run(&mut app, "ping").1, "ok: pong");
        assert_eq!(run(&mut app, "list monitors").1, "ok: *0=1920x1080+0+0");

        let (outcome, reply) = run(&mut app, "calibrate ten");
        assert_eq!(outcome, Outcome::Redraw);
        assert!(reply.starts_with("err: invalid number 'ten'"), "{}", reply);

        let (outcome, reply) = run(&mut app, "toggle");
        assert_eq!(outcome, Outcome::Unchanged);
        assert!(reply.starts_with("err: "), "{}", reply);

        assert_eq!(run(&mut app, "ack").0, Outcome::Redraw);
        assert_eq!(run(&mut app, "calibrate 10").0, Outcome::Redraw);
        run(&mut app, "wheel 10");
        let (_, reply) = run(&mut app, "confirm");
        assert!(reply.starts_with("ok: Calibration complete"), "{}", reply);

        assert_eq!(run(&mut app, "quit"), (Outcome::Quit, "ok: quitting".to_string()));
    }
}
