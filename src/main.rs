use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod calibration;
mod color;
mod display;
mod error;
mod events;
mod ipc;
mod projection;
mod renderer;
mod settings;

use app::App;
use display::{DisplayMode, FallbackDisplay};
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "rangerings")]
#[command(author, version, about = "Calibrated distance rings for judging range in games")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Display mode: terminal or print
    #[arg(short, long, default_value = "terminal")]
    mode: DisplayMode,

    /// Settings file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Display index, overriding the settings file
    #[arg(long)]
    monitor: Option<usize>,

    /// Write a commented settings template and exit
    #[arg(long)]
    init_config: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a command to a running instance, e.g. `ctl calibrate 10`
    Ctl {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Print shell completions
    Completions { shell: clap_complete::Shell },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("rangerings=info".parse()?);

    match log_file {
        // Keep log lines off the TUI.
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Some(Command::Ctl { words }) => {
            init_logging(None)?;
            let reply = ipc::send_command(&words.join(" ")).await?;
            println!("{}", reply);
            if reply.starts_with("err") {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            clap_complete::generate(*shell, &mut Args::command(), "rangerings", &mut io::stdout());
            return Ok(());
        }
        None => {}
    }

    let settings_path = Settings::resolve_path(args.config.as_deref());

    if args.init_config {
        Settings::init_default_config(&settings_path).with_context(|| {
            format!("Failed to write settings template to {}", settings_path.display())
        })?;
        println!("Settings template written to {}", settings_path.display());
        return Ok(());
    }

    let log_file = match args.mode {
        DisplayMode::Terminal => Some(settings_path.with_file_name("rangerings.log")),
        DisplayMode::Print => None,
    };
    init_logging(log_file.as_deref())?;

    info!("Starting rangerings in {:?} mode", args.mode);

    let mut settings = Settings::load(&settings_path);
    if let Some(monitor) = args.monitor {
        settings.display.monitor = monitor;
    }

    let fallback = FallbackDisplay {
        width: settings.display.fallback_width,
        height: settings.display.fallback_height,
    };
    let enumerator = display::platform_enumerator();
    let displays = display::detect_displays(enumerator.as_deref(), &fallback);

    let mut app = App::new(settings, settings_path, displays);
    info!("Using settings file {}", app.settings_path().display());

    match args.mode {
        DisplayMode::Terminal => {
            display::terminal::run(&mut app).await?;
        }
        DisplayMode::Print => {
            display::print::run(&mut app)?;
        }
    }

    Ok(())
}
