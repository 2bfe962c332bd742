//! Interactive shell for driving an overlay session by hand.
//!
//! Each line is parsed as a command; `load` starts a session, `bounds` and
//! `move` feed it geometry the way a host UI would, `status` dumps the
//! manager snapshot as JSON.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use perch_overlay::{ContainerBounds, OverlayManager, OverlaySettings};

/// Startup arguments; a document given here is loaded before the shell
/// starts accepting commands.
#[derive(Parser)]
#[command(version, about = "Overlay an external viewer window onto a container region")]
struct Args {
    /// Document to open immediately
    document: Option<PathBuf>,
    /// Container rectangle as x,y,width,height
    #[arg(short, long, value_parser = parse_bounds, default_value = "0,0,800,600")]
    bounds: ContainerBounds,
    /// Viewer command override, space separated
    #[arg(short, long)]
    viewer: Option<String>,
    /// Host viewport zoom factor
    #[arg(short, long, default_value_t = 1.0)]
    zoom: f64,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut settings = OverlaySettings::default();
    if let Some(viewer) = &args.viewer {
        settings.viewer_command = shlex::split(viewer).ok_or("error: Invalid viewer quoting")?;
    }
    let mut manager = new_manager(settings)?;
    manager.update_zoom_level(args.zoom);

    if let Some(document) = &args.document {
        manager
            .load_document(document, args.bounds)
            .map_err(|e| e.to_string())?;
    }

    let stdin = std::io::stdin();
    loop {
        print!("perch> ");
        std::io::stdout().flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, &mut manager) {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => eprintln!("{err}"),
        }
    }

    manager.stop();
    Ok(())
}

fn new_manager(settings: OverlaySettings) -> Result<OverlayManager, String> {
    let mut manager = OverlayManager::new(settings).map_err(|e| e.to_string())?;
    manager.set_callbacks(
        Some(Box::new(|state| println!("state: {state:?}"))),
        Some(Box::new(|msg| eprintln!("error: {msg}"))),
    );
    Ok(manager)
}

#[derive(Parser)]
#[command(version, about = "overlay shell")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the viewer for a document and overlay its window.
    Load {
        path: PathBuf,
        /// Container rectangle as x,y,width,height
        #[arg(short, long, value_parser = parse_bounds, default_value = "0,0,800,600")]
        bounds: ContainerBounds,
        /// Viewer command override, space separated
        #[arg(short, long)]
        viewer: Option<String>,
    },
    /// Report a new container rectangle (x,y,width,height).
    Bounds {
        #[arg(value_parser = parse_bounds)]
        bounds: ContainerBounds,
    },
    /// Report a new host window position.
    Move { x: i32, y: i32 },
    /// Report a new zoom factor.
    Zoom { factor: f64 },
    /// Toggle position smoothing.
    Smoothing {
        enabled: bool,
        #[arg(default_value_t = 0.3)]
        factor: f64,
    },
    /// Toggle movement prediction.
    Prediction { enabled: bool },
    /// Dump the session snapshot as JSON.
    Status,
    /// Tear the session down.
    Stop,
    #[command(alias = "exit")]
    Quit,
}

fn parse_bounds(s: &str) -> Result<ContainerBounds, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| e.to_string()))
        .collect::<Result<_, _>>()?;
    let [x, y, width, height] = parts[..] else {
        return Err("expected x,y,width,height".to_string());
    };
    if width <= 0.0 || height <= 0.0 {
        return Err("width and height must be positive".to_string());
    }
    Ok(ContainerBounds {
        x,
        y,
        width,
        height,
    })
}

fn respond(line: &str, manager: &mut OverlayManager) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "perch".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match cli.command {
        Commands::Load {
            path,
            bounds,
            viewer,
        } => {
            if let Some(viewer) = viewer {
                let command = shlex::split(&viewer).ok_or("error: Invalid viewer quoting")?;
                *manager = new_manager(OverlaySettings {
                    viewer_command: command,
                    ..OverlaySettings::default()
                })?;
            }
            manager
                .load_document(&path, bounds)
                .map_err(|e| e.to_string())?;
            println!("ready");
        }
        Commands::Bounds { bounds } => manager.update_container_bounds(bounds),
        Commands::Move { x, y } => manager.update_window_position(x, y),
        Commands::Zoom { factor } => manager.update_zoom_level(factor),
        Commands::Smoothing { enabled, factor } => manager.set_smoothing(enabled, factor),
        Commands::Prediction { enabled } => manager.set_prediction(enabled),
        Commands::Status => {
            let snapshot = manager.get_status();
            println!(
                "{}",
                serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?
            );
        }
        Commands::Stop => manager.stop(),
        Commands::Quit => return Ok(true),
    }
    Ok(false)
}
