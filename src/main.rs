//! sk-cam - remote capture for network cameras
//!
//! ```bash
//! # Listen for camera beacons (Ctrl-C to stop)
//! sk-cam discover
//!
//! # Capture one photo from a session camera
//! sk-cam capture --address 192.168.42.1 /tmp/photo.jpg
//!
//! # Push settings to an HTTP camera
//! sk-cam configure --address 10.0.0.7 --kind http framesize=13 quality=10
//!
//! # Discover for 5 s, then capture every camera found
//! sk-cam snapshot --window-sec 5
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use sk_cam::{
    camera_controller::{CameraDescriptor, CameraKind},
    discovery::DiscoveryMode,
    ghost_protocol::CONTROL_PORT,
    state::{AppConfig, AppState},
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sk-cam", version)]
#[command(about = "Remote capture for network cameras")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for camera beacons
    Discover {
        /// Stop after the first camera
        #[arg(long)]
        once: bool,
    },
    /// Capture one photo
    Capture {
        #[command(flatten)]
        camera: CameraArgs,

        /// Destination file
        destination: PathBuf,
    },
    /// Apply settings to a camera
    Configure {
        #[command(flatten)]
        camera: CameraArgs,

        /// Settings as name=value
        #[arg(required = true, value_parser = parse_setting)]
        settings: Vec<(String, String)>,
    },
    /// Discover for a while, then capture every camera found
    Snapshot {
        /// Discovery window in seconds
        #[arg(long, default_value_t = 5)]
        window_sec: u64,
    },
}

#[derive(clap::Args)]
struct CameraArgs {
    /// Camera IP address
    #[arg(long)]
    address: String,

    /// Camera id (defaults to the address)
    #[arg(long)]
    id: Option<String>,

    /// session | http
    #[arg(long, default_value = "session")]
    kind: CameraKind,

    /// HTTP port of the camera
    #[arg(long, default_value_t = 80)]
    http_port: u16,

    /// Control port of a session camera
    #[arg(long, default_value_t = CONTROL_PORT)]
    control_port: u16,
}

impl CameraArgs {
    fn descriptor(&self) -> CameraDescriptor {
        let id = self.id.clone().unwrap_or_else(|| self.address.clone());
        match self.kind {
            CameraKind::Session => CameraDescriptor::session(id, &self.address, "")
                .with_control_port(self.control_port)
                .with_http_port(self.http_port),
            CameraKind::Http => CameraDescriptor::http(id, &self.address, self.http_port),
        }
    }
}

fn parse_setting(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected name=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sk_cam=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = AppConfig::default();
    tracing::info!(
        pictures_dir = %config.pictures_dir.display(),
        capture_timeout_sec = config.capture_timeout_sec,
        max_capture_retries = config.max_capture_retries,
        discovery_port = config.discovery_port,
        "Configuration loaded"
    );

    let mode = match &args.command {
        Commands::Discover { once: true } => DiscoveryMode::FirstBeacon,
        _ => DiscoveryMode::Continuous,
    };
    let state = AppState::new(config, mode)?;

    // Ctrl-C cancels running captures and discovery
    let signal_state = state.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_state.shutdown();
        }
    });

    match args.command {
        Commands::Discover { .. } => {
            state.registry.discover().await?;
            for camera in state.registry.list().await {
                println!("{}", serde_json::to_string(&camera)?);
            }
        }
        Commands::Capture { camera, destination } => {
            let camera = camera.descriptor();
            let outcome = state
                .controllers
                .for_kind(camera.kind)
                .capture_jpeg(&camera, &destination)
                .await;
            let path = outcome
                .into_result()
                .with_context(|| format!("capture from {} failed", camera.id))?;
            println!("{}", path.display());
        }
        Commands::Configure { camera, settings } => {
            let camera = camera.descriptor();
            let settings: HashMap<String, String> = settings.into_iter().collect();
            state
                .controllers
                .for_kind(camera.kind)
                .configure_camera(&camera, &settings)
                .await
                .with_context(|| format!("configure {} failed", camera.id))?;
        }
        Commands::Snapshot { window_sec } => {
            let window = Duration::from_secs(window_sec);
            match tokio::time::timeout(window, state.registry.discover()).await {
                Ok(result) => result?,
                Err(_) => tracing::debug!(window_sec, "Discovery window closed"),
            }

            tokio::fs::create_dir_all(&state.config.pictures_dir).await?;
            let snapshot = state.registry.snapshot(&state.config.pictures_dir).await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            parse_setting("framesize=13").unwrap(),
            ("framesize".to_string(), "13".to_string())
        );
        assert_eq!(
            parse_setting("photo_size=12M (4000x3000 4:3)").unwrap().1,
            "12M (4000x3000 4:3)"
        );
        assert!(parse_setting("quality").is_err());
        assert!(parse_setting("=10").is_err());
    }

    #[test]
    fn test_cli_parses_capture() {
        let args = Args::try_parse_from([
            "sk-cam", "capture", "--address", "10.0.0.7", "--kind", "http", "--http-port", "8080", "/tmp/a.jpg",
        ])
        .unwrap();

        match args.command {
            Commands::Capture { camera, destination } => {
                let cam = camera.descriptor();
                assert_eq!(cam.id, "10.0.0.7");
                assert_eq!(cam.kind, CameraKind::Http);
                assert_eq!(cam.http_base_url(), "http://10.0.0.7:8080");
                assert_eq!(destination, PathBuf::from("/tmp/a.jpg"));
            }
            _ => panic!("expected capture"),
        }
    }
}
