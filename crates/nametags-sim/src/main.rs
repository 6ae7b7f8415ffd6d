mod scenario;

use std::path::{Path, PathBuf};
use std::time::Duration;

use nametags_core::{NametagConfig, TrackingSnapshot};
use scenario::Scenario;
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "nametags.toml";
const SNAPSHOT_FILE: &str = "nametags-tracking.json";

fn load_snapshot(path: &Path) -> Option<TrackingSnapshot> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("Ignoring unreadable tracking snapshot {}: {e}", path.display());
            None
        }
    }
}

fn save_snapshot(path: &Path, snapshot: &TrackingSnapshot) {
    let json = match serde_json::to_string_pretty(snapshot) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize tracking snapshot: {e}");
            return;
        }
    };
    if let Err(e) = std::fs::write(path, json) {
        error!("Failed to write {}: {e}", path.display());
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));

    let config = if config_path.exists() {
        match NametagConfig::load(&config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load {}: {e}", config_path.display());
                std::process::exit(1);
            }
        }
    } else {
        NametagConfig::default()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "nametags-sim v{} ({} label line(s), composer threads: {})",
        env!("CARGO_PKG_VERSION"),
        config.nametag.lines.len(),
        config.nametag.composer_threads
    );
    if !config_path.exists() {
        info!("{} not found, using defaults", config_path.display());
    }

    let snapshot_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(SNAPSHOT_FILE);
    let prior = load_snapshot(&snapshot_path);
    if let Some(prior) = &prior {
        info!("Loaded {} tracking pair(s) from {}", prior.len(), snapshot_path.display());
    }

    let mut scenario = match Scenario::new(config.nametag.clone(), prior) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start engine: {e}");
            std::process::exit(1);
        }
    };

    let mut tick_interval = tokio::time::interval(Duration::from_millis(50));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if let Err(e) = scenario.tick() {
                    warn!("Tick {} failed: {e}", scenario.current_tick());
                }
                if scenario.is_finished() {
                    info!("Script finished after {} ticks", scenario.current_tick());
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let snapshot = scenario.finish();
    save_snapshot(&snapshot_path, &snapshot);
    info!(
        "Saved {} tracking pair(s) to {}",
        snapshot.len(),
        snapshot_path.display()
    );
}
