use anyhow::{bail, Context};
use flightline_core::{load_from_path, logging, OpsConfig};
use flightline_ops_state::{ConnectivityState, FeedItem, LiveOpsView};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

const MONITOR_PROTOCOL_VERSION: u32 = 1;
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct MonitorVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = MonitorVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: MONITOR_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--json-logs") {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match parse_config_path(&args)? {
        Some(path) => load_from_path(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let config = OpsConfig::default();
            config.validate().context("invalid default configuration")?;
            config
        }
    };

    info!(
        role = config.role.as_str(),
        api = %config.connection.api_endpoint,
        telemetry = %config.connection.telemetry_endpoint,
        "ops-monitor starting"
    );

    let view = LiveOpsView::connect(&config)
        .await
        .context("initial dashboard load failed")?;

    let mut connectivity = view.connectivity();
    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connectivity.borrow_and_update();
                match state {
                    ConnectivityState::Failed => error!("Telemetry channel failed; live map is frozen"),
                    ConnectivityState::Reconnecting { attempt } => warn!(attempt, "Telemetry reconnecting"),
                    other => info!(state = ?other, "Telemetry connectivity changed"),
                }
            }
            _ = summary.tick() => log_summary(&view).await,
        }
    }

    view.close().await;
    Ok(())
}

async fn log_summary(view: &LiveOpsView) {
    let feed = view.alert_feed().await;
    let emergencies = feed.iter().filter(|item| item.is_emergency()).count();
    if let Some(FeedItem::Emergency(top)) = feed.first() {
        warn!(
            emergency_id = %top.id,
            severity = ?top.severity,
            status = ?top.status,
            "Top open emergency"
        );
    }

    if let Some(weather) = view.weather_assessment().await {
        info!(
            runway = ?weather.effective_runway_status,
            stale = weather.is_stale,
            stale_minutes = ?weather.stale_minutes,
            override_active = weather.override_active,
            "Weather"
        );
    }

    let map = view.current_map();
    info!(
        alerts = feed.len(),
        emergencies,
        active_vehicles = map.active_vehicles,
        stale_vehicles = map.stale_count(),
        connectivity = ?view.connectivity_state(),
        "Operational summary"
    );
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config was provided without a path");
        }
    }

    Ok(None)
}
