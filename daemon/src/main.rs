//! flood-sim: entry point for running an in-process overlay.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use flood_node::{NodeSnapshot, Overlay, Param, Settings};
use flood_utils::{format_duration, init_logging, parse_duration, LogFormat};

#[derive(Parser)]
#[command(name = "flood-sim", about = "Degree-bounded overlay simulation")]
struct Cli {
    /// Number of peers joining the overlay.
    #[arg(long, default_value_t = 32, env = "FLOOD_PEERS")]
    peers: usize,

    /// Target degree of every peer (MAX_NUM_CONNECTIONS).
    #[arg(long, env = "FLOOD_DEGREE")]
    degree: Option<u64>,

    /// How long to run after the last peer joined, e.g. "30s" or "2m".
    #[arg(long, default_value = "30s", value_parser = parse_duration, env = "FLOOD_DURATION")]
    duration: Duration,

    /// Delay between two consecutive joins.
    #[arg(long, default_value = "50ms", value_parser = parse_duration, env = "FLOOD_JOIN_STAGGER")]
    join_stagger: Duration,

    /// Number of peers whose network interface goes down for `--outage`
    /// right after the last join.
    #[arg(long, default_value_t = 0, env = "FLOOD_FLAPPING")]
    flapping: usize,

    /// How long flapping peers stay offline.
    #[arg(long, default_value = "2s", value_parser = parse_duration, env = "FLOOD_OUTAGE")]
    outage: Duration,

    /// Seed for every random choice in the run.
    #[arg(long, default_value_t = 0, env = "FLOOD_SEED")]
    seed: u64,

    /// Settings file: `NAME=value` lines for `.properties` files, otherwise
    /// TOML with `[params]` and `[times]` tables.
    #[arg(long, env = "FLOOD_SETTINGS")]
    settings: Option<PathBuf>,

    /// Settings overwrite string, e.g. "MAX_NUM_CONNECTIONS:8;MSG_TIMEOUT:500ms".
    /// Applied after the settings file.
    #[arg(long, env = "FLOOD_OVERWRITE")]
    overwrite: Option<String>,

    /// Log output format: "human" or "json".
    #[arg(long, default_value = "human", env = "FLOOD_LOG_FORMAT")]
    log_format: LogFormat,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, default_value = "info", env = "FLOOD_LOG_LEVEL")]
    log_level: String,
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let settings = Settings::from_file(path)
                .with_context(|| format!("loading settings from {}", path.display()))?;
            tracing::info!("Loaded settings from {}", path.display());
            settings
        }
        None => Settings::default(),
    };
    if let Some(overwrite) = &cli.overwrite {
        settings.apply_overwrite(overwrite)?;
    }
    if let Some(degree) = cli.degree {
        settings.set_param(Param::MaxNumConnections, degree);
    }
    Ok(settings)
}

/// Take the first `count` peers offline for `outage`, then run until
/// `duration` has passed in total.
async fn run_with_outage(
    overlay: &Overlay,
    count: usize,
    outage: Duration,
    duration: Duration,
) -> anyhow::Result<()> {
    let flapping = &overlay.peers()[..count.min(overlay.peers().len())];
    if flapping.is_empty() {
        tokio::time::sleep(duration).await;
        return Ok(());
    }

    let outage = outage.min(duration);
    for peer in flapping {
        peer.interface_down()?;
    }
    tracing::info!(peers = flapping.len(), "interfaces down for {}", format_duration(outage.as_secs()));
    tokio::time::sleep(outage).await;
    for peer in flapping {
        peer.interface_up()?;
    }
    tracing::info!(peers = flapping.len(), "interfaces back up");
    tokio::time::sleep(duration - outage).await;
    Ok(())
}

struct DegreeStats {
    present: usize,
    min: usize,
    max: usize,
    avg: f64,
}

fn degree_stats(snapshots: &[NodeSnapshot]) -> Option<DegreeStats> {
    let degrees: Vec<usize> = snapshots
        .iter()
        .filter(|s| s.status.is_present())
        .map(NodeSnapshot::degree)
        .collect();
    let min = *degrees.iter().min()?;
    let max = *degrees.iter().max()?;
    let avg = degrees.iter().sum::<usize>() as f64 / degrees.len() as f64;
    Some(DegreeStats {
        present: degrees.len(),
        min,
        max,
        avg,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, &cli.log_level);

    let settings = load_settings(&cli)?;
    tracing::info!(
        peers = cli.peers,
        degree = settings.max_num_connections(),
        max_new_neighbors = settings.max_num_new_neighbors(),
        share_neighbors = settings.share_neighbors(),
        seed = cli.seed,
        "starting overlay"
    );

    let mut overlay = Overlay::new(settings, cli.seed);
    let tracker = overlay.start_tracker()?;
    tracing::info!(tracker = %tracker.node_id(), "tracker up");

    for _ in 0..cli.peers {
        overlay.add_peer()?.join()?;
        tokio::time::sleep(cli.join_stagger).await;
    }

    tracing::info!(
        "All peers started, running for {}",
        format_duration(cli.duration.as_secs())
    );
    let interrupted = tokio::select! {
        res = run_with_outage(&overlay, cli.flapping, cli.outage, cli.duration) => {
            res?;
            false
        }
        res = overlay.shutdown_controller().wait_for_signal() => {
            res?;
            true
        }
    };

    if interrupted {
        tracing::info!("interrupted, skipping degree report");
    } else {
        let snapshots = overlay.snapshots().await?;
        match degree_stats(&snapshots) {
            Some(stats) => tracing::info!(
                present = stats.present,
                absent = snapshots.len() - stats.present,
                min = stats.min,
                avg = format!("{:.2}", stats.avg),
                max = stats.max,
                "overlay degree"
            ),
            None => tracing::warn!("no peer joined the overlay"),
        }
    }

    overlay.shutdown().await?;
    tracing::info!("flood-sim exited cleanly");
    Ok(())
}
