//! Background daemon mode for periodic discovery
//!
//! Runs a discovery pass on every tick and stops cleanly on SIGTERM/SIGINT.
//! Passes are serialized through a [`RunGuard`] seeded from the directory, so
//! a restart does not bypass the cooldown.

use anyhow::{Context, Result};
use switchmap_core::config::Config;
use switchmap_core::directory::DirectoryStore;
use switchmap_core::snmp::PollingSession;
use switchmap_core::{GuardBusy, RunGuard};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Run discovery every `interval_minutes` until a shutdown signal arrives
pub async fn run_daemon<S, C, St>(
    config: &Config,
    switches: &S,
    cores: &C,
    store: &St,
    interval_minutes: u64,
) -> Result<()>
where
    S: PollingSession,
    C: PollingSession,
    St: DirectoryStore,
{
    let inventory = config.inventory()?;
    tracing::info!(
        "Starting daemon: discovery every {} minutes over {} switches",
        interval_minutes,
        inventory.switch_count()
    );

    let period = tick_period(interval_minutes)?;
    let last_discovery = store.load()?.last_discovery();
    let guard = RunGuard::with_last_run(config.discovery.cooldown()?, last_discovery);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // Main daemon loop; the first tick fires immediately
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_pass(config, switches, cores, store, &guard).await;
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    tracing::info!("Daemon stopped");
    Ok(())
}

fn tick_period(interval_minutes: u64) -> Result<Duration> {
    interval_minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("Daemon interval of {} minutes is too large", interval_minutes))
}

async fn run_pass<S, C, St>(config: &Config, switches: &S, cores: &C, store: &St, guard: &RunGuard)
where
    S: PollingSession,
    C: PollingSession,
    St: DirectoryStore,
{
    let permit = match guard.try_acquire(chrono::Utc::now()) {
        Ok(permit) => permit,
        Err(GuardBusy::CoolingDown { remaining, .. }) => {
            tracing::info!("Skipping pass, cooldown has {}s left", remaining.num_seconds());
            return;
        }
        Err(e) => {
            tracing::warn!("Skipping pass: {}", e);
            return;
        }
    };

    let start = std::time::Instant::now();
    let outcome =
        switchmap_core::run_configured(config, switches, cores, store, permit.started_at()).await;
    match outcome {
        Ok(report) => tracing::info!(
            "Pass complete in {:.1}s: {} new, {} updated, {} offline, {} failed targets",
            start.elapsed().as_secs_f64(),
            report.summary.inserted,
            report.summary.updated,
            report.summary.marked_offline,
            report.failed_targets.len()
        ),
        Err(e) => tracing::error!("Discovery failed: {}", e),
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => tracing::warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}
