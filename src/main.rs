//! SCRAMBLE — race lifecycle scheduler and wagering settlement service
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the store and seeds it, then runs the scheduler loop and the
//! JSON API until Ctrl+C, shutting both down gracefully.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use scramble::config;
use scramble::dashboard::{self, routes::ApiContext};
use scramble::engine::{RaceLifecycle, RaceTiming, RandomWinner, Scheduler, SettlementEngine, WagerGateway};
use scramble::storage::{self, competitors, schema};

const BANNER: &str = r#"
 ____   ____ ____      _    __  __ ____  _     _____
/ ___| / ___|  _ \    / \  |  \/  | __ )| |   | ____|
\___ \| |   | |_) |  / _ \ | |\/| |  _ \| |   |  _|
 ___) | |___|  _ <  / ___ \| |  | | |_) | |___| |___
|____/ \____|_| \_\/_/   \_\_|  |_|____/|_____|_____|

  Race scheduler & wagering settlement
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("SCRAMBLE_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        poll_interval_secs = cfg.race.poll_interval_secs,
        race_interval_secs = cfg.race.race_interval_secs,
        race_duration_secs = cfg.race.race_duration_secs,
        "SCRAMBLE starting up"
    );

    // -- Store -----------------------------------------------------------

    let pool = storage::connect(&cfg.database_url(), cfg.database.max_connections)
        .await
        .context("Failed to open the race store")?;
    schema::ensure_schema(&pool).await.context("Failed to prepare schema")?;
    schema::seed_roster(&pool, &cfg.roster).await?;
    schema::seed_users(&pool, &cfg.seed_users).await?;

    let roster = Arc::new(
        competitors::load_roster(&pool)
            .await
            .context("Failed to load competitor roster")?,
    );
    info!(competitors = roster.len(), "Roster loaded");

    // -- Engine ----------------------------------------------------------

    let selector = match cfg.race.rng_seed {
        Some(seed) => {
            warn!(seed, "Using a fixed winner seed; outcomes are reproducible");
            RandomWinner::seeded(seed)
        }
        None => RandomWinner::from_entropy(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let lifecycle = Arc::new(RaceLifecycle::new(
        pool.clone(),
        Arc::clone(&roster),
        SettlementEngine::new(Arc::new(selector)),
        RaceTiming::from(&cfg.race),
        events_tx,
    ));
    let scheduler = Scheduler::new(Arc::clone(&lifecycle), events_rx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // -- API -------------------------------------------------------------

    let server = if cfg.server.enabled {
        let admin_token = cfg.admin_token();
        if admin_token.is_none() {
            warn!("No admin token configured; /admin endpoints are disabled");
        }
        let state = Arc::new(ApiContext::new(
            Arc::clone(&lifecycle),
            WagerGateway::new(pool.clone(), Arc::clone(&roster)),
            admin_token,
        ));
        Some(dashboard::spawn_dashboard(state, cfg.server.port, shutdown_rx.clone()).await?)
    } else {
        info!("API server disabled");
        None
    };

    // -- Scheduler loop --------------------------------------------------

    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));
    info!("Entering main loop. Press Ctrl+C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
    }
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    if let Some(server) = server {
        if let Err(e) = server.await {
            error!(error = %e, "Dashboard task ended abnormally");
        }
    }

    lifecycle.cancel_end_timer();
    pool.close().await;
    info!("SCRAMBLE shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scramble=info"));

    let json_logging = std::env::var("SCRAMBLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
