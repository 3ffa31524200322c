//! # Festive Terminal
//!
//! Headless stall terminal: opens the shared store, keeps the sales overview
//! fresh and replays orders queued while offline.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize logging (RUST_LOG, default info,festive=debug,sqlx=warn) │
//! │  2. Load terminal.toml + FESTIVE_* overrides                            │
//! │  3. Open the database (WAL, migrations)                                 │
//! │  4. Open the terminal: offline queue + error log from the data dir      │
//! │  5. Spawn the view coordinator and the replay worker                    │
//! │  6. Run until Ctrl-C, then shut both down                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use festive_db::{Database, DbConfig};
use festive_sync::{ActiveView, PosTerminal, ReplayWorker, TerminalConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = TerminalConfig::load_or_default(None);
    info!(
        terminal_id = %config.terminal_id(),
        operator = %config.operator(),
        data_dir = %config.data_dir().display(),
        "Starting Festive terminal"
    );

    std::fs::create_dir_all(config.data_dir())?;
    let db = Database::new(DbConfig::new(config.database_path())).await?;

    let marker = config.manual_product_marker().to_string();
    if db.products().find_by_name_marker(&marker).await?.is_none() {
        warn!(%marker, "No product for manual lines; run the seed binary");
    }

    let mut terminal = PosTerminal::open(config, db.clone()).await?;
    let views = terminal.start_coordinator();
    views.set_view(ActiveView::Overview(Default::default())).await?;

    let terminal = Arc::new(terminal);
    let (worker, replay) = ReplayWorker::new(terminal.clone());
    tokio::spawn(worker.run());

    info!("Terminal ready, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    if let Err(e) = replay.shutdown().await {
        warn!(?e, "Replay worker already stopped");
    }
    if let Err(e) = views.shutdown().await {
        warn!(?e, "Coordinator already stopped");
    }

    let queued = terminal.queued_orders().await.len();
    if queued > 0 {
        warn!(queued, "Orders still queued offline; they are sent on next start");
    }

    db.close().await;
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=festive_sync=trace` - Trace the sync crate only
/// - Default: `info,festive=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,festive=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
