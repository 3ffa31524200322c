//! # Sync Coordinator
//!
//! Keeps the sales list of the active view current.
//!
//! ## Refresh Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SyncCoordinator loop                              │
//! │                                                                         │
//! │   change feed ──────┐                                                   │
//! │   (sales / items)   │                                                   │
//! │                     │                                                   │
//! │   poll interval ────┼──► reload(active view) ──► ViewSnapshot           │
//! │                     │         │                                         │
//! │   handle.refresh() ─┘         └─ error: keep previous list,             │
//! │                                  record last_error                      │
//! │                                                                         │
//! │   handle.set_view(v) ──► drop subscription, subscribe for v, reload     │
//! │   ActiveView::None   ──► no subscription, no polling                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every reload is a full re-fetch with the view's current filter, never a
//! patch of the cached list. Reloads run one at a time inside the loop, so a
//! result always belongs to the view that was active when it started.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use festive_core::{ClosingSummary, Money, OverviewFilter, PendingFilter, Sale, SaleFilter};
use festive_db::{ChangeSubscription, Database, Table, TableChange};
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::closing::ClosingService;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// View State
// =============================================================================

/// The screen whose data the coordinator keeps fresh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveView {
    #[default]
    None,
    Overview(OverviewFilter),
    Pending(PendingFilter),
    Closing,
}

impl ActiveView {
    fn tables(&self) -> &'static [Table] {
        match self {
            ActiveView::None => &[],
            ActiveView::Overview(_) | ActiveView::Pending(_) => &[Table::Sales, Table::SaleItems],
            ActiveView::Closing => &[Table::Sales, Table::SaleItems, Table::CashClosures],
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, ActiveView::None)
    }
}

/// What the active view currently shows.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    pub view: ActiveView,
    /// Newest first.
    pub sales: Vec<Sale>,
    /// Open window totals, for the closing view.
    pub closing: Option<ClosingSummary>,
    /// Most recent reload failure; cleared by the next successful reload.
    pub last_error: Option<String>,
    pub last_reload: Option<DateTime<Utc>>,
    pub reloads: u64,
}

#[derive(Debug)]
enum Command {
    SetView(ActiveView),
    Refresh,
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct SyncCoordinator {
    db: Database,
    closing: ClosingService,
    poll_interval: Duration,
    state: Arc<RwLock<ViewSnapshot>>,
    subscription: Option<ChangeSubscription>,
    command_rx: mpsc::Receiver<Command>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for driving a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
    state: Arc<RwLock<ViewSnapshot>>,
}

impl CoordinatorHandle {
    /// Switches the active view and reloads it.
    pub async fn set_view(&self, view: ActiveView) -> SyncResult<()> {
        self.send(Command::SetView(view)).await
    }

    /// Requests an immediate reload of the active view.
    pub async fn refresh(&self) -> SyncResult<()> {
        self.send(Command::Refresh).await
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        self.state.read().await.clone()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Coordinator shutdown channel closed".into()))
    }

    async fn send(&self, command: Command) -> SyncResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}

impl SyncCoordinator {
    /// Creates a coordinator and returns a handle.
    pub fn new(db: Database, closing: ClosingService, poll_interval: Duration) -> (Self, CoordinatorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(ViewSnapshot::default()));

        let coordinator = SyncCoordinator {
            db,
            closing,
            poll_interval,
            state: state.clone(),
            subscription: None,
            command_rx,
            shutdown_rx,
        };

        let handle = CoordinatorHandle {
            command_tx,
            shutdown_tx,
            state,
        };

        (coordinator, handle)
    }

    /// Runs the coordinator loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(poll_secs = self.poll_interval.as_secs_f64(), "Sync coordinator starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let active = self.state.read().await.view.is_active();

            tokio::select! {
                change = next_change(&mut self.subscription) => {
                    match change {
                        Some(change) => {
                            debug!(table = %change.table, kind = ?change.kind, "Change notification");
                            self.reload().await;
                        }
                        None => {
                            warn!("Change feed closed, falling back to polling");
                            self.subscription = None;
                        }
                    }
                }

                _ = interval.tick(), if active => {
                    self.reload().await;
                }

                Some(command) = self.command_rx.recv() => {
                    match command {
                        Command::SetView(view) => {
                            self.switch_view(view).await;
                            interval.reset();
                        }
                        Command::Refresh => self.reload().await,
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync coordinator shutting down");
                    break;
                }
            }
        }

        self.subscription = None;
        info!("Sync coordinator stopped");
    }

    async fn switch_view(&mut self, view: ActiveView) {
        // Release the old subscription before taking a new one.
        self.subscription = None;

        let tables = view.tables();
        if !tables.is_empty() {
            self.subscription = Some(self.db.subscribe(tables));
        }

        debug!(?view, "Active view changed");
        {
            let mut state = self.state.write().await;
            *state = ViewSnapshot {
                view,
                reloads: state.reloads,
                ..Default::default()
            };
        }

        self.reload().await;
    }

    /// Re-fetches the active view. On failure the previous data stays.
    async fn reload(&self) {
        let view = self.state.read().await.view.clone();
        let now = Utc::now();

        let result: SyncResult<(Vec<Sale>, Option<ClosingSummary>)> = match &view {
            ActiveView::None => return,
            ActiveView::Overview(filter) => self
                .db
                .sales()
                .list(&filter.to_sale_filter(now, &Local))
                .await
                .map(|sales| (sales, None))
                .map_err(SyncError::from),
            ActiveView::Pending(filter) => self
                .db
                .sales()
                .list(&filter.to_sale_filter(now, &Local))
                .await
                .map(|sales| (sales, None))
                .map_err(SyncError::from),
            ActiveView::Closing => self.reload_closing().await,
        };

        let mut state = self.state.write().await;
        if state.view != view {
            return;
        }

        match result {
            Ok((sales, closing)) => {
                debug!(rows = sales.len(), "View reloaded");
                state.sales = sales;
                state.closing = closing;
                state.last_error = None;
                state.last_reload = Some(now);
                state.reloads += 1;
            }
            Err(e) => {
                warn!(?e, "View reload failed, keeping previous data");
                state.last_error = Some(e.to_string());
            }
        }
    }

    async fn reload_closing(&self) -> SyncResult<(Vec<Sale>, Option<ClosingSummary>)> {
        let review = self.closing.review(Money::zero()).await?;
        let sales = self
            .db
            .sales()
            .list(&SaleFilter::in_window(&review.summary.window))
            .await?;
        Ok((sales, Some(review.summary)))
    }
}

async fn next_change(subscription: &mut Option<ChangeSubscription>) -> Option<TableChange> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use festive_core::{NewSale, NewSaleLine, OverviewRange, PaymentMethod, PendingRange};
    use festive_db::DbConfig;

    use super::*;

    async fn setup(poll: Duration) -> (Database, i64, CoordinatorHandle) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let led = db.products().insert("Led rojo 100", 2500, Some("Leds"), 50).await.unwrap();
        let closing = ClosingService::new(db.clone(), "caja");
        let (coordinator, handle) = SyncCoordinator::new(db.clone(), closing, poll);
        tokio::spawn(coordinator.run());
        (db, led, handle)
    }

    async fn sale(db: &Database, product: i64, method: PaymentMethod) -> i64 {
        let id = db
            .sales()
            .insert_sale(&NewSale::new(Money::from_units(2500), method, None, "caja", Utc::now()))
            .await
            .unwrap();
        db.sales()
            .insert_items(id, &[NewSaleLine { product_id: product, quantity: 1, unit_price: 2500, total_price: 2500 }])
            .await
            .unwrap();
        id
    }

    async fn wait_for(handle: &CoordinatorHandle, check: impl Fn(&ViewSnapshot) -> bool) -> ViewSnapshot {
        for _ in 0..100 {
            let snapshot = handle.snapshot().await;
            if check(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("coordinator never reached expected state: {:?}", handle.snapshot().await);
    }

    fn overview() -> ActiveView {
        ActiveView::Overview(OverviewFilter { range: OverviewRange::All, method: None })
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_fail() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let closing = ClosingService::new(db.clone(), "caja");
        let (coordinator, handle) = SyncCoordinator::new(db, closing, Duration::from_secs(3600));
        let task = tokio::spawn(coordinator.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(handle.refresh().await, Err(SyncError::ShuttingDown)));
        assert!(matches!(handle.set_view(overview()).await, Err(SyncError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_push_reloads_active_view() {
        let (db, led, handle) = setup(Duration::from_secs(3600)).await;
        sale(&db, led, PaymentMethod::Cash).await;

        handle.set_view(overview()).await.unwrap();
        wait_for(&handle, |s| s.sales.len() == 1).await;

        let id = sale(&db, led, PaymentMethod::Transfer).await;
        let snapshot = wait_for(&handle, |s| s.sales.len() == 2).await;
        assert_eq!(snapshot.sales[0].id, id);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_view_filters() {
        let (db, led, handle) = setup(Duration::from_secs(3600)).await;
        sale(&db, led, PaymentMethod::Cash).await;
        let pending = sale(&db, led, PaymentMethod::Pending).await;

        handle
            .set_view(ActiveView::Pending(PendingFilter { range: PendingRange::Today, method: None, search: None }))
            .await
            .unwrap();
        let snapshot = wait_for(&handle, |s| s.reloads > 0).await;
        assert_eq!(snapshot.sales.len(), 1);
        assert_eq!(snapshot.sales[0].id, pending);
    }

    #[tokio::test]
    async fn test_inactive_view_ignores_changes() {
        let (db, led, handle) = setup(Duration::from_millis(50)).await;
        handle.set_view(overview()).await.unwrap();
        wait_for(&handle, |s| s.reloads > 0).await;

        handle.set_view(ActiveView::None).await.unwrap();
        let before = wait_for(&handle, |s| s.view == ActiveView::None).await.reloads;

        sale(&db, led, PaymentMethod::Cash).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.snapshot().await.reloads, before);
    }

    #[tokio::test]
    async fn test_polling_catches_unannounced_writes() {
        let (db, _led, handle) = setup(Duration::from_millis(50)).await;
        handle.set_view(overview()).await.unwrap();
        wait_for(&handle, |s| s.reloads > 0).await;

        // Written behind the change feed's back, like another terminal would.
        sqlx::query("INSERT INTO sales (created_at, total_amount, payment_method) VALUES (?1, 100, 'cash')")
            .bind(festive_db::repository::timestamp(Utc::now()))
            .execute(db.pool())
            .await
            .unwrap();

        wait_for(&handle, |s| s.sales.len() == 1).await;
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_list() {
        let (db, led, handle) = setup(Duration::from_secs(3600)).await;
        sale(&db, led, PaymentMethod::Cash).await;
        handle.set_view(overview()).await.unwrap();
        wait_for(&handle, |s| s.sales.len() == 1).await;

        db.close().await;
        handle.refresh().await.unwrap();

        let snapshot = wait_for(&handle, |s| s.last_error.is_some()).await;
        assert_eq!(snapshot.sales.len(), 1);
    }

    #[tokio::test]
    async fn test_closing_view_has_window_totals() {
        let (db, led, handle) = setup(Duration::from_secs(3600)).await;
        sale(&db, led, PaymentMethod::Cash).await;

        handle.set_view(ActiveView::Closing).await.unwrap();
        let snapshot = wait_for(&handle, |s| s.closing.is_some()).await;
        let summary = snapshot.closing.unwrap();
        assert_eq!(summary.totals.cash.units(), 2500);
        assert_eq!(snapshot.sales.len(), 1);
    }
}
