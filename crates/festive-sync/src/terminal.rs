//! # POS Terminal
//!
//! One stall terminal: its drafts, the submitter, the offline queue and the
//! background workers that keep views fresh and replay queued orders.
//!
//! ## Confirming an Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  confirm_order(draft)                                                   │
//! │       │                                                                 │
//! │       ├── offline? ─────────────────────────────┐                       │
//! │       │                                         ▼                       │
//! │       ├── submit ── Err(Offline) ─────────────► queue record            │
//! │       │     │                                   clear draft             │
//! │       │     ├── Err(other) ──► draft kept, error returned               │
//! │       │     └── Ok ──► clear draft ──► refresh views                    │
//! │                                                                         │
//! │  ReplayWorker                                                           │
//! │       offline → online ──┐                                              │
//! │       retry timer ───────┼──► flush_offline_queue()                     │
//! │       handle.flush() ────┘      one record at a time, oldest first      │
//! │                                 orphan header deleted, then submitted   │
//! │                                 removed only after its own success      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The online flag only follows the environment. A store that fails while
//! the environment reports online does not flip it; the next confirm and the
//! next timed replay pass try the store again.
//!
//! Replay is at-least-once. A sale can reach the store while its response is
//! lost; the record then stays queued and is submitted again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use festive_core::{
    order_notes, settled_notes, ClosingRecord, CoreError, DraftOrder, DraftOrderStore, DraftTotals,
    ErrorLogEntry, Money, OfflineOrderRecord, OrderLineItem, PaymentMethod, Product, ValidationError,
    PENDING_NOTE_PREFIX,
};
use festive_db::{Database, DbError};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use crate::closing::{ClosingReview, ClosingService};
use crate::config::TerminalConfig;
use crate::connectivity::Connectivity;
use crate::coordinator::{CoordinatorHandle, SyncCoordinator};
use crate::error::{SubmitError, SyncError, SyncResult};
use crate::error_log::{ErrorLog, CTX_OFFLINE_REPLAY, CTX_SAVE_SALE};
use crate::offline_queue::OfflineQueue;
use crate::store::SalesStore;
use crate::submitter::{OrderSubmitter, SubmitReceipt};

// =============================================================================
// Outcomes
// =============================================================================

/// What happened to a confirmed draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The sale is in the store.
    Submitted(SubmitReceipt),
    /// The store was unreachable; the order waits in the offline queue.
    QueuedOffline { record_id: String },
}

impl ConfirmOutcome {
    /// Operator-facing message for the queued case.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            ConfirmOutcome::Submitted(_) => None,
            ConfirmOutcome::QueuedOffline { .. } => {
                Some("Sin conexion. Pedido guardado offline y se enviara al reconectar.")
            }
        }
    }
}

/// Result of one pass over the offline queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub sent: usize,
    pub failed: usize,
    /// Records still queued after the pass.
    pub remaining: usize,
    /// Another replay was already running; nothing was attempted.
    pub skipped: bool,
}

impl ReplayReport {
    pub fn message(&self) -> Option<String> {
        (self.sent > 0).then(|| format!("Se enviaron {} pedido(s) pendientes al reconectar.", self.sent))
    }
}

// =============================================================================
// Terminal
// =============================================================================

pub struct PosTerminal {
    config: TerminalConfig,
    db: Database,
    drafts: Mutex<DraftOrderStore>,
    submitter: OrderSubmitter,
    queue: OfflineQueue,
    error_log: Arc<ErrorLog>,
    connectivity: Connectivity,
    closing: ClosingService,
    /// Held for the whole of a replay pass.
    flush_lock: tokio::sync::Mutex<()>,
    views: Option<CoordinatorHandle>,
}

impl PosTerminal {
    /// Opens a terminal that submits straight to `db`.
    pub async fn open(config: TerminalConfig, db: Database) -> SyncResult<Self> {
        let store: Arc<dyn SalesStore> = Arc::new(db.clone());
        Self::with_store(config, db, store).await
    }

    /// Opens a terminal whose submissions go through `store`.
    ///
    /// Loads the offline queue and error log from the data directory.
    pub async fn with_store(
        config: TerminalConfig,
        db: Database,
        store: Arc<dyn SalesStore>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let error_log = Arc::new(
            ErrorLog::load(config.error_log_path(), config.storage.error_log_capacity).await,
        );
        let queue = OfflineQueue::open(config.offline_queue_path()).await?;
        let submitter = OrderSubmitter::new(
            store,
            error_log.clone(),
            config.operator(),
            config.manual_product_marker(),
        );
        let closing = ClosingService::new(db.clone(), config.operator());

        info!(
            terminal_id = %config.terminal_id(),
            operator = %config.operator(),
            queued = queue.len().await,
            "Terminal opened"
        );

        Ok(PosTerminal {
            connectivity: Connectivity::new(config.sync.start_online),
            config,
            db,
            drafts: Mutex::new(DraftOrderStore::new()),
            submitter,
            queue,
            error_log,
            closing,
            flush_lock: tokio::sync::Mutex::new(()),
            views: None,
        })
    }

    /// Spawns the view coordinator and routes refreshes to it.
    pub fn start_coordinator(&mut self) -> CoordinatorHandle {
        let (coordinator, handle) =
            SyncCoordinator::new(self.db.clone(), self.closing.clone(), self.config.poll_interval());
        tokio::spawn(coordinator.run());
        self.views = Some(handle.clone());
        handle
    }

    pub fn config(&self) -> &TerminalConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Reports the environment's online state.
    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    // =========================================================================
    // Catalog & Drafts
    // =========================================================================

    pub async fn catalog(&self) -> SyncResult<Vec<Product>> {
        Ok(self.db.products().list_active().await?)
    }

    fn drafts(&self) -> MutexGuard<'_, DraftOrderStore> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_draft(&self) -> String {
        self.drafts().create()
    }

    pub fn set_active_draft(&self, draft_id: &str) -> SyncResult<()> {
        Ok(self.drafts().set_active(draft_id)?)
    }

    pub fn active_draft(&self) -> DraftOrder {
        self.drafts().active().clone()
    }

    pub fn draft(&self, draft_id: &str) -> SyncResult<DraftOrder> {
        Ok(self.drafts().get(draft_id)?.clone())
    }

    pub fn list_drafts(&self) -> Vec<DraftOrder> {
        self.drafts().drafts().to_vec()
    }

    /// Adds a catalog product, clamped against its stock as read now.
    pub async fn add_item(&self, draft_id: &str, product_id: i64, quantity: i64) -> SyncResult<()> {
        let product = self
            .db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        Ok(self.drafts().add_item(draft_id, &product, quantity)?)
    }

    pub fn add_manual_item(
        &self,
        draft_id: &str,
        name: &str,
        unit_price: Money,
        quantity: i64,
    ) -> SyncResult<String> {
        Ok(self.drafts().add_manual_item(draft_id, name, unit_price, quantity)?)
    }

    pub fn adjust_quantity(&self, draft_id: &str, item_id: &str, delta: i64) -> SyncResult<i64> {
        Ok(self.drafts().adjust_quantity(draft_id, item_id, delta)?)
    }

    pub fn set_payment_method(&self, draft_id: &str, method: PaymentMethod) -> SyncResult<()> {
        Ok(self.drafts().set_payment_method(draft_id, method)?)
    }

    pub fn clear_draft(&self, draft_id: &str) -> SyncResult<()> {
        Ok(self.drafts().clear(draft_id)?)
    }

    pub fn delete_draft(&self, draft_id: &str) -> SyncResult<()> {
        Ok(self.drafts().delete(draft_id)?)
    }

    pub fn draft_totals(&self, draft_id: &str) -> SyncResult<DraftTotals> {
        Ok(self.drafts().totals(draft_id)?)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submits a draft, or queues it when the store is unreachable.
    ///
    /// ## Arguments
    /// * `draft_id` - Draft to confirm
    /// * `notes` - Operator note; replaces the generated item summary
    ///
    /// ## Returns
    /// * `Ok(Submitted)` - Sale stored, draft cleared
    /// * `Ok(QueuedOffline)` - Order queued, draft cleared
    /// * `Err(_)` - Validation, stock or persistence failure; draft unchanged
    pub async fn confirm_order(&self, draft_id: &str, notes: Option<String>) -> SyncResult<ConfirmOutcome> {
        let (items, method) = {
            let drafts = self.drafts();
            let draft = drafts.get(draft_id)?;
            (draft.items.clone(), draft.payment_method)
        };

        if items.is_empty() {
            return Err(CoreError::EmptyOrder.into());
        }

        let notes = compose_notes(&items, method, notes);

        if !self.connectivity.is_online() {
            return self.queue_offline(draft_id, items, method, notes).await;
        }

        match self.submitter.submit(&items, method, notes.clone()).await {
            Ok(receipt) => {
                self.clear_confirmed(draft_id);
                self.refresh_views().await;
                Ok(ConfirmOutcome::Submitted(receipt))
            }
            Err(e) if e.is_offline() => {
                let mut record = OfflineOrderRecord::new(items, method, notes, Utc::now());
                record.orphan_sale_id = e.orphan_sale();
                self.enqueue(draft_id, record).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn queue_offline(
        &self,
        draft_id: &str,
        items: Vec<OrderLineItem>,
        method: PaymentMethod,
        notes: Option<String>,
    ) -> SyncResult<ConfirmOutcome> {
        let record = OfflineOrderRecord::new(items, method, notes, Utc::now());
        self.enqueue(draft_id, record).await
    }

    async fn enqueue(&self, draft_id: &str, record: OfflineOrderRecord) -> SyncResult<ConfirmOutcome> {
        let record_id = record.id.clone();

        // The record is queued in memory even when the write fails.
        if let Err(e) = self.queue.append(record).await {
            warn!(?e, record_id = %record_id, "Queued order not persisted yet");
            self.error_log
                .record(CTX_SAVE_SALE, format!("cola offline sin guardar: {e}"))
                .await;
        }

        self.clear_confirmed(draft_id);
        Ok(ConfirmOutcome::QueuedOffline { record_id })
    }

    fn clear_confirmed(&self, draft_id: &str) {
        if let Err(e) = self.drafts().clear(draft_id) {
            debug!(?e, draft_id, "Confirmed draft already gone");
        }
    }

    /// Settles a pending sale.
    ///
    /// The explicit note wins; otherwise the `PENDIENTE -` marker is dropped
    /// from the existing notes.
    pub async fn mark_pending_as_paid(
        &self,
        sale_id: i64,
        method: PaymentMethod,
        note: Option<&str>,
    ) -> SyncResult<()> {
        if method.is_pending() {
            return Err(ValidationError::NotAllowed {
                field: "payment method".to_string(),
                allowed: vec![PaymentMethod::Cash.to_string(), PaymentMethod::Transfer.to_string()],
            }
            .into());
        }

        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;

        let notes = settled_notes(note, sale.notes.as_deref());
        self.db
            .sales()
            .mark_paid(sale_id, method, notes.as_deref(), self.config.operator(), Utc::now())
            .await?;

        info!(sale_id, method = %method, "Pending sale settled");
        self.refresh_views().await;
        Ok(())
    }

    // =========================================================================
    // Offline Queue
    // =========================================================================

    /// Replays every queued order once, oldest first.
    ///
    /// Stops early when the store turns out to be unreachable. Returns a
    /// skipped report when another replay is already running.
    pub async fn flush_offline_queue(&self) -> SyncResult<ReplayReport> {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            debug!("Replay already running");
            return Ok(ReplayReport {
                remaining: self.queue.len().await,
                skipped: true,
                ..Default::default()
            });
        };

        let mut report = ReplayReport::default();
        if !self.connectivity.is_online() {
            report.remaining = self.queue.len().await;
            return Ok(report);
        }

        for record in self.queue.snapshot().await {
            match self.replay(&record).await {
                Ok(receipt) => {
                    report.sent += 1;
                    debug!(record_id = %record.id, sale_id = receipt.sale_id, "Queued order replayed");
                    if let Err(e) = self.queue.remove(&record.id).await {
                        warn!(?e, record_id = %record.id, "Replayed order still on disk");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    self.error_log
                        .record(CTX_OFFLINE_REPLAY, format!("{}: {e}", record.id))
                        .await;
                    let orphan = e.orphan_sale();
                    if orphan != record.orphan_sale_id {
                        if let Err(e) = self.queue.set_orphan_sale(&record.id, orphan).await {
                            warn!(?e, record_id = %record.id, ?orphan, "Orphan header not persisted yet");
                        }
                    }
                    if e.is_offline() {
                        debug!(record_id = %record.id, "Store unreachable, replay stopped");
                        break;
                    }
                }
            }
        }

        report.remaining = self.queue.len().await;
        if let Some(message) = report.message() {
            info!(sent = report.sent, remaining = report.remaining, "{message}");
            self.refresh_views().await;
        }
        Ok(report)
    }

    /// Clears the header an earlier attempt left behind, then submits.
    async fn replay(&self, record: &OfflineOrderRecord) -> Result<SubmitReceipt, SubmitError> {
        if let Some(sale_id) = record.orphan_sale_id {
            self.submitter.discard_orphan(sale_id).await?;
        }
        self.submitter
            .submit(&record.items, record.payment_method, record.notes.clone())
            .await
    }

    pub async fn queued_orders(&self) -> Vec<OfflineOrderRecord> {
        self.queue.snapshot().await
    }

    pub async fn error_log(&self) -> Vec<ErrorLogEntry> {
        self.error_log.entries().await
    }

    // =========================================================================
    // Cash Closing
    // =========================================================================

    pub async fn review_closing(&self, counted_cash: Money) -> SyncResult<ClosingReview> {
        self.closing.review(counted_cash).await
    }

    pub async fn save_closing(&self, review: &ClosingReview, comment: Option<String>) -> SyncResult<i64> {
        let id = self.closing.save(review, comment).await?;
        self.refresh_views().await;
        Ok(id)
    }

    pub async fn closing_history(&self, limit: i64) -> SyncResult<Vec<ClosingRecord>> {
        self.closing.history(limit).await
    }

    async fn refresh_views(&self) {
        if let Some(views) = &self.views {
            if let Err(e) = views.refresh().await {
                debug!(?e, "View refresh not delivered");
            }
        }
    }
}

/// Operator note if given, else the item summary. Pending orders keep the
/// `PENDIENTE - ` prefix either way.
fn compose_notes(items: &[OrderLineItem], method: PaymentMethod, explicit: Option<String>) -> Option<String> {
    let explicit = explicit
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    match explicit {
        Some(note) if method.is_pending() => Some(format!("{PENDING_NOTE_PREFIX}{note}")),
        Some(note) => Some(note),
        None => order_notes(items, method),
    }
}

// =============================================================================
// Replay Worker
// =============================================================================

/// Replay worker state for external queries.
#[derive(Debug, Clone, Default)]
pub struct ReplayStatus {
    /// Passes that found records to send.
    pub attempts: u64,
    pub last_report: Option<ReplayReport>,
    /// Delay before the next timed pass.
    pub next_retry: Option<Duration>,
}

/// Replays the offline queue on reconnect and on a retry timer.
pub struct ReplayWorker {
    terminal: Arc<PosTerminal>,
    online_rx: watch::Receiver<bool>,
    retry_interval: Duration,
    backoff: ExponentialBackoff,
    status: Arc<RwLock<ReplayStatus>>,
    flush_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the replay worker.
#[derive(Clone)]
pub struct ReplayHandle {
    flush_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<ReplayStatus>>,
}

impl ReplayHandle {
    /// Requests an immediate replay pass.
    pub async fn flush(&self) -> SyncResult<()> {
        self.flush_tx
            .send(())
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    pub async fn status(&self) -> ReplayStatus {
        self.status.read().await.clone()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Replay shutdown channel closed".into()))
    }
}

impl ReplayWorker {
    /// Creates a replay worker and returns a handle.
    pub fn new(terminal: Arc<PosTerminal>) -> (Self, ReplayHandle) {
        let sync = &terminal.config().sync;
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(sync.initial_backoff_ms),
            max_interval: Duration::from_secs(sync.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        let retry_interval = terminal.config().poll_interval();

        let (flush_tx, flush_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status = Arc::new(RwLock::new(ReplayStatus::default()));

        let worker = ReplayWorker {
            online_rx: terminal.watch_connectivity(),
            terminal,
            retry_interval,
            backoff,
            status: status.clone(),
            flush_rx,
            shutdown_rx,
        };

        let handle = ReplayHandle {
            flush_tx,
            shutdown_tx,
            status,
        };

        (worker, handle)
    }

    /// Runs the replay loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Replay worker starting");

        // Whatever a previous run left queued goes out first.
        let mut delay = self.pass().await;

        loop {
            tokio::select! {
                changed = self.online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *self.online_rx.borrow_and_update() {
                        self.backoff.reset();
                        delay = self.pass().await;
                    }
                }

                _ = tokio::time::sleep(delay) => {
                    delay = self.pass().await;
                }

                Some(()) = self.flush_rx.recv() => {
                    delay = self.pass().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Replay worker shutting down");
                    break;
                }
            }
        }

        info!("Replay worker stopped");
    }

    /// One replay pass. Returns the delay before the next timed pass.
    async fn pass(&mut self) -> Duration {
        if self.terminal.queue.is_empty().await || !self.terminal.is_online() {
            self.backoff.reset();
            return self.retry_interval;
        }

        let report = match self.terminal.flush_offline_queue().await {
            Ok(report) => report,
            Err(e) => {
                warn!(?e, "Replay pass failed");
                ReplayReport::default()
            }
        };

        let delay = if report.remaining == 0 {
            self.backoff.reset();
            self.retry_interval
        } else {
            self.backoff.next_backoff().unwrap_or(self.retry_interval)
        };

        let mut status = self.status.write().await;
        status.attempts += 1;
        status.last_report = Some(report);
        status.next_retry = Some(delay);
        delay
    }
}

#[cfg(test)]
mod tests {
    use festive_core::SaleFilter;
    use festive_db::DbConfig;

    use super::*;
    use crate::store::testing::FlakyStore;

    struct Fixture {
        dir: tempfile::TempDir,
        db: Database,
        store: Arc<FlakyStore>,
        terminal: PosTerminal,
        led: i64,
    }

    fn config(dir: &tempfile::TempDir) -> TerminalConfig {
        let mut config = TerminalConfig::new();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        config.sync.poll_interval_secs = 1;
        config.sync.initial_backoff_ms = 20;
        config.sync.max_backoff_secs = 1;
        config
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let led = db.products().insert("Led rojo 100", 2500, Some("Leds"), 5).await.unwrap();
        db.products().insert("Venta manual", 0, Some("Manual"), 0).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FlakyStore::new(db.clone()));
        let terminal = PosTerminal::with_store(config(&dir), db.clone(), store.clone()).await.unwrap();

        Fixture { dir, db, store, terminal, led }
    }

    /// 2x Led rojo 100 + 1x Flete, paid cash.
    async fn scenario_draft(fx: &Fixture) -> String {
        let id = fx.terminal.active_draft().id;
        fx.terminal.add_item(&id, fx.led, 2).await.unwrap();
        fx.terminal.add_manual_item(&id, "Flete", Money::from_units(3000), 1).unwrap();
        id
    }

    #[tokio::test]
    async fn test_confirm_online_order() {
        let fx = fixture().await;
        let draft = scenario_draft(&fx).await;

        let totals = fx.terminal.draft_totals(&draft).unwrap();
        assert_eq!(totals.subtotal.units(), 8000);
        assert_eq!(totals.total.units(), 8000);

        let outcome = fx.terminal.confirm_order(&draft, None).await.unwrap();
        let ConfirmOutcome::Submitted(receipt) = outcome else {
            panic!("expected a submitted sale");
        };

        let sale = fx.db.sales().get_by_id(receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.total_amount, 8000);
        assert_eq!(sale.notes.as_deref(), Some("2x Led rojo 100 - 1x Flete"));
        assert_eq!(fx.db.sales().get_items(receipt.sale_id).await.unwrap().len(), 2);
        assert_eq!(fx.db.products().get_by_id(fx.led).await.unwrap().unwrap().stock, 3);
        assert!(fx.terminal.draft(&draft).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_order_is_queued_then_replayed() {
        let fx = fixture().await;
        let draft = scenario_draft(&fx).await;
        fx.store.set(&fx.store.faults.offline, true);

        let outcome = fx.terminal.confirm_order(&draft, None).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::QueuedOffline { .. }));
        assert!(outcome.message().is_some());
        assert!(fx.terminal.draft(&draft).unwrap().is_empty());
        assert_eq!(fx.db.sales().count().await.unwrap(), 0);
        assert_eq!(fx.terminal.queued_orders().await.len(), 1);

        fx.store.set(&fx.store.faults.offline, false);
        let report = fx.terminal.flush_offline_queue().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(report.message().as_deref(), Some("Se enviaron 1 pedido(s) pendientes al reconectar."));

        let sales = fx.db.sales().list(&SaleFilter::all()).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].total_amount, 8000);
        assert!(fx.terminal.queued_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_queued_order_survives_restart() {
        let fx = fixture().await;
        let draft = scenario_draft(&fx).await;
        fx.terminal.set_online(false);
        fx.terminal.confirm_order(&draft, None).await.unwrap();

        let reopened = PosTerminal::open(config(&fx.dir), fx.db.clone()).await.unwrap();
        let queued = reopened.queued_orders().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].total().units(), 8000);
    }

    #[tokio::test]
    async fn test_add_item_at_stock_limit_rejected() {
        let fx = fixture().await;
        fx.db.products().set_stock(fx.led, 3).await.unwrap();
        let draft = fx.terminal.active_draft().id;
        fx.terminal.add_item(&draft, fx.led, 3).await.unwrap();

        let err = fx.terminal.add_item(&draft, fx.led, 1).await.unwrap_err();
        assert!(matches!(err, SyncError::Draft(CoreError::InsufficientStock { .. })));
        assert_eq!(fx.terminal.draft(&draft).unwrap().items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_stock_error_keeps_draft() {
        let fx = fixture().await;
        let draft = scenario_draft(&fx).await;
        fx.db.products().set_stock(fx.led, 1).await.unwrap();

        let err = fx.terminal.confirm_order(&draft, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Submit(SubmitError::Stock { .. })));
        assert_eq!(fx.terminal.draft(&draft).unwrap().items.len(), 2);
        assert!(fx.terminal.queued_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_removes_only_successes() {
        let fx = fixture().await;
        fx.terminal.set_online(false);

        let ok = scenario_draft(&fx).await;
        fx.terminal.confirm_order(&ok, None).await.unwrap();

        let too_many = fx.terminal.create_draft();
        fx.terminal.add_item(&too_many, fx.led, 4).await.unwrap();
        fx.terminal.confirm_order(&too_many, None).await.unwrap();

        let queued = fx.terminal.queued_orders().await;
        assert_eq!(queued.len(), 2);

        // First replay takes 2 of 5 units; the second asks for 4 of 3.
        fx.terminal.set_online(true);
        let report = fx.terminal.flush_offline_queue().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);

        let remaining = fx.terminal.queued_orders().await;
        assert_eq!(remaining, vec![queued[1].clone()]);
        assert!(fx.terminal.error_log().await.iter().any(|e| e.context == CTX_OFFLINE_REPLAY));
    }

    #[tokio::test]
    async fn test_replay_stops_when_store_unreachable() {
        let fx = fixture().await;
        fx.terminal.set_online(false);
        let draft = scenario_draft(&fx).await;
        fx.terminal.confirm_order(&draft, None).await.unwrap();

        fx.store.set(&fx.store.faults.offline, true);
        fx.terminal.set_online(true);
        let report = fx.terminal.flush_offline_queue().await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        // A failing store does not override the environment's signal.
        assert!(fx.terminal.is_online());
    }

    #[tokio::test]
    async fn test_store_outage_does_not_stick() {
        let fx = fixture().await;
        let first = scenario_draft(&fx).await;
        fx.store.set(&fx.store.faults.offline, true);
        let outcome = fx.terminal.confirm_order(&first, None).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::QueuedOffline { .. }));

        let terminal = Arc::new(fx.terminal);
        let (worker, handle) = ReplayWorker::new(terminal.clone());
        tokio::spawn(worker.run());

        // Startup pass fails; a timed pass picks the order up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.store.set(&fx.store.faults.offline, false);
        for _ in 0..150 {
            if terminal.queued_orders().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(terminal.queued_orders().await.is_empty());
        assert!(terminal.is_online());

        let second = terminal.active_draft().id;
        terminal.add_item(&second, fx.led, 1).await.unwrap();
        let outcome = terminal.confirm_order(&second, None).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Submitted(_)));
        assert_eq!(fx.db.sales().count().await.unwrap(), 2);
        assert!(handle.status().await.attempts >= 2);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_orphan_header_removed_before_replay() {
        let fx = fixture().await;
        let draft = scenario_draft(&fx).await;
        fx.store.set(&fx.store.faults.drop_after_header, true);

        let outcome = fx.terminal.confirm_order(&draft, None).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::QueuedOffline { .. }));
        let queued = fx.terminal.queued_orders().await;
        let orphan = queued[0].orphan_sale_id.unwrap();
        assert_eq!(fx.db.sales().count().await.unwrap(), 1);

        fx.store.set(&fx.store.faults.drop_after_header, false);
        fx.store.set(&fx.store.faults.offline, false);
        let report = fx.terminal.flush_offline_queue().await.unwrap();
        assert_eq!(report.sent, 1);

        let sales = fx.db.sales().list(&SaleFilter::all()).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_ne!(sales[0].id, orphan);
        assert_eq!(fx.db.sales().get_items(sales[0].id).await.unwrap().len(), 2);
        assert!(fx.terminal.queued_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_orphan_from_failed_replay_is_kept_on_record() {
        let fx = fixture().await;
        fx.terminal.set_online(false);
        let draft = scenario_draft(&fx).await;
        fx.terminal.confirm_order(&draft, None).await.unwrap();
        fx.terminal.set_online(true);

        fx.store.set(&fx.store.faults.drop_after_header, true);
        let report = fx.terminal.flush_offline_queue().await.unwrap();
        assert_eq!(report.remaining, 1);
        let orphan = fx.terminal.queued_orders().await[0].orphan_sale_id;
        assert!(orphan.is_some());

        fx.store.set(&fx.store.faults.drop_after_header, false);
        fx.store.set(&fx.store.faults.offline, false);
        fx.terminal.flush_offline_queue().await.unwrap();
        let sales = fx.db.sales().list(&SaleFilter::all()).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_ne!(Some(sales[0].id), orphan);
    }

    #[tokio::test]
    async fn test_settle_pending_sale() {
        let fx = fixture().await;
        let draft = fx.terminal.active_draft().id;
        fx.terminal.add_item(&draft, fx.led, 1).await.unwrap();
        fx.terminal.set_payment_method(&draft, PaymentMethod::Pending).unwrap();

        let ConfirmOutcome::Submitted(receipt) = fx.terminal.confirm_order(&draft, None).await.unwrap() else {
            panic!("expected a submitted sale");
        };
        let sale = fx.db.sales().get_by_id(receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.notes.as_deref(), Some("PENDIENTE - 1x Led rojo 100"));

        let err = fx
            .terminal
            .mark_pending_as_paid(receipt.sale_id, PaymentMethod::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Draft(CoreError::Validation(_))));

        fx.terminal
            .mark_pending_as_paid(receipt.sale_id, PaymentMethod::Transfer, None)
            .await
            .unwrap();
        let sale = fx.db.sales().get_by_id(receipt.sale_id).await.unwrap().unwrap();
        assert_eq!(sale.payment_method, PaymentMethod::Transfer);
        assert_eq!(sale.paid_method, Some(PaymentMethod::Transfer));
        assert_eq!(sale.paid_by.as_deref(), Some(fx.terminal.config().operator()));
        assert_eq!(sale.notes.as_deref(), Some("1x Led rojo 100"));

        let again = fx
            .terminal
            .mark_pending_as_paid(receipt.sale_id, PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(matches!(again, SyncError::Database(DbError::Conflict(_))));
    }

    #[test]
    fn test_operator_note_replaces_summary() {
        let items = vec![OrderLineItem::manual("Flete", Money::from_units(3000), 1)];
        assert_eq!(
            compose_notes(&items, PaymentMethod::Cash, Some("  mesa 4 ".into())).as_deref(),
            Some("mesa 4")
        );
        assert_eq!(
            compose_notes(&items, PaymentMethod::Pending, Some("Juan".into())).as_deref(),
            Some("PENDIENTE - Juan")
        );
        assert_eq!(compose_notes(&items, PaymentMethod::Cash, Some(" ".into())).as_deref(), Some("1x Flete"));
    }

    #[tokio::test]
    async fn test_worker_replays_on_reconnect() {
        let fx = fixture().await;
        fx.terminal.set_online(false);
        let draft = scenario_draft(&fx).await;
        fx.terminal.confirm_order(&draft, None).await.unwrap();

        let terminal = Arc::new(fx.terminal);
        let (worker, handle) = ReplayWorker::new(terminal.clone());
        tokio::spawn(worker.run());

        terminal.set_online(true);
        for _ in 0..100 {
            if terminal.queued_orders().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(terminal.queued_orders().await.is_empty());
        assert_eq!(fx.db.sales().count().await.unwrap(), 1);
        let status = handle.status().await;
        assert_eq!(status.last_report.map(|r| r.sent), Some(1));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_backs_off_while_records_fail() {
        let fx = fixture().await;
        fx.terminal.set_online(false);
        let draft = fx.terminal.active_draft().id;
        fx.terminal.add_item(&draft, fx.led, 5).await.unwrap();
        fx.terminal.confirm_order(&draft, None).await.unwrap();
        // Record can never succeed now.
        fx.db.products().set_stock(fx.led, 0).await.unwrap();
        fx.terminal.set_online(true);

        let terminal = Arc::new(fx.terminal);
        let (worker, handle) = ReplayWorker::new(terminal.clone());
        tokio::spawn(worker.run());

        let mut status = handle.status().await;
        for _ in 0..100 {
            if status.attempts >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = handle.status().await;
        }

        assert!(status.attempts >= 2);
        assert_eq!(status.last_report.map(|r| r.remaining), Some(1));
        assert!(status.next_retry.is_some_and(|d| d <= Duration::from_secs(1)));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_after_shutdown_fails() {
        let fx = fixture().await;
        let (worker, handle) = ReplayWorker::new(Arc::new(fx.terminal));
        let task = tokio::spawn(worker.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.flush().await, Err(SyncError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_worker_idles_with_empty_queue() {
        let fx = fixture().await;
        let terminal = Arc::new(fx.terminal);
        let (worker, handle) = ReplayWorker::new(terminal);

        tokio::time::pause();
        tokio::spawn(worker.run());
        tokio::time::advance(Duration::from_secs(30)).await;
        handle.flush().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(handle.status().await.attempts, 0);
        handle.shutdown().await.unwrap();
    }
}
