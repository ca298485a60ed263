//! Sync engine: local mutations, push-triggered fetch cycles, and views.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{watch, Mutex, MutexGuard};

use crate::codec::{self, HAZARD_RECORD_TYPE};
use crate::config::EngineConfig;
use crate::db::ChangeTokenStore;
use crate::error::{Error, Result};
use crate::models::{
    ChangeEvent, ChangeOrigin, ChangeReason, HazardReport, RecordChange, RecordId, RemoteRecord,
};
use crate::remote::{QuerySubscription, RemoteStore};
use crate::state::SyncState;

use super::broadcaster::{ChangeBroadcaster, Subscription};
use super::fetcher::DeltaFetcher;
use super::reconciler::{LocalCollection, Reconciler, ViewSource, ViewSpec};
use super::view::LiveView;

/// Outcome of one or more coalesced sync cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub cycles: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Whether the latest cycle's token reached storage
    pub token_persisted: bool,
}

impl SyncSummary {
    pub const fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    fn absorb(&mut self, cycle: Self) {
        self.cycles += cycle.cycles;
        self.created += cycle.created;
        self.updated += cycle.updated;
        self.deleted += cycle.deleted;
        self.token_persisted = cycle.token_persisted;
    }
}

/// Owns the change channel and drives every sync operation against one store.
///
/// Views obtained from [`open_view`](Self::open_view) stay current as long as
/// they keep applying what the channel delivers; [`shutdown`](Self::shutdown)
/// tears every subscription down.
pub struct SyncEngine<S, T> {
    store: S,
    token_store: T,
    fetcher: DeltaFetcher,
    broadcaster: ChangeBroadcaster,
    config: EngineConfig,
    cycle_lock: Mutex<()>,
    push_pending: AtomicBool,
    state_tx: watch::Sender<SyncState>,
}

impl<S: RemoteStore, T: ChangeTokenStore> SyncEngine<S, T> {
    pub fn new(store: S, token_store: T, config: EngineConfig) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            token_store,
            fetcher: DeltaFetcher::new(HAZARD_RECORD_TYPE),
            broadcaster: ChangeBroadcaster::new(),
            config,
            cycle_lock: Mutex::new(()),
            push_pending: AtomicBool::new(false),
            state_tx,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn token_store(&self) -> &T {
        &self.token_store
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn broadcaster(&self) -> &ChangeBroadcaster {
        &self.broadcaster
    }

    /// Raw handle on the change channel.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe()
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Register the standing push subscription for every report change.
    ///
    /// Failure is logged and reported as `false`; pulling with
    /// [`sync_remote_changes`](Self::sync_remote_changes) still works.
    pub async fn register_push_subscription(&self) -> bool {
        let subscription =
            QuerySubscription::all_changes(self.config.subscription_id.clone(), HAZARD_RECORD_TYPE);
        match self.store.subscribe(&subscription).await {
            Ok(()) => {
                tracing::info!(
                    "Registered push subscription '{}'",
                    subscription.subscription_id
                );
                true
            }
            Err(error) => {
                tracing::warn!("Push subscription registration failed: {error}");
                false
            }
        }
    }

    /// Save a new report and announce it.
    ///
    /// An [`Error::Decode`] here means the store accepted the record but
    /// returned something unreadable. The save is committed and announced, so
    /// retrying would create a second record.
    pub async fn create_report(&self, report: &HazardReport) -> Result<HazardReport> {
        if report.is_saved() {
            return Err(Error::InvalidInput(
                "report is already saved; update it instead".to_string(),
            ));
        }
        let saved = self.save_record(report).await?;
        tracing::info!("Created report {}", saved.display_id());
        self.finish_save(saved, RecordChange::Created)
    }

    /// Save edits to an existing report and announce them.
    ///
    /// A stale report fails with [`Error::VersionConflict`]; fetch the
    /// current version, reapply the edit, and save again. An
    /// [`Error::Decode`] means the update was committed and announced anyway.
    pub async fn update_report(&self, report: &HazardReport) -> Result<HazardReport> {
        if !report.is_saved() {
            return Err(Error::InvalidInput(
                "report has not been saved yet".to_string(),
            ));
        }
        let saved = self.save_record(report).await.inspect_err(|error| {
            if let Error::VersionConflict { record_id, .. } = error {
                tracing::warn!("Report {record_id} changed remotely; refetch before saving");
            }
        })?;
        tracing::info!("Updated report {}", saved.display_id());
        self.finish_save(saved, RecordChange::Updated)
    }

    /// Mark a report resolved.
    pub async fn resolve_report(&self, report: &HazardReport) -> Result<HazardReport> {
        let mut resolved = report.clone();
        resolved.is_resolved = true;
        self.update_report(&resolved).await
    }

    pub async fn delete_report(&self, report: &HazardReport) -> Result<RecordId> {
        let record_id = report
            .record_id()
            .ok_or_else(|| Error::InvalidInput("report has not been saved yet".to_string()))?;
        self.delete_record(&record_id).await
    }

    /// Delete a record and announce it.
    pub async fn delete_record(&self, record_id: &RecordId) -> Result<RecordId> {
        let deleted = self.store.delete(record_id).await?;
        tracing::info!("Deleted report {deleted}");
        self.broadcaster
            .publish(&ChangeEvent::local(RecordChange::Deleted(deleted.clone())));
        Ok(deleted)
    }

    /// Fetch one report by identity.
    pub async fn fetch_report(&self, record_id: &RecordId) -> Result<HazardReport> {
        let mut records = self.store.fetch_records(std::slice::from_ref(record_id)).await?;
        let record = records
            .remove(record_id)
            .ok_or_else(|| Error::NotFound(record_id.to_string()))?;
        if record.record_type != HAZARD_RECORD_TYPE {
            return Err(Error::RecordTypeMismatch {
                expected: HAZARD_RECORD_TYPE.to_string(),
                found: record.record_type,
            });
        }
        codec::from_remote(&record)
    }

    /// One-shot load of a view's contents, filtered and ordered.
    pub async fn query_reports(&self, spec: &ViewSpec) -> Result<Vec<HazardReport>> {
        let records = self.load_records(spec).await?;
        let changes: Vec<_> = records.into_iter().map(RecordChange::Created).collect();
        let mut collection = LocalCollection::new();
        Reconciler::new(spec.clone()).apply(&changes, &mut collection);
        Ok(collection.iter().cloned().collect())
    }

    /// Open a view populated from the store and subscribed to later changes.
    ///
    /// The subscription starts before the initial load, so nothing published
    /// while the load is in flight is missed.
    pub async fn open_view(&self, spec: ViewSpec) -> Result<LiveView> {
        let subscription = self.broadcaster.subscribe();
        let records = self.load_records(&spec).await?;
        let mut view = LiveView::new(spec, subscription);
        let loaded = view.populate(&records);
        tracing::debug!(
            "Opened view '{}' with {} report(s)",
            view.spec().name(),
            loaded.inserted
        );
        Ok(view)
    }

    /// Run one sync cycle now, waiting for any cycle already in flight.
    ///
    /// Pushes that arrive while this cycle runs are answered before it
    /// returns, and their cycles are counted in the summary.
    pub async fn sync_remote_changes(&self) -> Result<SyncSummary> {
        let guard = self.cycle_lock.lock().await;
        // The manual cycle also answers every push seen so far.
        self.push_pending.store(true, Ordering::SeqCst);
        Ok(self.drain_pushes(guard).await?.unwrap_or_default())
    }

    /// React to a push notification.
    ///
    /// Pushes arriving while a cycle is in flight are folded into one
    /// follow-up cycle run by whichever caller holds the cycle; those callers
    /// get `Ok(None)`.
    pub async fn handle_push(&self) -> Result<Option<SyncSummary>> {
        self.push_pending.store(true, Ordering::SeqCst);
        let Ok(guard) = self.cycle_lock.try_lock() else {
            tracing::debug!("Sync cycle in flight; push coalesced");
            return Ok(None);
        };
        self.drain_pushes(guard).await
    }

    /// Close the change channel. Open views drain what they have and stop.
    pub fn shutdown(&self) {
        self.broadcaster.close();
        self.state_tx.send_replace(SyncState::Idle);
        tracing::info!("Sync engine shut down");
    }

    /// Run cycles until no push is pending, starting with the cycle lock held.
    ///
    /// A failed cycle does not end the loop while pushes are still pending;
    /// the error is returned only when the last cycle run failed.
    async fn drain_pushes(&self, mut guard: MutexGuard<'_, ()>) -> Result<Option<SyncSummary>> {
        let mut total: Option<SyncSummary> = None;
        let mut last_error = None;

        loop {
            while self.push_pending.swap(false, Ordering::SeqCst) {
                match self.run_cycle().await {
                    Ok(summary) => {
                        total.get_or_insert_with(SyncSummary::default).absorb(summary);
                        last_error = None;
                    }
                    Err(error) => last_error = Some(error),
                }
            }
            drop(guard);

            // A push may have landed between the last swap and the unlock.
            if !self.push_pending.load(Ordering::SeqCst) {
                break;
            }
            match self.cycle_lock.try_lock() {
                Ok(next) => guard = next,
                // The current holder drains the pending push before unlocking.
                Err(_) => break,
            }
        }

        last_error.map_or(Ok(total), Err)
    }

    async fn run_cycle(&self) -> Result<SyncSummary> {
        self.state_tx.send_replace(SyncState::Syncing);
        let token = self.token_store.load();

        let fetched = match self.fetcher.fetch(&self.store, token.as_ref()).await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!("Sync cycle failed; token left unchanged: {error}");
                self.state_tx.send_replace(SyncState::Error);
                return Err(error);
            }
        };

        let mut summary = SyncSummary {
            cycles: 1,
            ..SyncSummary::default()
        };
        for change in &fetched.changes {
            match change.reason() {
                ChangeReason::Created => summary.created += 1,
                ChangeReason::Updated => summary.updated += 1,
                ChangeReason::Deleted => summary.deleted += 1,
            }
        }

        self.broadcaster
            .publish_batch(ChangeOrigin::Remote, fetched.changes);

        summary.token_persisted = match self.token_store.save(Some(&fetched.token)) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!("Change token not persisted; next cycle may redeliver: {error}");
                false
            }
        };

        self.state_tx.send_replace(SyncState::Synced);
        tracing::info!(
            "Sync cycle delivered {} change(s)",
            summary.total_changes()
        );
        Ok(summary)
    }

    async fn save_record(&self, report: &HazardReport) -> Result<RemoteRecord> {
        let staged = codec::to_remote(report, &self.config.staging_dir())?;
        let saved = self.store.save(staged.record()).await;
        drop(staged);
        saved
    }

    fn finish_save(
        &self,
        saved: RemoteRecord,
        change: fn(RemoteRecord) -> RecordChange,
    ) -> Result<HazardReport> {
        let report = codec::from_remote(&saved).inspect_err(|error| {
            tracing::warn!(
                "Saved record {} is committed but unreadable: {error}",
                saved.display_id()
            );
        });
        self.broadcaster.publish(&ChangeEvent::local(change(saved)));
        report
    }

    async fn load_records(&self, spec: &ViewSpec) -> Result<Vec<RemoteRecord>> {
        match spec.source() {
            ViewSource::Query(query) => self.store.query(query).await,
            ViewSource::Record(record_id) => Ok(self
                .store
                .fetch_records(std::slice::from_ref(record_id))
                .await?
                .into_values()
                .collect()),
        }
    }
}
