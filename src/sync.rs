/// Incremental library synchronization
///
/// The sync engine owns the asset store. It runs as a single task (the
/// owner task) that applies one [`SyncEvent`] at a time from its mailbox:
/// - the initial bulk load,
/// - library change notifications, reconciled by set difference,
/// - thumbnail completions posted back by background loads.
///
/// Every store mutation happens inside that task and is published to
/// readers as a whole [`StoreView`], so partial updates are never visible.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PickerConfig;
use crate::media::gateway::{AssetQuery, ChangeListener};
use crate::media::thumbnail::ThumbnailLoader;
use crate::state::data::{AssetId, AssetRef, DecodedImage, MaterializedAsset, Size, SyncState};
use crate::state::store::{diff, AssetStore, StoreView};

/// Work submitted to the owner task
#[derive(Debug)]
pub enum SyncEvent {
    /// Run the initial bulk load; `done` fires once the snapshot is set
    InitialLoad { done: Option<oneshot::Sender<()>> },
    /// The library reported a new authoritative order
    LibraryChanged(Vec<AssetRef>),
    /// A background thumbnail load finished (or gave up)
    ThumbnailLoaded {
        asset: AssetRef,
        ticket: u64,
        thumbnail: Option<DecodedImage>,
    },
    /// Fires once every event queued before it has been applied
    Flush(oneshot::Sender<()>),
}

/// An outstanding thumbnail load for one asset
struct InFlight {
    ticket: u64,
    cancel: CancellationToken,
}

pub struct SyncEngine {
    store: AssetStore,
    sync_state: SyncState,
    loader: Arc<ThumbnailLoader>,
    thumbnail_size: Size,
    query: AssetQuery,
    in_flight: HashMap<AssetId, InFlight>,
    next_ticket: u64,
    mailbox: mpsc::UnboundedSender<SyncEvent>,
    published: watch::Sender<StoreView>,
}

impl SyncEngine {
    /// Create an engine that posts thumbnail completions to `mailbox`
    pub fn new(
        loader: Arc<ThumbnailLoader>,
        thumbnail_size: Size,
        query: AssetQuery,
        mailbox: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        let store = AssetStore::new();
        let (published, _) = watch::channel(store.view(SyncState::Uninitialized));
        Self {
            store,
            sync_state: SyncState::Uninitialized,
            loader,
            thumbnail_size,
            query,
            in_flight: HashMap::new(),
            next_ticket: 0,
            mailbox,
            published,
        }
    }

    /// Start the owner task
    pub fn spawn(loader: Arc<ThumbnailLoader>, config: &PickerConfig) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let query = AssetQuery {
            include_hidden: config.include_hidden,
            ..AssetQuery::default()
        };
        let engine = SyncEngine::new(loader, config.thumbnail_size, query, tx.clone());
        let view = engine.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(engine.run(rx, shutdown.clone()));

        SyncHandle {
            mailbox: tx,
            view,
            shutdown,
            task: Some(task),
        }
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreView> {
        self.published.subscribe()
    }

    /// Number of thumbnail loads still outstanding
    pub fn pending_loads(&self) -> usize {
        self.in_flight.len()
    }

    async fn run(
        mut self,
        mut mailbox: mpsc::UnboundedReceiver<SyncEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = mailbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }
        self.cancel_all();
        tracing::debug!("Sync engine stopped");
    }

    /// Apply one event. Events are never interleaved with each other.
    pub async fn handle(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::InitialLoad { done } => {
                self.perform_initial_load().await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            SyncEvent::LibraryChanged(new_order) => self.on_library_changed(new_order),
            SyncEvent::ThumbnailLoaded {
                asset,
                ticket,
                thumbnail,
            } => self.on_thumbnail_loaded(asset, ticket, thumbnail),
            SyncEvent::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    /// Fetch the whole library and start a thumbnail load for every asset.
    ///
    /// Only runs from `Uninitialized`. A failed query leaves the engine
    /// uninitialized so a later open can try again.
    pub async fn perform_initial_load(&mut self) {
        if self.sync_state != SyncState::Uninitialized {
            tracing::debug!(state = ?self.sync_state, "Initial load already performed");
            return;
        }

        self.sync_state = SyncState::Loading;
        self.publish();

        let gateway = Arc::clone(self.loader.gateway());
        let assets = match gateway.query_all_assets(self.query).await {
            Ok(assets) => assets,
            Err(e) => {
                tracing::warn!(error = %e, "Library query failed");
                self.sync_state = SyncState::Uninitialized;
                self.publish();
                return;
            }
        };

        tracing::info!(count = assets.len(), "Fetched library");

        self.store.replace_snapshot(assets.clone());
        for asset in assets {
            self.request_thumbnail(asset);
        }

        self.sync_state = SyncState::Ready;
        self.publish();
    }

    /// Reconcile the store against a new library order.
    ///
    /// Removed assets lose their pending load and list entry, the snapshot
    /// is replaced, then added assets start loading. Notifications that
    /// arrive before the initial load are ignored; the initial query will
    /// see the same library.
    pub fn on_library_changed(&mut self, new_order: Vec<AssetRef>) {
        if self.sync_state != SyncState::Ready {
            tracing::debug!(state = ?self.sync_state, "Ignoring library change before initial load");
            return;
        }

        let changes = diff(self.store.snapshot(), &new_order);
        if changes.is_empty() && self.store.snapshot() == new_order.as_slice() {
            tracing::trace!("Library change without visible effect");
            return;
        }

        for asset in &changes.removed {
            if let Some(pending) = self.in_flight.remove(&asset.id) {
                pending.cancel.cancel();
            }
            self.loader.invalidate(&asset.id);
            self.store.remove_materialized(&asset.id);
        }

        self.store.replace_snapshot(new_order);

        for asset in &changes.added {
            self.request_thumbnail(asset.clone());
        }

        tracing::info!(
            added = changes.added.len(),
            removed = changes.removed.len(),
            total = self.store.snapshot().len(),
            "Library changed"
        );
        self.publish();
    }

    fn on_thumbnail_loaded(&mut self, asset: AssetRef, ticket: u64, thumbnail: Option<DecodedImage>) {
        match self.in_flight.get(&asset.id) {
            Some(pending) if pending.ticket == ticket => {
                self.in_flight.remove(&asset.id);
            }
            _ => {
                tracing::trace!(asset = %asset.id, ticket, "Dropping superseded thumbnail");
                return;
            }
        }

        let Some(thumbnail) = thumbnail else {
            return;
        };

        // The asset may have left the library while the load was running.
        if !self.store.contains(&asset.id) {
            tracing::debug!(asset = %asset.id, "Discarding thumbnail for removed asset");
            return;
        }

        if self
            .store
            .append_materialized(MaterializedAsset::new(asset, thumbnail))
        {
            self.publish();
        }
    }

    fn request_thumbnail(&mut self, asset: AssetRef) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let cancel = CancellationToken::new();

        if let Some(previous) = self.in_flight.insert(
            asset.id.clone(),
            InFlight {
                ticket,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }

        let loader = Arc::clone(&self.loader);
        let mailbox = self.mailbox.clone();
        let size = self.thumbnail_size;
        tokio::spawn(async move {
            let thumbnail = loader.load(&asset, size, &cancel).await;
            // The engine may already be gone during shutdown.
            let _ = mailbox.send(SyncEvent::ThumbnailLoaded {
                asset,
                ticket,
                thumbnail,
            });
        });
    }

    fn cancel_all(&mut self) {
        for (_, pending) in self.in_flight.drain() {
            pending.cancel.cancel();
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.store.view(self.sync_state));
    }
}

/// Handle to a running sync engine
pub struct SyncHandle {
    mailbox: mpsc::UnboundedSender<SyncEvent>,
    view: watch::Receiver<StoreView>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Queue the initial load and wait until the snapshot is in place.
    /// Thumbnails keep arriving afterwards.
    pub async fn perform_initial_load(&self) {
        let (done, finished) = oneshot::channel();
        if self
            .mailbox
            .send(SyncEvent::InitialLoad { done: Some(done) })
            .is_ok()
        {
            let _ = finished.await;
        }
    }

    /// Queue a library change notification
    pub fn library_changed(&self, new_order: Vec<AssetRef>) {
        let _ = self.mailbox.send(SyncEvent::LibraryChanged(new_order));
    }

    /// Listener to hand to the gateway; forwards notifications in arrival
    /// order into the mailbox
    pub fn change_listener(&self) -> ChangeListener {
        let mailbox = self.mailbox.clone();
        Arc::new(move |new_order: Vec<AssetRef>| {
            if mailbox.send(SyncEvent::LibraryChanged(new_order)).is_err() {
                tracing::trace!("Library change after sync engine stopped");
            }
        })
    }

    /// Wait until every event queued so far has been applied
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        if self.mailbox.send(SyncEvent::Flush(done)).is_ok() {
            let _ = finished.await;
        }
    }

    /// The latest published view
    pub fn view(&self) -> StoreView {
        self.view.borrow().clone()
    }

    pub fn sync_state(&self) -> SyncState {
        self.view.borrow().sync_state
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreView> {
        self.view.clone()
    }

    /// Wait for a view satisfying `predicate`. Returns `None` if the engine
    /// stops first.
    pub async fn wait_for(&self, predicate: impl FnMut(&StoreView) -> bool) -> Option<StoreView> {
        let mut view = self.view.clone();
        let result = view.wait_for(predicate).await;
        result.ok().map(|view| view.clone())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the owner task and cancel outstanding loads. Idempotent.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Sync engine task failed");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
