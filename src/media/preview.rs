/// Preview of a single selected asset
/// Resolves a still image at full resolution or a playable video handle
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::thumbnail::ThumbnailLoader;
use crate::error::PickerError;
use crate::state::data::{AssetId, AssetRef, MediaKind, PreviewPayload};

/// What the preview pane currently shows
#[derive(Debug, Clone, Default)]
pub struct PreviewSlot {
    /// Whether the preview pane is open
    pub visible: bool,
    /// Asset the pane was opened for
    pub asset: Option<AssetId>,
    /// Loaded content; None while loading or after close
    pub payload: Option<PreviewPayload>,
    /// Bumped by every open and close; completions from older
    /// generations are dropped
    generation: u64,
}

impl PreviewSlot {
    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }
}

/// Opens and closes the preview for one asset at a time.
///
/// A new `open` supersedes the previous one: its load is cancelled and, if
/// it still finishes, its result is discarded.
pub struct PreviewController {
    loader: Arc<ThumbnailLoader>,
    slot: Arc<watch::Sender<PreviewSlot>>,
    pending: Mutex<Option<CancellationToken>>,
}

impl PreviewController {
    pub fn new(loader: Arc<ThumbnailLoader>) -> Self {
        let (slot, _) = watch::channel(PreviewSlot::default());
        Self {
            loader,
            slot: Arc::new(slot),
            pending: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewSlot> {
        self.slot.subscribe()
    }

    pub fn current(&self) -> PreviewSlot {
        self.slot.borrow().clone()
    }

    /// Start loading the preview for `asset`.
    ///
    /// The returned task resolves to whether its payload was applied.
    pub fn open(&self, asset: AssetRef) -> JoinHandle<bool> {
        let cancel = CancellationToken::new();
        let mut generation = 0;

        // The token swap and the generation bump must not interleave with
        // another open or close.
        {
            let mut pending = self.lock_pending();
            if let Some(previous) = pending.replace(cancel.clone()) {
                previous.cancel();
            }
            self.slot.send_modify(|slot| {
                slot.generation += 1;
                generation = slot.generation;
                slot.visible = true;
                slot.asset = Some(asset.id.clone());
                slot.payload = None;
            });
        }

        tracing::debug!(asset = %asset.id, kind = ?asset.kind, "Opening preview");

        let loader = Arc::clone(&self.loader);
        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            let Some(payload) = resolve_payload(&loader, &asset, &cancel).await else {
                return false;
            };

            let applied = slot.send_if_modified(|current| {
                if current.generation != generation {
                    return false;
                }
                current.payload = Some(payload);
                true
            });
            if !applied {
                tracing::trace!(asset = %asset.id, "Dropping superseded preview");
            }
            applied
        })
    }

    /// Clear the preview. Idempotent.
    pub fn close(&self) {
        let mut pending = self.lock_pending();
        if let Some(previous) = pending.take() {
            previous.cancel();
        }
        self.slot.send_if_modified(|slot| {
            if !slot.visible && slot.payload.is_none() && slot.asset.is_none() {
                return false;
            }
            slot.generation += 1;
            slot.visible = false;
            slot.asset = None;
            slot.payload = None;
            true
        });
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn resolve_payload(
    loader: &ThumbnailLoader,
    asset: &AssetRef,
    cancel: &CancellationToken,
) -> Option<PreviewPayload> {
    match asset.kind {
        MediaKind::Image => loader
            .load_full_resolution(asset, cancel)
            .await
            .map(PreviewPayload::Image),
        MediaKind::Video => {
            let resolved = tokio::select! {
                _ = cancel.cancelled() => Err(PickerError::Cancelled),
                handle = loader.gateway().resolve_video_handle(asset) => handle,
            };
            match resolved {
                Ok(Some(handle)) => Some(PreviewPayload::Video(handle)),
                Ok(None) => {
                    tracing::warn!(asset = %asset.id, "Video is no longer available");
                    None
                }
                Err(e) if e.is_silent() => None,
                Err(e) => {
                    tracing::warn!(asset = %asset.id, error = %e, "Failed to resolve video");
                    None
                }
            }
        }
    }
}
