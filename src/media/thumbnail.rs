use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::gateway::LibraryGateway;
use crate::config::PickerConfig;
use crate::error::PickerError;
use crate::state::data::{AssetId, AssetRef, DecodedImage, Size};

type CacheKey = (AssetId, Size);

/// Produces decoded thumbnails and full-resolution images for assets.
///
/// Thumbnail decodes share a bounded pool of permits so a large library
/// cannot flood the gateway, and recent results are kept in a small LRU
/// cache keyed by `(asset, size)`. The cache is advisory: the asset store
/// decides what is on screen, not this loader.
pub struct ThumbnailLoader {
    gateway: Arc<dyn LibraryGateway>,
    cache: Mutex<LruCache<CacheKey, DecodedImage>>,
    permits: Semaphore,
}

impl ThumbnailLoader {
    pub fn new(
        gateway: Arc<dyn LibraryGateway>,
        cache_capacity: usize,
        max_concurrent_loads: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            gateway,
            cache: Mutex::new(LruCache::new(capacity)),
            permits: Semaphore::new(max_concurrent_loads.max(1)),
        }
    }

    pub fn from_config(gateway: Arc<dyn LibraryGateway>, config: &PickerConfig) -> Self {
        Self::new(
            gateway,
            config.thumbnail_cache_capacity,
            config.max_concurrent_loads,
        )
    }

    pub fn gateway(&self) -> &Arc<dyn LibraryGateway> {
        &self.gateway
    }

    /// Load a downscaled thumbnail.
    ///
    /// Resolves to `None` if the asset is gone, unreadable, or the token is
    /// cancelled first. Failures are logged here and never retried.
    pub async fn load(
        &self,
        asset: &AssetRef,
        size: Size,
        cancel: &CancellationToken,
    ) -> Option<DecodedImage> {
        match self.fetch_thumbnail(asset, size, cancel).await {
            Ok(image) => Some(image),
            Err(e) => {
                report_failure(asset, &e, "thumbnail");
                None
            }
        }
    }

    /// Load an asset at native resolution for the preview pane.
    ///
    /// Full-size images bypass the cache and the thumbnail pool so list
    /// memory stays bounded and a preview never queues behind the grid.
    pub async fn load_full_resolution(
        &self,
        asset: &AssetRef,
        cancel: &CancellationToken,
    ) -> Option<DecodedImage> {
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(PickerError::Cancelled),
            decoded = self.gateway.decode_full_resolution(asset) => decoded,
        };

        match result.and_then(|image| image.ok_or_else(|| unreadable(asset))) {
            Ok(image) => {
                let size = image.size();
                tracing::debug!(asset = %asset.id, width = size.width, height = size.height, "Loaded full resolution image");
                Some(image)
            }
            Err(e) => {
                report_failure(asset, &e, "full resolution image");
                None
            }
        }
    }

    /// Return a cached thumbnail without touching the gateway
    pub fn cached(&self, id: &AssetId, size: Size) -> Option<DecodedImage> {
        self.lock_cache().get(&(id.clone(), size)).cloned()
    }

    /// Drop every cached size for an asset
    pub fn invalidate(&self, id: &AssetId) {
        let mut cache = self.lock_cache();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|((cached_id, _), _)| cached_id == id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    async fn fetch_thumbnail(
        &self,
        asset: &AssetRef,
        size: Size,
        cancel: &CancellationToken,
    ) -> Result<DecodedImage, PickerError> {
        if let Some(hit) = self.cached(&asset.id, size) {
            tracing::trace!(asset = %asset.id, "Thumbnail cache hit");
            return Ok(hit);
        }

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(PickerError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| PickerError::Cancelled)?,
        };

        let decoded = tokio::select! {
            _ = cancel.cancelled() => return Err(PickerError::Cancelled),
            decoded = self.gateway.decode_thumbnail(asset, size) => decoded?,
        };
        let image = decoded.ok_or_else(|| unreadable(asset))?;

        // Checked under the cache lock: a load cancelled before `invalidate`
        // must not repopulate the entry afterwards.
        let mut cache = self.lock_cache();
        if cancel.is_cancelled() {
            return Err(PickerError::Cancelled);
        }
        cache.put((asset.id.clone(), size), image.clone());
        Ok(image)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, DecodedImage>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unreadable(asset: &AssetRef) -> PickerError {
    PickerError::AssetUnreadable(asset.id.to_string())
}

fn report_failure(asset: &AssetRef, error: &PickerError, what: &str) {
    if error.is_silent() {
        tracing::trace!(asset = %asset.id, "Cancelled {what} load");
    } else {
        tracing::warn!(asset = %asset.id, error = %error, "Skipping {what}");
    }
}
