/// The device media library as seen by the picker core.
///
/// Implementations wrap whatever the platform provides (a photo framework,
/// a folder on disk, a scripted fake in tests). The core only ever talks to
/// the library through this trait.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::PickerError;
use crate::state::data::{AssetRef, AuthorizationState, DecodedImage, Size, VideoHandle};

/// Ordering requested from a bulk query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    CreationDateDescending,
    CreationDateAscending,
}

/// Parameters of a bulk query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetQuery {
    pub sort: SortOrder,
    pub include_hidden: bool,
}

impl Default for AssetQuery {
    fn default() -> Self {
        Self {
            sort: SortOrder::CreationDateDescending,
            include_hidden: false,
        }
    }
}

impl AssetQuery {
    /// Sort and filter a result set in place according to this query.
    /// Ties on the creation date are broken by identifier so the order is
    /// stable across rescans.
    pub fn apply(&self, assets: &mut Vec<AssetRef>) {
        if !self.include_hidden {
            assets.retain(|asset| !asset.hidden);
        }
        match self.sort {
            SortOrder::CreationDateDescending => assets.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SortOrder::CreationDateAscending => assets.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

/// Callback invoked with the full new library order after a change
pub type ChangeListener = Arc<dyn Fn(Vec<AssetRef>) + Send + Sync>;

/// Owned handle for a change subscription.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Stop receiving notifications. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Access to the device media library.
///
/// Decode and resolve calls return `Ok(None)` when the asset is gone;
/// `Err` is reserved for assets that exist but cannot be read or decoded.
#[async_trait]
pub trait LibraryGateway: Send + Sync {
    async fn request_authorization(&self) -> AuthorizationState;

    async fn query_all_assets(&self, query: AssetQuery) -> Result<Vec<AssetRef>, PickerError>;

    fn subscribe_to_changes(&self, on_change: ChangeListener) -> Subscription;

    async fn resolve_video_handle(
        &self,
        asset: &AssetRef,
    ) -> Result<Option<VideoHandle>, PickerError>;

    async fn decode_thumbnail(
        &self,
        asset: &AssetRef,
        size: Size,
    ) -> Result<Option<DecodedImage>, PickerError>;

    async fn decode_full_resolution(
        &self,
        asset: &AssetRef,
    ) -> Result<Option<DecodedImage>, PickerError>;
}
