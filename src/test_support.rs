use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::PickerError;
use crate::media::gateway::{AssetQuery, ChangeListener, LibraryGateway, Subscription};
use crate::state::data::{
    AssetRef, AuthorizationState, DecodedImage, MediaKind, Size, VideoHandle,
};

/// Image asset whose creation time is fixed; tests list orders explicitly
pub fn asset(id: &str) -> AssetRef {
    AssetRef::new(id, MediaKind::Image, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
}

pub fn video(id: &str) -> AssetRef {
    AssetRef::new(id, MediaKind::Video, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
}

pub fn assets(ids: &[&str]) -> Vec<AssetRef> {
    ids.iter().map(|id| asset(id)).collect()
}

/// Upper bound for any wait in async tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Inner {
    assets: Vec<AssetRef>,
    listeners: HashMap<u64, ChangeListener>,
    next_listener: u64,
    failing: HashSet<String>,
    thumbnail_decodes: HashMap<String, usize>,
    full_decodes: HashMap<String, usize>,
    authorization: AuthorizationState,
}

/// In-memory library with scripted behavior.
///
/// Every decode or video resolve for an asset named in [`hold`] blocks until
/// [`release`] is called, which lets tests interleave notifications with
/// in-flight loads deterministically.
///
/// [`hold`]: ScriptedLibrary::hold
/// [`release`]: ScriptedLibrary::release
pub struct ScriptedLibrary {
    me: Weak<ScriptedLibrary>,
    inner: Mutex<Inner>,
    held: watch::Sender<HashSet<String>>,
    started: watch::Sender<HashMap<String, usize>>,
}

impl ScriptedLibrary {
    pub const FULL_SIZE: Size = Size {
        width: 64,
        height: 48,
    };

    pub fn new(assets: Vec<AssetRef>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            inner: Mutex::new(Inner {
                assets,
                authorization: AuthorizationState::Approved,
                ..Inner::default()
            }),
            held: watch::channel(HashSet::new()).0,
            started: watch::channel(HashMap::new()).0,
        })
    }

    pub fn set_authorization(&self, state: AuthorizationState) {
        self.inner.lock().unwrap().authorization = state;
    }

    /// Replace the library contents and notify every subscriber
    pub fn emit(&self, order: Vec<AssetRef>) {
        let listeners: Vec<ChangeListener> = {
            let mut inner = self.inner.lock().unwrap();
            inner.assets = order.clone();
            inner.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(order.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }

    pub fn hold(&self, id: &str) {
        self.held.send_modify(|held| {
            held.insert(id.to_string());
        });
    }

    pub fn release(&self, id: &str) {
        self.held.send_modify(|held| {
            held.remove(id);
        });
    }

    pub fn fail_decode(&self, id: &str) {
        self.inner.lock().unwrap().failing.insert(id.to_string());
    }

    pub fn thumbnail_decodes(&self, id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.thumbnail_decodes.get(id).copied().unwrap_or(0)
    }

    pub fn full_decodes(&self, id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.full_decodes.get(id).copied().unwrap_or(0)
    }

    /// Wait until at least one decode or resolve has started for `id`
    pub async fn wait_for_decode_started(&self, id: &str) {
        self.wait_for_decodes_started(id, 1).await;
    }

    pub async fn wait_for_decodes_started(&self, id: &str, count: usize) {
        let mut rx = self.started.subscribe();
        let started = tokio::time::timeout(
            TEST_TIMEOUT,
            rx.wait_for(|started| started.get(id).copied().unwrap_or(0) >= count),
        )
        .await
        .map(|result| result.is_ok())
        .unwrap_or(false);
        assert!(started, "decode for {id} never started");
    }

    /// Record the start of a load, report whether the asset exists, then
    /// block while the asset is held
    async fn begin(&self, id: &str) -> Result<bool, PickerError> {
        let (present, failing) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.assets.iter().any(|a| a.id.as_str() == id),
                inner.failing.contains(id),
            )
        };
        self.started.send_modify(|started| {
            *started.entry(id.to_string()).or_default() += 1;
        });

        let mut rx = self.held.subscribe();
        let _ = rx.wait_for(|held| !held.contains(id)).await;

        if failing {
            return Err(PickerError::DecodeFailed {
                asset: id.to_string(),
                reason: "scripted failure".into(),
            });
        }
        Ok(present)
    }
}

#[async_trait]
impl LibraryGateway for ScriptedLibrary {
    async fn request_authorization(&self) -> AuthorizationState {
        self.inner.lock().unwrap().authorization
    }

    async fn query_all_assets(&self, query: AssetQuery) -> Result<Vec<AssetRef>, PickerError> {
        let mut assets = self.inner.lock().unwrap().assets.clone();
        if !query.include_hidden {
            assets.retain(|a| !a.hidden);
        }
        Ok(assets)
    }

    fn subscribe_to_changes(&self, on_change: ChangeListener) -> Subscription {
        let key = {
            let mut inner = self.inner.lock().unwrap();
            let key = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.insert(key, on_change);
            key
        };
        let weak = self.me.clone();
        Subscription::new(move || {
            if let Some(library) = weak.upgrade() {
                library.inner.lock().unwrap().listeners.remove(&key);
            }
        })
    }

    async fn resolve_video_handle(
        &self,
        asset: &AssetRef,
    ) -> Result<Option<VideoHandle>, PickerError> {
        if !self.begin(asset.id.as_str()).await? || !asset.is_video() {
            return Ok(None);
        }
        Ok(Some(VideoHandle {
            asset: asset.id.clone(),
            location: PathBuf::from("/library").join(asset.id.as_str()),
        }))
    }

    async fn decode_thumbnail(
        &self,
        asset: &AssetRef,
        size: Size,
    ) -> Result<Option<DecodedImage>, PickerError> {
        {
            let mut inner = self.inner.lock().unwrap();
            *inner
                .thumbnail_decodes
                .entry(asset.id.to_string())
                .or_default() += 1;
        }
        if !self.begin(asset.id.as_str()).await? {
            return Ok(None);
        }
        Ok(Some(DecodedImage::new(image::RgbaImage::new(
            size.width,
            size.height,
        ))))
    }

    async fn decode_full_resolution(
        &self,
        asset: &AssetRef,
    ) -> Result<Option<DecodedImage>, PickerError> {
        {
            let mut inner = self.inner.lock().unwrap();
            *inner.full_decodes.entry(asset.id.to_string()).or_default() += 1;
        }
        if !self.begin(asset.id.as_str()).await? {
            return Ok(None);
        }
        Ok(Some(DecodedImage::new(image::RgbaImage::new(
            Self::FULL_SIZE.width,
            Self::FULL_SIZE.height,
        ))))
    }
}
