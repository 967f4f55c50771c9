use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::PickerConfig;
use crate::media::gateway::{LibraryGateway, Subscription};
use crate::media::preview::{PreviewController, PreviewSlot};
use crate::media::thumbnail::ThumbnailLoader;
use crate::state::data::{AuthorizationState, SyncState};
use crate::state::store::StoreView;
use crate::sync::{SyncEngine, SyncHandle};

/// The surface the picker UI talks to.
///
/// Wires a library gateway to the sync engine, the thumbnail loader and
/// the preview controller, and tracks permission and picker visibility.
/// Must be created inside a tokio runtime.
pub struct ImagePicker {
    gateway: Arc<dyn LibraryGateway>,
    sync: SyncHandle,
    preview: PreviewController,
    authorization: watch::Sender<AuthorizationState>,
    subscription: Mutex<Option<Subscription>>,
    visible: AtomicBool,
}

impl ImagePicker {
    pub fn new(gateway: Arc<dyn LibraryGateway>, config: &PickerConfig) -> Self {
        let loader = Arc::new(ThumbnailLoader::from_config(Arc::clone(&gateway), config));
        let sync = SyncEngine::spawn(Arc::clone(&loader), config);
        let preview = PreviewController::new(loader);
        let (authorization, _) = watch::channel(AuthorizationState::NotDetermined);

        Self {
            gateway,
            sync,
            preview,
            authorization,
            subscription: Mutex::new(None),
            visible: AtomicBool::new(false),
        }
    }

    /// Ask for library access and start listening for changes.
    ///
    /// An undecided answer is treated as a denial. Revoked access drops the
    /// change subscription.
    pub async fn setup(&self) -> AuthorizationState {
        let answer = match self.gateway.request_authorization().await {
            AuthorizationState::NotDetermined => AuthorizationState::Denied,
            other => other,
        };

        self.authorization
            .send_modify(|current| *current = current.apply(answer));
        let state = self.authorization();
        tracing::info!(?state, "Library authorization");

        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.allows_reading() {
            if subscription.is_none() {
                *subscription = Some(
                    self.gateway
                        .subscribe_to_changes(self.sync.change_listener()),
                );
            }
        } else if let Some(mut active) = subscription.take() {
            active.unsubscribe();
        }

        state
    }

    /// Show or hide the picker, loading the library the first time it opens.
    /// Returns the new visibility.
    pub async fn open_picker(&self) -> bool {
        if self.sync.sync_state() == SyncState::Uninitialized {
            if self.authorization().allows_reading() {
                self.sync.perform_initial_load().await;
            } else {
                tracing::debug!("Library not readable, skipping initial load");
            }
        }

        let visible = !self.visible.fetch_xor(true, Ordering::SeqCst);
        tracing::debug!(visible, "Toggled picker");
        visible
    }

    pub fn is_picker_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn authorization(&self) -> AuthorizationState {
        *self.authorization.borrow()
    }

    /// Live view of the library snapshot and the thumbnail list
    pub fn store(&self) -> watch::Receiver<StoreView> {
        self.sync.subscribe()
    }

    pub fn view(&self) -> StoreView {
        self.sync.view()
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Live view of the preview pane
    pub fn preview(&self) -> watch::Receiver<PreviewSlot> {
        self.preview.subscribe()
    }

    /// Open the preview for the list entry at `index`.
    /// Returns None if the index is out of range.
    pub fn select(&self, index: usize) -> Option<JoinHandle<bool>> {
        let asset = self.sync.view().asset_at(index).cloned()?;
        Some(self.preview.open(asset))
    }

    pub fn dismiss_preview(&self) {
        self.preview.close();
    }

    /// Unsubscribe from the library and stop the sync engine. Idempotent.
    pub async fn shutdown(&mut self) {
        let subscription = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
        }
        self.preview.close();
        self.sync.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assets, video, ScriptedLibrary, TEST_TIMEOUT};
    use tokio::time::timeout;

    fn picker(library: &Arc<ScriptedLibrary>) -> ImagePicker {
        ImagePicker::new(library.clone(), &PickerConfig::default())
    }

    async fn wait_for_list(picker: &ImagePicker, len: usize) -> StoreView {
        timeout(TEST_TIMEOUT, picker.sync().wait_for(|v| v.materialized.len() == len))
            .await
            .expect("timed out waiting for thumbnails")
            .expect("sync engine stopped")
    }

    #[tokio::test]
    async fn test_setup_approved_subscribes() {
        let library = ScriptedLibrary::new(assets(&["A"]));
        let picker = picker(&library);
        assert_eq!(picker.authorization(), AuthorizationState::NotDetermined);

        assert_eq!(picker.setup().await, AuthorizationState::Approved);
        assert_eq!(library.listener_count(), 1);

        picker.setup().await;
        assert_eq!(library.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_undecided_is_surfaced_as_denied() {
        let library = ScriptedLibrary::new(assets(&["A"]));
        library.set_authorization(AuthorizationState::NotDetermined);
        let picker = picker(&library);

        assert_eq!(picker.setup().await, AuthorizationState::Denied);
        assert_eq!(library.listener_count(), 0);

        assert!(picker.open_picker().await);
        assert_eq!(picker.view().sync_state, SyncState::Uninitialized);
    }

    #[tokio::test]
    async fn test_revocation_unsubscribes() {
        let library = ScriptedLibrary::new(assets(&["A"]));
        let picker = picker(&library);
        picker.setup().await;

        library.set_authorization(AuthorizationState::Denied);
        assert_eq!(picker.setup().await, AuthorizationState::Denied);
        assert_eq!(library.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_open_picker_loads_once_and_toggles() {
        let library = ScriptedLibrary::new(assets(&["A", "B"]));
        let picker = picker(&library);
        picker.setup().await;

        assert!(picker.open_picker().await);
        assert!(picker.is_picker_visible());
        wait_for_list(&picker, 2).await;

        assert!(!picker.open_picker().await);
        assert!(picker.open_picker().await);
        assert_eq!(library.thumbnail_decodes("A"), 1);
    }

    #[tokio::test]
    async fn test_library_changes_flow_into_the_list() {
        let library = ScriptedLibrary::new(assets(&["A", "B", "C"]));
        let picker = picker(&library);
        picker.setup().await;
        picker.open_picker().await;
        wait_for_list(&picker, 3).await;

        library.emit(assets(&["D", "A", "C"]));
        let view = timeout(
            TEST_TIMEOUT,
            picker.sync().wait_for(|v| v.materialized_ids().contains(&"D")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(view.snapshot_ids(), vec!["D", "A", "C"]);
        assert!(!view.materialized_ids().contains(&"B"));
    }

    #[tokio::test]
    async fn test_select_opens_preview() {
        let mut order = assets(&["A"]);
        order.push(video("clip"));
        let library = ScriptedLibrary::new(order);
        let picker = picker(&library);
        picker.setup().await;
        picker.open_picker().await;

        // The scripted library decodes a poster frame for videos.
        let view = wait_for_list(&picker, 2).await;
        let clip_index = view
            .materialized
            .iter()
            .position(|m| m.asset.is_video())
            .unwrap();

        assert!(picker.select(clip_index).unwrap().await.unwrap());
        let slot = picker.preview().borrow().clone();
        assert!(slot.payload.as_ref().and_then(|p| p.as_video()).is_some());

        picker.dismiss_preview();
        assert!(picker.preview().borrow().is_empty());
        assert!(picker.select(99).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let library = ScriptedLibrary::new(assets(&["A"]));
        let mut picker = picker(&library);
        picker.setup().await;

        picker.shutdown().await;
        picker.shutdown().await;

        assert_eq!(library.listener_count(), 0);
        assert!(!picker.sync().is_running());
    }

    #[tokio::test]
    async fn test_folder_library_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png"] {
            image::RgbaImage::new(8, 8).save(dir.path().join(name)).unwrap();
        }

        let library = crate::media::FolderLibrary::open(dir.path(), false).unwrap();
        let picker = ImagePicker::new(library.clone(), &PickerConfig::default());
        assert_eq!(picker.setup().await, AuthorizationState::Approved);
        picker.open_picker().await;
        wait_for_list(&picker, 2).await;

        image::RgbaImage::new(8, 8)
            .save(dir.path().join("c.png"))
            .unwrap();
        std::fs::remove_file(dir.path().join("a.png")).unwrap();
        assert!(library.rescan().await.unwrap());

        let view = timeout(
            TEST_TIMEOUT,
            picker.sync().wait_for(|v| {
                let mut ids = v.materialized_ids();
                ids.sort();
                ids == vec!["b.png", "c.png"]
            }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(view.snapshot.len(), 2);
        assert!(view.is_consistent());
    }

    #[tokio::test]
    async fn test_folder_video_is_selectable() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbaImage::new(8, 8).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"mp4").unwrap();

        let library = crate::media::FolderLibrary::open(dir.path(), false).unwrap();
        let picker = ImagePicker::new(library.clone(), &PickerConfig::default());
        picker.setup().await;
        picker.open_picker().await;

        let view = wait_for_list(&picker, 2).await;
        let clip_index = view
            .materialized
            .iter()
            .position(|m| m.asset.is_video())
            .unwrap();

        assert!(picker.select(clip_index).unwrap().await.unwrap());
        let slot = picker.preview().borrow().clone();
        let handle = slot.payload.as_ref().and_then(|p| p.as_video()).unwrap();
        assert_eq!(handle.location, dir.path().join("clip.mp4"));
    }
}
