use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::gateway::{AssetQuery, ChangeListener, LibraryGateway, Subscription};
use crate::error::PickerError;
use crate::state::data::{
    AssetRef, AuthorizationState, DecodedImage, MediaKind, Size, VideoHandle,
};

/// Supported still image extensions
const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

/// Supported video extensions
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "m4v", "avi", "mkv", "webm"];

#[derive(Default)]
struct Listeners {
    next: u64,
    active: HashMap<u64, ChangeListener>,
}

/// A media library backed by a directory tree.
///
/// Asset identifiers are paths relative to the root. Change notifications
/// come from [`FolderLibrary::rescan`], either called directly or from the
/// polling task started by [`FolderLibrary::spawn_polling`].
pub struct FolderLibrary {
    me: Weak<FolderLibrary>,
    root: PathBuf,
    query: AssetQuery,
    listeners: Mutex<Listeners>,
    last_order: Mutex<Option<Vec<AssetRef>>>,
}

impl FolderLibrary {
    /// Open a library rooted at `root`. The directory must exist.
    pub fn open(root: impl Into<PathBuf>, include_hidden: bool) -> Result<Arc<Self>, PickerError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PickerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("library folder {} does not exist", root.display()),
            )));
        }

        tracing::info!(root = %root.display(), "Opened folder library");

        Ok(Arc::new_cyclic(|me| FolderLibrary {
            me: me.clone(),
            root,
            query: AssetQuery {
                include_hidden,
                ..AssetQuery::default()
            },
            listeners: Mutex::new(Listeners::default()),
            last_order: Mutex::new(None),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-scan the folder and notify subscribers if the order changed.
    /// Returns whether a notification was sent.
    pub async fn rescan(&self) -> Result<bool, PickerError> {
        let order = self.scan(self.query).await?;

        {
            let mut last = self.last_order.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_deref() == Some(order.as_slice()) {
                return Ok(false);
            }
            *last = Some(order.clone());
        }

        let listeners: Vec<ChangeListener> = self
            .lock_listeners()
            .active
            .values()
            .cloned()
            .collect();

        tracing::debug!(assets = order.len(), subscribers = listeners.len(), "Folder changed");
        for listener in listeners {
            listener(order.clone());
        }
        Ok(true)
    }

    /// Rescan every `interval` until `cancel` fires
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let library = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = library.rescan().await {
                            tracing::warn!(error = %e, "Folder rescan failed");
                        }
                    }
                }
            }
        })
    }

    async fn scan(&self, query: AssetQuery) -> Result<Vec<AssetRef>, PickerError> {
        let root = self.root.clone();
        let assets = tokio::task::spawn_blocking(move || scan_blocking(&root, query)).await??;
        Ok(assets)
    }

    fn path_of(&self, asset: &AssetRef) -> PathBuf {
        self.root.join(asset.id.as_str())
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LibraryGateway for FolderLibrary {
    async fn request_authorization(&self) -> AuthorizationState {
        match std::fs::read_dir(&self.root) {
            Ok(_) => AuthorizationState::Approved,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Library folder is not readable");
                AuthorizationState::Denied
            }
        }
    }

    async fn query_all_assets(&self, query: AssetQuery) -> Result<Vec<AssetRef>, PickerError> {
        let order = self.scan(query).await?;
        if query == self.query {
            *self.last_order.lock().unwrap_or_else(PoisonError::into_inner) = Some(order.clone());
        }
        Ok(order)
    }

    fn subscribe_to_changes(&self, on_change: ChangeListener) -> Subscription {
        let key = {
            let mut listeners = self.lock_listeners();
            let key = listeners.next;
            listeners.next += 1;
            listeners.active.insert(key, on_change);
            key
        };

        let library = self.me.clone();
        Subscription::new(move || {
            if let Some(library) = library.upgrade() {
                library.lock_listeners().active.remove(&key);
            }
        })
    }

    async fn resolve_video_handle(
        &self,
        asset: &AssetRef,
    ) -> Result<Option<VideoHandle>, PickerError> {
        let path = self.path_of(asset);
        if !asset.is_video() || !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(VideoHandle {
            asset: asset.id.clone(),
            location: path,
        }))
    }

    async fn decode_thumbnail(
        &self,
        asset: &AssetRef,
        size: Size,
    ) -> Result<Option<DecodedImage>, PickerError> {
        let path = self.path_of(asset);
        // No video decoder here; videos get a placeholder frame so they
        // still show up in the grid and can be previewed.
        if asset.is_video() {
            if !tokio::fs::try_exists(&path).await? {
                return Ok(None);
            }
            return Ok(Some(video_placeholder(size)));
        }
        let id = asset.id.to_string();
        tokio::task::spawn_blocking(move || decode_blocking(&path, &id, Some(size))).await?
    }

    async fn decode_full_resolution(
        &self,
        asset: &AssetRef,
    ) -> Result<Option<DecodedImage>, PickerError> {
        if asset.is_video() {
            return Ok(None);
        }
        let path = self.path_of(asset);
        let id = asset.id.to_string();
        tokio::task::spawn_blocking(move || decode_blocking(&path, &id, None)).await?
    }
}

/// Classify a file by extension
fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Walk the folder tree and build the sorted asset list
fn scan_blocking(root: &Path, query: AssetQuery) -> Result<Vec<AssetRef>, PickerError> {
    let files = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path());

    Ok(collect_assets(root, files, query))
}

/// Turn media files into sorted assets. Files that vanish or cannot be
/// stat'ed between the walk and this call are skipped.
fn collect_assets(
    root: &Path,
    files: impl IntoIterator<Item = PathBuf>,
    query: AssetQuery,
) -> Vec<AssetRef> {
    let mut assets = Vec::new();

    for path in files {
        let Some(kind) = media_kind(&path) else {
            continue;
        };
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        match asset_for_file(&path, relative, kind) {
            Ok(asset) => assets.push(asset),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
            }
        }
    }

    query.apply(&mut assets);
    assets
}

fn asset_for_file(path: &Path, relative: &Path, kind: MediaKind) -> std::io::Result<AssetRef> {
    // Creation time is not available everywhere; fall back to mtime.
    let metadata = std::fs::metadata(path)?;
    let created = metadata.created().or_else(|_| metadata.modified())?;

    let hidden = relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));

    let mut asset = AssetRef::new(
        relative.to_string_lossy().replace('\\', "/"),
        kind,
        DateTime::<Utc>::from(created),
    );
    asset.hidden = hidden;
    Ok(asset)
}

/// Dark tile with a light play triangle, standing in for a poster frame
fn video_placeholder(size: Size) -> DecodedImage {
    let (width, height) = (size.width.max(1), size.height.max(1));
    let background = image::Rgba([32, 32, 32, 255]);
    let glyph = image::Rgba([220, 220, 220, 255]);

    let side = width.min(height) / 3;
    let left = (width - side) / 2;
    let top = (height - side) / 2;

    let tile = image::RgbaImage::from_fn(width, height, |x, y| {
        if side == 0 || x < left || y < top || y >= top + side {
            return background;
        }
        // Triangle pointing right: narrows towards the right edge.
        let dx = x - left;
        let dy = (y - top).abs_diff(side / 2);
        if dx < side && dy * 2 <= side - dx {
            glyph
        } else {
            background
        }
    });
    DecodedImage::new(tile)
}

/// Decode an image file, downscaling to fit `target` when given.
/// A missing file is `Ok(None)`, a corrupt one is `DecodeFailed`.
fn decode_blocking(
    path: &Path,
    id: &str,
    target: Option<Size>,
) -> Result<Option<DecodedImage>, PickerError> {
    if !path.exists() {
        return Ok(None);
    }

    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) => PickerError::AssetUnreadable(format!("{id}: {io}")),
        other => PickerError::DecodeFailed {
            asset: id.to_string(),
            reason: other.to_string(),
        },
    })?;

    let img = match target {
        // Resize maintaining aspect ratio
        Some(size) => img.resize(size.width, size.height, FilterType::Lanczos3),
        None => img,
    };

    Ok(Some(DecodedImage::new(img.to_rgba8())))
}
