/// Shared data structures for the picker state
///
/// These structs represent the data model that flows between
/// the library gateway, the sync engine and the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Stable library identifier for one asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

/// Reference to one library item (image or video).
///
/// Equality and hashing use the library identifier only; kind and
/// timestamps are metadata carried along for ordering and preview.
#[derive(Debug, Clone)]
pub struct AssetRef {
    pub id: AssetId,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub hidden: bool,
}

impl AssetRef {
    pub fn new(id: impl Into<String>, kind: MediaKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AssetId::new(id),
            kind,
            created_at,
            hidden: false,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

impl PartialEq for AssetRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AssetRef {}

impl Hash for AssetRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Pixel dimensions of a requested or decoded image
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A decoded RGBA raster, cheap to clone
#[derive(Clone)]
pub struct DecodedImage(Arc<image::RgbaImage>);

impl DecodedImage {
    pub fn new(pixels: image::RgbaImage) -> Self {
        Self(Arc::new(pixels))
    }

    pub fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }

    pub fn pixels(&self) -> &image::RgbaImage {
        &self.0
    }

    /// Whether two handles share the same decoded buffer
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size();
        f.debug_struct("DecodedImage")
            .field("width", &size.width)
            .field("height", &size.height)
            .finish()
    }
}

/// Something a video player can open
#[derive(Debug, Clone, PartialEq)]
pub struct VideoHandle {
    pub asset: AssetId,
    pub location: PathBuf,
}

/// One entry of the on-screen list: an asset with its loaded thumbnail.
///
/// `id` is minted when the thumbnail lands and only exists for list
/// diffing in the UI. Library identity is `asset.id`.
#[derive(Debug, Clone)]
pub struct MaterializedAsset {
    pub id: Uuid,
    pub asset: AssetRef,
    pub thumbnail: DecodedImage,
}

impl MaterializedAsset {
    pub fn new(asset: AssetRef, thumbnail: DecodedImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset,
            thumbnail,
        }
    }
}

/// Photo library permission as seen by the picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthorizationState {
    #[default]
    NotDetermined,
    Denied,
    Limited,
    Approved,
}

impl AuthorizationState {
    fn rank(self) -> u8 {
        match self {
            AuthorizationState::NotDetermined => 0,
            AuthorizationState::Denied => 1,
            AuthorizationState::Limited => 2,
            AuthorizationState::Approved => 3,
        }
    }

    /// Apply a permission decision.
    ///
    /// Access may only widen, or be revoked back to `Denied`. Anything
    /// else keeps the current state.
    pub fn apply(self, next: AuthorizationState) -> AuthorizationState {
        if next == AuthorizationState::Denied || next.rank() >= self.rank() {
            next
        } else {
            self
        }
    }

    /// Whether the library may be read
    pub fn allows_reading(self) -> bool {
        matches!(
            self,
            AuthorizationState::Limited | AuthorizationState::Approved
        )
    }
}

/// Lifecycle of the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// What the preview pane shows. Only one variant can be active.
#[derive(Debug, Clone)]
pub enum PreviewPayload {
    Image(DecodedImage),
    Video(VideoHandle),
}

impl PreviewPayload {
    pub fn as_image(&self) -> Option<&DecodedImage> {
        match self {
            PreviewPayload::Image(image) => Some(image),
            PreviewPayload::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoHandle> {
        match self {
            PreviewPayload::Image(_) => None,
            PreviewPayload::Video(handle) => Some(handle),
        }
    }
}
