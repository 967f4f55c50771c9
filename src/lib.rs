/// Photo picker core
///
/// Keeps an in-memory list of library assets and their thumbnails in step
/// with a device media library:
/// - `state` holds the data model and the asset store
/// - `media` talks to the library (gateway, thumbnails, previews)
/// - `sync` reconciles the store against library change notifications
/// - `picker` is the facade a UI drives

pub mod config;
pub mod error;
pub mod media;
pub mod picker;
pub mod state;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::PickerConfig;
pub use error::PickerError;
pub use media::{FolderLibrary, LibraryGateway, PreviewController, PreviewSlot, ThumbnailLoader};
pub use picker::ImagePicker;
pub use state::{
    AssetId, AssetRef, AuthorizationState, DecodedImage, MaterializedAsset, MediaKind,
    PreviewPayload, Size, StoreView, SyncState,
};
pub use sync::{SyncEngine, SyncHandle};
