/// State management module
///
/// This module holds all picker state:
/// - Shared data structures (data.rs)
/// - The asset store and the library diff (store.rs)

pub mod data;
pub mod store;

pub use data::{
    AssetId, AssetRef, AuthorizationState, DecodedImage, MaterializedAsset, MediaKind,
    PreviewPayload, Size, SyncState, VideoHandle,
};
pub use store::{diff, AssetStore, LibraryDiff, StoreView};
