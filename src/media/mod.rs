/// Media access module
///
/// This module handles:
/// - The library gateway seam and its query/subscription types
/// - A folder-backed library for desktop use and tests
/// - Thumbnail loading with a bounded cache
/// - Full-size previews of a single asset

pub mod folder;
pub mod gateway;
pub mod preview;
pub mod thumbnail;

pub use folder::FolderLibrary;
pub use gateway::{AssetQuery, ChangeListener, LibraryGateway, SortOrder, Subscription};
pub use preview::{PreviewController, PreviewSlot};
pub use thumbnail::ThumbnailLoader;
