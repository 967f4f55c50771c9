use photo_picker::{telemetry, FolderLibrary, ImagePicker, PickerConfig, PickerError};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often the folder is rescanned for changes
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Headless picker: keeps a folder of photos in sync and logs what the
/// list would show, until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), PickerError> {
    let config = PickerConfig::load()?;
    telemetry::init(&config.log_level);

    let root = library_root(&config).ok_or_else(|| {
        PickerError::InvalidConfig(
            "no library folder given; pass one as an argument or set library_root".into(),
        )
    })?;

    let library = FolderLibrary::open(root, config.include_hidden)?;
    let mut picker = ImagePicker::new(library.clone(), &config);

    let authorization = picker.setup().await;
    if !authorization.allows_reading() {
        tracing::error!(?authorization, "Cannot read the library folder");
        return Err(PickerError::AuthorizationDenied);
    }

    picker.open_picker().await;

    let stop = CancellationToken::new();
    let poller = library.spawn_polling(POLL_INTERVAL, stop.clone());
    let mut store = picker.store();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = store.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = store.borrow_and_update().clone();
                tracing::info!(
                    state = ?view.sync_state,
                    library = view.snapshot.len(),
                    thumbnails = view.materialized.len(),
                    "Picker updated"
                );
            }
        }
    }

    tracing::info!("Shutting down");
    stop.cancel();
    let _ = poller.await;
    picker.shutdown().await;

    Ok(())
}

/// Folder from the first argument, the config, or the user's pictures dir
fn library_root(config: &PickerConfig) -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.library_root.clone())
        .or_else(dirs::picture_dir)
}
