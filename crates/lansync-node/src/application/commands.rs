//! Presentation command handlers.
//!
//! The UI (the console in `infrastructure::ui_bridge`, or a richer shell
//! later) drives the node through these functions only:
//!
//! | Command              | Effect                                                    |
//! |----------------------|-----------------------------------------------------------|
//! | `select_files`       | Ask a [`FilePicker`] for paths and share each regular file |
//! | `remove_file`        | Stop sharing a name                                       |
//! | `save_received_file` | Ask a [`SaveDialog`] for a destination, copy, forget entry |
//! | `request_init`       | Publish and return a fresh snapshot                       |
//! | `rotate_passcode`    | Replace the passcode                                      |
//!
//! Native dialogs are hidden behind the two traits so the handlers can be
//! unit-tested with mocks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use lansync_core::{CatalogError, StateSnapshot};

use super::context::ServerContext;

// ── Dialog seams ──────────────────────────────────────────────────────────────

/// Source of paths the user wants to share.
#[cfg_attr(test, mockall::automock)]
pub trait FilePicker: Send + Sync {
    /// Returns the chosen paths; empty when the user cancels.
    fn pick_files(&self) -> Vec<PathBuf>;
}

/// Where a received file should be written.
#[cfg_attr(test, mockall::automock)]
pub trait SaveDialog: Send + Sync {
    /// `None` means the user cancelled.
    fn choose_destination(&self, suggested_name: &str) -> Option<PathBuf>;
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no received file with id {0}")]
    UnknownReceived(u64),

    #[error("could not copy received file to {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Shares every regular file the picker returns.  Returns the names that were
/// newly added; paths that are missing, are directories, or collide with an
/// existing name are skipped.
pub async fn select_files(ctx: &Arc<ServerContext>, picker: &dyn FilePicker) -> Vec<String> {
    let mut added = Vec::new();
    for path in picker.pick_files() {
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), "cannot share file: {e}");
                continue;
            }
        };
        if !metadata.is_file() {
            warn!(path = %path.display(), "not a regular file; skipped");
            continue;
        }

        match ctx.add_shared(&path, Some(metadata.len())).await {
            Ok(true) => {
                if let Some(name) = file_name(&path) {
                    info!(name = %name, "sharing file");
                    added.push(name);
                }
            }
            Ok(false) => {
                info!(path = %path.display(), "a file with this name is already shared");
            }
            Err(e) => warn!("cannot share file: {e}"),
        }
    }
    added
}

/// Stops sharing `name`.  Returns `false` if it was not shared.
pub async fn remove_file(ctx: &Arc<ServerContext>, name: &str) -> bool {
    let removed = ctx.remove_shared(name).await;
    if removed {
        info!(name, "file no longer shared");
    }
    removed
}

/// Copies received file `id` to a destination chosen by `dialog`, then drops
/// it from the received list and deletes the scratch copy.
///
/// Returns `Ok(None)` when the dialog is cancelled; nothing changes then.
pub async fn save_received_file(
    ctx: &Arc<ServerContext>,
    id: u64,
    dialog: &dyn SaveDialog,
) -> Result<Option<PathBuf>, CommandError> {
    let file = ctx
        .received(id)
        .await
        .ok_or(CommandError::UnknownReceived(id))?;

    let destination = match dialog.choose_destination(&file.name) {
        Some(d) => d,
        None => return Ok(None),
    };

    tokio::fs::copy(&file.storage_path, &destination)
        .await
        .map_err(|source| CommandError::Copy {
            path: destination.clone(),
            source,
        })?;

    ctx.take_received(id).await?;
    if let Err(e) = tokio::fs::remove_file(&file.storage_path).await {
        warn!(path = %file.storage_path.display(), "could not remove scratch file: {e}");
    }
    info!(id, destination = %destination.display(), "received file saved");
    Ok(Some(destination))
}

/// Publishes the current state and returns it, for a UI that just attached.
pub async fn request_init(ctx: &Arc<ServerContext>) -> StateSnapshot {
    ctx.publish().await;
    ctx.snapshot().await
}

pub async fn rotate_passcode(ctx: &Arc<ServerContext>) -> String {
    ctx.rotate_passcode().await
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::ContextSettings;
    use lansync_core::{AuthState, Passcode};

    fn context() -> Arc<ServerContext> {
        let auth = AuthState::with_passcode(Passcode::parse("4821").unwrap());
        ServerContext::new(ContextSettings::default(), auth, "localhost".into())
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lansync-cmd-{tag}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_select_files_shares_regular_files_only() {
        // Arrange
        let dir = temp_dir("select");
        let file = dir.join("a.txt");
        std::fs::write(&file, b"hello").unwrap();
        let missing = dir.join("missing.bin");
        let ctx = context();
        let mut picker = MockFilePicker::new();
        let paths = vec![file.clone(), dir.clone(), missing];
        picker.expect_pick_files().return_once(move || paths);

        // Act
        let added = select_files(&ctx, &picker).await;

        // Assert
        assert_eq!(added, vec!["a.txt"]);
        assert_eq!(ctx.shared_names().await, vec!["a.txt"]);
        assert_eq!(ctx.find_shared("a.txt").await.unwrap().size_bytes, Some(5));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_select_files_with_cancelled_picker_changes_nothing() {
        let ctx = context();
        let mut picker = MockFilePicker::new();
        picker.expect_pick_files().return_once(Vec::new);

        let added = select_files(&ctx, &picker).await;

        assert!(added.is_empty());
        assert!(ctx.shared_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_file_then_reselect_restores_availability() {
        let dir = temp_dir("reselect");
        let file = dir.join("b.txt");
        std::fs::write(&file, b"x").unwrap();
        let ctx = context();
        ctx.add_shared(&file, Some(1)).await.unwrap();

        assert!(remove_file(&ctx, "b.txt").await);
        assert!(!remove_file(&ctx, "b.txt").await);
        let mut picker = MockFilePicker::new();
        let again = vec![file.clone()];
        picker.expect_pick_files().return_once(move || again);
        let added = select_files(&ctx, &picker).await;

        assert_eq!(added, vec!["b.txt"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_save_received_file_copies_and_forgets_entry() {
        // Arrange
        let dir = temp_dir("save");
        let scratch = dir.join("scratch-photo.jpg");
        std::fs::write(&scratch, b"jpeg-bytes").unwrap();
        let ctx = context();
        let received = ctx
            .record_received("photo.jpg".into(), scratch.clone(), "Mobile-42".into())
            .await;
        let destination = dir.join("saved.jpg");
        let mut dialog = MockSaveDialog::new();
        let dest = destination.clone();
        dialog
            .expect_choose_destination()
            .withf(|name| name == "photo.jpg")
            .return_once(move |_| Some(dest));

        // Act
        let saved = save_received_file(&ctx, received.id, &dialog).await.unwrap();

        // Assert
        assert_eq!(saved, Some(destination.clone()));
        assert_eq!(std::fs::read(&destination).unwrap(), b"jpeg-bytes");
        assert!(!scratch.exists());
        assert!(ctx.received_files().await.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_save_received_file_cancel_is_noop() {
        let ctx = context();
        let received = ctx
            .record_received("a.txt".into(), PathBuf::from("/nonexistent/a"), "x".into())
            .await;
        let mut dialog = MockSaveDialog::new();
        dialog.expect_choose_destination().return_once(|_| None);

        let saved = save_received_file(&ctx, received.id, &dialog).await.unwrap();

        assert_eq!(saved, None);
        assert_eq!(ctx.received_files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_unknown_id_is_error() {
        let ctx = context();
        let mut dialog = MockSaveDialog::new();
        dialog.expect_choose_destination().never();

        let err = save_received_file(&ctx, 42, &dialog).await.unwrap_err();

        assert!(matches!(err, CommandError::UnknownReceived(42)));
    }

    #[tokio::test]
    async fn test_failed_copy_keeps_entry() {
        let ctx = context();
        let received = ctx
            .record_received("a.txt".into(), PathBuf::from("/nonexistent/a"), "x".into())
            .await;
        let mut dialog = MockSaveDialog::new();
        dialog
            .expect_choose_destination()
            .return_once(|_| Some(std::env::temp_dir().join("lansync-never-written")));

        let err = save_received_file(&ctx, received.id, &dialog).await.unwrap_err();

        assert!(matches!(err, CommandError::Copy { .. }));
        assert_eq!(ctx.received_files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_request_init_returns_current_state() {
        let ctx = context();
        ctx.add_shared("/srv/a.txt", None).await.unwrap();

        let snapshot = request_init(&ctx).await;

        assert_eq!(snapshot.shared_names, vec!["a.txt"]);
        assert_eq!(snapshot.passcode, "4821");
        assert_eq!(ctx.subscribe().borrow().shared_names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_rotate_passcode_changes_snapshot() {
        let ctx = context();
        let code = rotate_passcode(&ctx).await;
        assert_ne!(code, "4821");
        assert_eq!(code.len(), 4);
        assert_eq!(request_init(&ctx).await.passcode, code);
    }
}
