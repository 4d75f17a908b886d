//! The file catalog: what this node shares and what it has received.
//!
//! Two lists with different rules live here:
//!
//! - **Shared files** are picked by the local user.  Peers see only their
//!   base names, and names are unique: adding a second file called
//!   `report.pdf` is silently ignored (the first one wins).
//! - **Received files** arrive through uploads.  Duplicated names are fine;
//!   every entry gets its own id, and the list is append-only until the user
//!   saves an entry somewhere permanent.
//!
//! The catalog never touches the disk.  A shared entry whose file has been
//! deleted behind our back stays listed; the download path discovers that
//! lazily when it opens the file.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Errors produced by catalog operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The path has no final component to use as a name (e.g. `/` or `..`).
    #[error("path {0:?} has no file name")]
    NoFileName(PathBuf),

    /// No received file carries this id.
    #[error("no received file with id {0}")]
    UnknownReceived(u64),
}

/// A file the local user offers for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    /// Base name; the lookup key exposed to peers.
    pub name: String,
    /// Where the bytes live.  Never sent to peers.
    pub absolute_path: PathBuf,
    /// Size at the time the file was picked, when the caller knew it.
    pub size_bytes: Option<u64>,
}

/// A file that arrived through an upload and sits in scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub id: u64,
    pub name: String,
    pub storage_path: PathBuf,
    pub sender: String,
    pub received_at: SystemTime,
}

/// In-memory catalog of shared and received files.
#[derive(Debug, Default)]
pub struct FileCatalog {
    shared: Vec<SharedFile>,
    received: Vec<ReceivedFile>,
    last_received_id: u64,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Shared side ───────────────────────────────────────────────────────────

    /// Adds `path` to the shared list under its base name.
    ///
    /// Returns `Ok(true)` when a new entry was inserted and `Ok(false)` when an
    /// entry with the same name already existed (that entry is kept as-is).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NoFileName`] if the path has no base name.
    pub fn add_shared(
        &mut self,
        path: impl AsRef<Path>,
        size_bytes: Option<u64>,
    ) -> Result<bool, CatalogError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CatalogError::NoFileName(path.to_path_buf()))?;

        if self.shared.iter().any(|f| f.name == name) {
            return Ok(false);
        }
        self.shared.push(SharedFile {
            name,
            absolute_path: path.to_path_buf(),
            size_bytes,
        });
        Ok(true)
    }

    /// Removes the shared entry called `name`.  Returns whether one was removed.
    pub fn remove_shared(&mut self, name: &str) -> bool {
        let before = self.shared.len();
        self.shared.retain(|f| f.name != name);
        self.shared.len() != before
    }

    /// Shared names in the order they were added.
    pub fn list_shared_names(&self) -> Vec<String> {
        self.shared.iter().map(|f| f.name.clone()).collect()
    }

    /// Exact, case-sensitive lookup.  Returns a clone so the caller can stream
    /// the file after releasing whatever lock guards the catalog.
    pub fn find_shared(&self, name: &str) -> Option<SharedFile> {
        self.shared.iter().find(|f| f.name == name).cloned()
    }

    // ── Received side ─────────────────────────────────────────────────────────

    /// Appends a received file stamped with the current wall clock.
    pub fn record_received(
        &mut self,
        name: impl Into<String>,
        storage_path: impl Into<PathBuf>,
        sender: impl Into<String>,
    ) -> ReceivedFile {
        self.record_received_at(name, storage_path, sender, SystemTime::now())
    }

    /// Appends a received file stamped with `now`.
    ///
    /// The id is the millisecond timestamp of `now`, bumped past the previous
    /// id when two uploads land in the same millisecond (or the clock steps
    /// backwards), so ids are strictly increasing.
    pub fn record_received_at(
        &mut self,
        name: impl Into<String>,
        storage_path: impl Into<PathBuf>,
        sender: impl Into<String>,
        now: SystemTime,
    ) -> ReceivedFile {
        let millis = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let id = millis.max(self.last_received_id + 1);
        self.last_received_id = id;

        let file = ReceivedFile {
            id,
            name: name.into(),
            storage_path: storage_path.into(),
            sender: sender.into(),
            received_at: now,
        };
        self.received.push(file.clone());
        file
    }

    /// Looks up a received file by id.
    pub fn received(&self, id: u64) -> Option<&ReceivedFile> {
        self.received.iter().find(|f| f.id == id)
    }

    /// Removes and returns a received file, e.g. once it has been saved.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownReceived`] when no entry has this id.
    pub fn take_received(&mut self, id: u64) -> Result<ReceivedFile, CatalogError> {
        let index = self
            .received
            .iter()
            .position(|f| f.id == id)
            .ok_or(CatalogError::UnknownReceived(id))?;
        Ok(self.received.remove(index))
    }

    /// Received files in arrival order.
    pub fn list_received(&self) -> &[ReceivedFile] {
        &self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_scenario_add_shared_exposes_base_name_only() {
        // Arrange
        let mut catalog = FileCatalog::new();

        // Act
        let inserted = catalog.add_shared("/home/u/report.pdf", Some(10)).unwrap();

        // Assert
        assert!(inserted);
        assert_eq!(catalog.list_shared_names(), vec!["report.pdf".to_string()]);
        let entry = catalog.find_shared("report.pdf").unwrap();
        assert_eq!(entry.absolute_path, PathBuf::from("/home/u/report.pdf"));
        assert_eq!(entry.size_bytes, Some(10));
    }

    #[test]
    fn test_add_shared_same_name_keeps_first_entry() {
        let mut catalog = FileCatalog::new();
        catalog.add_shared("/a/notes.txt", None).unwrap();

        let inserted = catalog.add_shared("/b/notes.txt", None).unwrap();

        assert!(!inserted);
        assert_eq!(catalog.list_shared_names().len(), 1);
        assert_eq!(
            catalog.find_shared("notes.txt").unwrap().absolute_path,
            PathBuf::from("/a/notes.txt")
        );
    }

    #[test]
    fn test_add_shared_is_idempotent_for_same_path() {
        let mut catalog = FileCatalog::new();
        catalog.add_shared("/a/x.bin", None).unwrap();
        catalog.add_shared("/a/x.bin", None).unwrap();
        catalog.add_shared("/a/x.bin", None).unwrap();
        assert_eq!(catalog.list_shared_names(), vec!["x.bin".to_string()]);
    }

    #[test]
    fn test_add_shared_rejects_path_without_name() {
        let mut catalog = FileCatalog::new();
        assert!(matches!(
            catalog.add_shared("/", None),
            Err(CatalogError::NoFileName(_))
        ));
        assert!(catalog.list_shared_names().is_empty());
    }

    #[test]
    fn test_remove_then_add_restores_availability() {
        let mut catalog = FileCatalog::new();
        catalog.add_shared("/srv/a.txt", None).unwrap();

        assert!(catalog.remove_shared("a.txt"));
        assert!(catalog.find_shared("a.txt").is_none());
        assert!(!catalog.remove_shared("a.txt"), "second removal is a no-op");

        catalog.add_shared("/srv/a.txt", None).unwrap();
        assert!(catalog.find_shared("a.txt").is_some());
    }

    #[test]
    fn test_find_shared_is_case_sensitive() {
        let mut catalog = FileCatalog::new();
        catalog.add_shared("/srv/Readme.md", None).unwrap();
        assert!(catalog.find_shared("readme.md").is_none());
        assert!(catalog.find_shared("Readme.md").is_some());
    }

    #[test]
    fn test_shared_names_keep_insertion_order() {
        let mut catalog = FileCatalog::new();
        for p in ["/z/c.txt", "/z/a.txt", "/z/b.txt"] {
            catalog.add_shared(p, None).unwrap();
        }
        assert_eq!(catalog.list_shared_names(), vec!["c.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_received_ids_distinct_within_same_millisecond() {
        // Arrange
        let mut catalog = FileCatalog::new();
        let instant = UNIX_EPOCH + Duration::from_millis(1_700_000_000_000);

        // Act
        let a = catalog.record_received_at("photo.jpg", "/tmp/1", "Mobile-42", instant);
        let b = catalog.record_received_at("photo.jpg", "/tmp/2", "Laptop-7", instant);

        // Assert
        assert_eq!(a.id, 1_700_000_000_000);
        assert_eq!(b.id, a.id + 1);
        assert_eq!(catalog.list_received().len(), 2, "duplicates are kept");
    }

    #[test]
    fn test_received_ids_increase_when_clock_steps_back() {
        let mut catalog = FileCatalog::new();
        let later = UNIX_EPOCH + Duration::from_millis(5_000);
        let earlier = UNIX_EPOCH + Duration::from_millis(1_000);
        let a = catalog.record_received_at("a", "/t/a", "s", later);
        let b = catalog.record_received_at("b", "/t/b", "s", earlier);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_scenario_upload_from_sender_grows_received_list() {
        let mut catalog = FileCatalog::new();
        let before = catalog.list_received().len();

        let file = catalog.record_received("photo.jpg", "/tmp/inbox/photo.jpg", "Mobile-42");

        assert_eq!(catalog.list_received().len(), before + 1);
        assert_eq!(file.name, "photo.jpg");
        assert_eq!(file.sender, "Mobile-42");
        assert_eq!(catalog.received(file.id), Some(&file));
    }

    #[test]
    fn test_take_received_removes_entry() {
        let mut catalog = FileCatalog::new();
        let file = catalog.record_received("x", "/t/x", "peer");

        let taken = catalog.take_received(file.id).unwrap();

        assert_eq!(taken, file);
        assert!(catalog.list_received().is_empty());
        assert_eq!(
            catalog.take_received(file.id),
            Err(CatalogError::UnknownReceived(file.id))
        );
    }
}
