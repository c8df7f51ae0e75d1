//! Floor context passed explicitly to room-transform operations.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::store::{self, AlignmentStore, AlignmentStoreError};

#[derive(thiserror::Error, Debug)]
pub enum FloorError {
    #[error("floor {0:?} lock poisoned by a panicked writer")]
    Poisoned(String),
}

/// One floor: its name, its alignment file and the in-memory table.
#[derive(Clone, Debug)]
pub struct FloorAlignment {
    name: String,
    file_path: PathBuf,
    store: AlignmentStore,
    /// The file exists but could not be loaded; whole-table saves are refused.
    load_failed: bool,
}

impl FloorAlignment {
    pub fn new(name: impl Into<String>, file_path: impl Into<PathBuf>, store: AlignmentStore) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            store,
            load_failed: false,
        }
    }

    /// Alignment file name of a floor, `<name>.json`.
    pub fn file_name_for(name: &str) -> String {
        format!("{name}.json")
    }

    /// Open `<dir>/<name>.json`; a missing or unreadable file yields an empty table.
    ///
    /// When the file exists but fails to load, [`save`](Self::save) refuses to
    /// replace it until [`reload`](Self::reload) succeeds.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Self {
        let file_path = dir.as_ref().join(Self::file_name_for(name));
        let mut floor = Self::new(name, file_path, AlignmentStore::new());
        floor.reload();
        floor
    }

    /// Like [`open`](Self::open), but a file that exists and fails to load is
    /// an error.
    pub fn try_open(dir: impl AsRef<Path>, name: &str) -> Result<Self, AlignmentStoreError> {
        let file_path = dir.as_ref().join(Self::file_name_for(name));
        let store = load_floor_file(&file_path)?;
        Ok(Self::new(name, file_path, store))
    }

    /// Open an alignment file directly; the floor is named after the file stem.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut floor = Self::new(floor_name_of(path), path, AlignmentStore::new());
        floor.reload();
        floor
    }

    /// Like [`from_file`](Self::from_file), but a file that exists and fails
    /// to load is an error.
    pub fn try_from_file(path: impl AsRef<Path>) -> Result<Self, AlignmentStoreError> {
        let path = path.as_ref();
        let store = load_floor_file(path)?;
        Ok(Self::new(floor_name_of(path), path, store))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    #[inline]
    pub fn store(&self) -> &AlignmentStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut AlignmentStore {
        &mut self.store
    }

    /// `true` when the floor's file exists but could not be loaded.
    #[inline]
    pub fn load_failed(&self) -> bool {
        self.load_failed
    }

    /// Write the whole table to the floor's file.
    ///
    /// Fails with [`AlignmentStoreError::UnreadableFile`] if the file could not
    /// be loaded, so the rooms it still holds are never dropped.
    pub fn save(&self) -> Result<(), AlignmentStoreError> {
        if self.load_failed {
            return Err(AlignmentStoreError::UnreadableFile(self.file_path.clone()));
        }
        self.store.save(&self.file_path, &self.name)
    }

    /// Write only `room`'s current entry, leaving other rooms on disk untouched.
    pub fn persist_room(&self, room: &str) -> Result<(), AlignmentStoreError> {
        let transform = self
            .store
            .entry(room)
            .ok_or_else(|| AlignmentStoreError::UnknownRoom(room.to_string()))?;
        store::update_entry(&self.file_path, room, transform)
    }

    /// Drop unsaved edits and re-read the floor's file.
    pub fn reload(&mut self) {
        debug!("loading floor {} from {}", self.name, self.file_path.display());
        match load_floor_file(&self.file_path) {
            Ok(store) => {
                self.store = store;
                self.load_failed = false;
            }
            Err(e) => {
                warn!("{e}; starting with an empty alignment table, the file will not be replaced");
                self.store = AlignmentStore::new();
                self.load_failed = true;
            }
        }
    }
}

/// A missing file is an empty floor; anything else that fails is an error.
fn load_floor_file(path: &Path) -> Result<AlignmentStore, AlignmentStoreError> {
    match AlignmentStore::load(path) {
        Ok(store) => Ok(store),
        Err(e) if e.is_missing_file() => {
            debug!("no alignment file at {}, starting empty", path.display());
            Ok(AlignmentStore::new())
        }
        Err(e) => Err(e),
    }
}

fn floor_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Per-floor single-writer handle for multi-threaded callers.
#[derive(Clone, Debug)]
pub struct SharedFloor(Arc<Mutex<FloorAlignment>>);

impl SharedFloor {
    pub fn new(floor: FloorAlignment) -> Self {
        Self(Arc::new(Mutex::new(floor)))
    }

    /// Exclusive access to the floor; load, save and edits all go through here.
    pub fn lock(&self) -> Result<MutexGuard<'_, FloorAlignment>, FloorError> {
        self.0
            .lock()
            .map_err(|poisoned| FloorError::Poisoned(poisoned.get_ref().name.clone()))
    }
}
