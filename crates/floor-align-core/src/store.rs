//! Per-floor alignment table and its JSON file.
//!
//! File layout, one object keyed by room name:
//!
//! ```json
//! {
//!   "RoomA": {
//!     "translation": [[1,0,0,1.0],[0,1,0,0.0],[0,0,1,2.5],[0,0,0,1]],
//!     "R_Y": [[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]]
//!   }
//! }
//! ```
//!
//! Whole-table writes go through [`AlignmentStore::save`]. The single-room
//! helpers ([`update_entry`], [`rename_entry`], [`remove_entry`]) keep every
//! other room's JSON text untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::value::RawValue;
use tempfile::NamedTempFile;

use crate::transform::RigidTransform;

/// Why an alignment file could not be read.
#[derive(thiserror::Error, Debug)]
pub enum LoadFailure {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum AlignmentStoreError {
    #[error("cannot load alignment file {}: {source}", path.display())]
    Deserialization { path: PathBuf, source: LoadFailure },
    #[error("changes not saved to {}: {source}", path.display())]
    Serialization { path: PathBuf, source: io::Error },
    #[error("room {0:?} has no alignment entry")]
    UnknownRoom(String),
    #[error("room {0:?} already has an alignment entry")]
    RoomExists(String),
    #[error("refusing to replace {}: it exists but failed to load", .0.display())]
    UnreadableFile(PathBuf),
}

impl AlignmentStoreError {
    /// `true` when loading failed only because the file does not exist.
    pub fn is_missing_file(&self) -> bool {
        matches!(
            self,
            AlignmentStoreError::Deserialization {
                source: LoadFailure::Io(e),
                ..
            } if e.kind() == io::ErrorKind::NotFound
        )
    }

    fn deserialization(path: &Path, source: impl Into<LoadFailure>) -> Self {
        AlignmentStoreError::Deserialization {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    fn serialization(path: &Path, source: impl Into<io::Error>) -> Self {
        AlignmentStoreError::Serialization {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }
}

/// In-memory mapping from room name to its alignment on one floor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignmentStore {
    rooms: BTreeMap<String, RigidTransform>,
}

impl AlignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from disk.
    ///
    /// Fails when the file is absent, unreadable, or any entry has the wrong
    /// shape or is not a rigid transform.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AlignmentStoreError> {
        let path = path.as_ref();
        let raw =
            fs::read_to_string(path).map_err(|e| AlignmentStoreError::deserialization(path, e))?;
        let rooms: BTreeMap<String, RigidTransform> = serde_json::from_str(&raw)
            .map_err(|e| AlignmentStoreError::deserialization(path, e))?;
        info!("loaded {} room alignments from {}", rooms.len(), path.display());
        Ok(Self { rooms })
    }

    /// Load a table, treating a missing or malformed file as an empty floor.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(store) => store,
            Err(e) if e.is_missing_file() => {
                debug!("no alignment file at {}, starting empty", path.display());
                Self::new()
            }
            Err(e) => {
                warn!("{e}; starting with an empty alignment table");
                Self::new()
            }
        }
    }

    /// Alignment for `room`, identity when the room has none yet.
    pub fn get(&self, room: &str) -> RigidTransform {
        self.rooms.get(room).copied().unwrap_or_default()
    }

    pub fn entry(&self, room: &str) -> Option<&RigidTransform> {
        self.rooms.get(room)
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Replace the in-memory alignment of `room`. Nothing is written to disk.
    pub fn set(&mut self, room: impl Into<String>, transform: RigidTransform) {
        let room = room.into();
        let t = transform.translation_vector();
        debug!(
            "set alignment of {room}: t=({:.4}, {:.4}, {:.4}) yaw={:.6}",
            t.x,
            t.y,
            t.z,
            transform.yaw()
        );
        self.rooms.insert(room, transform);
    }

    pub fn remove(&mut self, room: &str) -> Option<RigidTransform> {
        self.rooms.remove(room)
    }

    /// Move the entry of `old` to `new`. Renaming a room to its own name is a no-op.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), AlignmentStoreError> {
        if old == new {
            return if self.rooms.contains_key(old) {
                Ok(())
            } else {
                Err(AlignmentStoreError::UnknownRoom(old.to_string()))
            };
        }
        if self.rooms.contains_key(new) {
            return Err(AlignmentStoreError::RoomExists(new.to_string()));
        }
        let t = self
            .rooms
            .remove(old)
            .ok_or_else(|| AlignmentStoreError::UnknownRoom(old.to_string()))?;
        self.rooms.insert(new.to_string(), t);
        Ok(())
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RigidTransform)> {
        self.rooms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Serialize the whole table to `path`, atomically.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(self, path), fields(rooms = self.rooms.len())))]
    pub fn save(&self, path: impl AsRef<Path>, floor_name: &str) -> Result<(), AlignmentStoreError> {
        let path = path.as_ref();
        for (room, transform) in &self.rooms {
            ensure_finite(path, room, transform)?;
        }
        let json = serde_json::to_string_pretty(&self.rooms)
            .map_err(|e| AlignmentStoreError::serialization(path, e))?;
        write_atomic(path, json.as_bytes()).map_err(|e| AlignmentStoreError::serialization(path, e))?;
        info!(
            "saved {} room alignments of floor {floor_name} to {}",
            self.rooms.len(),
            path.display()
        );
        Ok(())
    }
}

impl FromIterator<(String, RigidTransform)> for AlignmentStore {
    fn from_iter<I: IntoIterator<Item = (String, RigidTransform)>>(iter: I) -> Self {
        Self {
            rooms: iter.into_iter().collect(),
        }
    }
}

type RawTable = BTreeMap<String, Box<RawValue>>;

/// Overwrite one room's entry in the file at `path`, leaving the others as
/// they are on disk. A missing file starts a new table.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(path, transform)))]
pub fn update_entry(
    path: impl AsRef<Path>,
    room: &str,
    transform: &RigidTransform,
) -> Result<(), AlignmentStoreError> {
    let path = path.as_ref();
    ensure_finite(path, room, transform)?;
    let mut table = read_raw_table(path, true)?;
    let entry = raw_entry(transform).map_err(|e| AlignmentStoreError::serialization(path, e))?;
    table.insert(room.to_string(), entry);
    write_raw_table(path, &table)?;
    debug!("updated alignment of {room} in {}", path.display());
    Ok(())
}

/// Rename one room's entry in the file at `path`.
pub fn rename_entry(path: impl AsRef<Path>, old: &str, new: &str) -> Result<(), AlignmentStoreError> {
    let path = path.as_ref();
    let mut table = read_raw_table(path, false)?;
    if old == new {
        return if table.contains_key(old) {
            Ok(())
        } else {
            Err(AlignmentStoreError::UnknownRoom(old.to_string()))
        };
    }
    if table.contains_key(new) {
        return Err(AlignmentStoreError::RoomExists(new.to_string()));
    }
    let entry = table
        .remove(old)
        .ok_or_else(|| AlignmentStoreError::UnknownRoom(old.to_string()))?;
    table.insert(new.to_string(), entry);
    write_raw_table(path, &table)?;
    info!("renamed alignment {old} -> {new} in {}", path.display());
    Ok(())
}

/// Drop one room's entry from the file at `path`.
pub fn remove_entry(path: impl AsRef<Path>, room: &str) -> Result<(), AlignmentStoreError> {
    let path = path.as_ref();
    let mut table = read_raw_table(path, false)?;
    if table.remove(room).is_none() {
        return Err(AlignmentStoreError::UnknownRoom(room.to_string()));
    }
    write_raw_table(path, &table)?;
    info!("removed alignment of {room} from {}", path.display());
    Ok(())
}

/// Whether the file at `path` holds an entry for `room`.
pub fn contains_entry(path: impl AsRef<Path>, room: &str) -> Result<bool, AlignmentStoreError> {
    Ok(read_raw_table(path.as_ref(), false)?.contains_key(room))
}

/// JSON has no NaN or infinity; serde_json would write `null` and leave a
/// file that no longer loads.
fn ensure_finite(
    path: &Path,
    room: &str,
    transform: &RigidTransform,
) -> Result<(), AlignmentStoreError> {
    if transform.is_finite() {
        return Ok(());
    }
    Err(AlignmentStoreError::serialization(
        path,
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("alignment of {room} has non-finite values"),
        ),
    ))
}

/// Read the table keeping each entry's original JSON text. Every entry is
/// still validated so a malformed file is never rewritten.
fn read_raw_table(path: &Path, missing_ok: bool) -> Result<RawTable, AlignmentStoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if missing_ok && e.kind() == io::ErrorKind::NotFound => return Ok(RawTable::new()),
        Err(e) => return Err(AlignmentStoreError::deserialization(path, e)),
    };
    let table: RawTable =
        serde_json::from_str(&raw).map_err(|e| AlignmentStoreError::deserialization(path, e))?;
    for entry in table.values() {
        serde_json::from_str::<RigidTransform>(entry.get())
            .map_err(|e| AlignmentStoreError::deserialization(path, e))?;
    }
    Ok(table)
}

fn write_raw_table(path: &Path, table: &RawTable) -> Result<(), AlignmentStoreError> {
    let json =
        serde_json::to_string_pretty(table).map_err(|e| AlignmentStoreError::serialization(path, e))?;
    write_atomic(path, json.as_bytes()).map_err(|e| AlignmentStoreError::serialization(path, e))
}

/// Pretty JSON for one entry, indented to sit one level deep in the table,
/// so it matches what [`AlignmentStore::save`] writes.
fn raw_entry(transform: &RigidTransform) -> serde_json::Result<Box<RawValue>> {
    let pretty = serde_json::to_string_pretty(transform)?;
    RawValue::from_string(pretty.replace('\n', "\n  "))
}

/// Write to a temp file in the target directory, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
