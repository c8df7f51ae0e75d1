//! Operations on one floor's alignment file.
//!
//! Every write goes through the single-entry helpers of `floor-align-core`,
//! so the rooms an operation does not name keep their text on disk. A
//! malformed file is reported and left untouched.

use std::path::Path;

use floor_align_core::{
    remove_entry, rename_entry, update_entry, AdjustCommand, AdjustError, AdjusterParams,
    AdjusterParamsError, AlignmentStore, AlignmentStoreError, FloorAlignment,
    IncrementalAdjuster, PlacedGeometry, PointPlacement, RigidTransform, RoomGeometry,
    ScenePlacement, TransformError,
};
use log::{info, warn};
use nalgebra::{Point3, Vector3};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum EditError {
    #[error(transparent)]
    Store(#[from] AlignmentStoreError),
    #[error(transparent)]
    Adjust(#[from] AdjustError),
    #[error(transparent)]
    Params(#[from] AdjusterParamsError),
    #[error("invalid alignment: {0}")]
    Transform(#[from] TransformError),
    #[error("no adjustment commands given")]
    NoCommands,
}

/// Open the floor stored at `path`, named after the file stem.
///
/// A malformed file is an error; only a missing file yields an empty table.
pub fn open_floor(path: impl AsRef<Path>) -> Result<FloorAlignment, EditError> {
    Ok(FloorAlignment::try_from_file(path)?)
}

/// Load the table for display. Fails on a missing file.
pub fn show(path: impl AsRef<Path>) -> Result<AlignmentStore, EditError> {
    Ok(AlignmentStore::load(path)?)
}

/// JSON summary of a table: translation and heading (degrees) per room.
pub fn summary_json(store: &AlignmentStore) -> serde_json::Value {
    let rooms: serde_json::Map<String, serde_json::Value> = store
        .iter()
        .map(|(room, t)| {
            let v = t.translation_vector();
            (
                room.to_string(),
                json!({
                    "translation": [v.x, v.y, v.z],
                    "yaw_deg": t.yaw().to_degrees(),
                }),
            )
        })
        .collect();
    serde_json::Value::Object(rooms)
}

/// Replace `room`'s alignment with translation `t` and heading `yaw` (radians).
pub fn set_entry(
    path: impl AsRef<Path>,
    room: &str,
    t: Vector3<f64>,
    yaw: f64,
) -> Result<RigidTransform, EditError> {
    let transform = RigidTransform::from_parts(t, yaw)?;
    update_entry(path, room, &transform)?;
    Ok(transform)
}

/// Apply `commands` to `room` in order and persist the result.
///
/// A room without an entry starts from identity. Nothing is written when
/// any command fails.
pub fn nudge(
    path: impl AsRef<Path>,
    room: &str,
    commands: &[AdjustCommand],
    params: AdjusterParams,
) -> Result<RigidTransform, EditError> {
    if commands.is_empty() {
        return Err(EditError::NoCommands);
    }
    params.validate()?;
    let mut floor = open_floor(path)?;
    if !floor.store().contains(room) {
        info!("{room} has no alignment on floor {} yet, starting from identity", floor.name());
    }

    let mut adjuster = IncrementalAdjuster::new(params);
    adjuster.target(&floor, room);
    let placement = adjuster.apply_all(commands.iter().copied(), &mut floor)?;
    floor.persist_room(room)?;
    info!("{room}: {} adjustment(s) saved", commands.len());
    Ok(placement)
}

pub fn rename(path: impl AsRef<Path>, old: &str, new: &str) -> Result<(), EditError> {
    Ok(rename_entry(path, old, new)?)
}

pub fn remove(path: impl AsRef<Path>, room: &str) -> Result<(), EditError> {
    Ok(remove_entry(path, room)?)
}

/// Map room-local `points` into the floor frame with `room`'s alignment.
pub fn place(
    path: impl AsRef<Path>,
    room: &str,
    points: &[Point3<f64>],
) -> Result<PlacedGeometry, EditError> {
    let floor = open_floor(path)?;
    if !floor.store().contains(room) {
        warn!("{room} has no alignment on floor {}, placing with identity", floor.name());
    }
    let geometry = RoomGeometry {
        name: room.to_string(),
        points: points.to_vec(),
    };
    Ok(PointPlacement.apply(&floor.store().get(room), &geometry))
}
