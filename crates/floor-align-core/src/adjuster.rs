//! Step-wise manual refinement of a room's alignment.
//!
//! Every command builds one elementary delta and right-multiplies it onto the
//! room's current placement (`placement * delta`, [`Composition::Local`]).
//! Rotation deltas are plain yaw steps, so the room spins about its own
//! origin. Translation steps are given along the floor axes and expressed in
//! the room frame as `R^T * step` before composing, so a nudge moves the room
//! along X/Z of the floor whatever its current heading.

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::floor::FloorAlignment;
use crate::transform::{Composition, RigidTransform, TransformError};

/// One discrete adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustCommand {
    /// Translate one step along +Z of the floor.
    PlusZ,
    MinusZ,
    /// Translate one step along +X of the floor.
    PlusX,
    MinusX,
    /// Rotate one step about +Y (counter-clockwise seen from above).
    RotateCounterClockwise,
    RotateClockwise,
}

impl AdjustCommand {
    pub const ALL: [AdjustCommand; 6] = [
        AdjustCommand::PlusZ,
        AdjustCommand::MinusZ,
        AdjustCommand::PlusX,
        AdjustCommand::MinusX,
        AdjustCommand::RotateCounterClockwise,
        AdjustCommand::RotateClockwise,
    ];

    /// The command that undoes this one.
    pub fn inverse(self) -> AdjustCommand {
        match self {
            AdjustCommand::PlusZ => AdjustCommand::MinusZ,
            AdjustCommand::MinusZ => AdjustCommand::PlusZ,
            AdjustCommand::PlusX => AdjustCommand::MinusX,
            AdjustCommand::MinusX => AdjustCommand::PlusX,
            AdjustCommand::RotateCounterClockwise => AdjustCommand::RotateClockwise,
            AdjustCommand::RotateClockwise => AdjustCommand::RotateCounterClockwise,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AdjustError {
    #[error("no room is targeted for adjustment")]
    NoActiveTarget,
    #[error("adjuster targets floor {expected:?}, got {found:?}")]
    FloorMismatch { expected: String, found: String },
    #[error("invalid adjuster params: {0}")]
    InvalidParams(#[from] AdjusterParamsError),
    #[error("adjustment would leave the room with a non-rigid placement: {0}")]
    Transform(#[from] TransformError),
}

#[derive(thiserror::Error, Debug)]
pub enum AdjusterParamsError {
    #[error("translation_step must be finite and > 0")]
    InvalidTranslationStep,
    #[error("rotation_step must be finite and > 0")]
    InvalidRotationStep,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Step sizes of the adjuster.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjusterParams {
    /// Translation per command, in floor units (meters).
    pub translation_step: f64,
    /// Rotation per command, in radians.
    pub rotation_step: f64,
}

impl Default for AdjusterParams {
    fn default() -> Self {
        Self {
            translation_step: 0.02,
            rotation_step: PI / 200.0,
        }
    }
}

impl AdjusterParams {
    pub fn validate(&self) -> Result<(), AdjusterParamsError> {
        if !self.translation_step.is_finite() || self.translation_step <= 0.0 {
            return Err(AdjusterParamsError::InvalidTranslationStep);
        }
        if !self.rotation_step.is_finite() || self.rotation_step <= 0.0 {
            return Err(AdjusterParamsError::InvalidRotationStep);
        }
        Ok(())
    }

    /// Load params from JSON on disk; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, AdjusterParamsError> {
        let raw = fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&raw)?;
        params.validate()?;
        Ok(params)
    }

    /// Write params to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), AdjusterParamsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Target {
    floor: String,
    room: String,
    placement: RigidTransform,
}

/// Owner of the live placement of the room being refined.
///
/// Commands must be issued one at a time; each takes the floor mutably, so
/// they cannot interleave with a resolver submission on the same floor.
#[derive(Clone, Debug, Default)]
pub struct IncrementalAdjuster {
    params: AdjusterParams,
    target: Option<Target>,
}

impl IncrementalAdjuster {
    /// Params are checked on every [`apply`](Self::apply), so a bad step
    /// size is reported before anything is written.
    pub fn new(params: AdjusterParams) -> Self {
        Self {
            params,
            target: None,
        }
    }

    #[inline]
    pub fn params(&self) -> &AdjusterParams {
        &self.params
    }

    /// Start adjusting `room`, seeding the placement from the floor's table.
    pub fn target(&mut self, floor: &FloorAlignment, room: &str) -> RigidTransform {
        let placement = floor.store().get(room);
        debug!("adjuster targets {room} on floor {}", floor.name());
        self.target = Some(Target {
            floor: floor.name().to_string(),
            room: room.to_string(),
            placement,
        });
        placement
    }

    /// Stop adjusting; later commands report [`AdjustError::NoActiveTarget`].
    pub fn release(&mut self) {
        self.target = None;
    }

    pub fn target_room(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.room.as_str())
    }

    /// Current placement of the targeted room. Rendering input is derived
    /// from this value, never tracked separately.
    pub fn placement(&self) -> Option<RigidTransform> {
        self.target.as_ref().map(|t| t.placement)
    }

    /// Apply one command and write the result into the floor's table.
    ///
    /// The table is only updated in memory; persisting is the caller's
    /// explicit confirm step. Invalid params or a non-finite result leave
    /// both the placement and the table untouched.
    pub fn apply(
        &mut self,
        command: AdjustCommand,
        floor: &mut FloorAlignment,
    ) -> Result<RigidTransform, AdjustError> {
        let Some(target) = self.target.as_mut() else {
            warn!("ignoring {command:?}: no room targeted");
            return Err(AdjustError::NoActiveTarget);
        };
        if target.floor != floor.name() {
            warn!(
                "ignoring {command:?}: adjuster targets floor {}, got {}",
                target.floor,
                floor.name()
            );
            return Err(AdjustError::FloorMismatch {
                expected: target.floor.clone(),
                found: floor.name().to_string(),
            });
        }
        if let Err(e) = self.params.validate() {
            warn!("ignoring {command:?}: {e}");
            return Err(e.into());
        }

        // The table wins if someone else (e.g. a resolver round) wrote it.
        let stored = floor.store().get(&target.room);
        if stored != target.placement {
            debug!("resyncing placement of {} from the floor table", target.room);
            target.placement = stored;
        }

        let delta = step_delta(&self.params, command, &target.placement)?;
        let next = target.placement.compose(&delta, Composition::Local);
        if !next.is_finite() {
            warn!("ignoring {command:?}: {} placement overflowed", target.room);
            return Err(TransformError::NonFinite.into());
        }
        target.placement = next;
        floor.store_mut().set(target.room.clone(), next);
        debug!("{command:?} applied to {}", target.room);
        Ok(next)
    }

    /// Apply a sequence of commands in order, stopping at the first error.
    pub fn apply_all<I>(&mut self, commands: I, floor: &mut FloorAlignment) -> Result<RigidTransform, AdjustError>
    where
        I: IntoIterator<Item = AdjustCommand>,
    {
        let mut last = self.placement().ok_or(AdjustError::NoActiveTarget)?;
        for command in commands {
            last = self.apply(command, floor)?;
        }
        Ok(last)
    }
}

/// Elementary delta for one command, expressed in the room frame of `current`.
fn step_delta(
    params: &AdjusterParams,
    command: AdjustCommand,
    current: &RigidTransform,
) -> Result<RigidTransform, TransformError> {
    let step = params.translation_step;
    let floor_step = match command {
        AdjustCommand::PlusZ => Vector3::new(0.0, 0.0, step),
        AdjustCommand::MinusZ => Vector3::new(0.0, 0.0, -step),
        AdjustCommand::PlusX => Vector3::new(step, 0.0, 0.0),
        AdjustCommand::MinusX => Vector3::new(-step, 0.0, 0.0),
        AdjustCommand::RotateCounterClockwise => {
            return RigidTransform::from_yaw(params.rotation_step)
        }
        AdjustCommand::RotateClockwise => return RigidTransform::from_yaw(-params.rotation_step),
    };
    RigidTransform::from_translation(current.rotation3().transpose() * floor_step)
}
