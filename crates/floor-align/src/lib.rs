//! High-level facade crate for the `floor-align-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of [`floor_align_core`] (transforms, alignment tables,
//!   the incremental adjuster and the resolver contract),
//! - [`edit`]: file-level operations on a floor's alignment file, used by
//!   the `floor-align` command-line tool.
//!
//! ## Quickstart
//!
//! ```no_run
//! use floor_align::{edit, AdjustCommand, AdjusterParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let placement = edit::nudge(
//!     "Ground.json",
//!     "Kitchen",
//!     &[AdjustCommand::PlusX, AdjustCommand::RotateClockwise],
//!     AdjusterParams::default(),
//! )?;
//! println!("Kitchen yaw is now {:.4} rad", placement.yaw());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `floor_align::core`: everything in `floor-align-core`.
//! - `floor_align::edit`: show / set / nudge / rename / remove / place on a file.

pub use floor_align_core as core;

pub use floor_align_core::{
    AdjustCommand, AdjusterParams, AlignmentSession, AlignmentStore, FloorAlignment,
    IncrementalAdjuster, RigidTransform,
};

pub mod edit;
