//! Rigid alignment of room scans into a shared floor frame.
//!
//! Each room on a floor carries a [`RigidTransform`] (rotation about the
//! vertical axis plus translation). The crate covers:
//! - composing, inverting and applying those transforms,
//! - the per-floor [`AlignmentStore`] and its JSON file,
//! - step-wise manual refinement with the [`IncrementalAdjuster`],
//! - the [`Resolver`] contract that estimates a transform from matched points.
//!
//! Rendering, AR capture and the network client behind a resolver live
//! outside this crate.
//!
//! ```
//! use floor_align_core::{AdjustCommand, AlignmentStore, FloorAlignment, IncrementalAdjuster};
//!
//! # fn main() -> Result<(), floor_align_core::AdjustError> {
//! let mut floor = FloorAlignment::new("Ground", "Ground.json", AlignmentStore::new());
//! let mut adjuster = IncrementalAdjuster::default();
//! adjuster.target(&floor, "Kitchen");
//! adjuster.apply(AdjustCommand::PlusX, &mut floor)?;
//! assert!((floor.store().get("Kitchen").translation_vector().x - 0.02).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

mod adjuster;
mod correspondence;
mod floor;
mod logger;
mod placement;
mod store;
mod transform;

pub use adjuster::{
    AdjustCommand, AdjustError, AdjusterParams, AdjusterParamsError, IncrementalAdjuster,
};
pub use correspondence::{
    rank_by_similarity, AlignmentSession, Correspondence, CorrespondenceSet, NodeRef,
    ResolveRequest, Resolver, ResolverError, ResolverResponse, SessionError, MIN_CORRESPONDENCES,
};
pub use floor::{FloorAlignment, FloorError, SharedFloor};
pub use placement::{PlacedGeometry, PointPlacement, RoomGeometry, ScenePlacement};
pub use store::{
    contains_entry, remove_entry, rename_entry, update_entry, AlignmentStore,
    AlignmentStoreError, LoadFailure,
};
pub use transform::{
    yaw_matrix, Composition, RigidTransform, TransformError, TransformRows, MATRIX_TOLERANCE,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, DEFAULT_TRACING_FILTER};
