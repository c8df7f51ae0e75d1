//! Placing room geometry in the floor frame.
//!
//! The rendering layer implements [`ScenePlacement`] for its own geometry
//! types. [`PointPlacement`] is the plain point-cloud implementation.

use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};

use crate::transform::RigidTransform;

/// Turns a room-local geometry plus its alignment into floor-frame geometry.
pub trait ScenePlacement {
    type Geometry;
    type Output;

    fn apply(&self, transform: &RigidTransform, geometry: &Self::Geometry) -> Self::Output;
}

/// Room geometry in its local frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomGeometry {
    pub name: String,
    pub points: Vec<Point3<f64>>,
}

/// Room geometry mapped into the floor frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacedGeometry {
    pub name: String,
    pub points: Vec<Point3<f64>>,
    /// Combined placement used to map the points.
    pub placement: Matrix4<f64>,
}

impl PlacedGeometry {
    /// Center of the XZ bounding box, on the floor plane (`y = 0`).
    pub fn footprint_center(&self) -> Option<Point3<f64>> {
        let first = self.points.first()?;
        let (mut min_x, mut max_x, mut min_z, mut max_z) = (first.x, first.x, first.z, first.z);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_z = min_z.min(p.z);
            max_z = max_z.max(p.z);
        }
        Some(Point3::new((min_x + max_x) / 2.0, 0.0, (min_z + max_z) / 2.0))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PointPlacement;

impl ScenePlacement for PointPlacement {
    type Geometry = RoomGeometry;
    type Output = PlacedGeometry;

    fn apply(&self, transform: &RigidTransform, geometry: &RoomGeometry) -> PlacedGeometry {
        PlacedGeometry {
            name: geometry.name.clone(),
            points: geometry.points.iter().map(|p| transform.apply_point(p)).collect(),
            placement: transform.matrix(),
        }
    }
}
