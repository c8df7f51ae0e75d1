//! Rigid room-to-floor transforms.
//!
//! A [`RigidTransform`] is stored as the two homogeneous matrices used by the
//! alignment file: a pure translation `T` and a rotation `R_Y` about the
//! vertical axis. The combined placement is `T * R_Y`: a local point is first
//! rotated, then translated into the floor frame.
//!
//! Rotation about +Y is right-handed: a positive angle turns +Z toward +X
//! (counter-clockwise when looking down from above).

use nalgebra::{
    ArrayStorage, Matrix3, Matrix4, Point3, Rotation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};

/// Maximum absolute deviation accepted when validating loaded matrices.
///
/// Alignment files are frequently written with 32-bit floats, so exact
/// orthonormality cannot be expected.
pub const MATRIX_TOLERANCE: f64 = 1e-4;

const IDENTITY4: Matrix4<f64> = Matrix4::from_array_storage(ArrayStorage([
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
]));

/// Reasons a pair of matrices does not describe a rigid transform.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("matrix contains non-finite values")]
    NonFinite,
    #[error("translation matrix is not a pure homogeneous translation")]
    NotATranslation,
    #[error("rotation matrix has a translation or projective part")]
    NotHomogeneousRotation,
    #[error("rotation block is not orthonormal (max deviation {deviation:.3e})")]
    NotOrthonormal { deviation: f64 },
    #[error("rotation block has determinant {det:.6}, expected +1")]
    Reflection { det: f64 },
}

/// Order in which a delta is chained onto an existing transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    /// `base * delta`: the delta is expressed in the room's own, evolving frame.
    Local,
    /// `delta * base`: the delta is expressed in the fixed floor frame.
    Global,
}

/// Rigid alignment of a room's local frame into its floor frame.
///
/// Fields are private so every value satisfies the rigid invariant: new
/// rotations are only ever produced by multiplying valid rotations together.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransformRows", into = "TransformRows")]
pub struct RigidTransform {
    translation: Matrix4<f64>,
    rotation_y: Matrix4<f64>,
}

/// Row-major file representation of a [`RigidTransform`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformRows {
    pub translation: [[f64; 4]; 4],
    #[serde(rename = "R_Y")]
    pub rotation_y: [[f64; 4]; 4],
}

impl RigidTransform {
    pub const IDENTITY: RigidTransform = RigidTransform {
        translation: IDENTITY4,
        rotation_y: IDENTITY4,
    };

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Pure translation by `t` (floor units, meters).
    pub fn from_translation(t: Vector3<f64>) -> Result<Self, TransformError> {
        Self::from_parts(t, 0.0)
    }

    /// Pure rotation by `angle` radians about +Y.
    pub fn from_yaw(angle: f64) -> Result<Self, TransformError> {
        Self::from_parts(Vector3::zeros(), angle)
    }

    /// Rotate by `yaw` about +Y, then translate by `t`.
    ///
    /// Fails with [`TransformError::NonFinite`] on NaN or infinite input.
    pub fn from_parts(t: Vector3<f64>, yaw: f64) -> Result<Self, TransformError> {
        if !yaw.is_finite() || t.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite);
        }
        Ok(Self {
            translation: Matrix4::new_translation(&t),
            rotation_y: yaw_matrix(yaw),
        })
    }

    /// Build from homogeneous matrices, validating both.
    pub fn from_matrices(
        translation: Matrix4<f64>,
        rotation_y: Matrix4<f64>,
    ) -> Result<Self, TransformError> {
        validate_translation(&translation)?;
        validate_rotation(&rotation_y)?;
        Ok(Self {
            translation,
            rotation_y,
        })
    }

    /// Build from row-major arrays as stored in alignment files.
    pub fn from_rows(
        translation: [[f64; 4]; 4],
        rotation_y: [[f64; 4]; 4],
    ) -> Result<Self, TransformError> {
        Self::from_matrices(matrix_from_rows(&translation), matrix_from_rows(&rotation_y))
    }

    pub fn to_rows(&self) -> TransformRows {
        TransformRows {
            translation: matrix_to_rows(&self.translation),
            rotation_y: matrix_to_rows(&self.rotation_y),
        }
    }

    /// Homogeneous translation matrix.
    #[inline]
    pub fn translation_matrix(&self) -> &Matrix4<f64> {
        &self.translation
    }

    /// Homogeneous rotation matrix (`R_Y`).
    #[inline]
    pub fn rotation_matrix(&self) -> &Matrix4<f64> {
        &self.rotation_y
    }

    #[inline]
    pub fn translation_vector(&self) -> Vector3<f64> {
        self.translation.fixed_view::<3, 1>(0, 3).into_owned()
    }

    #[inline]
    pub fn rotation3(&self) -> Matrix3<f64> {
        self.rotation_y.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn rotation_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(self.rotation3()))
    }

    /// Heading about +Y in radians, in `(-pi, pi]`.
    ///
    /// Only meaningful when the rotation is a pure yaw, which is the case for
    /// every transform produced by this crate.
    pub fn yaw(&self) -> f64 {
        let r = &self.rotation_y;
        r[(0, 2)].atan2(r[(0, 0)])
    }

    /// Combined placement `T * R_Y`.
    #[inline]
    pub fn matrix(&self) -> Matrix4<f64> {
        self.translation * self.rotation_y
    }

    /// Chain `delta` onto `self` in the given order.
    pub fn compose(&self, delta: &RigidTransform, order: Composition) -> RigidTransform {
        let product = match order {
            Composition::Local => self.matrix() * delta.matrix(),
            Composition::Global => delta.matrix() * self.matrix(),
        };
        Self::split_rigid(&product)
    }

    pub fn inverse(&self) -> RigidTransform {
        let rt = self.rotation3().transpose();
        let t = -(rt * self.translation_vector());
        RigidTransform {
            translation: Matrix4::new_translation(&t),
            rotation_y: rt.to_homogeneous(),
        }
    }

    /// Map a point from the room frame into the floor frame.
    #[inline]
    pub fn apply_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation3() * p.coords + self.translation_vector())
    }

    /// Rotate a direction; translation does not apply to vectors.
    #[inline]
    pub fn apply_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation3() * v
    }

    /// Place a local homogeneous frame in the floor frame: rotate, then translate.
    #[inline]
    pub fn apply_frame(&self, frame: &Matrix4<f64>) -> Matrix4<f64> {
        self.matrix() * frame
    }

    /// `false` once composition has overflowed to an infinite or NaN value.
    pub fn is_finite(&self) -> bool {
        self.translation.iter().chain(self.rotation_y.iter()).all(|v| v.is_finite())
    }

    pub fn approx_eq(&self, other: &RigidTransform, eps: f64) -> bool {
        (self.translation - other.translation).amax() <= eps
            && (self.rotation_y - other.rotation_y).amax() <= eps
    }

    /// Split a product of rigid matrices back into translation and rotation.
    fn split_rigid(m: &Matrix4<f64>) -> RigidTransform {
        let t: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
        let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        RigidTransform {
            translation: Matrix4::new_translation(&t),
            rotation_y: r.to_homogeneous(),
        }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<TransformRows> for RigidTransform {
    type Error = TransformError;

    fn try_from(rows: TransformRows) -> Result<Self, Self::Error> {
        Self::from_rows(rows.translation, rows.rotation_y)
    }
}

impl From<RigidTransform> for TransformRows {
    fn from(t: RigidTransform) -> Self {
        t.to_rows()
    }
}

/// Homogeneous elementary rotation by `angle` radians about +Y.
pub fn yaw_matrix(angle: f64) -> Matrix4<f64> {
    Rotation3::from_axis_angle(&Vector3::y_axis(), angle).to_homogeneous()
}

fn matrix_from_rows(rows: &[[f64; 4]; 4]) -> Matrix4<f64> {
    Matrix4::from_fn(|r, c| rows[r][c])
}

fn matrix_to_rows(m: &Matrix4<f64>) -> [[f64; 4]; 4] {
    let mut rows = [[0.0; 4]; 4];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = m[(r, c)];
        }
    }
    rows
}

fn has_homogeneous_bottom_row(m: &Matrix4<f64>) -> bool {
    m[(3, 0)].abs() <= MATRIX_TOLERANCE
        && m[(3, 1)].abs() <= MATRIX_TOLERANCE
        && m[(3, 2)].abs() <= MATRIX_TOLERANCE
        && (m[(3, 3)] - 1.0).abs() <= MATRIX_TOLERANCE
}

fn validate_translation(m: &Matrix4<f64>) -> Result<(), TransformError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(TransformError::NonFinite);
    }
    let block: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    if (block - Matrix3::identity()).amax() > MATRIX_TOLERANCE || !has_homogeneous_bottom_row(m) {
        return Err(TransformError::NotATranslation);
    }
    Ok(())
}

fn validate_rotation(m: &Matrix4<f64>) -> Result<(), TransformError> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(TransformError::NonFinite);
    }
    let column_t = m.fixed_view::<3, 1>(0, 3).amax();
    if column_t > MATRIX_TOLERANCE || !has_homogeneous_bottom_row(m) {
        return Err(TransformError::NotHomogeneousRotation);
    }
    let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let deviation = (r.transpose() * r - Matrix3::identity()).amax();
    if deviation > MATRIX_TOLERANCE {
        return Err(TransformError::NotOrthonormal { deviation });
    }
    let det = r.determinant();
    if det <= 0.0 {
        return Err(TransformError::Reflection { det });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-12;

    #[test]
    fn identity_leaves_points_in_place() {
        let p = Point3::new(1.5, -0.25, 3.0);
        assert_eq!(RigidTransform::identity().apply_point(&p), p);
        assert_eq!(RigidTransform::default(), RigidTransform::IDENTITY);
    }

    #[test]
    fn positive_yaw_turns_z_toward_x() {
        let t = RigidTransform::from_yaw(FRAC_PI_2).expect("rigid");
        let v = t.apply_vector(&Vector3::z());
        assert_relative_eq!(v, Vector3::x(), epsilon = EPS);
        assert_relative_eq!(t.yaw(), FRAC_PI_2, epsilon = EPS);
    }

    #[test]
    fn combined_matrix_rotates_before_translating() {
        let t = RigidTransform::from_parts(Vector3::new(2.0, 0.0, -1.0), FRAC_PI_2).expect("rigid");
        let p = t.apply_point(&Point3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(p, Point3::new(3.0, 0.0, -1.0), epsilon = EPS);

        let h = t.matrix() * nalgebra::Vector4::new(0.0, 0.0, 1.0, 1.0);
        assert_relative_eq!(h.xyz(), p.coords, epsilon = EPS);
    }

    #[test]
    fn inverse_round_trips_points_and_frames() {
        let t = RigidTransform::from_parts(Vector3::new(0.3, 1.2, -4.0), 0.7).expect("rigid");
        let p = Point3::new(-2.0, 0.5, 9.0);
        let back = t.apply_point(&t.inverse().apply_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-9);

        let frame = RigidTransform::from_parts(Vector3::new(1.0, 0.0, 1.0), -0.3).expect("rigid").matrix();
        let back = t.apply_frame(&t.inverse().apply_frame(&frame));
        assert_relative_eq!(back, frame, epsilon = 1e-9);
    }

    #[test]
    fn local_and_global_composition_differ_for_translations() {
        let base = RigidTransform::from_yaw(FRAC_PI_2).expect("rigid");
        let step = RigidTransform::from_translation(Vector3::new(0.0, 0.0, 1.0)).expect("rigid");

        let local = base.compose(&step, Composition::Local);
        assert_relative_eq!(local.translation_vector(), Vector3::new(1.0, 0.0, 0.0), epsilon = EPS);

        let global = base.compose(&step, Composition::Global);
        assert_relative_eq!(global.translation_vector(), Vector3::new(0.0, 0.0, 1.0), epsilon = EPS);
        assert!(local.approx_eq(&RigidTransform::from_parts(Vector3::x(), FRAC_PI_2).expect("rigid"), EPS));
    }

    #[test]
    fn composed_rotation_stays_rigid() {
        let mut t = RigidTransform::from_parts(Vector3::new(1.0, 0.0, 2.5), 0.1).expect("rigid");
        let step = RigidTransform::from_yaw(PI / 200.0).expect("rigid");
        for _ in 0..1000 {
            t = t.compose(&step, Composition::Local);
        }
        assert!(RigidTransform::from_matrices(*t.translation_matrix(), *t.rotation_matrix()).is_ok());
        assert_relative_eq!(t.translation_vector(), Vector3::new(1.0, 0.0, 2.5), epsilon = 1e-9);
    }

    #[test]
    fn quaternion_matches_yaw() {
        let t = RigidTransform::from_yaw(0.4).expect("rigid");
        let q = t.rotation_quaternion();
        assert_relative_eq!(q.angle(), 0.4, epsilon = 1e-9);
        let axis = q.axis().expect("axis");
        assert_relative_eq!(axis.into_inner(), Vector3::y(), epsilon = 1e-9);
    }

    #[test]
    fn rows_are_row_major() {
        let t = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 2.5)).expect("rigid");
        let rows = t.to_rows();
        assert_eq!(rows.translation[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(rows.translation[2], [0.0, 0.0, 1.0, 2.5]);
        assert_eq!(rows.translation[3], [0.0, 0.0, 0.0, 1.0]);
        let back = RigidTransform::try_from(rows).expect("valid rows");
        assert_eq!(back, t);
    }

    #[test]
    fn rejects_non_rigid_matrices() {
        let mut scaled = IDENTITY4;
        scaled[(0, 0)] = 2.0;
        assert!(matches!(
            RigidTransform::from_matrices(IDENTITY4, scaled),
            Err(TransformError::NotOrthonormal { .. })
        ));

        let mut mirrored = IDENTITY4;
        mirrored[(0, 0)] = -1.0;
        assert!(matches!(
            RigidTransform::from_matrices(IDENTITY4, mirrored),
            Err(TransformError::Reflection { .. })
        ));

        let rotation_with_offset = Matrix4::new_translation(&Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(
            RigidTransform::from_matrices(IDENTITY4, rotation_with_offset),
            Err(TransformError::NotHomogeneousRotation)
        );

        assert_eq!(
            RigidTransform::from_matrices(yaw_matrix(0.3), IDENTITY4),
            Err(TransformError::NotATranslation)
        );

        let mut nan = IDENTITY4;
        nan[(0, 3)] = f64::NAN;
        assert_eq!(
            RigidTransform::from_matrices(nan, IDENTITY4),
            Err(TransformError::NonFinite)
        );
    }

    #[test]
    fn constructors_reject_non_finite_input() {
        assert_eq!(
            RigidTransform::from_parts(Vector3::new(0.0, f64::NAN, 0.0), 0.0),
            Err(TransformError::NonFinite)
        );
        assert_eq!(RigidTransform::from_yaw(f64::INFINITY), Err(TransformError::NonFinite));
        assert_eq!(
            RigidTransform::from_translation(Vector3::new(f64::NEG_INFINITY, 0.0, 0.0)),
            Err(TransformError::NonFinite)
        );
    }

    #[test]
    fn overflowing_composition_is_not_finite() {
        let far = RigidTransform::from_translation(Vector3::new(f64::MAX, 0.0, 0.0)).expect("rigid");
        assert!(far.is_finite());
        assert!(!far.compose(&far, Composition::Global).is_finite());
    }

    #[test]
    fn accepts_single_precision_rotations() {
        let r = yaw_matrix(0.123).map(|v| v as f32 as f64);
        assert!(RigidTransform::from_matrices(IDENTITY4, r).is_ok());
    }
}
