//! Initial orientation from averaged reference directions.
//!
//! The global frame has its `z` axis pointing up (opposite to gravity, along
//! the accelerometer reading at rest). With a magnetometer the global `y` axis
//! is the horizontal component of the magnetic field, otherwise the heading is
//! an arbitrary but deterministic choice.

use nalgebra::{Matrix3, RealField, Rotation3, UnitQuaternion, Vector3};

/// Builds the orientation whose rotation matrix has the rows `x`, `y` and `z`.
///
/// The rows are the global axes expressed in the body frame and must form a
/// right-handed orthonormal basis.
fn from_frame<T: RealField + Copy>(x: &Vector3<T>, y: &Vector3<T>, z: &Vector3<T>) -> UnitQuaternion<T> {
    let matrix = Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(matrix))
}

/// Index of the component of `v` with the smallest magnitude.
fn min_abs_index<T: RealField + Copy>(v: &Vector3<T>) -> usize {
    let mut index = 0;
    for i in 1..3 {
        if v[i].abs() < v[index].abs() {
            index = i;
        }
    }
    index
}

/// Returns the orientation that maps the global up direction onto the
/// normalized accelerometer direction `a`.
///
/// The global `x` axis is taken orthogonal to `a` and to the body axis along
/// which `a` has its smallest component, which keeps the cross product well
/// conditioned.
#[must_use]
pub fn initial_quaternion<T: RealField + Copy>(a: &Vector3<T>) -> UnitQuaternion<T> {
    let z = *a;
    let axis = Vector3::ith(min_abs_index(&z), T::one());
    let x = z.cross(&axis).normalize();
    let y = z.cross(&x);
    from_frame(&x, &y, &z)
}

/// Returns the orientation that maps the global up direction onto the
/// normalized accelerometer direction `a` and the global `y` axis onto the
/// horizontal part of the normalized magnetometer direction `m`.
///
/// `m` must not be parallel to `a`.
#[must_use]
pub fn initial_quaternion_with_field<T: RealField + Copy>(a: &Vector3<T>, m: &Vector3<T>) -> UnitQuaternion<T> {
    let z = *a;
    let x = m.cross(&z).normalize();
    let y = z.cross(&x);
    from_frame(&x, &y, &z)
}
