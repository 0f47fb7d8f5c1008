//! Quaternion helpers shared by the integrators and filters.
//!
//! Orientations are Hamilton unit quaternions rotating body (local) vectors
//! into the global frame. Increments, both from gyroscope integration and from
//! measurement corrections, are composed on the body side: $q \leftarrow q
//! \otimes \Delta q$.

use nalgebra::{Quaternion, RealField, UnitQuaternion, Vector3};

use crate::EkfError;

/// Returns the pure quaternion $(0, v)$.
#[inline]
#[must_use]
pub fn pure<T: RealField + Copy>(v: &Vector3<T>) -> Quaternion<T> {
    Quaternion::from_imag(*v)
}

/// Rotates a vector given in the global frame into the body frame of `q`,
/// i.e. computes $q^* \otimes (0, v) \otimes q$.
#[inline]
#[must_use]
pub fn global_to_local<T: RealField + Copy>(q: &UnitQuaternion<T>, global: &Vector3<T>) -> Vector3<T> {
    q.inverse_transform_vector(global)
}

/// Builds the unit correction quaternion for a small rotation with vector
/// part `v` (half of the attitude error).
///
/// For $\|v\|^2 \le 1$ the scalar part is chosen so that the result is
/// exactly unit, otherwise $(1, v)$ is normalized.
#[must_use]
pub fn delta_quaternion<T: RealField + Copy>(v: &Vector3<T>) -> Quaternion<T> {
    let n2 = v.norm_squared();
    if n2 <= T::one() {
        return Quaternion::from_parts((T::one() - n2).sqrt(), *v);
    }
    Quaternion::from_parts(T::one(), *v) / (T::one() + n2).sqrt()
}

/// Normalizes `q`.
///
/// # Errors
///
/// Returns [`EkfError::DegenerateQuaternion`] if the norm of `q` is zero or
/// not finite.
pub fn normalize<T: RealField + Copy>(q: Quaternion<T>) -> Result<UnitQuaternion<T>, EkfError> {
    let norm = q.norm();
    if !(norm.is_finite() && norm > T::zero()) {
        return Err(EkfError::DegenerateQuaternion);
    }
    Ok(UnitQuaternion::new_unchecked(q / norm))
}

/// Corrects `q` by the body side attitude error `error`, in radians.
///
/// # Errors
///
/// Returns [`EkfError::DegenerateQuaternion`] if the corrected quaternion
/// cannot be normalized.
pub fn apply_attitude_error<T: RealField + Copy>(
    q: &UnitQuaternion<T>,
    error: &Vector3<T>,
) -> Result<UnitQuaternion<T>, EkfError> {
    let half: T = nalgebra::convert(0.5);
    normalize(q.quaternion() * delta_quaternion(&(error * half)))
}
