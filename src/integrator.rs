//! Propagation of an orientation quaternion with angular rate samples.
//!
//! The integrators return the (not yet normalized) product of the previous
//! orientation with the increment. Callers normalize after use.

use nalgebra::{Quaternion, RealField, Vector3};

use crate::quaternion::pure;

/// Angular rate below which the increment uses the first-order Taylor form,
/// in rad/s.
pub const W_THRESHOLD: f64 = 1e-5;

/// Returns the rotation increment for a constant angular rate `w` over `dt`.
#[must_use]
pub fn zeroth_order_increment<T: RealField + Copy>(w: &Vector3<T>, dt: T) -> Quaternion<T> {
    let w_norm = w.norm();
    if w_norm < nalgebra::convert::<f64, T>(W_THRESHOLD) {
        return small_angle_increment(w, dt);
    }
    exact_increment(w, w_norm, dt)
}

#[inline]
fn small_angle_increment<T: RealField + Copy>(w: &Vector3<T>, dt: T) -> Quaternion<T> {
    let half: T = nalgebra::convert(0.5);
    Quaternion::from_parts(T::one(), w * (dt * half))
}

#[inline]
fn exact_increment<T: RealField + Copy>(w: &Vector3<T>, w_norm: T, dt: T) -> Quaternion<T> {
    let half: T = nalgebra::convert(0.5);
    let k = w_norm * dt * half;
    Quaternion::from_parts(k.cos(), w * (k.sin() / w_norm))
}

/// Returns the rotation increment for an angular rate varying linearly from
/// `w0` to `w1` over `dt`.
///
/// The increment of the mean rate is corrected by the commutator term
/// $\frac{dt^2}{48} (\omega_0 \otimes \omega_1 - \omega_1 \otimes
/// \omega_0)$, which vanishes for parallel rates.
#[must_use]
pub fn first_order_increment<T: RealField + Copy>(w0: &Vector3<T>, w1: &Vector3<T>, dt: T) -> Quaternion<T> {
    let half: T = nalgebra::convert(0.5);
    let w = (w0 + w1) * half;
    let q0 = zeroth_order_increment(&w, dt);

    let qw0 = pure(w0);
    let qw1 = pure(w1);
    let q1 = (qw0 * qw1 - qw1 * qw0) * (dt * dt / nalgebra::convert::<f64, T>(48.0));

    q0 + q1
}

/// Integrates `q` with the constant angular rate `w` (body frame, rad/s).
#[must_use]
pub fn zeroth_order_quaternion_integrator<T: RealField + Copy>(
    q: &Quaternion<T>,
    w: &Vector3<T>,
    dt: T,
) -> Quaternion<T> {
    q * zeroth_order_increment(w, dt)
}

/// Integrates `q` with the angular rates `w0` at the start and `w1` at the
/// end of the interval (body frame, rad/s).
#[must_use]
pub fn first_order_quaternion_integrator<T: RealField + Copy>(
    q: &Quaternion<T>,
    w0: &Vector3<T>,
    w1: &Vector3<T>,
    dt: T,
) -> Quaternion<T> {
    q * first_order_increment(w0, w1, dt)
}
