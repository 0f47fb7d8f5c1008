//! Linearized error-state models for the prediction step.
//!
//! The attitude error $\delta\theta$ is a small rotation applied on the body
//! side of the estimate, and the optional bias error $\delta b$ is the
//! difference between the true and the estimated gyroscope bias. For a
//! constant bias corrected rate $\omega$ over $dt$ the error evolves as
//! $\dot{\delta\theta} = -[\omega\times]\delta\theta - \delta b$.
//!
//! Every trigonometric ratio is evaluated through its Taylor series when
//! $\|\omega\| dt$ is small, so none of the builders divide by a vanishing
//! angular rate.

use nalgebra::{Matrix3, Matrix6, RealField, Vector3};

/// Below this rotation angle, in radians, the coefficients are evaluated with
/// their Taylor series.
const SERIES_THRESHOLD: f64 = 1e-2;

/// Returns the cross-product matrix $[v\times]$, such that $[v\times] u = v
/// \times u$.
#[inline]
#[must_use]
pub fn cross_matrix<T: RealField + Copy>(v: &Vector3<T>) -> Matrix3<T> {
    v.cross_matrix()
}

/// Scalar factors of $[\omega\times]$ and $[\omega\times]^2$ in the closed
/// form transition and noise matrices, with $x = \|\omega\| dt$.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients<T> {
    /// $\sin x / \|\omega\|$
    sin: T,
    /// $(1 - \cos x) / \|\omega\|^2$
    one_minus_cos: T,
    /// $(x - \sin x) / \|\omega\|^3$
    x_minus_sin: T,
    /// $(x^2/2 + \cos x - 1) / \|\omega\|^4$
    quartic: T,
    /// $(x^3/3 + 2\sin x - 2x) / \|\omega\|^5$
    quintic: T,
}

impl<T: RealField + Copy> Coefficients<T> {
    fn new(w_norm: T, dt: T) -> Self {
        let x = w_norm * dt;
        if x < nalgebra::convert(SERIES_THRESHOLD) {
            Self::series(x, dt)
        } else {
            Self::exact(x, w_norm)
        }
    }

    fn series(x: T, dt: T) -> Self {
        let c = |v: f64| -> T { nalgebra::convert(v) };
        let x2 = x * x;
        let x4 = x2 * x2;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;

        Self {
            sin: dt * (T::one() - x2 / c(6.0) + x4 / c(120.0)),
            one_minus_cos: dt2 * (c(1.0 / 2.0) - x2 / c(24.0) + x4 / c(720.0)),
            x_minus_sin: dt3 * (c(1.0 / 6.0) - x2 / c(120.0) + x4 / c(5040.0)),
            quartic: dt2 * dt2 * (c(1.0 / 24.0) - x2 / c(720.0) + x4 / c(40320.0)),
            quintic: dt3 * dt2 * (c(1.0 / 60.0) - x2 / c(2520.0) + x4 / c(181_440.0)),
        }
    }

    fn exact(x: T, w_norm: T) -> Self {
        let two: T = nalgebra::convert(2.0);
        let three: T = nalgebra::convert(3.0);
        let (sin, cos) = x.sin_cos();
        let w2 = w_norm * w_norm;
        let w3 = w2 * w_norm;

        Self {
            sin: sin / w_norm,
            one_minus_cos: (T::one() - cos) / w2,
            x_minus_sin: (x - sin) / w3,
            quartic: (x * x / two + cos - T::one()) / (w2 * w2),
            quintic: (x * x * x / three + two * sin - two * x) / (w3 * w2),
        }
    }
}

/// $\Theta = I - \frac{\sin x}{\|\omega\|}[\omega\times] + \frac{1 - \cos
/// x}{\|\omega\|^2}[\omega\times]^2$, the attitude error transition.
fn theta<T: RealField + Copy>(c: &Coefficients<T>, wx: &Matrix3<T>, wx2: &Matrix3<T>) -> Matrix3<T> {
    Matrix3::identity() - wx * c.sin + wx2 * c.one_minus_cos
}

/// Error-state transition matrix of the attitude-only filter for the angular
/// rate `w` over `dt`.
#[must_use]
pub fn state_transition_matrix_3<T: RealField + Copy>(w: &Vector3<T>, dt: T) -> Matrix3<T> {
    let c = Coefficients::new(w.norm(), dt);
    let wx = cross_matrix(w);
    theta(&c, &wx, &(wx * wx))
}

/// Process noise covariance of the attitude-only filter for the angular rate
/// white noise `variance` over `dt`.
#[must_use]
pub fn noise_covariance_matrix_3<T: RealField + Copy>(variance: T, dt: T) -> Matrix3<T> {
    Matrix3::from_diagonal_element(variance * dt)
}

/// Error-state transition matrix of the attitude and bias filter for the bias
/// corrected angular rate `w` over `dt`.
///
/// The upper right block couples the bias error into the attitude error:
/// $\Psi = -I dt + \frac{1 - \cos x}{\|\omega\|^2}[\omega\times] - \frac{x -
/// \sin x}{\|\omega\|^3}[\omega\times]^2$.
#[must_use]
pub fn state_transition_matrix_6<T: RealField + Copy>(w: &Vector3<T>, dt: T) -> Matrix6<T> {
    let c = Coefficients::new(w.norm(), dt);
    let wx = cross_matrix(w);
    let wx2 = wx * wx;

    let psi = Matrix3::from_diagonal_element(-dt) + wx * c.one_minus_cos - wx2 * c.x_minus_sin;

    let mut phi = Matrix6::identity();
    phi.fixed_view_mut::<3, 3>(0, 0).copy_from(&theta(&c, &wx, &wx2));
    phi.fixed_view_mut::<3, 3>(0, 3).copy_from(&psi);
    phi
}

/// Process noise covariance of the attitude and bias filter.
///
/// `variance_r` is the angular rate white noise variance, `variance_w` the
/// variance of the bias random walk, and `w` the bias corrected angular rate.
#[must_use]
pub fn noise_covariance_matrix_6<T: RealField + Copy>(
    w: &Vector3<T>,
    variance_r: T,
    variance_w: T,
    dt: T,
) -> Matrix6<T> {
    let two: T = nalgebra::convert(2.0);
    let three: T = nalgebra::convert(3.0);

    let c = Coefficients::new(w.norm(), dt);
    let wx = cross_matrix(w);
    let wx2 = wx * wx;
    let dt2 = dt * dt;

    let q11 = Matrix3::from_diagonal_element(variance_r * dt + variance_w * dt2 * dt / three)
        + wx2 * (variance_w * c.quintic);
    let q12 = (Matrix3::from_diagonal_element(dt2 / two) - wx * c.x_minus_sin + wx2 * c.quartic) * -variance_w;
    let q22 = Matrix3::from_diagonal_element(variance_w * dt);

    let mut q = Matrix6::zeros();
    q.fixed_view_mut::<3, 3>(0, 0).copy_from(&q11);
    q.fixed_view_mut::<3, 3>(0, 3).copy_from(&q12);
    q.fixed_view_mut::<3, 3>(3, 0).copy_from(&q12.transpose());
    q.fixed_view_mut::<3, 3>(3, 3).copy_from(&q22);
    q
}
