//! Predict and correct steps of the error-state Kalman recursion.

use nalgebra::{RealField, SMatrix, SVector};

use crate::{measurement::MeasurementModel, EkfError};

/// Result of fusing a measurement into the error state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction<T, const S: usize> {
    /// Estimated error state, to be injected into the nominal state.
    pub dx: SVector<T, S>,
    /// Posterior covariance.
    pub covariance: SMatrix<T, S, S>,
}

fn is_finite<T: RealField + Copy, const R: usize, const C: usize>(matrix: &SMatrix<T, R, C>) -> bool {
    matrix.iter().all(|value| value.is_finite())
}

/// Checks that `dt` is a positive, finite time step.
///
/// # Errors
///
/// Returns [`EkfError::InvalidTimeStep`] otherwise.
pub fn validate_time_step<T: RealField + Copy>(dt: T) -> Result<(), EkfError> {
    if dt.is_finite() && dt > T::zero() {
        Ok(())
    } else {
        Err(EkfError::InvalidTimeStep)
    }
}

/// Propagates `p` through the transition `phi` and adds the process noise `q`.
///
/// # Errors
///
/// Returns [`EkfError::NonFiniteState`] if the propagated covariance is not
/// finite.
pub fn predict<T: RealField + Copy, const S: usize>(
    p: &SMatrix<T, S, S>,
    phi: &SMatrix<T, S, S>,
    q: &SMatrix<T, S, S>,
) -> Result<SMatrix<T, S, S>, EkfError> {
    let covariance = phi * p * phi.transpose() + q;
    if !is_finite(&covariance) {
        return Err(EkfError::NonFiniteState);
    }
    Ok(covariance)
}

/// Fuses the linearized `model` into an error state with covariance `p`.
///
/// The gain is obtained from a Cholesky solve of the innovation covariance and
/// the covariance is updated in Joseph form, $P \leftarrow (I - KH) P (I -
/// KH)^T + K R K^T$, which stays symmetric positive semi-definite.
///
/// # Errors
///
/// Returns [`EkfError::SingularInnovation`] if $H P H^T + R$ is not positive
/// definite, and [`EkfError::NonFiniteState`] if the correction or the
/// posterior covariance is not finite.
pub fn correct<T: RealField + Copy, const M: usize, const S: usize>(
    p: &SMatrix<T, S, S>,
    model: &MeasurementModel<T, M, S>,
) -> Result<Correction<T, S>, EkfError> {
    let hp = model.h * p;
    let s = hp * model.h.transpose() + model.r;

    // K^T = S^-1 H P, since P and S are symmetric
    let k = s
        .cholesky()
        .ok_or(EkfError::SingularInnovation)?
        .solve(&hp)
        .transpose();

    let dx = k * model.residual();

    let i_kh = SMatrix::<T, S, S>::identity() - k * model.h;
    let covariance = i_kh * p * i_kh.transpose() + k * model.r * k.transpose();

    if !(is_finite(&dx) && is_finite(&covariance)) {
        return Err(EkfError::NonFiniteState);
    }

    Ok(Correction { dx, covariance })
}
