//! Errors reported by the attitude filters and attitude determination.

use thiserror::Error;

/// Errors that can occur while running an attitude filter or solving for an
/// attitude.
///
/// Samples rejected by the validity gates are not errors, they are reported as
/// `Ok(false)` by the update methods. An [`EkfError`] always means the call had
/// no effect on the filter state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EkfError {
    /// The time step passed to a gyroscope update is not a positive finite
    /// number.
    #[error("time step must be positive and finite")]
    InvalidTimeStep,

    /// The innovation covariance $S = H P H^T + R$ is not positive definite.
    #[error("innovation covariance is not positive definite")]
    SingularInnovation,

    /// A quaternion with a zero or non-finite norm was about to be
    /// normalized.
    #[error("quaternion norm is zero or not finite")]
    DegenerateQuaternion,

    /// The propagated covariance or bias contains non-finite values.
    #[error("filter state is not finite")]
    NonFiniteState,

    /// Observation, reference and weight slices have different lengths.
    #[error("observations ({observations}), references ({references}) and weights ({weights}) differ in length")]
    ObservationCountMismatch {
        /// Number of observed vectors.
        observations: usize,
        /// Number of reference vectors.
        references: usize,
        /// Number of weights.
        weights: usize,
    },

    /// Fewer than two vector observations were supplied.
    #[error("at least 2 observations are required, got {0}")]
    TooFewObservations(usize),

    /// Newton-Raphson iteration for the largest eigenvalue did not converge.
    #[error("largest eigenvalue not found")]
    EigenvalueNotFound,
}
