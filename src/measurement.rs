//! Stacked vector observation models.
//!
//! Every observation compares a measured direction in the body frame with the
//! direction predicted from the current orientation. For a body side attitude
//! error $\delta\theta$ the prediction changes by $[h_x\times]\delta\theta$, so
//! each observation contributes the cross-product matrix of its prediction to
//! the attitude columns of $H$. Gyroscope bias columns stay zero.

use nalgebra::{RealField, SMatrix, SVector, Vector3};

use crate::linearization::cross_matrix;

/// A single direction observation in the body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<T> {
    /// The measured direction.
    pub measurement: Vector3<T>,
    /// The direction predicted by the current orientation estimate.
    pub prediction: Vector3<T>,
    /// Isotropic variance of the measurement.
    pub variance: T,
}

impl<T: RealField + Copy> Observation<T> {
    /// Creates an observation of `measurement`, predicted as `prediction`.
    #[must_use]
    pub fn new(measurement: Vector3<T>, prediction: Vector3<T>, variance: T) -> Self {
        Self {
            measurement,
            prediction,
            variance,
        }
    }

    /// Creates an observation with zero innovation along `direction`.
    ///
    /// It leaves the state estimate untouched but shrinks the covariance of
    /// the attitude error around the axes orthogonal to `direction`.
    #[must_use]
    pub fn regularizer(direction: Vector3<T>, variance: T) -> Self {
        Self::new(direction, direction, variance)
    }
}

/// Linearized model of `N` stacked observations, with `M = 3 * N` measurement
/// rows and `S` error-state columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementModel<T, const M: usize, const S: usize> {
    /// Stacked measurements.
    pub z: SVector<T, M>,
    /// Stacked predictions.
    pub hx: SVector<T, M>,
    /// Measurement Jacobian with respect to the error state.
    pub h: SMatrix<T, M, S>,
    /// Block diagonal measurement noise covariance.
    pub r: SMatrix<T, M, M>,
}

impl<T: RealField + Copy, const M: usize, const S: usize> MeasurementModel<T, M, S> {
    /// Stacks `observations` in order.
    #[must_use]
    pub fn new<const N: usize>(observations: &[Observation<T>; N]) -> Self {
        const { assert!(M == 3 * N && S >= 3) };

        let mut model = Self {
            z: SVector::zeros(),
            hx: SVector::zeros(),
            h: SMatrix::zeros(),
            r: SMatrix::zeros(),
        };

        for (i, observation) in observations.iter().enumerate() {
            let row = 3 * i;
            model.z.fixed_rows_mut::<3>(row).copy_from(&observation.measurement);
            model.hx.fixed_rows_mut::<3>(row).copy_from(&observation.prediction);
            model
                .h
                .fixed_view_mut::<3, 3>(row, 0)
                .copy_from(&cross_matrix(&observation.prediction));
            model
                .r
                .fixed_view_mut::<3, 3>(row, row)
                .fill_diagonal(observation.variance);
        }

        model
    }

    /// The innovation $z - h(x)$.
    #[must_use]
    pub fn residual(&self) -> SVector<T, M> {
        self.z - self.hx
    }
}
