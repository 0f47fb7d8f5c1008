//! Attitude and gyroscope bias estimation from a gyroscope, an accelerometer
//! and a magnetometer.

use log::{debug, info, warn};
use nalgebra::{Matrix6, RealField, UnitQuaternion, Vector3};

use crate::{
    accumulator::Accumulator,
    initializer::initial_quaternion_with_field,
    integrator::first_order_quaternion_integrator,
    kalman,
    linearization::{noise_covariance_matrix_6, state_transition_matrix_6},
    measurement::{MeasurementModel, Observation},
    quaternion::{apply_attitude_error, global_to_local, normalize},
    EkfError, EkfParameters,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State<T: RealField + Copy> {
    Uninitialized {
        acceleration: Accumulator<T>,
        magnetic_field: Accumulator<T>,
    },
    Tracking {
        orientation: UnitQuaternion<T>,
        bias: Vector3<T>,
        covariance: Matrix6<T>,
    },
}

/// Extended Kalman filter estimating the attitude of a body and the bias of
/// its gyroscope from a gyroscope, an accelerometer and a magnetometer.
///
/// The error state holds the attitude error followed by the gyroscope bias
/// error. The global frame has `z` pointing up and `y` along the horizontal
/// component of the magnetic field.
///
/// # Example
///
/// ```
/// use attitude_ekf::EkfMarg;
/// use nalgebra::Vector3;
///
/// let mut filter = EkfMarg::<f64>::default();
///
/// let gravity = Vector3::new(0.0, 0.0, 9.81);
/// let field = Vector3::new(0.0, 20.0, -40.0);
/// for _ in 0..10 {
///     filter.update_accel_mag(gravity, field, 1e-4, 1e-4)?;
/// }
///
/// let rate = Vector3::new(0.01, 0.0, 0.0);
/// filter.update_gyro(rate, rate, 1e-6, 1e-10, 0.01)?;
///
/// assert!(filter.attitude().is_some());
/// assert!(filter.bias().is_some());
/// # Ok::<(), attitude_ekf::EkfError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EkfMarg<T: RealField + Copy> {
    /// The parameters of the filter.
    parameters: EkfParameters<T>,
    state: State<T>,
}

impl<T: RealField + Copy> Default for EkfMarg<T> {
    fn default() -> Self {
        Self::new(EkfParameters::default())
    }
}

impl<T: RealField + Copy> EkfMarg<T> {
    /// Create a new, uninitialized filter with the given parameters.
    #[must_use]
    pub fn new(parameters: EkfParameters<T>) -> Self {
        Self {
            parameters,
            state: State::Uninitialized {
                acceleration: Accumulator::default(),
                magnetic_field: Accumulator::default(),
            },
        }
    }

    /// The parameters of the filter.
    #[must_use]
    pub fn parameters(&self) -> &EkfParameters<T> {
        &self.parameters
    }

    /// Returns `true` once the initial orientation has been computed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Tracking { .. })
    }

    /// The estimated orientation, rotating body vectors into the global
    /// frame, or `None` while the filter is uninitialized.
    #[must_use]
    pub fn attitude(&self) -> Option<UnitQuaternion<T>> {
        match self.state {
            State::Tracking { orientation, .. } => Some(orientation),
            State::Uninitialized { .. } => None,
        }
    }

    /// The estimated gyroscope bias in rad/s, or `None` while the filter is
    /// uninitialized.
    #[must_use]
    pub fn bias(&self) -> Option<Vector3<T>> {
        match self.state {
            State::Tracking { bias, .. } => Some(bias),
            State::Uninitialized { .. } => None,
        }
    }

    /// The covariance of the attitude and bias errors, or `None` while the
    /// filter is uninitialized.
    #[must_use]
    pub fn covariance(&self) -> Option<Matrix6<T>> {
        match self.state {
            State::Tracking { covariance, .. } => Some(covariance),
            State::Uninitialized { .. } => None,
        }
    }

    /// Prediction step, using the angular rates `w0` and `w1` (rad/s) measured
    /// at the start and at the end of the time step `dt` (s).
    ///
    /// The current bias estimate is removed from both rates. `variance_r` is
    /// the white noise variance of the angular rate and `variance_w` the
    /// variance of the bias random walk. Does nothing while the filter is
    /// uninitialized.
    ///
    /// # Errors
    ///
    /// Returns [`EkfError::InvalidTimeStep`] if `dt` is not positive, or a
    /// numerical error if the propagated state is degenerate. The filter is
    /// left unchanged on error.
    pub fn update_gyro(
        &mut self,
        w0: Vector3<T>,
        w1: Vector3<T>,
        variance_r: T,
        variance_w: T,
        dt: T,
    ) -> Result<(), EkfError> {
        kalman::validate_time_step(dt)?;

        let State::Tracking {
            orientation,
            bias,
            covariance,
        } = &mut self.state
        else {
            return Ok(());
        };

        let w0 = w0 - *bias;
        let w1 = w1 - *bias;

        let predicted_orientation = normalize(first_order_quaternion_integrator(
            orientation.quaternion(),
            &w0,
            &w1,
            dt,
        ))?;

        let phi = state_transition_matrix_6(&w1, dt);
        let q = noise_covariance_matrix_6(&w1, variance_r, variance_w, dt);
        let predicted_covariance = kalman::predict(covariance, &phi, &q)?;

        *orientation = predicted_orientation;
        *covariance = predicted_covariance;
        Ok(())
    }

    /// Correction step, using the accelerometer sample `a` (m/s^2) as a
    /// measurement of the up direction.
    ///
    /// `variance` is the variance of the normalized accelerometer direction.
    /// `variance_direction` weights a zero innovation observation of the
    /// global `y` axis.
    ///
    /// Returns `Ok(true)` if the sample was fused or completed the
    /// initialization, and `Ok(false)` if it was rejected or stored for the
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns a numerical error if the correction is degenerate. The filter
    /// is left unchanged on error.
    pub fn update_accel(&mut self, a: Vector3<T>, variance: T, variance_direction: T) -> Result<bool, EkfError> {
        let norm = a.norm();
        if !self.parameters.acceleration_suitable(norm) {
            debug!("rejecting accelerometer sample with norm {norm}");
            return Ok(false);
        }

        let Some(orientation) = self.attitude() else {
            return Ok(self.accumulate(Some(&a), None));
        };

        let y = global_to_local(&orientation, &Vector3::y());
        let z = global_to_local(&orientation, &Vector3::z());

        self.correct(&MeasurementModel::new(&[
            Observation::new(a / norm, z, variance),
            Observation::regularizer(y, variance_direction),
        ]))?;
        Ok(true)
    }

    /// Correction step, using the magnetometer sample `m` (µT) as a
    /// measurement of the heading.
    ///
    /// Only the horizontal direction of the field is used. `variance` is
    /// scaled by the inverse squared sine of the angle between the field and
    /// the up direction. `variance_direction` weights a zero innovation
    /// observation of the up direction.
    ///
    /// Returns `Ok(true)` if the sample was fused or completed the
    /// initialization, and `Ok(false)` if it was rejected or stored for the
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns a numerical error if the correction is degenerate. The filter
    /// is left unchanged on error.
    pub fn update_mag(&mut self, m: Vector3<T>, variance: T, variance_direction: T) -> Result<bool, EkfError> {
        let norm = m.norm();
        if !self.parameters.magnetic_field_suitable(norm) {
            debug!("rejecting magnetometer sample with norm {norm}");
            return Ok(false);
        }

        let Some(orientation) = self.attitude() else {
            return Ok(self.accumulate(None, Some(&m)));
        };

        let y = global_to_local(&orientation, &Vector3::y());
        let z = global_to_local(&orientation, &Vector3::z());
        let Some((heading, sin2)) = self.heading(&(m / norm), &z) else {
            return Ok(false);
        };

        self.correct(&MeasurementModel::new(&[
            Observation::new(heading, y, variance / sin2),
            Observation::regularizer(z, variance_direction),
        ]))?;
        Ok(true)
    }

    /// Correction step, fusing the accelerometer sample `a` (m/s^2) and the
    /// magnetometer sample `m` (µT) at once.
    ///
    /// The sample pair is rejected if either sample is out of range or the
    /// heading is not observable.
    ///
    /// Returns `Ok(true)` if the samples were fused or completed the
    /// initialization, and `Ok(false)` if they were rejected or stored for the
    /// initialization.
    ///
    /// # Errors
    ///
    /// Returns a numerical error if the correction is degenerate. The filter
    /// is left unchanged on error.
    pub fn update_accel_mag(
        &mut self,
        a: Vector3<T>,
        m: Vector3<T>,
        a_variance: T,
        m_variance: T,
    ) -> Result<bool, EkfError> {
        let a_norm = a.norm();
        let m_norm = m.norm();
        if !self.parameters.acceleration_suitable(a_norm) {
            debug!("rejecting accelerometer sample with norm {a_norm}");
            return Ok(false);
        }
        if !self.parameters.magnetic_field_suitable(m_norm) {
            debug!("rejecting magnetometer sample with norm {m_norm}");
            return Ok(false);
        }

        let Some(orientation) = self.attitude() else {
            return Ok(self.accumulate(Some(&a), Some(&m)));
        };

        let y = global_to_local(&orientation, &Vector3::y());
        let z = global_to_local(&orientation, &Vector3::z());
        let Some((heading, sin2)) = self.heading(&(m / m_norm), &z) else {
            return Ok(false);
        };

        self.correct(&MeasurementModel::new(&[
            Observation::new(heading, y, m_variance / sin2),
            Observation::new(a / a_norm, z, a_variance),
        ]))?;
        Ok(true)
    }

    /// Horizontal direction of the normalized field `m` in the body frame,
    /// with the squared sine of its angle to the local up direction `z`.
    fn heading(&self, m: &Vector3<T>, z: &Vector3<T>) -> Option<(Vector3<T>, T)> {
        let east = m.cross(z);
        let sin2 = east.norm_squared();
        if !self.parameters.heading_observable(sin2) {
            debug!("rejecting magnetometer sample, heading not observable");
            return None;
        }
        Some((z.cross(&east).normalize(), sin2))
    }

    fn correct(&mut self, model: &MeasurementModel<T, 6, 6>) -> Result<(), EkfError> {
        let State::Tracking {
            orientation,
            bias,
            covariance,
        } = &mut self.state
        else {
            return Ok(());
        };

        let correction = kalman::correct(covariance, model)?;
        let attitude_error = correction.dx.fixed_rows::<3>(0).into_owned();
        let bias_error = correction.dx.fixed_rows::<3>(3).into_owned();

        let corrected = apply_attitude_error(orientation, &attitude_error)?;

        *orientation = corrected;
        *bias += bias_error;
        *covariance = correction.covariance;
        Ok(())
    }

    /// Stores initialization samples and initializes the filter once every
    /// stream is complete.
    fn accumulate(&mut self, a: Option<&Vector3<T>>, m: Option<&Vector3<T>>) -> bool {
        let init_count = self.parameters.init_count;
        let State::Uninitialized {
            acceleration,
            magnetic_field,
        } = &mut self.state
        else {
            return false;
        };

        if let Some(a) = a {
            acceleration.push(a, init_count);
        }
        if let Some(m) = m {
            magnetic_field.push(m, init_count);
        }
        if !(acceleration.is_full(init_count) && magnetic_field.is_full(init_count)) {
            return false;
        }
        let (Some(a), Some(m)) = (acceleration.mean(), magnetic_field.mean()) else {
            return false;
        };

        let a_norm = a.norm();
        let m_norm = m.norm();
        let a = a / a_norm;
        let m = m / m_norm;
        if !(self.parameters.acceleration_suitable(a_norm)
            && self.parameters.magnetic_field_suitable(m_norm)
            && self.parameters.heading_observable(m.cross(&a).norm_squared()))
        {
            warn!("mean acceleration {a_norm} and magnetic field {m_norm} unusable, restarting initialization");
            acceleration.reset();
            magnetic_field.reset();
            return false;
        }

        info!(
            "initialized attitude from {} accelerometer and {} magnetometer samples",
            acceleration.len(),
            magnetic_field.len()
        );

        self.state = State::Tracking {
            orientation: initial_quaternion_with_field(&a, &m),
            bias: Vector3::zeros(),
            covariance: Matrix6::zeros(),
        };
        true
    }
}
