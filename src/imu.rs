//! Attitude estimation from a gyroscope and an accelerometer.

use log::{debug, info, warn};
use nalgebra::{Matrix3, RealField, UnitQuaternion, Vector3};

use crate::{
    accumulator::Accumulator,
    initializer::initial_quaternion,
    integrator::first_order_quaternion_integrator,
    kalman,
    linearization::{noise_covariance_matrix_3, state_transition_matrix_3},
    measurement::{MeasurementModel, Observation},
    quaternion::{apply_attitude_error, global_to_local, normalize},
    EkfError, EkfParameters,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum State<T: RealField + Copy> {
    Uninitialized {
        acceleration: Accumulator<T>,
    },
    Tracking {
        orientation: UnitQuaternion<T>,
        covariance: Matrix3<T>,
    },
}

/// Extended Kalman filter estimating the attitude of a body from a
/// gyroscope and an accelerometer.
///
/// The error state is the three dimensional attitude error. Heading is not
/// observable, the filter only keeps it from drifting through the
/// covariance.
///
/// The filter stays uninitialized until [`EkfParameters::init_count`]
/// accelerometer samples have been collected. Their mean defines the initial
/// orientation, with an arbitrary heading.
///
/// # Example
///
/// ```
/// use attitude_ekf::EkfImu;
/// use nalgebra::Vector3;
///
/// let mut filter = EkfImu::<f64>::default();
///
/// let gravity = Vector3::new(0.0, 0.0, 9.81);
/// for _ in 0..10 {
///     filter.update_accel(gravity, 1e-4, 1e-2)?;
/// }
/// assert!(filter.attitude().is_some());
///
/// let rate = Vector3::new(0.0, 0.0, 0.1);
/// filter.update_gyro(rate, rate, 1e-6, 0.01)?;
/// # Ok::<(), attitude_ekf::EkfError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EkfImu<T: RealField + Copy> {
    /// The parameters of the filter.
    parameters: EkfParameters<T>,
    state: State<T>,
}

impl<T: RealField + Copy> Default for EkfImu<T> {
    fn default() -> Self {
        Self::new(EkfParameters::default())
    }
}

impl<T: RealField + Copy> EkfImu<T> {
    /// Create a new, uninitialized filter with the given parameters.
    #[must_use]
    pub fn new(parameters: EkfParameters<T>) -> Self {
        Self {
            parameters,
            state: State::Uninitialized {
                acceleration: Accumulator::default(),
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

    /// The covariance of the attitude error, or `None` while the filter is
    /// uninitialized.
    #[must_use]
    pub fn covariance(&self) -> Option<Matrix3<T>> {
        match self.state {
            State::Tracking { covariance, .. } => Some(covariance),
            State::Uninitialized { .. } => None,
        }
    }

    /// Prediction step, using the angular rates `w0` and `w1` (rad/s) measured
    /// at the start and at the end of the time step `dt` (s).
    ///
    /// `variance` is the white noise variance of the angular rate. Does
    /// nothing while the filter is uninitialized.
    ///
    /// # Errors
    ///
    /// Returns [`EkfError::InvalidTimeStep`] if `dt` is not positive, or a
    /// numerical error if the propagated state is degenerate. The filter is
    /// left unchanged on error.
    pub fn update_gyro(&mut self, w0: Vector3<T>, w1: Vector3<T>, variance: T, dt: T) -> Result<(), EkfError> {
        kalman::validate_time_step(dt)?;

        let State::Tracking {
            orientation,
            covariance,
        } = &mut self.state
        else {
            return Ok(());
        };

        let predicted_orientation = normalize(first_order_quaternion_integrator(
            orientation.quaternion(),
            &w0,
            &w1,
            dt,
        ))?;

        let phi = state_transition_matrix_3(&w1, dt);
        let q = noise_covariance_matrix_3(variance, dt);
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
    /// global `y` axis, which bounds the heading uncertainty.
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

        match &mut self.state {
            State::Uninitialized { acceleration } => {
                acceleration.push(&a, self.parameters.init_count);
                Ok(self.try_initialize())
            }
            State::Tracking {
                orientation,
                covariance,
            } => {
                let y = global_to_local(orientation, &Vector3::y());
                let z = global_to_local(orientation, &Vector3::z());

                let model = MeasurementModel::<T, 6, 3>::new(&[
                    Observation::new(a / norm, z, variance),
                    Observation::regularizer(y, variance_direction),
                ]);
                let correction = kalman::correct(covariance, &model)?;
                let corrected = apply_attitude_error(orientation, &correction.dx)?;

                *orientation = corrected;
                *covariance = correction.covariance;
                Ok(true)
            }
        }
    }

    fn try_initialize(&mut self) -> bool {
        let State::Uninitialized { acceleration } = &mut self.state else {
            return false;
        };
        if !acceleration.is_full(self.parameters.init_count) {
            return false;
        }
        let Some(mean) = acceleration.mean() else {
            return false;
        };

        let norm = mean.norm();
        if !self.parameters.acceleration_suitable(norm) {
            warn!("mean acceleration norm {norm} out of range, restarting initialization");
            acceleration.reset();
            return false;
        }

        let orientation = initial_quaternion(&(mean / norm));
        info!("initialized attitude from {} accelerometer samples", acceleration.len());

        self.state = State::Tracking {
            orientation,
            covariance: Matrix3::zeros(),
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    use super::*;

    const GRAVITY: f64 = 9.81;

    fn initialized(q: &UnitQuaternion<f64>) -> EkfImu<f64> {
        let mut filter = EkfImu::default();
        let a = global_to_local(q, &Vector3::new(0.0, 0.0, GRAVITY));
        for _ in 0..10 {
            filter.update_accel(a, 1e-4, 1e-2).unwrap();
        }
        filter
    }

    #[test]
    fn initializes_after_init_count_samples() {
        let mut filter = EkfImu::<f64>::default();
        let a = Vector3::new(0.0, 0.0, GRAVITY);

        for _ in 0..9 {
            assert_eq!(filter.update_accel(a, 1e-4, 1e-2), Ok(false));
            assert_eq!(filter.attitude(), None);
        }
        assert_eq!(filter.update_accel(a, 1e-4, 1e-2), Ok(true));

        assert!(filter.is_initialized());
        assert_eq!(filter.covariance(), Some(Matrix3::zeros()));
    }

    #[test]
    fn rejected_samples_do_not_count_towards_initialization() {
        let mut filter = EkfImu::<f64>::default();

        for _ in 0..20 {
            assert_eq!(filter.update_accel(Vector3::new(0.0, 0.0, 2.0), 1e-4, 1e-2), Ok(false));
        }
        assert!(!filter.is_initialized());
    }

    #[test]
    fn initial_attitude_matches_gravity() {
        let truth = UnitQuaternion::from_euler_angles(0.3, -0.5, 0.0);
        let filter = initialized(&truth);

        let attitude = filter.attitude().unwrap();
        assert_relative_eq!(
            global_to_local(&attitude, &Vector3::z()),
            global_to_local(&truth, &Vector3::z()),
            epsilon = 1e-14
        );
    }

    #[test]
    fn gyro_is_ignored_until_initialized() {
        let mut filter = EkfImu::<f64>::default();
        let w = Vector3::new(0.1, 0.2, 0.3);

        assert_eq!(filter.update_gyro(w, w, 1e-4, 0.01), Ok(()));
        assert_eq!(filter, EkfImu::default());
    }

    #[test]
    fn invalid_time_step_is_rejected() {
        let mut filter = initialized(&UnitQuaternion::identity());
        let before = filter;
        let w = Vector3::new(0.1, 0.2, 0.3);

        for dt in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            assert_eq!(filter.update_gyro(w, w, 1e-4, dt), Err(EkfError::InvalidTimeStep));
        }
        assert_eq!(filter, before);
    }

    #[test]
    fn gyro_integrates_rotation() {
        let mut filter = initialized(&UnitQuaternion::identity());
        let start = filter.attitude().unwrap();
        let w = Vector3::new(0.0, 0.0, 0.5);

        for _ in 0..100 {
            filter.update_gyro(w, w, 1e-4, 0.01).unwrap();
        }

        let expected = start * UnitQuaternion::from_scaled_axis(w);
        assert_relative_eq!(filter.attitude().unwrap(), expected, epsilon = 1e-12);

        let covariance = filter.covariance().unwrap();
        assert_relative_eq!(covariance, Matrix3::identity() * 1e-4, epsilon = 1e-15);
    }

    #[test]
    fn accelerometer_corrects_tilt() {
        let truth = UnitQuaternion::from_euler_angles(0.2, 0.1, 0.0);
        let mut filter = initialized(&UnitQuaternion::identity());
        let a = global_to_local(&truth, &Vector3::new(0.0, 0.0, GRAVITY));

        for _ in 0..500 {
            filter.update_gyro(Vector3::zeros(), Vector3::zeros(), 1e-2, 0.01).unwrap();
            assert_eq!(filter.update_accel(a, 1e-3, 1e-2), Ok(true));
        }

        let attitude = filter.attitude().unwrap();
        assert_relative_eq!(
            global_to_local(&attitude, &Vector3::z()),
            global_to_local(&truth, &Vector3::z()),
            epsilon = 1e-9
        );
    }

    #[test]
    fn out_of_range_sample_leaves_state_unchanged() {
        let mut filter = initialized(&UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3));
        let w = Vector3::new(0.3, -0.1, 0.2);
        filter.update_gyro(w, w, 1e-4, 0.01).unwrap();
        let before = filter;

        for a in [
            Vector3::new(0.0, 0.0, 8.0),
            Vector3::new(0.0, 11.0, 0.0),
            Vector3::new(f64::NAN, 0.0, 9.81),
        ] {
            assert_eq!(filter.update_accel(a, 1e-4, 1e-2), Ok(false));
        }
        assert_eq!(filter, before);
    }

    #[test]
    fn attitude_stays_normalized() {
        let mut filter = initialized(&UnitQuaternion::identity());

        for i in 0..2000 {
            let t = f64::from(i) * 0.01;
            let w0 = Vector3::new(t.sin(), 0.5 * t.cos(), 0.3);
            let w1 = Vector3::new((t + 0.01).sin(), 0.5 * (t + 0.01).cos(), 0.3);
            filter.update_gyro(w0, w1, 1e-4, 0.01).unwrap();
            let a = global_to_local(&filter.attitude().unwrap(), &Vector3::new(0.05, -0.02, GRAVITY));
            filter.update_accel(a, 1e-2, 1e-1).unwrap();

            assert_relative_eq!(filter.attitude().unwrap().quaternion().norm(), 1.0, epsilon = 1e-15);
        }
    }
}
