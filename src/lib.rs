//! An implementation of a quaternion based extended Kalman filter for
//! attitude estimation.
//!
//! Two filters are provided:
//!
//! - [`EkfImu`] fuses a gyroscope with an accelerometer and estimates the
//!   attitude. The heading is unobservable and only kept from drifting.
//! - [`EkfMarg`] additionally fuses a magnetometer and estimates the
//!   gyroscope bias next to the attitude.
//!
//! Both filters are error-state filters: the orientation is kept as a unit
//! quaternion, while the covariance describes a small rotation error applied
//! on the body side. They initialize themselves from the mean of the first
//! accelerometer (and magnetometer) samples and then alternate prediction
//! with gyroscope samples and correction with reference vector samples.
//!
//! The [`quest_attitude`] function solves for an attitude from a single set
//! of vector observations.
//!
//! All types are generic over the scalar type, both `f32` and `f64` are
//! supported.

mod accumulator;
pub mod determination;
mod error;
mod imu;
pub mod initializer;
pub mod integrator;
pub mod kalman;
pub mod linearization;
mod marg;
pub mod measurement;
mod parameters;
pub mod quaternion;

pub use determination::quest_attitude;
pub use error::EkfError;
pub use imu::EkfImu;
pub use marg::EkfMarg;
pub use measurement::{MeasurementModel, Observation};
pub use parameters::EkfParameters;
