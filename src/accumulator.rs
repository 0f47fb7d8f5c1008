//! Module implementing the arithmetic mean of initialization samples.

use nalgebra::{RealField, Vector3};

/// Running sum of up to `capacity` vector samples.
///
/// Once full, further samples are ignored until [`Self::reset`] is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accumulator<T> {
    /// The sum of all accepted samples.
    sum: Vector3<T>,
    /// The number of samples accepted by this accumulator.
    sample_count: u32,
}

impl<T: RealField + Copy> Default for Accumulator<T> {
    fn default() -> Self {
        Self {
            sum: Vector3::zeros(),
            sample_count: 0,
        }
    }
}

impl<T: RealField + Copy> Accumulator<T> {
    /// Adds `sample` unless `capacity` samples have already been accepted.
    pub fn push(&mut self, sample: &Vector3<T>, capacity: u32) {
        if self.sample_count < capacity {
            self.sum += sample;
            self.sample_count += 1;
        }
    }

    /// Returns `true` once `capacity` samples have been accepted.
    #[must_use]
    pub fn is_full(&self, capacity: u32) -> bool {
        self.sample_count >= capacity
    }

    /// The number of accepted samples.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.sample_count
    }

    /// Returns `true` if no sample has been accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Arithmetic mean of the accepted samples, or `None` if there are none.
    #[must_use]
    pub fn mean(&self) -> Option<Vector3<T>> {
        if self.is_empty() {
            return None;
        }
        Some(self.sum / nalgebra::convert::<f64, T>(f64::from(self.sample_count)))
    }

    /// Discards all accepted samples.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
