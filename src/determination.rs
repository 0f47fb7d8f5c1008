//! Single frame attitude determination from vector observations.
//!
//! Solves Wahba's problem with the QUEST algorithm: the optimal attitude is
//! the eigenvector of Davenport's $K$ matrix for its largest eigenvalue
//! $\lambda$, obtained in closed form from the Gibbs vector. Rotations close
//! to 180 degrees make that form singular, so the references are also
//! rotated by 180 degrees about each axis and the best conditioned solution
//! is kept.

use nalgebra::{Matrix3, Quaternion, RealField, UnitQuaternion, Vector3};

use crate::{quaternion::normalize, EkfError};

/// Convergence threshold of the Newton-Raphson eigenvalue search.
const EIGENVALUE_ACCURACY: f64 = 1e-5;

/// Maximum number of Newton-Raphson iterations.
const MAX_ITERATIONS: usize = 15;

/// Adjugate (transposed cofactor matrix) of `m`.
fn adjugate<T: RealField + Copy>(m: &Matrix3<T>) -> Matrix3<T> {
    Matrix3::new(
        m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
        m[(0, 2)] * m[(2, 1)] - m[(0, 1)] * m[(2, 2)],
        m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
        m[(1, 2)] * m[(2, 0)] - m[(1, 0)] * m[(2, 2)],
        m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
        m[(0, 2)] * m[(1, 0)] - m[(0, 0)] * m[(1, 2)],
        m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        m[(0, 1)] * m[(2, 0)] - m[(0, 0)] * m[(2, 1)],
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
    )
}

/// Attitude profile matrix $B = \sum_i w_i o_i r_i^T$ with its Davenport
/// decomposition.
struct Profile<T> {
    /// $\mathrm{tr}(B)$
    sigma: T,
    /// $B + B^T$
    s: Matrix3<T>,
    z: Vector3<T>,
}

impl<T: RealField + Copy> Profile<T> {
    fn new(b: &Matrix3<T>) -> Self {
        Self {
            sigma: b.trace(),
            s: b + b.transpose(),
            z: Vector3::new(
                b[(1, 2)] - b[(2, 1)],
                b[(2, 0)] - b[(0, 2)],
                b[(0, 1)] - b[(1, 0)],
            ),
        }
    }

    /// Largest eigenvalue of $K$, by Newton-Raphson on its characteristic
    /// polynomial starting from the noise free value 1.
    fn largest_eigenvalue(&self) -> Result<T, EkfError> {
        let two: T = nalgebra::convert(2.0);
        let four: T = nalgebra::convert(4.0);
        let accuracy: T = nalgebra::convert(EIGENVALUE_ACCURACY);

        let sigma = self.s.trace() / two;
        let kappa = adjugate(&self.s).trace();
        let delta = self.s.determinant();
        let sz = self.s * self.z;

        let a = sigma * sigma - kappa;
        let b = sigma * sigma + self.z.dot(&self.z);
        let c = delta + self.z.dot(&sz);
        let d = self.z.dot(&(self.s * sz));

        let c0 = -a - b;
        let c1 = -c;
        let c2 = a * b + c * sigma - d;

        let mut lambda = T::one();
        for _ in 0..MAX_ITERATIONS {
            let f = ((lambda * lambda + c0) * lambda + c1) * lambda + c2;
            let df = (four * lambda * lambda + two * c0) * lambda + c1;
            let step = f / df;
            lambda -= step;
            if step.abs() <= accuracy && f.abs() <= accuracy {
                return Ok(lambda);
            }
        }
        Err(EkfError::EigenvalueNotFound)
    }

    /// Unnormalized optimal quaternion for the eigenvalue `lambda`.
    fn quaternion(&self, lambda: T) -> Quaternion<T> {
        let m = Matrix3::from_diagonal_element(lambda + self.sigma) - self.s;
        let adj = adjugate(&m);
        Quaternion::from_parts(m.determinant(), adj * self.z)
    }
}

/// Largest eigenvalue for two observations with normalized weights `w0` and
/// `w1`.
fn two_observation_eigenvalue<T: RealField + Copy>(
    observations: [Vector3<T>; 2],
    references: [Vector3<T>; 2],
    w0: T,
    w1: T,
) -> T {
    let two: T = nalgebra::convert(2.0);
    let cos = references[0].dot(&references[1]) * observations[0].dot(&observations[1])
        + references[0].cross(&references[1]).norm() * observations[0].cross(&observations[1]).norm();
    (w0 * w0 + two * w0 * w1 * cos + w1 * w1).sqrt()
}

/// Computes the attitude `q` that best maps each reference direction onto
/// the corresponding observed direction, in the sense that
/// `observations[i]` is close to `q.inverse() * references[i]`.
///
/// References are given in the global frame and observations in the body
/// frame. Vectors need not be normalized. Each pair is weighted by the square
/// of its weight, relative to the other pairs.
///
/// # Errors
///
/// Returns [`EkfError::ObservationCountMismatch`] if the slices differ in
/// length, [`EkfError::TooFewObservations`] for less than two pairs,
/// [`EkfError::EigenvalueNotFound`] if the eigenvalue search does not
/// converge, and [`EkfError::DegenerateQuaternion`] if the vectors do not
/// determine an attitude.
///
/// # Example
///
/// ```
/// use attitude_ekf::quest_attitude;
/// use nalgebra::{UnitQuaternion, Vector3};
///
/// let truth = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
/// let references = [Vector3::z(), Vector3::new(0.0, 1.0, -2.0)];
/// let observations = references.map(|r| truth.inverse() * r);
///
/// let q = quest_attitude(&observations, &references, &[1.0, 1.0])?;
/// assert!(q.angle_to(&truth) < 1e-9);
/// # Ok::<(), attitude_ekf::EkfError>(())
/// ```
pub fn quest_attitude<T: RealField + Copy>(
    observations: &[Vector3<T>],
    references: &[Vector3<T>],
    weights: &[T],
) -> Result<UnitQuaternion<T>, EkfError> {
    let count = observations.len();
    if references.len() != count || weights.len() != count {
        return Err(EkfError::ObservationCountMismatch {
            observations: count,
            references: references.len(),
            weights: weights.len(),
        });
    }
    if count < 2 {
        return Err(EkfError::TooFewObservations(count));
    }

    let total = weights.iter().fold(T::zero(), |sum, &w| sum + w * w);

    let mut b = Matrix3::zeros();
    for ((observation, reference), &w) in observations.iter().zip(references).zip(weights) {
        b += observation.normalize() * reference.normalize().transpose() * (w * w / total);
    }

    let lambda = if count == 2 {
        two_observation_eigenvalue(
            [observations[0].normalize(), observations[1].normalize()],
            [references[0].normalize(), references[1].normalize()],
            weights[0] * weights[0] / total,
            weights[1] * weights[1] / total,
        )
    } else {
        Profile::new(&b).largest_eigenvalue()?
    };

    let one = T::one();
    let zero = T::zero();
    let candidates = [
        (Quaternion::identity(), Vector3::new(one, one, one)),
        (Quaternion::new(zero, one, zero, zero), Vector3::new(one, -one, -one)),
        (Quaternion::new(zero, zero, one, zero), Vector3::new(-one, one, -one)),
        (Quaternion::new(zero, zero, zero, one), Vector3::new(-one, -one, one)),
    ];

    let mut best: Option<(T, Quaternion<T>, Quaternion<T>)> = None;
    for (rotation, signs) in candidates {
        // references rotated by 180 degrees about one axis
        let rotated = b * Matrix3::from_diagonal(&signs);
        let q = Profile::new(&rotated).quaternion(lambda);
        let norm = q.norm();
        let better = match best {
            Some((best_norm, ..)) => norm > best_norm,
            None => true,
        };
        if better {
            best = Some((norm, rotation, q));
        }
    }

    let Some((_, rotation, q)) = best else {
        return Err(EkfError::DegenerateQuaternion);
    };
    Ok(UnitQuaternion::new_unchecked(rotation * normalize(q)?.into_inner()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{Quaternion, UnitQuaternion, Vector3};

    use super::*;

    fn references() -> [Vector3<f64>; 3] {
        [
            Vector3::new(-2.0, 3.0, -4.0),
            Vector3::new(2.0, 3.0, -4.0),
            Vector3::new(-2.0, -3.0, -4.0),
        ]
    }

    fn rotations() -> [UnitQuaternion<f64>; 5] {
        [
            UnitQuaternion::from_quaternion(Quaternion::new(4.0, 1.0, -2.0, 3.0)),
            UnitQuaternion::from_quaternion(Quaternion::new(0.0, 1.0, 0.0, 0.0)),
            UnitQuaternion::from_quaternion(Quaternion::new(0.0, 0.0, 1.0, 0.0)),
            UnitQuaternion::from_quaternion(Quaternion::new(0.0, 0.0, 0.0, 1.0)),
            UnitQuaternion::identity(),
        ]
    }

    #[test]
    fn two_observations() {
        let references = &references()[..2];
        for truth in rotations() {
            let observations: Vec<_> = references.iter().map(|r| truth.inverse() * *r).collect();

            let q = quest_attitude(&observations, references, &[0.5, 0.5]).unwrap();

            assert_relative_eq!(q, truth, epsilon = 1e-12);
        }
    }

    #[test]
    fn three_observations() {
        let references = references();
        for truth in rotations() {
            let observations = references.map(|r| truth.inverse() * r);

            let q = quest_attitude(&observations, &references, &[0.5, 0.5, 0.5]).unwrap();

            assert_relative_eq!(q, truth, epsilon = 1e-12);
        }
    }

    #[test]
    fn noisy_observations() {
        let truth = UnitQuaternion::from_euler_angles(0.7, -0.3, 1.9);
        let references = references();
        let noise = [
            Vector3::new(0.01, -0.02, 0.0),
            Vector3::new(0.0, 0.015, -0.01),
            Vector3::new(-0.01, 0.0, 0.02),
        ];
        let observations: Vec<_> = references
            .iter()
            .zip(noise)
            .map(|(r, n)| truth.inverse() * r.normalize() + n)
            .collect();

        let q = quest_attitude(&observations, &references, &[1.0, 1.0, 1.0]).unwrap();

        assert!(q.angle_to(&truth) < 0.02);
    }

    #[test]
    fn weights_are_relative() {
        let truth = UnitQuaternion::from_euler_angles(0.2, 0.1, -0.4);
        let references = references();
        let observations = [
            truth.inverse() * references[0] + Vector3::new(0.1, 0.0, 0.0),
            truth.inverse() * references[1],
            truth.inverse() * references[2],
        ];

        let a = quest_attitude(&observations, &references, &[1.0, 2.0, 3.0]).unwrap();
        let b = quest_attitude(&observations, &references, &[10.0, 20.0, 30.0]).unwrap();

        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let references = references();

        assert_eq!(
            quest_attitude(&references[..2], &references, &[1.0, 1.0]),
            Err(EkfError::ObservationCountMismatch {
                observations: 2,
                references: 3,
                weights: 2,
            })
        );
        assert_eq!(
            quest_attitude(&references[..1], &references[..1], &[1.0]),
            Err(EkfError::TooFewObservations(1))
        );
        assert_eq!(
            quest_attitude(&[Vector3::zeros(); 2], &references[..2], &[1.0, 1.0]),
            Err(EkfError::DegenerateQuaternion)
        );
    }

    #[test]
    fn adjugate_is_scaled_inverse() {
        let m = Matrix3::new(2.0, -1.0, 0.5, 0.3, 4.0, -2.0, 1.0, 0.0, 3.0);
        assert_relative_eq!(adjugate(&m) * m, Matrix3::identity() * m.determinant(), epsilon = 1e-12);
    }
}
