use nalgebra::RealField;

/// Parameters for the [`EkfImu`](crate::EkfImu) and
/// [`EkfMarg`](crate::EkfMarg) filters.
///
/// The defaults describe a sensor at rest on the surface of the earth and
/// should rarely need to change.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EkfParameters<T> {
    /// Number of accepted samples per sensor stream that are averaged to
    /// compute the initial orientation.
    pub init_count: u32,
    /// Minimum accepted accelerometer norm, in m/s^2.
    ///
    /// Accelerometer samples outside of
    /// [`Self::min_acceleration`]..=[`Self::max_acceleration`] contain too
    /// much linear acceleration to be used as a gravity reference.
    pub min_acceleration: T,
    /// Maximum accepted accelerometer norm, in m/s^2.
    pub max_acceleration: T,
    /// Minimum accepted magnetometer norm, in µT.
    pub min_magnetic_field: T,
    /// Maximum accepted magnetometer norm, in µT.
    pub max_magnetic_field: T,
    /// Minimum sine of the angle between the measured magnetic field and the
    /// local up direction.
    ///
    /// A magnetic field closer to vertical than this carries no usable
    /// heading information.
    pub min_sin_z_mag: T,
}

impl<T: RealField + Copy> Default for EkfParameters<T> {
    fn default() -> Self {
        Self {
            init_count: 10,
            min_acceleration: nalgebra::convert(9.0),
            max_acceleration: nalgebra::convert(10.6),
            min_magnetic_field: nalgebra::convert(20.0),
            max_magnetic_field: nalgebra::convert(70.0),
            min_sin_z_mag: nalgebra::convert(0.1),
        }
    }
}

impl<T: RealField + Copy> EkfParameters<T> {
    /// Returns `true` if an accelerometer sample with the given norm can be
    /// used as a gravity reference.
    #[must_use]
    pub fn acceleration_suitable(&self, norm: T) -> bool {
        norm >= self.min_acceleration && norm <= self.max_acceleration
    }

    /// Returns `true` if a magnetometer sample with the given norm can be used
    /// as a heading reference.
    #[must_use]
    pub fn magnetic_field_suitable(&self, norm: T) -> bool {
        norm >= self.min_magnetic_field && norm <= self.max_magnetic_field
    }

    /// Returns `true` if the heading is observable, given the squared sine of
    /// the angle between the magnetic field and the up direction.
    #[must_use]
    pub fn heading_observable(&self, sin2: T) -> bool {
        sin2 > self.min_sin_z_mag * self.min_sin_z_mag
    }
}
