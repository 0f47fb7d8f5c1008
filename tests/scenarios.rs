use approx::assert_relative_eq;
use attitude_ekf::{quaternion::global_to_local, EkfError, EkfImu, EkfMarg};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

#[test]
fn imu_rotation_about_gravity() -> Result<(), EkfError> {
    let axis = Vector3::new(3.0, 5.0, 8.0).normalize();
    let mut filter = EkfImu::<f64>::default();

    for _ in 0..100 {
        filter.update_accel(axis * 9.8, 1e-4, 1e-4)?;
        filter.update_gyro(axis * 0.2, axis * 0.3, 1e-4, 0.01)?;
        filter.update_gyro(axis * 0.3, axis * 0.2, 1e-4, 0.01)?;
    }

    let q = *filter.attitude().expect("filter should be initialized").quaternion();
    let q = if q.w < 0.0 { -q } else { q };
    let expected = Quaternion::new(
        0.828_229_377_846_810_7,
        0.153_083_694_947_164_17,
        -0.269_266_344_945_741_94,
        -0.467_008_688_883_161_16,
    );

    assert_relative_eq!(q.coords, expected.coords, epsilon = 1e-13);
    Ok(())
}

#[test]
fn imu_initialization_threshold() -> Result<(), EkfError> {
    let mut filter = EkfImu::<f64>::default();
    let a = Vector3::new(0.3, -0.2, 9.8);

    for _ in 0..9 {
        filter.update_accel(a, 1e-4, 1e-4)?;
    }
    assert_eq!(filter.attitude(), None);

    filter.update_accel(a, 1e-4, 1e-4)?;
    assert!(filter.attitude().is_some());
    Ok(())
}

#[test]
fn marg_bias_converges() -> Result<(), EkfError> {
    let bias_direction = Vector3::new(3.0, 5.0, 8.0).normalize();
    let bias = bias_direction * 0.01;
    let rate = Vector3::new(-2.0, 1.0, 3.0).normalize() * 0.5;
    let gravity = Vector3::new(0.0, 0.0, 9.8);
    let field = Vector3::new(0.0, 20.0, -40.0);
    let dt = 0.01;

    let mut truth = UnitQuaternion::from_quaternion(Quaternion::new(0.9, 0.1, -0.2, 0.3));
    let mut filter = EkfMarg::<f64>::default();

    for _ in 0..1000 {
        filter.update_accel(global_to_local(&truth, &gravity), 1e-4, 1e-2)?;
        filter.update_mag(global_to_local(&truth, &field), 1e-4, 1e-2)?;

        let measured = rate + bias;
        filter.update_gyro(measured, measured, 1e-6, 1e-3, dt)?;
        truth *= UnitQuaternion::from_scaled_axis(rate * dt);
    }

    let estimated = filter.bias().expect("filter should be initialized");
    let ratio = estimated.component_div(&bias_direction);
    assert_relative_eq!(ratio, Vector3::repeat(0.01), epsilon = 1e-9);

    assert_relative_eq!(filter.attitude().unwrap(), truth, epsilon = 1e-9);
    Ok(())
}

#[test]
fn rejected_samples_are_idempotent() -> Result<(), EkfError> {
    let truth = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.7);
    let gravity = global_to_local(&truth, &Vector3::new(0.0, 0.0, 9.81));
    let field = global_to_local(&truth, &Vector3::new(0.0, 25.0, -35.0));

    let mut filter = EkfMarg::<f64>::default();
    for _ in 0..10 {
        filter.update_accel_mag(gravity, field, 1e-4, 1e-4)?;
    }
    let w = Vector3::new(0.1, 0.0, -0.05);
    filter.update_gyro(w, w, 1e-4, 1e-8, 0.01)?;

    let attitude = filter.attitude();
    let bias = filter.bias();
    let covariance = filter.covariance();

    assert!(!filter.update_accel(gravity * 2.0, 1e-4, 1e-2)?);
    assert!(!filter.update_mag(field * 0.1, 1e-4, 1e-2)?);
    assert!(!filter.update_mag(field * 10.0, 1e-4, 1e-2)?);
    assert!(!filter.update_accel_mag(gravity, field * 3.0, 1e-4, 1e-4)?);

    assert_eq!(filter.attitude(), attitude);
    assert_eq!(filter.bias(), bias);
    assert_eq!(filter.covariance(), covariance);
    Ok(())
}

#[test]
fn marg_attitude_stays_normalized() -> Result<(), EkfError> {
    let mut truth = UnitQuaternion::from_euler_angles(-0.4, 0.3, 1.2);
    let gravity = Vector3::new(0.0, 0.0, 9.81);
    let field = Vector3::new(0.0, 22.0, -41.0);
    let mut filter = EkfMarg::<f64>::default();

    for i in 0..5000 {
        let t = f64::from(i) * 0.005;
        let rate = Vector3::new(t.sin(), 0.7 * (2.0 * t).cos(), -0.4);
        let a = global_to_local(&truth, &gravity);
        let m = global_to_local(&truth, &field);

        if i % 3 == 0 {
            filter.update_accel_mag(a, m, 1e-3, 1e-3)?;
        } else {
            filter.update_accel(a, 1e-3, 1e-1)?;
            filter.update_mag(m, 1e-3, 1e-1)?;
        }
        filter.update_gyro(rate, rate, 1e-5, 1e-9, 0.005)?;
        truth *= UnitQuaternion::from_scaled_axis(rate * 0.005);

        if let Some(attitude) = filter.attitude() {
            assert_relative_eq!(attitude.quaternion().norm(), 1.0, epsilon = 1e-15);
        }
    }

    let covariance = filter.covariance().unwrap();
    assert_relative_eq!(covariance, covariance.transpose(), epsilon = 1e-15);
    assert!(covariance.symmetric_eigenvalues().iter().all(|&v| v > 0.0));
    Ok(())
}

#[test]
fn single_precision() -> Result<(), EkfError> {
    let truth = UnitQuaternion::from_euler_angles(0.1_f32, 0.2, -0.3);
    let gravity = global_to_local(&truth, &Vector3::new(0.0, 0.0, 9.81));
    let field = global_to_local(&truth, &Vector3::new(0.0, 20.0, -40.0));

    let mut imu = EkfImu::<f32>::default();
    let mut marg = EkfMarg::<f32>::default();

    for _ in 0..100 {
        imu.update_accel(gravity, 1e-3, 1e-2)?;
        imu.update_gyro(Vector3::zeros(), Vector3::zeros(), 1e-4, 0.01)?;

        marg.update_accel(gravity, 1e-3, 1e-2)?;
        marg.update_mag(field, 1e-3, 1e-2)?;
        marg.update_gyro(Vector3::zeros(), Vector3::zeros(), 1e-4, 1e-8, 0.01)?;
    }

    let up = global_to_local(&imu.attitude().unwrap(), &Vector3::z());
    assert_relative_eq!(up, gravity.normalize(), epsilon = 1e-5);
    assert_relative_eq!(marg.attitude().unwrap(), truth, epsilon = 1e-5);
    Ok(())
}
