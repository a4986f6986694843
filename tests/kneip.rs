use approx::{assert_relative_eq, relative_eq};
use nalgebra::{Isometry3, Point3, Translation, UnitQuaternion, Vector3};
use quickcheck_macros::quickcheck;
use upnp::kneip::eigen::NalgebraEigen;
use upnp::*;

type V3 = (f64, f64, f64);

const EPSILON_APPROX: f64 = 1e-6;

/// Points spread in front of the camera, roughly 3 to 7 units away.
fn world_points(n: usize) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let i = i as f64;
            Point3::new(
                2.0 * (0.9 * i + 0.3).sin(),
                1.5 * (1.7 * i).cos(),
                5.0 + 2.0 * (2.3 * i).sin(),
            )
        })
        .collect()
}

/// Ray origins of a rig with four cameras on a 20cm square.
fn rig_origins(n: usize) -> Vec<Point3<f64>> {
    let cameras = [
        Point3::new(-0.1, -0.1, 0.0),
        Point3::new(0.1, -0.1, 0.0),
        Point3::new(0.1, 0.1, 0.0),
        Point3::new(-0.1, 0.1, 0.0),
    ];
    (0..n).map(|i| cameras[i % cameras.len()]).collect()
}

/// Unit directions from the ray origins to the points seen under `pose`.
fn ray_directions(
    pose: &Isometry3<f64>,
    world: &[Point3<f64>],
    origins: &[Point3<f64>],
) -> Vec<Vector3<f64>> {
    world
        .iter()
        .zip(origins)
        .map(|(w, o)| ((pose * w) - o).normalize())
        .collect()
}

fn to_samples(
    origins: &[Point3<f64>],
    directions: &[Vector3<f64>],
    world: &[Point3<f64>],
) -> Vec<Sample> {
    origins
        .iter()
        .zip(directions)
        .zip(world)
        .map(|((&origin, &direction), &world)| Sample {
            ray: Ray { origin, direction },
            world,
        })
        .collect()
}

/// Check that at least one estimated pose is near the expected one.
fn contains(poses: &[Pose], expected: &Isometry3<f64>, epsilon: f64) -> bool {
    poses.iter().any(|pose| {
        pose.rotation.angle_to(&expected.rotation) < epsilon
            && relative_eq!(
                pose.translation,
                expected.translation.vector,
                epsilon = epsilon
            )
    })
}

#[test]
fn pinhole_case() {
    let rot = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
    let trans = Translation::from(Vector3::new(0.1, 0.2, 0.3));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(10);
    let origins = vec![Point3::origin(); world.len()];
    let directions = ray_directions(&pose, &world, &origins);

    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(!poses.is_empty());
    assert!(contains(&poses, &pose, EPSILON_APPROX));

    // Compare the best pose to ground truth.
    let best = poses[0].to_iso3();
    assert_relative_eq!(rot, best.rotation, epsilon = EPSILON_APPROX);
    assert_relative_eq!(trans, best.translation, epsilon = EPSILON_APPROX);
}

#[test]
fn rig_case() {
    let rot = UnitQuaternion::from_euler_angles(-0.4, 0.3, 1.2);
    let trans = Translation::from(Vector3::new(-0.5, 0.25, 1.0));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(12);
    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);

    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(contains(&poses, &pose, EPSILON_APPROX));

    let samples = to_samples(&origins, &directions, &world);
    assert!(poses[0].cost(&samples) < 1e-12);
}

#[test]
fn six_correspondences() {
    let rot = UnitQuaternion::from_euler_angles(0.7, -0.2, -0.9);
    let trans = Translation::from(Vector3::new(0.3, -0.1, 0.4));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(6);
    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);

    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(contains(&poses, &pose, EPSILON_APPROX));
}

#[test]
fn three_rays_of_a_rig() {
    let rot = UnitQuaternion::from_euler_angles(0.4, -0.3, 0.8);
    let trans = Translation::from(Vector3::new(0.2, 0.1, -0.3));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(3);
    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);

    // Several poses may fit three rays exactly, the true one must be among them.
    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(contains(&poses, &pose, EPSILON_APPROX));
}

#[test]
fn four_points_pinhole() {
    let rot = UnitQuaternion::from_euler_angles(-0.2, 0.5, -1.4);
    let trans = Translation::from(Vector3::new(-0.1, 0.3, 0.2));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(4);
    let origins = vec![Point3::origin(); world.len()];
    let directions = ray_directions(&pose, &world, &origins);

    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(contains(&poses, &pose, EPSILON_APPROX));
    let samples = to_samples(&origins, &directions, &world);
    assert!(poses[0].cost(&samples) < 1e-12);
}

#[test]
fn candidates_are_sorted_and_unit() {
    let pose = Isometry3::from_parts(
        Translation::from(Vector3::new(0.2, 0.0, -0.3)),
        UnitQuaternion::from_euler_angles(1.0, 0.5, -0.5),
    );
    let world = world_points(9);
    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);
    let samples = to_samples(&origins, &directions, &world);

    let poses = UpnpSolver::<NalgebraEigen>::default().solve_samples(&samples);
    assert!(!poses.is_empty());
    for pair in poses.windows(2) {
        assert!(pair[0].cost(&samples) <= pair[1].cost(&samples) * (1.0 + 1e-9) + 1e-12);
    }
    for pose in &poses {
        assert_relative_eq!(pose.rotation.into_inner().norm(), 1.0, epsilon = 1e-12);
        assert!(pose.rotation.w >= 0.0);
    }
}

#[test]
fn rotated_scene() {
    let rot = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.4);
    let trans = Translation::from(Vector3::new(0.1, -0.3, 0.2));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(10);
    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);
    let samples = to_samples(&origins, &directions, &world);
    let poses = upnp(&origins, &directions, &world).unwrap();

    // Rotate the whole world by r0, the rays are unchanged.
    let r0 = UnitQuaternion::from_euler_angles(-1.0, 0.6, 2.5);
    let rotated_world: Vec<Point3<f64>> = world.iter().map(|p| r0 * p).collect();
    let rotated_samples = to_samples(&origins, &directions, &rotated_world);
    let rotated_poses = upnp(&origins, &directions, &rotated_world).unwrap();

    let expected = Isometry3::from_parts(trans, rot * r0.inverse());
    assert!(contains(&rotated_poses, &expected, EPSILON_APPROX));

    // Best candidates are related by r0 and have the same cost.
    let best = poses[0];
    let rotated_best = rotated_poses[0];
    assert!((best.rotation * r0.inverse()).angle_to(&rotated_best.rotation) < EPSILON_APPROX);
    assert_relative_eq!(
        best.cost(&samples),
        rotated_best.cost(&rotated_samples),
        epsilon = 1e-10
    );
}

#[test]
fn noisy_case() {
    let rot = UnitQuaternion::from_euler_angles(0.3, 0.1, -0.2);
    let trans = Translation::from(Vector3::new(0.0, 0.1, 0.5));
    let pose = Isometry3::from_parts(trans, rot);

    let world = world_points(20);
    let origins = rig_origins(world.len());
    let directions: Vec<Vector3<f64>> = ray_directions(&pose, &world, &origins)
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let i = i as f64;
            let noise = Vector3::new((3.1 * i).sin(), (5.3 * i).cos(), (7.7 * i).sin()) * 1e-3;
            (d + noise).normalize()
        })
        .collect();

    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(contains(&poses, &pose, 5e-2));

    // The best pose fits the noisy rays at least as well as the true one.
    let samples = to_samples(&origins, &directions, &world);
    let truth = Pose::from_iso3(pose);
    assert!(poses[0].cost(&samples) <= truth.cost(&samples) + 1e-12);
}

#[test]
fn parallel_rays() {
    let world = world_points(8);
    let origins: Vec<Point3<f64>> = (0..world.len())
        .map(|i| Point3::new(i as f64, 0.0, 0.0))
        .collect();
    let directions = vec![Vector3::new(0.0, 0.6, 0.8); world.len()];
    let poses = upnp(&origins, &directions, &world).unwrap();
    assert!(poses.is_empty());
}

#[test]
fn not_enough_rays() {
    let world = world_points(1);
    let directions = vec![Vector3::z(); 1];
    assert!(upnp(&[Point3::origin()], &directions, &world)
        .unwrap()
        .is_empty());
    assert!(upnp(&[], &[], &[]).unwrap().is_empty());
}

#[test]
fn minimal_case() {
    let pose = Isometry3::from_parts(
        Translation::from(Vector3::new(0.1, 0.2, 0.3)),
        UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
    );
    let world = world_points(2);
    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);

    // Under-constrained, any number of candidates may come out, all finite.
    let poses = upnp(&origins, &directions, &world).unwrap();
    for pose in &poses {
        assert!(pose.rotation.coords.iter().all(|c| c.is_finite()));
        assert!(pose.translation.iter().all(|c| c.is_finite()));
    }
}

#[test]
fn mismatched_lengths() {
    let world = world_points(6);
    let origins = rig_origins(5);
    let directions = vec![Vector3::z(); 6];
    let err = upnp(&origins, &directions, &world).unwrap_err();
    assert_eq!(
        err.to_string(),
        "mismatched array lengths: ray origins (5) != ray directions (6)"
    );
}

/// This test is ignored because it is random and may fail in CI.
/// Run `cargo test -- --ignored` to test it.
#[quickcheck]
#[ignore]
fn non_degenerate_case(rot: V3, trans: V3) -> bool {
    if ![rot.0, rot.1, rot.2, trans.0, trans.1, trans.2]
        .iter()
        .all(|v| v.is_finite())
    {
        return true;
    }

    // Keep the points in front of the rig.
    let rotation = UnitQuaternion::from_euler_angles(rot.0, rot.1, rot.2);
    let translation = Translation::from(Vector3::new(trans.0, trans.1, trans.2) * 0.01);
    let pose = Isometry3::from_parts(translation, rotation);
    let world: Vec<Point3<f64>> = world_points(10)
        .iter()
        .map(|p| pose.inverse() * p)
        .collect();

    let origins = rig_origins(world.len());
    let directions = ray_directions(&pose, &world, &origins);
    let poses = upnp(&origins, &directions, &world).unwrap();
    contains(&poses, &pose, 1e-4)
}
