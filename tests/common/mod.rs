#![allow(dead_code)]

//! Synthetic scenes: 3D points seen by pinhole cameras, with one-hot
//! descriptors so that exact matchers pair features of the same point and
//! reject everything else.

use nalgebra::{Matrix3, Rotation3, Vector3};
use pairmatch::regions::io::{write_regions, ImageDescriber, IMAGE_DESCRIBER_FILE};
use pairmatch::{Camera, Descriptors, Feature, Regions, RegionsType, Scene, View};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const DIM: usize = 128;
pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn pinhole() -> Camera {
    Camera::Pinhole {
        width: WIDTH,
        height: HEIGHT,
        focal: 800.0,
        principal_point: [320.0, 240.0],
    }
}

pub fn k_matrix() -> Matrix3<f64> {
    Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0)
}

/// Camera pose mapping world points to camera coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(roll: f64, pitch: f64, yaw: f64, translation: [f64; 3]) -> Self {
        Self {
            rotation: Rotation3::from_euler_angles(roll, pitch, yaw).into_inner(),
            translation: Vector3::from(translation),
        }
    }

    pub fn project(&self, point: &Vector3<f64>) -> (f32, f32) {
        let p = k_matrix() * (self.rotation * point + self.translation);
        ((p.x / p.z) as f32, (p.y / p.z) as f32)
    }
}

/// Points spread in front of the identity camera.
pub fn world_points(count: usize, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Vector3::new(
                rng.random_range(-1.5..1.5),
                rng.random_range(-1.0..1.0),
                rng.random_range(4.0..7.0),
            )
        })
        .collect()
}

/// Unit descriptor of `slot`.
pub fn one_hot(slot: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[slot % DIM] = 1.0;
    v
}

/// Features of the points `observed` seen through `pose`; feature `k` is
/// point `observed.start + k` and carries that point's one-hot descriptor.
pub fn observe(points: &[Vector3<f64>], observed: Range<usize>, pose: &Pose) -> Regions {
    let mut features = Vec::new();
    let mut data = Vec::new();
    for idx in observed {
        let (x, y) = pose.project(&points[idx]);
        features.push(Feature::new(x, y, 1.0 + (idx % 7) as f32, 0.0));
        data.extend(one_hot(idx));
    }
    Regions::new(features, Descriptors::Scalar { dimension: DIM, data }).unwrap()
}

/// `count` features that all carry the same descriptor.
pub fn featureless(count: usize, slot: usize) -> Regions {
    let features = (0..count)
        .map(|k| Feature::new(10.0 + 7.0 * k as f32, 200.0, 1.0, 0.0))
        .collect();
    let data = (0..count).flat_map(|_| one_hot(slot)).collect();
    Regions::new(features, Descriptors::Scalar { dimension: DIM, data }).unwrap()
}

pub fn view(id: u32) -> View {
    View {
        id,
        path: format!("view{id}.jpg"),
        width: WIDTH,
        height: HEIGHT,
        intrinsic_id: Some(0),
    }
}

pub fn scene(view_count: u32) -> Scene {
    Scene::new(
        "images",
        (0..view_count).map(view).collect(),
        vec![(0, pinhole())],
    )
    .unwrap()
}

/// Four views: 0 sees points 0..100, 1 sees 0..50, 2 sees 45..100 and 3
/// has no distinctive feature. Pairs (0, 1) and (0, 2) share many points,
/// (1, 2) only five.
pub fn four_view_regions() -> Vec<(u32, Regions)> {
    let points = world_points(100, 3);
    let poses = [
        Pose::identity(),
        Pose::new(0.02, -0.08, 0.01, [-0.6, 0.05, 0.1]),
        Pose::new(-0.03, 0.07, -0.02, [0.5, -0.1, 0.2]),
    ];
    vec![
        (0, observe(&points, 0..100, &poses[0])),
        (1, observe(&points, 0..50, &poses[1])),
        (2, observe(&points, 45..100, &poses[2])),
        (3, featureless(40, DIM - 1)),
    ]
}

/// Files of a synthetic project.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub scene_path: PathBuf,
}

impl Fixture {
    pub fn matches_dir(&self) -> PathBuf {
        self.dir.path().join("matches")
    }

    pub fn matches_path(&self, name: &str) -> PathBuf {
        self.matches_dir().join(name)
    }
}

/// Writes the scene, the region sidecar and every region file.
pub fn write_fixture(regions: &[(u32, Regions)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let scene = scene(regions.len() as u32);
    let scene_path = dir.path().join("scene.json");
    scene.save(&scene_path).unwrap();

    let matches_dir = dir.path().join("matches");
    std::fs::create_dir_all(&matches_dir).unwrap();
    write_describer(&matches_dir);
    for (id, r) in regions {
        write_regions(&matches_dir, scene.view(*id).unwrap(), r).unwrap();
    }
    Fixture { dir, scene_path }
}

pub fn write_describer(dir: &Path) {
    ImageDescriber {
        describer: "SYNTHETIC".into(),
        regions_type: RegionsType::Scalar { dimension: DIM },
    }
    .save(dir.join(IMAGE_DESCRIBER_FILE))
    .unwrap();
}
