//! Scene description: views and their camera intrinsics.
//!
//! The scene is read from a JSON document produced by the image listing stage.
//! Views are immutable once loaded and are keyed by their id.

use crate::util::{PairMatchError, PairMatchResult};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifier of a view.
pub type ViewId = u32;
/// Identifier of a camera intrinsic.
pub type IntrinsicId = u32;

/// One input image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Unique view id.
    pub id: ViewId,
    /// Image path relative to the scene root.
    pub path: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Associated intrinsic, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic_id: Option<IntrinsicId>,
}

impl View {
    /// Base file name of the image without its extension.
    pub fn stem(&self) -> Option<&str> {
        Path::new(&self.path).file_stem().and_then(|s| s.to_str())
    }
}

/// Camera model attached to one or more views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Camera {
    /// Pinhole camera without distortion.
    Pinhole {
        width: u32,
        height: u32,
        focal: f64,
        principal_point: [f64; 2],
    },
    /// Equirectangular (360 degree) camera.
    Spherical { width: u32, height: u32 },
}

impl Camera {
    /// Image width the camera was calibrated for.
    pub fn width(&self) -> u32 {
        match self {
            Camera::Pinhole { width, .. } | Camera::Spherical { width, .. } => *width,
        }
    }

    /// Calibration matrix, for pinhole cameras.
    pub fn k_matrix(&self) -> Option<Matrix3<f64>> {
        match *self {
            Camera::Pinhole {
                focal,
                principal_point: [ppx, ppy],
                ..
            } => Some(Matrix3::new(focal, 0.0, ppx, 0.0, focal, ppy, 0.0, 0.0, 1.0)),
            Camera::Spherical { .. } => None,
        }
    }

    /// Focal length in pixels, for pinhole cameras.
    pub fn focal(&self) -> Option<f64> {
        match *self {
            Camera::Pinhole { focal, .. } => Some(focal),
            Camera::Spherical { .. } => None,
        }
    }

    /// Normalized image coordinates of a pixel, for pinhole cameras.
    pub fn normalize(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match *self {
            Camera::Pinhole {
                focal,
                principal_point: [ppx, ppy],
                ..
            } => Some(((x - ppx) / focal, (y - ppy) / focal)),
            Camera::Spherical { .. } => None,
        }
    }

    /// Unit bearing vector of a pixel, for spherical cameras.
    pub fn bearing(&self, x: f64, y: f64) -> Option<Vector3<f64>> {
        match *self {
            Camera::Spherical { width, height } => {
                let lon = (x / width as f64 - 0.5) * std::f64::consts::TAU;
                let lat = -(y / height as f64 - 0.5) * std::f64::consts::PI;
                Some(Vector3::new(
                    lat.cos() * lon.sin(),
                    -lat.sin(),
                    lat.cos() * lon.cos(),
                ))
            }
            Camera::Pinhole { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IntrinsicRecord {
    id: IntrinsicId,
    #[serde(flatten)]
    camera: Camera,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SceneFile {
    #[serde(default)]
    root_path: String,
    views: Vec<View>,
    #[serde(default)]
    intrinsics: Vec<IntrinsicRecord>,
}

/// Views and intrinsics of one reconstruction problem.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    root_path: PathBuf,
    views: BTreeMap<ViewId, View>,
    intrinsics: BTreeMap<IntrinsicId, Camera>,
}

impl Scene {
    /// Builds a scene, validating id uniqueness and intrinsic references.
    pub fn new(
        root_path: impl Into<PathBuf>,
        views: Vec<View>,
        intrinsics: Vec<(IntrinsicId, Camera)>,
    ) -> PairMatchResult<Self> {
        let mut intrinsic_map = BTreeMap::new();
        for (id, camera) in intrinsics {
            if intrinsic_map.insert(id, camera).is_some() {
                return Err(PairMatchError::InvalidInput("duplicate intrinsic id"));
            }
        }
        let mut view_map = BTreeMap::new();
        for view in views {
            if let Some(intrinsic_id) = view.intrinsic_id {
                if !intrinsic_map.contains_key(&intrinsic_id) {
                    return Err(PairMatchError::InvalidInput(
                        "view references an unknown intrinsic",
                    ));
                }
            }
            let id = view.id;
            if view_map.insert(id, view).is_some() {
                return Err(PairMatchError::InvalidInput("duplicate view id"));
            }
        }
        Ok(Self {
            root_path: root_path.into(),
            views: view_map,
            intrinsics: intrinsic_map,
        })
    }

    /// Loads a scene from its JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> PairMatchResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| PairMatchError::io(path, err))?;
        let file: SceneFile =
            serde_json::from_str(&text).map_err(|err| PairMatchError::json(path, err))?;
        let intrinsics = file
            .intrinsics
            .into_iter()
            .map(|record| (record.id, record.camera))
            .collect();
        Self::new(file.root_path, file.views, intrinsics)
    }

    /// Writes the scene as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PairMatchResult<()> {
        let path = path.as_ref();
        let file = SceneFile {
            root_path: self.root_path.to_string_lossy().into_owned(),
            views: self.views.values().cloned().collect(),
            intrinsics: self
                .intrinsics
                .iter()
                .map(|(&id, camera)| IntrinsicRecord {
                    id,
                    camera: camera.clone(),
                })
                .collect(),
        };
        let json =
            serde_json::to_string_pretty(&file).map_err(|err| PairMatchError::json(path, err))?;
        fs::write(path, json).map_err(|err| PairMatchError::io(path, err))
    }

    /// Root directory of the image paths.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns true when the scene has no view.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Views ordered by id.
    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    /// Looks up a view.
    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    /// Camera of a view, when it has a defined intrinsic.
    pub fn camera_of(&self, id: ViewId) -> Option<&Camera> {
        let intrinsic_id = self.views.get(&id)?.intrinsic_id?;
        self.intrinsics.get(&intrinsic_id)
    }
}

#[cfg(test)]
mod tests {
    use super::{Camera, Scene, View};

    fn view(id: u32, intrinsic_id: Option<u32>) -> View {
        View {
            id,
            path: format!("img_{id:03}.jpg"),
            width: 640,
            height: 480,
            intrinsic_id,
        }
    }

    #[test]
    fn rejects_duplicate_views() {
        let err = Scene::new("", vec![view(0, None), view(0, None)], Vec::new());
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unknown_intrinsic() {
        let err = Scene::new("", vec![view(0, Some(3))], Vec::new());
        assert!(err.is_err());
    }

    #[test]
    fn parses_json_layout() {
        let text = r#"{
            "root_path": "images",
            "views": [
                { "id": 0, "path": "a.jpg", "width": 640, "height": 480, "intrinsic_id": 0 },
                { "id": 1, "path": "b.png", "width": 640, "height": 480 }
            ],
            "intrinsics": [
                { "id": 0, "model": "pinhole", "width": 640, "height": 480,
                  "focal": 800.0, "principal_point": [320.0, 240.0] }
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(&path, text).unwrap();
        let scene = Scene::load(&path).unwrap();
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.view(0).unwrap().stem(), Some("a"));
        assert!(matches!(scene.camera_of(0), Some(Camera::Pinhole { .. })));
        assert!(scene.camera_of(1).is_none());
    }

    #[test]
    fn spherical_bearing_is_unit_and_centered() {
        let camera = Camera::Spherical {
            width: 2000,
            height: 1000,
        };
        let b = camera.bearing(1000.0, 500.0).unwrap();
        assert!((b.norm() - 1.0).abs() < 1e-12);
        assert!((b.z - 1.0).abs() < 1e-12);
    }
}
