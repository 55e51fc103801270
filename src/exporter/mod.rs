//! Scene Exporter: turns a host scene snapshot into a three.js JSON file.

pub mod three_js;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use three_js::{build_three_js_scene, color_to_three_js, export, export_to_path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvSet {
    pub name: String,
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub geometry_name: String,
    /// Column-major 4x4 world matrix, already converted to the Y-up frame.
    pub world_matrix: [f64; 16],
    /// Polygons as vertex indices: triangles or quads.
    pub faces: Vec<Vec<u32>>,
    pub vertices: Vec<[f64; 3]>,
    #[serde(default)]
    pub uvsets: Vec<UvSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub generator: String,
    pub source_file: String,
    /// Packed RGB, see [`color_to_three_js`].
    #[serde(default)]
    pub background_color: Option<u32>,
    #[serde(default)]
    pub objects: Vec<Mesh>,
}

/// Host side of an export: captures the scene to publish.
///
/// Called on the controlling thread, the only place host state may be read.
pub trait SceneSource {
    fn build_scene(&self) -> Result<SceneSnapshot>;
}
