use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use log::info;
use serde::Serialize;
use serde_json::{json, ser::PrettyFormatter, Map, Value};
use uuid::Uuid;

use crate::{
    error::Result,
    exporter::{Mesh, SceneSnapshot},
};

const OBJECT_FORMAT_VERSION: f64 = 4.4;
const GEOMETRY_FORMAT_VERSION: u32 = 3;
const UUID_DOMAIN: &str = "app.previz.co";

const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Packs linear RGB in `[0, 1]` into `0xRRGGBB`; out-of-range channels clamp.
pub fn color_to_three_js(r: f64, g: f64, b: f64) -> u32 {
    fn channel(v: f64) -> u32 {
        if v.is_nan() || v < 0.0 {
            0
        } else if v > 1.0 {
            255
        } else {
            (v * 255.0).round() as u32
        }
    }
    (channel(r) << 16) | (channel(g) << 8) | channel(b)
}

/// Builds the three.js object-format document for `scene`.
pub fn build_three_js_scene(scene: &SceneSnapshot) -> Value {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, UUID_DOMAIN.as_bytes());

    let mut children = Vec::with_capacity(scene.objects.len());
    let mut geometries = Vec::with_capacity(scene.objects.len());
    for mesh in &scene.objects {
        let geometry_uuid = named_uuid(&namespace, &format!("geometry/{}/{}", mesh.name, mesh.geometry_name));
        geometries.push(build_geometry(scene, mesh, &geometry_uuid));
        children.push(build_object(mesh, &namespace, &geometry_uuid));
    }

    let mut root = Map::new();
    root.insert("type".into(), json!("Scene"));
    root.insert("matrix".into(), json!(IDENTITY));
    root.insert("uuid".into(), json!(upper(Uuid::new_v4())));
    root.insert("children".into(), Value::Array(children));
    if let Some(color) = scene.background_color {
        root.insert("background".into(), json!(color));
    }

    json!({
        "animations": [],
        "geometries": geometries,
        "images": [],
        "materials": [],
        "metadata": {
            "version": OBJECT_FORMAT_VERSION,
            "type": "Object",
            "generator": scene.generator,
            "sourceFile": scene.source_file,
        },
        "object": root,
        "textures": [],
    })
}

/// Writes `scene` as JSON with one-space indentation and sorted keys.
pub fn export<W: Write>(scene: &SceneSnapshot, writer: W) -> Result<()> {
    let document = build_three_js_scene(scene);
    let mut serializer = serde_json::Serializer::with_formatter(writer, PrettyFormatter::with_indent(b" "));
    document.serialize(&mut serializer)?;
    Ok(())
}

pub fn export_to_path(scene: &SceneSnapshot, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    export(scene, &mut writer)?;
    writer.flush()?;
    info!("Exported {} objects to {}.", scene.objects.len(), path.display());
    Ok(())
}

fn build_geometry(scene: &SceneSnapshot, mesh: &Mesh, uuid: &str) -> Value {
    let uvs: Vec<Vec<f64>> = mesh
        .uvsets
        .iter()
        .map(|set| set.coordinates.iter().flatten().copied().collect())
        .collect();
    let vertices: Vec<f64> = mesh.vertices.iter().flatten().copied().collect();

    json!({
        "data": {
            "metadata": {
                "version": GEOMETRY_FORMAT_VERSION,
                "generator": scene.generator,
            },
            "name": mesh.geometry_name,
            "faces": three_js_faces(&mesh.faces, mesh.uvsets.len()),
            "uvs": uvs,
            "vertices": vertices,
        },
        "uuid": uuid,
        "type": "Geometry",
    })
}

fn build_object(mesh: &Mesh, namespace: &Uuid, geometry_uuid: &str) -> Value {
    let uvset_names: Vec<&str> = mesh.uvsets.iter().map(|set| set.name.as_str()).collect();
    json!({
        "name": mesh.name,
        "uuid": named_uuid(namespace, &format!("object/{}", mesh.name)),
        "matrix": mesh.world_matrix,
        "visible": true,
        "type": "Mesh",
        "geometry": geometry_uuid,
        "userData": { "previz": { "uvsetNames": uvset_names } },
    })
}

/// Flattens faces into the legacy JSON model layout: per face a type
/// bitmask, its vertex indices, then one run of uv indices per uv set.
fn three_js_faces(faces: &[Vec<u32>], uvsets_count: usize) -> Vec<u32> {
    let has_uvs = uvsets_count > 0;
    let mut out = Vec::new();
    let mut next_uv = 0u32;
    for face in faces {
        let is_quad = face.len() == 4;
        out.push(u32::from(is_quad) | (u32::from(has_uvs) << 3));
        out.extend_from_slice(face);

        let count = face.len() as u32;
        let uv_indices: Vec<u32> = (next_uv..next_uv + count).collect();
        next_uv += count;
        for _ in 0..uvsets_count {
            out.extend_from_slice(&uv_indices);
        }
    }
    out
}

fn named_uuid(namespace: &Uuid, name: &str) -> String {
    upper(Uuid::new_v5(namespace, name.as_bytes()))
}

fn upper(uuid: Uuid) -> String {
    uuid.hyphenated().to_string().to_uppercase()
}
