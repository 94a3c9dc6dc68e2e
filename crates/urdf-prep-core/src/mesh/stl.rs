//! STL file loading and saving

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::{MeshError, TriMesh, calculate_triangle_normal};

/// Precision for vertex welding (multiply by this, then round to int)
const WELD_PRECISION: f32 = 10000.0;

/// Load an STL file (ASCII or binary) as an indexed mesh
pub fn load_stl(path: impl AsRef<Path>) -> Result<TriMesh, MeshError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| MeshError::Io(e.to_string()))?;
    let mut reader = BufReader::new(file);

    let mesh = stl_io::read_stl(&mut reader).map_err(|e| MeshError::Parse(e.to_string()))?;
    let mesh = weld_vertices(&mesh);

    tracing::debug!(
        "Loaded {:?}: {} vertices, {} faces",
        path,
        mesh.vertex_count(),
        mesh.face_count()
    );

    Ok(mesh)
}

/// Merge vertices that coincide after quantisation
fn weld_vertices(mesh: &stl_io::IndexedMesh) -> TriMesh {
    let mut vertices: Vec<[f32; 3]> = Vec::new();
    let mut vertex_map: HashMap<[i32; 3], u32> = HashMap::new();
    let mut indices: Vec<u32> = Vec::with_capacity(mesh.faces.len() * 3);

    for face in &mesh.faces {
        for &vertex_idx in &face.vertices {
            let vertex = mesh.vertices[vertex_idx];
            let v = [vertex[0], vertex[1], vertex[2]];

            let key = [
                (v[0] * WELD_PRECISION).round() as i32,
                (v[1] * WELD_PRECISION).round() as i32,
                (v[2] * WELD_PRECISION).round() as i32,
            ];

            let index = *vertex_map.entry(key).or_insert_with(|| {
                vertices.push(v);
                (vertices.len() - 1) as u32
            });

            indices.push(index);
        }
    }

    TriMesh::new(vertices, indices)
}

/// Save a mesh as a binary STL file, recomputing face normals
pub fn save_stl(mesh: &TriMesh, path: impl AsRef<Path>) -> Result<(), MeshError> {
    let path = path.as_ref();

    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|[v0, v1, v2]| stl_io::Triangle {
            normal: stl_io::Normal::new(calculate_triangle_normal(v0, v1, v2)),
            vertices: [
                stl_io::Vertex::new(v0),
                stl_io::Vertex::new(v1),
                stl_io::Vertex::new(v2),
            ],
        })
        .collect();

    let file = std::fs::File::create(path).map_err(|e| MeshError::Io(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::Write(e.to_string()))?;

    Ok(())
}
