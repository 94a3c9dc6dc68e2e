//! Mesh file loading and saving (STL, DAE formats)

pub mod dae;
mod normals;
pub mod stl;

use std::path::Path;

pub use dae::{load_dae, save_dae};
pub use normals::calculate_triangle_normal;
pub use stl::{load_stl, save_stl};

/// Indexed triangle mesh shared by every format
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    /// Unique vertex positions
    pub vertices: Vec<[f32; 3]>,
    /// Triangle indices into `vertices` (3 per face)
    pub indices: Vec<u32>,
}

impl TriMesh {
    pub fn new(vertices: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Number of unique vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles
    pub fn face_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.len() < 3
    }

    /// Iterate over triangles as vertex positions
    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 3]; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertices[tri[0] as usize],
                self.vertices[tri[1] as usize],
                self.vertices[tri[2] as usize],
            ]
        })
    }

    /// Drop vertices no triangle references and renumber indices
    pub fn compact(&mut self) {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut vertices = Vec::with_capacity(self.vertices.len());

        for index in &mut self.indices {
            let slot = &mut remap[*index as usize];
            if *slot == u32::MAX {
                *slot = vertices.len() as u32;
                vertices.push(self.vertices[*index as usize]);
            }
            *index = *slot;
        }

        self.vertices = vertices;
    }
}

/// Detect mesh format from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Dae,
    Unknown,
}

impl MeshFormat {
    /// Detect format from file path
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("stl") => MeshFormat::Stl,
            Some("dae") => MeshFormat::Dae,
            _ => MeshFormat::Unknown,
        }
    }
}

fn unsupported(path: &Path) -> MeshError {
    MeshError::UnsupportedFormat(
        path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_string(),
    )
}

/// Load any supported mesh format
pub fn load_mesh(path: impl AsRef<Path>) -> Result<TriMesh, MeshError> {
    let path = path.as_ref();
    match MeshFormat::from_path(path) {
        MeshFormat::Stl => load_stl(path),
        MeshFormat::Dae => load_dae(path),
        MeshFormat::Unknown => Err(unsupported(path)),
    }
}

/// Save a mesh in the format implied by the path's extension
pub fn save_mesh(mesh: &TriMesh, path: impl AsRef<Path>) -> Result<(), MeshError> {
    let path = path.as_ref();
    match MeshFormat::from_path(path) {
        MeshFormat::Stl => save_stl(mesh, path),
        MeshFormat::Dae => save_dae(mesh, path),
        MeshFormat::Unknown => Err(unsupported(path)),
    }
}

/// Where the batch reducer reads meshes from and writes them to
pub trait MeshStore {
    fn load(&self, path: &Path) -> Result<TriMesh, MeshError>;
    fn save(&self, mesh: &TriMesh, path: &Path) -> Result<(), MeshError>;
}

/// Mesh store backed by files on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMeshStore;

impl MeshStore for FileMeshStore {
    fn load(&self, path: &Path) -> Result<TriMesh, MeshError> {
        load_mesh(path)
    }

    fn save(&self, mesh: &TriMesh, path: &Path) -> Result<(), MeshError> {
        save_mesh(mesh, path)
    }
}

/// Mesh-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum MeshError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Write error: {0}")]
    Write(String),
    #[error("Empty mesh: no geometry found")]
    EmptyMesh,
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection_is_case_insensitive() {
        assert_eq!(MeshFormat::from_path(Path::new("a.STL")), MeshFormat::Stl);
        assert_eq!(MeshFormat::from_path(Path::new("dir/b.Dae")), MeshFormat::Dae);
        assert_eq!(MeshFormat::from_path(Path::new("c.obj")), MeshFormat::Unknown);
        assert_eq!(MeshFormat::from_path(Path::new("noext")), MeshFormat::Unknown);
    }

    #[test]
    fn test_compact_drops_unreferenced_vertices() {
        let mut mesh = TriMesh::new(
            vec![[0.0; 3], [9.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 2, 3],
        );
        mesh.compact();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.vertices[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_save_mesh_rejects_unknown_extension() {
        let mesh = TriMesh::default();
        let result = save_mesh(&mesh, "out.ply");
        assert!(matches!(result, Err(MeshError::UnsupportedFormat(ext)) if ext == "ply"));
    }

    #[test]
    fn test_load_mesh_without_extension_is_unsupported() {
        let result = load_mesh("meshes/link");
        assert!(matches!(result, Err(MeshError::UnsupportedFormat(ext)) if ext == "unknown"));
    }
}
