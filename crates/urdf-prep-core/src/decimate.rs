//! Mesh simplification
//!
//! The batch reducer only needs "give me a smaller mesh"; the edge-collapse
//! algorithm lives behind [`Decimator`] so the batch logic can be driven by
//! a fake in tests.

use crate::mesh::TriMesh;

/// Reduce a mesh towards a target size
pub trait Decimator {
    /// Simplify `mesh` towards `target` (see the implementation for how the
    /// target is interpreted). `target` is always at least 1.
    fn decimate(&self, mesh: &TriMesh, target: usize) -> Result<TriMesh, DecimateError>;
}

/// Quadric edge-collapse decimation backed by meshoptimizer
///
/// The target is used as a face budget, the way MeshLab's
/// `targetfacenum` parameter receives it.
#[derive(Debug, Clone, Copy)]
pub struct QuadricDecimator {
    /// Largest allowed deviation, relative to the mesh extents (0..=1)
    pub max_error: f32,
}

impl QuadricDecimator {
    pub const DEFAULT_MAX_ERROR: f32 = 1.0;

    pub fn new(max_error: f32) -> Self {
        Self { max_error }
    }
}

impl Default for QuadricDecimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ERROR)
    }
}

impl Decimator for QuadricDecimator {
    fn decimate(&self, mesh: &TriMesh, target: usize) -> Result<TriMesh, DecimateError> {
        if target == 0 {
            return Err(DecimateError::InvalidTarget(target));
        }
        if mesh.is_empty() {
            return Err(DecimateError::EmptyMesh);
        }
        if target >= mesh.face_count() {
            return Ok(mesh.clone());
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let adapter =
            meshopt::VertexDataAdapter::new(vertex_bytes, std::mem::size_of::<[f32; 3]>(), 0)
                .map_err(|e| DecimateError::Backend(format!("{:?}", e)))?;

        let mut result_error = 0.0f32;
        let indices = meshopt::simplify(
            &mesh.indices,
            &adapter,
            target * 3,
            self.max_error,
            meshopt::SimplifyOptions::empty(),
            Some(&mut result_error),
        );

        if indices.is_empty() {
            return Err(DecimateError::Backend(
                "simplification collapsed the whole mesh".to_string(),
            ));
        }

        let mut simplified = TriMesh::new(mesh.vertices.clone(), indices);
        simplified.compact();

        tracing::debug!(
            "Simplified {} -> {} faces (error {:.4})",
            mesh.face_count(),
            simplified.face_count(),
            result_error
        );

        Ok(simplified)
    }
}

/// Decimation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecimateError {
    #[error("Invalid target count: {0}")]
    InvalidTarget(usize),
    #[error("Cannot simplify an empty mesh")]
    EmptyMesh,
    #[error("Simplification failed: {0}")]
    Backend(String),
}
