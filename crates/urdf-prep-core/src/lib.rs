//! Robot asset preparation
//!
//! This crate contains the building blocks behind the `urdf-prep` tool:
//! - rewrite: package:// mesh references in URDF/Xacro into relative paths
//! - mesh: STL and COLLADA loading/saving into a shared indexed mesh
//! - decimate: the simplification seam and its meshoptimizer backend
//! - reduce: batch vertex reduction over a mesh directory
//! - config: serializable batch configuration

pub mod config;
pub mod decimate;
pub mod mesh;
pub mod reduce;
pub mod rewrite;

pub use config::*;
pub use decimate::*;
pub use mesh::{FileMeshStore, MeshError, MeshFormat, MeshStore, TriMesh, load_mesh, save_mesh};
pub use reduce::*;
pub use rewrite::*;
