//! Batch mesh reduction
//!
//! Scans one directory for mesh files, simplifies each towards a fraction of
//! its vertex count and writes the result next to the original.

use std::path::{Path, PathBuf};

use crate::config::{ConfigError, ErrorPolicy, ReduceConfig};
use crate::decimate::{DecimateError, Decimator, QuadricDecimator};
use crate::mesh::{FileMeshStore, MeshError, MeshStore};

/// Vertex target for a mesh: `max(1, floor(original * ratio))`, or 0 for an
/// empty mesh
pub fn target_vertex_count(original: usize, ratio: f64) -> usize {
    if original == 0 {
        return 0;
    }
    ((original as f64 * ratio).floor() as usize).max(1)
}

/// Step of the per-file pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceStage {
    Load,
    Simplify,
    Save,
}

impl std::fmt::Display for ReduceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            ReduceStage::Load => "loading",
            ReduceStage::Simplify => "simplifying",
            ReduceStage::Save => "saving",
        };
        f.write_str(verb)
    }
}

/// Result for a single file
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Reduced {
        output: PathBuf,
        original_vertices: usize,
        target_vertices: usize,
        result_vertices: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        stage: ReduceStage,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub file: PathBuf,
    pub status: FileStatus,
}

/// Per-file outcomes in processing order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReduceReport {
    pub outcomes: Vec<FileOutcome>,
}

impl ReduceReport {
    pub fn reduced_count(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Reduced { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Errors that end a batch run
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReduceError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Cannot list directory {path}: {reason}")]
    ReadDir { path: String, reason: String },

    #[error("Error {stage} {file}: {reason}")]
    File {
        file: String,
        stage: ReduceStage,
        reason: String,
    },
}

/// Per-file failure before it is either logged or escalated
#[derive(Debug)]
enum FileFailure {
    Load(MeshError),
    NoVertices,
    Simplify(DecimateError),
    /// Output file name and the store error
    Save(String, MeshError),
}

impl FileFailure {
    fn stage(&self) -> ReduceStage {
        match self {
            FileFailure::Load(_) => ReduceStage::Load,
            FileFailure::NoVertices | FileFailure::Simplify(_) => ReduceStage::Simplify,
            FileFailure::Save(..) => ReduceStage::Save,
        }
    }

    /// File the failure is reported against: the output for save errors
    fn file<'a>(&'a self, input: &'a str) -> &'a str {
        match self {
            FileFailure::Save(output, _) => output,
            _ => input,
        }
    }

    fn reason(&self) -> String {
        match self {
            FileFailure::Load(e) | FileFailure::Save(_, e) => e.to_string(),
            FileFailure::NoVertices => "No vertices found.".to_string(),
            FileFailure::Simplify(e) => e.to_string(),
        }
    }
}

/// Snapshot the matching files in `directory`, sorted by name
fn list_mesh_files(config: &ReduceConfig) -> Result<Vec<(PathBuf, String)>, ReduceError> {
    let read_dir_error = |e: std::io::Error| ReduceError::ReadDir {
        path: config.directory.display().to_string(),
        reason: e.to_string(),
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&config.directory).map_err(read_dir_error)? {
        let entry = entry.map_err(read_dir_error)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::debug!("Ignoring non UTF-8 file name {:?}", path);
            continue;
        };
        if config.matches(&name).is_some() {
            files.push((path, name));
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn reduce_file<S, D>(
    config: &ReduceConfig,
    path: &Path,
    file_name: &str,
    store: &S,
    decimator: &D,
) -> Result<FileStatus, FileFailure>
where
    S: MeshStore + ?Sized,
    D: Decimator + ?Sized,
{
    let mesh = store.load(path).map_err(FileFailure::Load)?;

    let original_vertices = mesh.vertex_count();
    if original_vertices == 0 {
        return Err(FileFailure::NoVertices);
    }
    let target_vertices = target_vertex_count(original_vertices, config.ratio);

    let reduced = decimator
        .decimate(&mesh, target_vertices)
        .map_err(FileFailure::Simplify)?;

    let matched_ext = config.matches(file_name).unwrap_or_default();
    let output_name = config.output_name(file_name, matched_ext);
    let output = path.with_file_name(&output_name);
    if let Err(e) = store.save(&reduced, &output) {
        return Err(FileFailure::Save(output_name, e));
    }

    tracing::info!(
        "Saved reduced mesh: {} ({} → {} vertices)",
        output_name,
        original_vertices,
        target_vertices
    );

    Ok(FileStatus::Reduced {
        output,
        original_vertices,
        target_vertices,
        result_vertices: reduced.vertex_count(),
    })
}

/// Reduce every matching mesh in `config.directory`
///
/// Files are processed in name order from a listing taken before anything is
/// written, so outputs of this run are never picked up again. Under
/// [`ErrorPolicy::Skip`] failures are logged and recorded in the report;
/// under [`ErrorPolicy::Abort`] the first failure is returned as an error.
pub fn reduce_directory<S, D>(
    config: &ReduceConfig,
    store: &S,
    decimator: &D,
) -> Result<ReduceReport, ReduceError>
where
    S: MeshStore + ?Sized,
    D: Decimator + ?Sized,
{
    config.validate()?;

    let files = list_mesh_files(config)?;
    tracing::debug!(
        "Found {} mesh files in {:?}",
        files.len(),
        config.directory
    );

    let mut report = ReduceReport::default();
    for (path, file_name) in files {
        let status = match reduce_file(config, &path, &file_name, store, decimator) {
            Ok(status) => status,
            Err(failure) => match config.on_error {
                ErrorPolicy::Abort => {
                    return Err(ReduceError::File {
                        file: failure.file(&file_name).to_string(),
                        stage: failure.stage(),
                        reason: failure.reason(),
                    });
                }
                ErrorPolicy::Skip => match failure {
                    FileFailure::NoVertices => {
                        tracing::info!("Skipping {}: No vertices found.", file_name);
                        FileStatus::Skipped {
                            reason: failure.reason(),
                        }
                    }
                    _ => {
                        tracing::warn!(
                            "Error {} {}: {}",
                            failure.stage(),
                            failure.file(&file_name),
                            failure.reason()
                        );
                        FileStatus::Failed {
                            stage: failure.stage(),
                            error: failure.reason(),
                        }
                    }
                },
            },
        };
        report.outcomes.push(FileOutcome { file: path, status });
    }

    Ok(report)
}

/// Reduce meshes on disk with the meshoptimizer decimator
pub fn reduce_meshes(config: &ReduceConfig) -> Result<ReduceReport, ReduceError> {
    reduce_directory(config, &FileMeshStore, &QuadricDecimator::new(config.max_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{TriMesh, load_stl, save_stl};
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use tempfile::tempdir;

    /// In-memory store keyed by file name; files must still exist on disk
    /// so the directory listing sees them
    #[derive(Default)]
    struct FakeStore {
        meshes: HashMap<String, TriMesh>,
        unreadable: HashSet<String>,
        unwritable: HashSet<String>,
        saved: RefCell<Vec<(String, usize)>>,
    }

    fn name_of(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    impl MeshStore for FakeStore {
        fn load(&self, path: &Path) -> Result<TriMesh, MeshError> {
            let name = name_of(path);
            if self.unreadable.contains(&name) {
                return Err(MeshError::Parse("corrupt".to_string()));
            }
            self.meshes
                .get(&name)
                .cloned()
                .ok_or_else(|| MeshError::Io("missing".to_string()))
        }

        fn save(&self, mesh: &TriMesh, path: &Path) -> Result<(), MeshError> {
            let name = name_of(path);
            if self.unwritable.contains(&name) {
                return Err(MeshError::Io("read-only".to_string()));
            }
            self.saved.borrow_mut().push((name, mesh.vertex_count()));
            Ok(())
        }
    }

    /// Returns a mesh with exactly `target` vertices and records each request
    #[derive(Default)]
    struct FakeDecimator {
        requests: RefCell<Vec<usize>>,
    }

    impl Decimator for FakeDecimator {
        fn decimate(&self, _mesh: &TriMesh, target: usize) -> Result<TriMesh, DecimateError> {
            self.requests.borrow_mut().push(target);
            if target == 0 {
                return Err(DecimateError::InvalidTarget(target));
            }
            Ok(TriMesh::new(vec![[0.0; 3]; target], Vec::new()))
        }
    }

    fn mesh_with_vertices(count: usize) -> TriMesh {
        TriMesh::new(vec![[0.0; 3]; count], Vec::new())
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"").unwrap();
        }
    }

    #[test]
    fn test_target_vertex_count() {
        assert_eq!(target_vertex_count(1000, 0.3), 300);
        assert_eq!(target_vertex_count(10, 0.05), 1);
        assert_eq!(target_vertex_count(7, 0.5), 3);
        assert_eq!(target_vertex_count(7, 1.0), 7);
        assert_eq!(target_vertex_count(0, 0.3), 0);
    }

    #[test]
    fn test_reduces_matching_file() {
        let temp = tempdir().unwrap();
        touch(temp.path(), &["a.stl", "notes.txt"]);

        let mut store = FakeStore::default();
        store.meshes.insert("a.stl".to_string(), mesh_with_vertices(1000));
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::defensive(temp.path()).with_ratio(0.3);

        let report = reduce_directory(&config, &store, &decimator).unwrap();

        assert_eq!(*decimator.requests.borrow(), vec![300]);
        assert_eq!(*store.saved.borrow(), vec![("a_reduced.stl".to_string(), 300)]);
        assert_eq!(
            report.outcomes,
            vec![FileOutcome {
                file: temp.path().join("a.stl"),
                status: FileStatus::Reduced {
                    output: temp.path().join("a_reduced.stl"),
                    original_vertices: 1000,
                    target_vertices: 300,
                    result_vertices: 300,
                },
            }]
        );
    }

    #[test]
    fn test_skip_policy_continues_past_failures() {
        let temp = tempdir().unwrap();
        touch(temp.path(), &["a.stl", "b.STL", "c.dae", "d.stl", "e.dae"]);

        let mut store = FakeStore::default();
        store.unreadable.insert("a.stl".to_string());
        store.meshes.insert("b.STL".to_string(), mesh_with_vertices(0));
        store.meshes.insert("c.dae".to_string(), mesh_with_vertices(10));
        store.meshes.insert("d.stl".to_string(), mesh_with_vertices(10));
        store.unwritable.insert("d_reduced.stl".to_string());
        store.meshes.insert("e.dae".to_string(), mesh_with_vertices(4));
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::defensive(temp.path()).with_ratio(0.5);

        let report = reduce_directory(&config, &store, &decimator).unwrap();

        let statuses: Vec<_> = report.outcomes.iter().map(|o| &o.status).collect();
        assert!(matches!(statuses[0], FileStatus::Failed { stage: ReduceStage::Load, .. }));
        assert!(matches!(statuses[1], FileStatus::Skipped { .. }));
        assert!(matches!(statuses[2], FileStatus::Reduced { target_vertices: 5, .. }));
        assert!(matches!(statuses[3], FileStatus::Failed { stage: ReduceStage::Save, .. }));
        assert!(matches!(statuses[4], FileStatus::Reduced { target_vertices: 2, .. }));
        assert_eq!(report.reduced_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.failed_count(), 2);

        // Zero-vertex files never reach the decimator
        assert_eq!(*decimator.requests.borrow(), vec![5, 5, 2]);
        assert_eq!(
            *store.saved.borrow(),
            vec![("c_reduced.dae".to_string(), 5), ("e_reduced.dae".to_string(), 2)]
        );
    }

    #[test]
    fn test_abort_policy_stops_at_first_failure() {
        let temp = tempdir().unwrap();
        touch(temp.path(), &["a.stl", "b.stl", "c.stl"]);

        let mut store = FakeStore::default();
        store.meshes.insert("a.stl".to_string(), mesh_with_vertices(10));
        store.meshes.insert("b.stl".to_string(), mesh_with_vertices(0));
        store.meshes.insert("c.stl".to_string(), mesh_with_vertices(10));
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::stl_only(temp.path()).with_ratio(0.3);

        let result = reduce_directory(&config, &store, &decimator);

        match result {
            Err(ReduceError::File { file, stage, .. }) => {
                assert_eq!(file, "b.stl");
                assert_eq!(stage, ReduceStage::Simplify);
            }
            other => panic!("expected abort on b.stl, got {:?}", other),
        }
        assert_eq!(*store.saved.borrow(), vec![("a_reduced.stl".to_string(), 3)]);
    }

    #[test]
    fn test_save_failure_names_output_file() {
        let temp = tempdir().unwrap();
        touch(temp.path(), &["a.stl", "b.stl"]);

        let mut store = FakeStore::default();
        store.meshes.insert("a.stl".to_string(), mesh_with_vertices(10));
        store.meshes.insert("b.stl".to_string(), mesh_with_vertices(10));
        store.unwritable.insert("a_reduced.stl".to_string());
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::stl_only(temp.path()).with_ratio(0.3);

        let error = reduce_directory(&config, &store, &decimator).unwrap_err();

        match &error {
            ReduceError::File { file, stage, .. } => {
                assert_eq!(file, "a_reduced.stl");
                assert_eq!(*stage, ReduceStage::Save);
            }
            other => panic!("expected save failure, got {:?}", other),
        }
        assert_eq!(error.to_string(), "Error saving a_reduced.stl: IO error: read-only");
        assert!(store.saved.borrow().is_empty());
    }

    #[test]
    fn test_stl_only_profile_filters_and_names() {
        let temp = tempdir().unwrap();
        touch(temp.path(), &["arm.stl", "ARM2.STL", "hand.dae"]);
        std::fs::create_dir(temp.path().join("nested.stl")).unwrap();

        let mut store = FakeStore::default();
        store.meshes.insert("arm.stl".to_string(), mesh_with_vertices(100));
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::stl_only(temp.path()).with_ratio(0.3);

        let report = reduce_directory(&config, &store, &decimator).unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(*store.saved.borrow(), vec![("arm_reduced.stl".to_string(), 30)]);
    }

    #[test]
    fn test_invalid_ratio_rejected_before_listing() {
        let store = FakeStore::default();
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::defensive("/nonexistent/dir").with_ratio(0.0);

        let result = reduce_directory(&config, &store, &decimator);
        assert!(matches!(result, Err(ReduceError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_missing_directory() {
        let store = FakeStore::default();
        let decimator = FakeDecimator::default();
        let config = ReduceConfig::defensive("/nonexistent/definitely/missing");

        let result = reduce_directory(&config, &store, &decimator);
        assert!(matches!(result, Err(ReduceError::ReadDir { .. })));
    }

    #[test]
    fn test_reduce_meshes_on_disk() {
        let temp = tempdir().unwrap();
        let n = 12u32;
        let row = n + 1;
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push([x as f32, y as f32, 0.0]);
            }
        }
        let mut indices = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                indices.extend_from_slice(&[i, i + 1, i + row + 1, i, i + row + 1, i + row]);
            }
        }
        let grid = TriMesh::new(vertices, indices);
        save_stl(&grid, temp.path().join("plate.stl")).unwrap();

        let config = ReduceConfig::defensive(temp.path()).with_ratio(0.3);
        let report = reduce_meshes(&config).unwrap();

        assert_eq!(report.reduced_count(), 1);
        let reduced = load_stl(temp.path().join("plate_reduced.stl")).unwrap();
        assert!(reduced.face_count() < grid.face_count());
    }
}
