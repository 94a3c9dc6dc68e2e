//! Batch reduction configuration
//!
//! A `ReduceConfig` replaces the directory/ratio constants the reduction
//! scripts used to hard-code. It can be built in code, from CLI flags, or
//! loaded from a RON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How output file names are derived from input names
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputNaming {
    /// `link.stl` -> `link_reduced.stl` (suffix before the final extension)
    #[default]
    Suffix,
    /// Every `.stl` in the name becomes `_reduced.stl`
    Replace,
}

/// What to do when one file in the batch fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure and continue with the next file
    #[default]
    Skip,
    /// Stop the batch at the first failure
    Abort,
}

fn default_extensions() -> Vec<String> {
    vec!["stl".to_string(), "dae".to_string()]
}

fn default_suffix() -> String {
    "_reduced".to_string()
}

fn default_max_error() -> f32 {
    1.0
}

/// Configuration for one batch reduction run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReduceConfig {
    /// Directory scanned (non-recursively) for meshes
    pub directory: PathBuf,
    /// Fraction of the original vertex count to keep, in (0, 1]
    pub ratio: f64,
    /// File extensions to process, without the leading dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Match extensions case-sensitively
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub naming: OutputNaming,
    /// Text inserted into output file names
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    /// Simplification error bound handed to the decimator
    #[serde(default = "default_max_error")]
    pub max_error: f32,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self::defensive(Self::DEFAULT_DIRECTORY)
    }
}

impl ReduceConfig {
    pub const DEFAULT_DIRECTORY: &'static str = "./meshes";
    pub const DEFAULT_RATIO: f64 = 0.3;

    /// STL and DAE, case-insensitive, `_reduced` suffix, failures skipped
    pub fn defensive(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ratio: Self::DEFAULT_RATIO,
            extensions: default_extensions(),
            case_sensitive: false,
            naming: OutputNaming::Suffix,
            suffix: default_suffix(),
            on_error: ErrorPolicy::Skip,
            max_error: default_max_error(),
        }
    }

    /// Lowercase `.stl` only, extension replaced in the name, first failure aborts
    pub fn stl_only(directory: impl Into<PathBuf>) -> Self {
        Self {
            extensions: vec!["stl".to_string()],
            case_sensitive: true,
            naming: OutputNaming::Replace,
            on_error: ErrorPolicy::Abort,
            ..Self::defensive(directory)
        }
    }

    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.ratio = ratio;
        self
    }

    /// Check the configuration before any file is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ratio.is_finite() || self.ratio <= 0.0 || self.ratio > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "reduction ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("no file extensions configured".to_string()));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::Invalid(format!("invalid extension '{}'", bad)));
        }
        if self.suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "output suffix must not be empty".to_string(),
            ));
        }
        if !self.max_error.is_finite() || self.max_error < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max error must be a non-negative number, got {}",
                self.max_error
            )));
        }
        Ok(())
    }

    /// Return the extension (with dot, as spelled in `file_name`) if the file
    /// should be processed
    pub fn matches<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.extensions.iter().find_map(|ext| {
            let dotted = format!(".{}", ext.trim_start_matches('.'));
            let start = file_name.len().checked_sub(dotted.len())?;
            let tail = file_name.get(start..)?;
            let hit = if self.case_sensitive {
                tail == dotted
            } else {
                tail.eq_ignore_ascii_case(&dotted)
            };
            hit.then_some(tail)
        })
    }

    /// Output file name for `file_name`, whose extension matched as `matched_ext`
    pub fn output_name(&self, file_name: &str, matched_ext: &str) -> String {
        match self.naming {
            OutputNaming::Suffix => match file_name.rsplit_once('.') {
                Some((stem, ext)) => format!("{}{}.{}", stem, self.suffix, ext),
                None => format!("{}{}", file_name, self.suffix),
            },
            OutputNaming::Replace => {
                file_name.replace(matched_ext, &format!("{}{}", self.suffix, matched_ext))
            }
        }
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            ron::from_str(&content).map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save the configuration as pretty-printed RON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// IO error during file operations
    Io(String),
    /// Error during serialization
    Serialize(String),
    /// Error during deserialization
    Deserialize(String),
    /// Values out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO error: {}", msg),
            ConfigError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
            ConfigError::Deserialize(msg) => write!(f, "Deserialization error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
