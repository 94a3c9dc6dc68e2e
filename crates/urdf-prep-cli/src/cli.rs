//! CLI options.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use urdf_prep_core::{ConfigError, ErrorPolicy, OutputNaming, ReduceConfig, RewriteOptions};

/// Robot asset preparation tools.
#[derive(Debug, Parser)]
#[command(name = "urdf-prep", version, about)]
pub struct CliOpt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert all 'package://' mesh paths in a URDF/Xacro file to relative paths.
    RewritePaths(RewriteArgs),
    /// Simplify every STL/DAE mesh in a directory by vertex-count reduction.
    ReduceMeshes(ReduceArgs),
}

#[derive(Debug, Args)]
pub struct RewriteArgs {
    /// Input URDF or Xacro file path
    pub input_file: PathBuf,
    /// Output file path (defaults to `<input>_relative.<ext>`)
    pub output_file: Option<PathBuf>,
    /// Mesh reference element name
    #[arg(long, default_value = "mesh")]
    pub tag: String,
    /// Attribute holding the mesh path
    #[arg(long, default_value = "filename")]
    pub attribute: String,
    /// Scheme marker stripped together with the package name
    #[arg(long, default_value = "package://")]
    pub scheme: String,
}

impl RewriteArgs {
    pub fn options(&self) -> RewriteOptions {
        RewriteOptions {
            tag: self.tag.clone(),
            attribute: self.attribute.clone(),
            scheme: self.scheme.clone(),
        }
    }
}

/// Preset matching one of the two historical reduction scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// STL + DAE, any case, `_reduced` suffix, failures skipped
    Defensive,
    /// Lowercase .stl only, extension replaced, first failure aborts
    StlOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NamingArg {
    Suffix,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnErrorArg {
    Skip,
    Abort,
}

#[derive(Debug, Args)]
pub struct ReduceArgs {
    /// Directory containing the meshes [default: ./meshes]
    pub directory: Option<PathBuf>,
    /// Fraction of the original vertex count to keep, in (0, 1] [default: 0.3]
    #[arg(long)]
    pub ratio: Option<f64>,
    /// Preset the other options start from
    #[arg(long, value_enum, default_value_t = Profile::Defensive)]
    pub profile: Profile,
    /// Load settings from a RON file (flags still override it)
    #[arg(long, conflicts_with = "profile")]
    pub config: Option<PathBuf>,
    /// Write the effective settings to a RON file before running
    #[arg(long)]
    pub save_config: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub naming: Option<NamingArg>,
    #[arg(long, value_enum)]
    pub on_error: Option<OnErrorArg>,
    /// File extension to process (repeatable)
    #[arg(long = "ext")]
    pub extensions: Vec<String>,
    /// Match extensions case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,
    /// Text inserted into output file names
    #[arg(long)]
    pub suffix: Option<String>,
    /// Simplification error bound relative to the mesh size
    #[arg(long)]
    pub max_error: Option<f32>,
}

impl ReduceArgs {
    /// Effective configuration: config file or profile, then flag overrides
    pub fn to_config(&self) -> Result<ReduceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ReduceConfig::load(path)?,
            None => {
                let directory = PathBuf::from(ReduceConfig::DEFAULT_DIRECTORY);
                match self.profile {
                    Profile::Defensive => ReduceConfig::defensive(directory),
                    Profile::StlOnly => ReduceConfig::stl_only(directory),
                }
            }
        };

        if let Some(directory) = &self.directory {
            config.directory = directory.clone();
        }
        if let Some(ratio) = self.ratio {
            config.ratio = ratio;
        }
        if let Some(naming) = self.naming {
            config.naming = match naming {
                NamingArg::Suffix => OutputNaming::Suffix,
                NamingArg::Replace => OutputNaming::Replace,
            };
        }
        if let Some(on_error) = self.on_error {
            config.on_error = match on_error {
                OnErrorArg::Skip => ErrorPolicy::Skip,
                OnErrorArg::Abort => ErrorPolicy::Abort,
            };
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions.clone();
        }
        if self.case_sensitive {
            config.case_sensitive = true;
        }
        if let Some(suffix) = &self.suffix {
            config.suffix = suffix.clone();
        }
        if let Some(max_error) = self.max_error {
            config.max_error = max_error;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn reduce_args(args: &[&str]) -> ReduceArgs {
        let argv = ["urdf-prep", "reduce-meshes"].iter().chain(args);
        match CliOpt::try_parse_from(argv).unwrap().command {
            Command::ReduceMeshes(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition() {
        CliOpt::command().debug_assert();
    }

    #[test]
    fn test_rewrite_positionals() {
        let opt = CliOpt::try_parse_from(["urdf-prep", "rewrite-paths", "in.urdf", "out.urdf"])
            .unwrap();
        let Command::RewritePaths(args) = opt.command else {
            panic!("expected rewrite-paths");
        };
        assert_eq!(args.input_file, PathBuf::from("in.urdf"));
        assert_eq!(args.output_file, Some(PathBuf::from("out.urdf")));
        assert_eq!(args.options(), RewriteOptions::default());
    }

    #[test]
    fn test_reduce_defaults() {
        let config = reduce_args(&[]).to_config().unwrap();
        assert_eq!(config, ReduceConfig::default());
    }

    #[test]
    fn test_reduce_profile_and_overrides() {
        let config = reduce_args(&[
            "assets",
            "--profile",
            "stl-only",
            "--ratio",
            "0.5",
            "--on-error",
            "skip",
        ])
        .to_config()
        .unwrap();

        assert_eq!(config.directory, PathBuf::from("assets"));
        assert_eq!(config.ratio, 0.5);
        assert_eq!(config.naming, OutputNaming::Replace);
        assert_eq!(config.on_error, ErrorPolicy::Skip);
        assert_eq!(config.extensions, vec!["stl"]);
    }

    #[test]
    fn test_reduce_rejects_out_of_range_ratio() {
        let result = reduce_args(&["--ratio", "1.5"]).to_config();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_reduce_config_file_with_overrides() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("reduce.ron");
        ReduceConfig::stl_only("from_file").save(&path).unwrap();

        let config = reduce_args(&["--config", path.to_str().unwrap(), "--ext", "dae"])
            .to_config()
            .unwrap();

        assert_eq!(config.directory, PathBuf::from("from_file"));
        assert_eq!(config.extensions, vec!["dae"]);
        assert_eq!(config.on_error, ErrorPolicy::Abort);
    }
}
