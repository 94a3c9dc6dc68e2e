//! urdf-prep entry point

mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use urdf_prep_core::{RewriteError, convert_urdf_paths, default_output_path, reduce_meshes};

use crate::cli::{CliOpt, Command, ReduceArgs, RewriteArgs};

fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "urdf_prep=info,urdf_prep_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opt = CliOpt::parse();
    exit_code(run(&opt.command))
}

fn run(command: &Command) -> anyhow::Result<()> {
    match command {
        Command::RewritePaths(args) => rewrite_paths(args),
        Command::ReduceMeshes(args) => reduce(args),
    }
}

/// Log the error line; a missing rewrite input is reported but is not a failure
fn exit_code(result: anyhow::Result<()>) -> ExitCode {
    let Err(e) = result else {
        return ExitCode::SUCCESS;
    };
    tracing::error!("{:#}", e);

    match e.downcast_ref::<RewriteError>() {
        Some(RewriteError::FileNotFound { .. }) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn rewrite_paths(args: &RewriteArgs) -> anyhow::Result<()> {
    let output = args
        .output_file
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input_file));

    let conversions = convert_urdf_paths(&args.input_file, &output, &args.options())?;
    tracing::debug!("{} mesh paths converted", conversions.len());
    Ok(())
}

fn reduce(args: &ReduceArgs) -> anyhow::Result<()> {
    let config = args.to_config().context("invalid reduction settings")?;

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    tracing::info!(
        "Reducing meshes in {} to {:.0}% of their vertices",
        config.directory.display(),
        config.ratio * 100.0
    );
    let report = reduce_meshes(&config)?;
    tracing::info!(
        "Done: {} reduced, {} skipped, {} failed",
        report.reduced_count(),
        report.skipped_count(),
        report.failed_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(argv: &[&str]) -> Command {
        CliOpt::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_missing_rewrite_input_exits_successfully() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("missing.urdf");
        let output = temp.path().join("out.urdf");
        let command = parse(&[
            "urdf-prep",
            "rewrite-paths",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
        ]);

        let result = run(&command);

        assert!(matches!(
            result.as_ref().map_err(|e| e.downcast_ref::<RewriteError>()),
            Err(Some(RewriteError::FileNotFound { .. }))
        ));
        assert_eq!(exit_code(result), ExitCode::SUCCESS);
        assert!(!output.exists());
    }

    #[test]
    fn test_malformed_rewrite_input_fails() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("broken.urdf");
        std::fs::write(&input, "<robot><link></robot>").unwrap();
        let command = parse(&["urdf-prep", "rewrite-paths", input.to_str().unwrap()]);

        assert_eq!(exit_code(run(&command)), ExitCode::FAILURE);
    }

    #[test]
    fn test_invalid_reduce_settings_fail() {
        let temp = tempdir().unwrap();
        let command = parse(&[
            "urdf-prep",
            "reduce-meshes",
            temp.path().to_str().unwrap(),
            "--ratio",
            "0",
        ]);

        assert_eq!(exit_code(run(&command)), ExitCode::FAILURE);
    }

    #[test]
    fn test_empty_directory_succeeds() {
        let temp = tempdir().unwrap();
        let command = parse(&["urdf-prep", "reduce-meshes", temp.path().to_str().unwrap()]);

        assert_eq!(exit_code(run(&command)), ExitCode::SUCCESS);
    }
}
