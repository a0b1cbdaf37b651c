//! Update-version operation, backed by `agvtool`.

use std::path::PathBuf;

use tracing::info;

use crate::args;
use crate::exec::CommandRunner;
use crate::types::{ConfigError, Error, ProjectMetadata, Step, VersionConfig, VersionOutcome};

/// Stamps the marketing version and build number, then reads the number back.
///
/// An explicit `build_number` wins over `increment_build_number`; with
/// neither, the build number is left alone.
pub fn run(
    config: &VersionConfig,
    project: &ProjectMetadata,
    runner: &dyn CommandRunner,
) -> Result<VersionOutcome, Error> {
    let version = resolve_version(config, project)?;
    let work_dir = work_dir(config, project);
    if !work_dir.is_dir() {
        return Err(ConfigError::InvalidSourceDir(work_dir).into());
    }

    info!("Updating iOS version");

    runner
        .execute(&args::marketing_version(&work_dir, &version))
        .map_err(Error::step(Step::MarketingVersion))?;

    let build_number = config.build_number.as_deref().filter(|n| !n.is_empty());
    if let Some(request) =
        args::build_number(&work_dir, build_number, config.increment_build_number)
    {
        runner
            .execute(&request)
            .map_err(Error::step(Step::BuildNumber))?;
    }

    let current = runner
        .execute(&args::read_build_number(&work_dir))
        .map_err(Error::step(Step::ReadBuildNumber))?
        .trim()
        .to_string();

    info!("Updated iOS version to {} ({})", version, current);
    Ok(VersionOutcome {
        version,
        build_number: current,
    })
}

fn resolve_version(
    config: &VersionConfig,
    project: &ProjectMetadata,
) -> Result<String, ConfigError> {
    [config.version.as_deref(), project.version.as_deref()]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingParameter {
            name: "version",
            purpose: "to update the iOS version (set [version].version or [project].version)",
        })
}

fn work_dir(config: &VersionConfig, project: &ProjectMetadata) -> PathBuf {
    if config.source_dir.as_os_str().is_empty() {
        project.base_dir.clone()
    } else {
        project.base_dir.join(&config.source_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use tempfile::TempDir;

    fn project(dir: &TempDir) -> ProjectMetadata {
        ProjectMetadata {
            base_dir: dir.path().to_path_buf(),
            version: Some("1.4.0".into()),
            ..ProjectMetadata::default()
        }
    }

    #[test]
    fn test_explicit_build_number_wins_over_increment() {
        let dir = TempDir::new().unwrap();
        let config = VersionConfig {
            build_number: Some("42".into()),
            increment_build_number: true,
            ..VersionConfig::default()
        };
        let runner = RecordingRunner::new().respond("agvtool", "42\n");

        let outcome = run(&config, &project(&dir), &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], vec!["agvtool", "new-marketing-version", "1.4.0"]);
        assert_eq!(calls[1], vec!["agvtool", "new-version", "-all", "42"]);
        assert_eq!(calls[2], vec!["agvtool", "what-version", "-terse"]);
        assert!(!calls.iter().any(|c| c.contains(&"next-version".to_string())));
        assert_eq!(outcome.build_number, "42");
    }

    #[test]
    fn test_increment_build_number() {
        let dir = TempDir::new().unwrap();
        let config = VersionConfig {
            version: Some("2.0.0".into()),
            increment_build_number: true,
            ..VersionConfig::default()
        };
        let runner = RecordingRunner::new().respond("agvtool", "7");

        let outcome = run(&config, &project(&dir), &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0], vec!["agvtool", "new-marketing-version", "2.0.0"]);
        assert_eq!(calls[1], vec!["agvtool", "next-version", "-all"]);
        assert_eq!(outcome.version, "2.0.0");
        assert_eq!(outcome.build_number, "7");
    }

    #[test]
    fn test_marketing_version_only() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();

        run(&VersionConfig::default(), &project(&dir), &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec!["agvtool", "what-version", "-terse"]);
    }

    #[test]
    fn test_missing_version_fails_before_running() {
        let dir = TempDir::new().unwrap();
        let project = ProjectMetadata {
            base_dir: dir.path().to_path_buf(),
            ..ProjectMetadata::default()
        };
        let runner = RecordingRunner::new();

        let err = run(&VersionConfig::default(), &project, &runner).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingParameter { name: "version", .. })
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_marketing_failure_stops_sequence() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new().fail_on("agvtool", 1);

        let err = run(&VersionConfig::default(), &project(&dir), &runner).unwrap_err();
        assert!(matches!(
            err,
            Error::Step {
                step: Step::MarketingVersion,
                ..
            }
        ));
        assert_eq!(runner.calls().len(), 1);
    }
}
