//! Configuration resolution.
//!
//! Applies defaults to a [`BuildConfig`], computes the working directory,
//! the absolute build output directory and the [`ArtifactPaths`] once, and
//! picks the [`BuildTool`]. Everything downstream reads the resulting
//! [`ResolvedBuild`] and never recomputes paths.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::args;
use crate::exec::CommandRunner;
use crate::types::{
    ArtifactPaths, BuildConfig, BuildToolPreference, ConfigError, DEFAULT_BUILD_CONFIGURATION,
    DEFAULT_SDK, DEFAULT_TARGET_DIR, Error, ProjectMetadata, Step,
};

/// Alternate build runner probed by [`detect_build_tool`].
pub const XCTOOL: &str = "xctool";

/// Standard build tool.
pub const XCODEBUILD: &str = "xcodebuild";

/// Build tool chosen for build and clean.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BuildTool {
    #[default]
    Xcodebuild,
    /// `xctool` at the path reported by `which`.
    Xctool(PathBuf),
}

impl BuildTool {
    /// Executable placed in argv[0].
    pub fn command(&self) -> String {
        match self {
            BuildTool::Xcodebuild => XCODEBUILD.to_string(),
            BuildTool::Xctool(path) => path.display().to_string(),
        }
    }
}

/// A [`BuildConfig`] with defaults applied and paths derived.
#[derive(Debug, Clone)]
pub struct ResolvedBuild {
    /// The configuration as given, for the optional fields builders pass through.
    pub config: BuildConfig,
    pub sdk: String,
    pub configuration: String,
    /// `base_dir/source_dir`; every command of the operation runs here.
    pub work_dir: PathBuf,
    /// Absolute build output directory.
    pub target_dir: PathBuf,
    pub final_name: String,
    pub artifacts: ArtifactPaths,
    pub build_tool: BuildTool,
}

impl ResolvedBuild {
    pub fn with_build_tool(mut self, build_tool: BuildTool) -> Self {
        self.build_tool = build_tool;
        self
    }

    /// Configuration set explicitly by the user, ignoring the default.
    pub fn explicit_configuration(&self) -> Option<&str> {
        non_empty(self.config.build_configuration.as_deref())
    }
}

/// Applies defaults and derives paths. Does not touch external tools.
pub fn resolve(
    config: &BuildConfig,
    project: &ProjectMetadata,
) -> Result<ResolvedBuild, ConfigError> {
    let sdk = non_empty(config.sdk.as_deref()).unwrap_or(DEFAULT_SDK).to_string();
    let configuration = non_empty(config.build_configuration.as_deref())
        .unwrap_or(DEFAULT_BUILD_CONFIGURATION)
        .to_string();

    let work_dir = join_relative(&project.base_dir, &config.source_dir);

    let target_dir = project
        .target_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_DIR));
    let target_dir = join_relative(&project.base_dir, &target_dir);
    let target_dir = std::path::absolute(&target_dir).map_err(|source| ConfigError::Path {
        path: target_dir.clone(),
        source,
    })?;

    let final_name = project.final_name_for(&config.app_name);
    let artifacts = artifact_paths(
        &target_dir,
        &configuration,
        &sdk,
        &config.app_name,
        &final_name,
    );

    debug!(
        "Resolved sdk={} configuration={} work_dir={} app_dir={}",
        sdk,
        configuration,
        work_dir.display(),
        artifacts.app_dir.display()
    );

    Ok(ResolvedBuild {
        config: config.clone(),
        sdk,
        configuration,
        work_dir,
        target_dir,
        final_name,
        artifacts,
        build_tool: BuildTool::Xcodebuild,
    })
}

/// Resolves the configuration and the build tool in one go.
pub fn resolve_for_build(
    config: &BuildConfig,
    project: &ProjectMetadata,
    runner: &dyn CommandRunner,
) -> Result<ResolvedBuild, Error> {
    let resolved = resolve(config, project)?;
    let tool = detect_build_tool(config.build_tool, runner)?;
    Ok(resolved.with_build_tool(tool))
}

/// Picks the build tool according to `preference`.
///
/// With [`BuildToolPreference::Auto`] any failure of the `which` probe (tool
/// missing, non-executable path, probe not runnable) falls back to
/// `xcodebuild`.
pub fn detect_build_tool(
    preference: BuildToolPreference,
    runner: &dyn CommandRunner,
) -> Result<BuildTool, Error> {
    match preference {
        BuildToolPreference::Xcodebuild => Ok(BuildTool::Xcodebuild),
        BuildToolPreference::Auto => match probe_xctool(runner) {
            Ok(path) => {
                info!("Using {} at {}", XCTOOL, path.display());
                Ok(BuildTool::Xctool(path))
            }
            Err(reason) => {
                debug!(
                    "{} not usable ({}), falling back to {}",
                    XCTOOL, reason, XCODEBUILD
                );
                Ok(BuildTool::Xcodebuild)
            }
        },
        BuildToolPreference::Xctool => probe_xctool(runner)
            .map(BuildTool::Xctool)
            .map_err(|reason| ConfigError::BuildToolUnavailable(reason).into()),
    }
}

fn probe_xctool(runner: &dyn CommandRunner) -> Result<PathBuf, String> {
    let output = runner
        .execute(&args::which(XCTOOL))
        .map_err(|e| format!("{} failed: {e}", Step::ProbeBuildTool))?;

    let path = PathBuf::from(output.trim());
    if path.as_os_str().is_empty() {
        return Err(format!("'which {XCTOOL}' printed nothing"));
    }
    if !is_executable(&path) {
        return Err(format!("{} is not an executable file", path.display()));
    }
    Ok(path)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn artifact_paths(
    target_dir: &Path,
    configuration: &str,
    sdk: &str,
    app_name: &str,
    final_name: &str,
) -> ArtifactPaths {
    let app_dir = target_dir.join(format!("{configuration}-{sdk}"));
    ArtifactPaths {
        app_bundle: app_dir.join(format!("{app_name}.app")),
        ipa: app_dir.join(format!("{final_name}.ipa")),
        generated_dsym: app_dir.join(format!("{app_name}.app.dSYM")),
        dsym: app_dir.join(format!("{final_name}.app.dSYM")),
        dsym_zip: app_dir.join(format!("{final_name}.dSYM.zip")),
        package: app_dir.join(format!("{final_name}.zip")),
        app_dir,
    }
}

fn join_relative(base: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        base.to_path_buf()
    } else {
        base.join(path)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
