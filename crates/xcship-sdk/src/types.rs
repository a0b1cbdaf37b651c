//! Core types for xcship-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`Error`] and its parts [`ConfigError`], [`ExecError`], [`UploadError`]
//! - [`Step`] - The workflow step a failure is attributed to
//! - [`BuildConfig`] / [`KeychainConfig`] / [`BuildToolPreference`] - Build configuration
//! - [`ProjectMetadata`] - Project-level facts (base dir, output dir, final name, version)
//! - [`VersionConfig`] / [`DeployConfig`] - Inputs to update-version and deploy
//! - [`BuildOutcome`] and friends - Output from operations

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default SDK passed to the build tool and to `xcrun`.
pub const DEFAULT_SDK: &str = "iphoneos";

/// Default build configuration when none is configured.
pub const DEFAULT_BUILD_CONFIGURATION: &str = "Adhoc";

/// Directory (under the target dir) used for shared precompiled headers.
pub const DEFAULT_SHARED_PRECOMPS_DIR: &str = "SharedPrecompiledHeaders";

/// Default build output directory, relative to the project base directory.
pub const DEFAULT_TARGET_DIR: &str = "target";

/// Invalid or missing configuration, detected before any command runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required parameter was not provided.
    #[error("the '{name}' parameter is required {purpose}")]
    MissingParameter {
        name: &'static str,
        purpose: &'static str,
    },

    /// Building a workspace needs a scheme to select what to build.
    #[error("the 'scheme' parameter is required when building a workspace")]
    WorkspaceWithoutScheme,

    /// The source directory does not exist.
    #[error("invalid source directory: {0}")]
    InvalidSourceDir(PathBuf),

    /// `xctool` was requested explicitly but could not be located.
    #[error("build tool 'xctool' was requested but is not available: {0}")]
    BuildToolUnavailable(String),

    /// A path could not be made absolute.
    #[error("could not resolve path {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single external command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The process could not be started (missing executable, bad working dir).
    #[error("failed to start '{program}': {source}. Ensure the tool is installed and available on PATH")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the merged output stream failed.
    #[error("an error occurred while reading the output of '{program}': {source}")]
    IoFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully. Termination by signal reports `-1`.
    #[error("'{program}' was unsuccessful (exit code {code})")]
    NonZeroExit { program: String, code: i32 },

    /// Waiting for the process was interrupted.
    ///
    /// `Child::wait` already retries on `EINTR`, so std does not surface this
    /// in practice. Kept so callers can match every failure kind.
    #[error("interrupted while waiting for '{program}'")]
    Interrupted { program: String },
}

impl ExecError {
    /// Exit code for [`ExecError::NonZeroExit`], `None` otherwise.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failure of the deploy upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// An artifact that must be uploaded is not on disk.
    #[error("could not find {kind} at '{path}'. You must compile the artifact before deploying")]
    MissingArtifact { kind: &'static str, path: PathBuf },

    /// The request could not be sent or the response could not be read.
    #[error("network error while uploading to HockeyApp: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("HockeyApp rejected the upload: {status_line}\n{body}")]
    Rejected { status_line: String, body: String },
}

/// Workflow step a command failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    ProbeBuildTool,
    UnlockKeychain,
    UpdatePods,
    Build,
    PackageApplication,
    RenameDsym,
    Clean,
    ZipPackage,
    ZipDsym,
    MarketingVersion,
    BuildNumber,
    ReadBuildNumber,
}

impl Step {
    /// Human-readable name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ProbeBuildTool => "probe build tool",
            Step::UnlockKeychain => "unlock keychain",
            Step::UpdatePods => "update pods",
            Step::Build => "build",
            Step::PackageApplication => "package application",
            Step::RenameDsym => "rename dSYM",
            Step::Clean => "clean",
            Step::ZipPackage => "zip package",
            Step::ZipDsym => "zip dSYM",
            Step::MarketingVersion => "stamp marketing version",
            Step::BuildNumber => "stamp build number",
            Step::ReadBuildNumber => "read build number",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for xcship-sdk operations.
///
/// The first failure of an operation is terminal: nothing is retried and
/// completed steps are not rolled back.
///
/// # Example
///
/// ```ignore
/// use xcship_sdk::{Error, ExecError};
///
/// match xcship_sdk::workflows::build::run(&resolved, &runner) {
///     Ok(outcome) => println!("ipa at {:?}", outcome.artifacts.ipa),
///     Err(Error::Step { step, source: ExecError::NonZeroExit { code, .. } }) => {
///         eprintln!("{step} exited with {code}");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration was invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An external command failed during the named step.
    #[error("{step} failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: ExecError,
    },

    /// The deploy upload failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A filesystem operation performed by the workflow itself failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn step(step: Step) -> impl FnOnce(ExecError) -> Error {
        move |source| Error::Step { step, source }
    }
}

/// Which build tool to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildToolPreference {
    /// Use `xctool` when `which xctool` finds an executable, else `xcodebuild`.
    #[default]
    Auto,
    /// Always use `xcodebuild` without probing.
    Xcodebuild,
    /// Require `xctool`.
    Xctool,
}

/// Keychain to unlock before building.
///
/// Unlocking only happens when both fields are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeychainConfig {
    pub path: Option<PathBuf>,
    pub password: Option<String>,
}

/// Configuration for building, cleaning and packaging an iOS project.
///
/// Unset optional fields receive defaults during resolution
/// (see [`crate::resolve`]).
///
/// # Example
///
/// ```
/// use xcship_sdk::BuildConfig;
///
/// let config = BuildConfig {
///     app_name: "Demo".to_string(),
///     project_name: Some("Demo".to_string()),
///     scheme: Some("Demo".to_string()),
///     ..BuildConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory of the Xcode project, relative to the project base dir.
    pub source_dir: PathBuf,
    /// Name of the `.app` bundle produced by the build.
    pub app_name: String,
    pub project_name: Option<String>,
    pub workspace_name: Option<String>,
    pub scheme: Option<String>,
    pub target: Option<String>,
    pub sdk: Option<String>,
    pub build_configuration: Option<String>,
    pub code_sign_identity: Option<String>,
    /// Extra `KEY=VALUE` settings passed to the build tool in insertion order.
    pub build_settings: IndexMap<String, String>,
    pub keychain: KeychainConfig,
    pub skip_pods_update: bool,
    /// Delete `Podfile.lock` and `Pods/` during clean.
    pub clean_pods: bool,
    pub build_tool: BuildToolPreference,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            app_name: String::new(),
            project_name: None,
            workspace_name: None,
            scheme: None,
            target: None,
            sdk: None,
            build_configuration: None,
            code_sign_identity: None,
            build_settings: IndexMap::new(),
            keychain: KeychainConfig::default(),
            skip_pods_update: false,
            clean_pods: true,
            build_tool: BuildToolPreference::Auto,
        }
    }
}

impl BuildConfig {
    /// Checks invariants that do not depend on the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace_name.is_some() && self.scheme.is_none() {
            return Err(ConfigError::WorkspaceWithoutScheme);
        }
        Ok(())
    }
}

/// Facts about the enclosing project.
#[derive(Debug, Clone, Default)]
pub struct ProjectMetadata {
    /// Project root; `source_dir` and a relative `target_dir` hang off it.
    pub base_dir: PathBuf,
    /// Build output directory. Defaults to [`DEFAULT_TARGET_DIR`].
    pub target_dir: Option<PathBuf>,
    /// Base name of produced artifacts.
    pub final_name: Option<String>,
    /// Project version, used when no explicit iOS version is configured.
    pub version: Option<String>,
}

impl ProjectMetadata {
    /// Final artifact name: explicit, else `{app_name}-{version}`, else `app_name`.
    pub fn final_name_for(&self, app_name: &str) -> String {
        match (&self.final_name, &self.version) {
            (Some(name), _) if !name.is_empty() => name.clone(),
            (_, Some(version)) if !version.is_empty() => format!("{app_name}-{version}"),
            _ => app_name.to_string(),
        }
    }
}

/// Inputs to the update-version operation.
#[derive(Debug, Clone, Default)]
pub struct VersionConfig {
    pub source_dir: PathBuf,
    /// Marketing version; falls back to [`ProjectMetadata::version`].
    pub version: Option<String>,
    /// Explicit build number. Takes priority over `increment_build_number`.
    pub build_number: Option<String>,
    pub increment_build_number: bool,
}

/// HockeyApp deploy parameters.
#[derive(Debug, Clone, Default)]
pub struct DeployConfig {
    pub api_token: Option<String>,
    pub app_identifier: Option<String>,
    pub notes: Option<String>,
    pub notes_type: Option<String>,
    pub notify: Option<String>,
    pub status: Option<String>,
    pub mandatory: Option<String>,
    pub tags: Option<String>,
}

/// Paths derived from the resolved configuration.
///
/// Computed once per operation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPaths {
    /// `{target_dir}/{configuration}-{sdk}`
    pub app_dir: PathBuf,
    /// `{app_dir}/{app_name}.app`
    pub app_bundle: PathBuf,
    /// `{app_dir}/{final_name}.ipa`
    pub ipa: PathBuf,
    /// dSYM as written by the build tool: `{app_dir}/{app_name}.app.dSYM`
    pub generated_dsym: PathBuf,
    /// dSYM after renaming: `{app_dir}/{final_name}.app.dSYM`
    pub dsym: PathBuf,
    /// `{app_dir}/{final_name}.dSYM.zip`
    pub dsym_zip: PathBuf,
    /// `{app_dir}/{final_name}.zip`
    pub package: PathBuf,
}

/// Result of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub artifacts: ArtifactPaths,
    /// Build tool that was invoked (`xcodebuild` or the xctool path).
    pub build_tool: String,
    pub pods_updated: bool,
    pub keychain_unlocked: bool,
}

/// Result of a successful clean.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanOutcome {
    /// Pods paths that were removed.
    pub removed: Vec<PathBuf>,
    /// Pods paths whose removal failed.
    pub failed: Vec<PathBuf>,
}

/// Result of a successful package operation.
#[derive(Debug, Clone, Serialize)]
pub struct PackageOutcome {
    /// The produced output artifact.
    pub artifact: PathBuf,
    pub ipa: PathBuf,
}

/// Result of a successful update-version operation.
#[derive(Debug, Clone, Serialize)]
pub struct VersionOutcome {
    pub version: String,
    /// Build number as reported by `agvtool what-version -terse`.
    pub build_number: String,
}

/// Result of a successful deploy.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub status_line: String,
    pub body: String,
    pub ipa: PathBuf,
    pub dsym_zip: PathBuf,
}
