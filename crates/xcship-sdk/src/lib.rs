//! iOS build automation SDK
//!
//! `xcship-sdk` drives the Apple command-line toolchain (`xcodebuild` or
//! `xctool`, `xcrun`, `agvtool`, `pod`, `security`, `zip`) to build, clean,
//! package and version an iOS project, and uploads the result to HockeyApp.
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Exec**: Runs one external command, streaming its merged output to the log
//! - **Args**: Turns resolved configuration into exact argument lists
//! - **Resolve**: Fills defaults, derives artifact paths, picks the build tool
//! - **Workflows**: Sequences commands into build/clean/package/version/deploy
//!
//! External effects sit behind two traits: [`exec::CommandRunner`] for
//! processes and [`workflows::deploy::Uploader`] for the HTTP upload.
//!
//! # Example
//!
//! ```ignore
//! use xcship_sdk::exec::ProcessRunner;
//! use xcship_sdk::resolve::resolve_for_build;
//! use xcship_sdk::{BuildConfig, ProjectMetadata};
//!
//! fn main() -> Result<(), xcship_sdk::Error> {
//!     let config = BuildConfig {
//!         source_dir: "ios".into(),
//!         app_name: "Demo".to_string(),
//!         workspace_name: Some("Demo".to_string()),
//!         scheme: Some("Demo".to_string()),
//!         ..BuildConfig::default()
//!     };
//!     let project = ProjectMetadata {
//!         base_dir: std::env::current_dir().unwrap(),
//!         version: Some("1.0.0".to_string()),
//!         ..ProjectMetadata::default()
//!     };
//!
//!     let runner = ProcessRunner::new();
//!     let resolved = resolve_for_build(&config, &project, &runner)?;
//!     let outcome = xcship_sdk::workflows::build::run(&resolved, &runner)?;
//!     println!("ipa: {}", outcome.artifacts.ipa.display());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod args;
pub mod exec;
pub mod resolve;
pub mod types;
pub mod workflows;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use exec::{CommandRunner, ExecutionRequest, ProcessRunner};
pub use resolve::{BuildTool, ResolvedBuild, resolve, resolve_for_build};
pub use types::{
    ArtifactPaths, BuildConfig, BuildOutcome, BuildToolPreference, CleanOutcome, ConfigError,
    DeployConfig, DeployOutcome, Error, ExecError, KeychainConfig, PackageOutcome,
    ProjectMetadata, Step, UploadError, VersionConfig, VersionOutcome,
};
pub use workflows::deploy::{DeployRequest, UploadReceipt, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
