//! Operations composed from argument builders and a [`CommandRunner`].
//!
//! Each operation is a linear sequence of steps. The first failing step ends
//! the operation with [`Error::Step`] naming it; earlier steps are not rolled
//! back and nothing is retried.
//!
//! | Operation | Steps |
//! |-----------|-------|
//! | [`build`] | validate (app name included), unlock keychain, pods, build tool, `xcrun PackageApplication`, rename dSYM |
//! | [`clean`] | validate, build tool `clean`, delete `Podfile.lock` / `Pods/` |
//! | [`package`] | check app name, `xcrun PackageApplication`, zip dSYM + ipa |
//! | [`version`] | marketing version, build number, read back |
//! | [`deploy`] | validate (app name included), zip dSYM, upload |
//!
//! ## Example
//!
//! ```ignore
//! use xcship_sdk::exec::ProcessRunner;
//! use xcship_sdk::resolve::resolve_for_build;
//! use xcship_sdk::workflows::build;
//!
//! let runner = ProcessRunner::new();
//! let resolved = resolve_for_build(&config, &project, &runner)?;
//! let outcome = build::run(&resolved, &runner)?;
//! println!("ipa: {:?}", outcome.artifacts.ipa);
//! # Ok::<(), xcship_sdk::Error>(())
//! ```

pub mod build;
pub mod clean;
pub mod deploy;
pub mod package;
pub mod version;

use std::path::Path;

use tracing::{debug, info};

use crate::args;
use crate::exec::CommandRunner;
use crate::resolve::ResolvedBuild;
use crate::types::{ConfigError, Error, KeychainConfig, Step};

pub const PODFILE: &str = "Podfile";
pub const PODFILE_LOCK: &str = "Podfile.lock";
pub const PODS_DIR: &str = "Pods";

/// Checks the workspace/scheme invariant and that the source directory exists.
pub fn validate(resolved: &ResolvedBuild) -> Result<(), ConfigError> {
    resolved.config.validate()?;
    if !resolved.work_dir.is_dir() {
        return Err(ConfigError::InvalidSourceDir(resolved.work_dir.clone()));
    }
    Ok(())
}

/// Every operation that touches the `.app` bundle needs its name.
pub fn require_app_name(resolved: &ResolvedBuild) -> Result<(), ConfigError> {
    if resolved.config.app_name.trim().is_empty() {
        return Err(ConfigError::MissingParameter {
            name: "appName",
            purpose: "to locate the built .app bundle",
        });
    }
    Ok(())
}

/// Unlocks the keychain when both path and password are configured.
///
/// Returns whether a command ran.
pub fn unlock_keychain(
    keychain: &KeychainConfig,
    runner: &dyn CommandRunner,
) -> Result<bool, Error> {
    match args::unlock_keychain(keychain) {
        Some(request) => {
            runner
                .execute(&request)
                .map_err(Error::step(Step::UnlockKeychain))?;
            Ok(true)
        }
        None => {
            debug!("No keychain path and password configured, skipping unlock");
            Ok(false)
        }
    }
}

/// Runs `pod update` or `pod install` depending on the lock file.
pub fn update_pods(work_dir: &Path, runner: &dyn CommandRunner) -> Result<(), Error> {
    let lock_present = work_dir.join(PODFILE_LOCK).exists();
    info!(
        "Running CocoaPods {} in {}",
        if lock_present { "update" } else { "install" },
        work_dir.display()
    );
    runner
        .execute(&args::pods(work_dir, lock_present))
        .map_err(Error::step(Step::UpdatePods))?;
    Ok(())
}

pub fn has_podfile(work_dir: &Path) -> bool {
    work_dir.join(PODFILE).exists()
}
