//! Build operation.

use std::fs;
use std::io::ErrorKind;

use tracing::{debug, info};

use super::{has_podfile, require_app_name, unlock_keychain, update_pods, validate};
use crate::args;
use crate::exec::CommandRunner;
use crate::resolve::ResolvedBuild;
use crate::types::{ArtifactPaths, BuildOutcome, Error, Step};

/// Builds the app and packages it as an ipa.
///
/// This performs the following steps:
/// 1. Validate parameters (app name set, workspace needs a scheme, source dir exists)
/// 2. Unlock the keychain (skipped unless path and password are set)
/// 3. `pod update`/`pod install` when a `Podfile` exists and pods are not skipped
/// 4. Run the build tool
/// 5. `xcrun PackageApplication` into `{final_name}.ipa`
/// 6. Rename `{app_name}.app.dSYM` to `{final_name}.app.dSYM`
pub fn run(resolved: &ResolvedBuild, runner: &dyn CommandRunner) -> Result<BuildOutcome, Error> {
    require_app_name(resolved)?;
    validate(resolved)?;

    let keychain_unlocked = unlock_keychain(&resolved.config.keychain, runner)?;

    let pods_updated = if resolved.config.skip_pods_update {
        debug!("Skipping CocoaPods update");
        false
    } else if has_podfile(&resolved.work_dir) {
        update_pods(&resolved.work_dir, runner)?;
        true
    } else {
        false
    };

    info!(
        "Building {} ({}, {})",
        resolved.config.app_name, resolved.configuration, resolved.sdk
    );
    runner
        .execute(&args::build(resolved))
        .map_err(Error::step(Step::Build))?;

    runner
        .execute(&args::package_application(resolved))
        .map_err(Error::step(Step::PackageApplication))?;

    rename_dsym(&resolved.artifacts)?;

    Ok(BuildOutcome {
        artifacts: resolved.artifacts.clone(),
        build_tool: resolved.build_tool.command(),
        pods_updated,
        keychain_unlocked,
    })
}

/// Moves the build tool's dSYM to the final-name location, replacing any
/// stale copy. A missing dSYM is not an error.
fn rename_dsym(artifacts: &ArtifactPaths) -> Result<(), Error> {
    let from = &artifacts.generated_dsym;
    let to = &artifacts.dsym;
    if from == to || !from.exists() {
        return Ok(());
    }

    debug!("Renaming {} to {}", from.display(), to.display());
    match fs::remove_dir_all(to) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(Error::Io {
                context: format!("removing stale dSYM {}", to.display()),
                source,
            });
        }
    }
    fs::rename(from, to).map_err(|source| Error::Io {
        context: format!("{} {} to {}", Step::RenameDsym, from.display(), to.display()),
        source,
    })
}
