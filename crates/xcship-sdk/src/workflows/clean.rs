//! Clean operation.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::{PODFILE_LOCK, PODS_DIR, validate};
use crate::args;
use crate::exec::CommandRunner;
use crate::resolve::ResolvedBuild;
use crate::types::{CleanOutcome, Error, Step};

/// Cleans build products and, when enabled, the CocoaPods state.
///
/// Failing to delete `Podfile.lock` or `Pods/` is logged as a warning and
/// does not fail the operation; each is attempted independently.
pub fn run(resolved: &ResolvedBuild, runner: &dyn CommandRunner) -> Result<CleanOutcome, Error> {
    validate(resolved)?;

    runner
        .execute(&args::clean(resolved))
        .map_err(Error::step(Step::Clean))?;

    let mut outcome = CleanOutcome::default();
    if resolved.config.clean_pods {
        info!("Cleaning CocoaPods files");
        clean_pods(&resolved.work_dir, &mut outcome);
    } else {
        info!("Skipping cleaning of CocoaPods files");
    }
    Ok(outcome)
}

fn clean_pods(work_dir: &Path, outcome: &mut CleanOutcome) {
    let lock = work_dir.join(PODFILE_LOCK);
    if lock.exists() {
        match fs::remove_file(&lock) {
            Ok(()) => {
                info!("Successfully deleted file {}", lock.display());
                outcome.removed.push(lock);
            }
            Err(e) => {
                warn!("Failed to delete file {}: {}", lock.display(), e);
                outcome.failed.push(lock);
            }
        }
    } else {
        debug!("Skipping deletion of {}", lock.display());
    }

    let pods = work_dir.join(PODS_DIR);
    if pods.exists() {
        match fs::remove_dir_all(&pods) {
            Ok(()) => {
                info!("Successfully deleted directory {}", pods.display());
                outcome.removed.push(pods);
            }
            Err(e) => {
                warn!("Failed to delete directory {}: {}", pods.display(), e);
                outcome.failed.push(pods);
            }
        }
    } else {
        debug!("Skipping deletion of {}", pods.display());
    }
}
