//! Package operation.

use tracing::info;

use super::require_app_name;
use crate::args;
use crate::exec::CommandRunner;
use crate::resolve::ResolvedBuild;
use crate::types::{Error, PackageOutcome, Step};

/// Packages the built app and bundles it with its dSYM.
///
/// Runs `xcrun PackageApplication`, then zips `{final_name}.app.dSYM` and
/// `{final_name}.ipa` into `{final_name}.zip` inside the app directory. The
/// zip is the operation's output artifact.
pub fn run(resolved: &ResolvedBuild, runner: &dyn CommandRunner) -> Result<PackageOutcome, Error> {
    require_app_name(resolved)?;
    let artifacts = &resolved.artifacts;

    runner
        .execute(&args::package_application(resolved))
        .map_err(Error::step(Step::PackageApplication))?;

    runner
        .execute(&args::zip_package(resolved))
        .map_err(Error::step(Step::ZipPackage))?;

    info!("Packaged {}", artifacts.package.display());
    Ok(PackageOutcome {
        artifact: artifacts.package.clone(),
        ipa: artifacts.ipa.clone(),
    })
}
