//! Deploy operation: zip the dSYM and upload it with the ipa to HockeyApp.
//!
//! The HTTP transport lives behind [`Uploader`] so the sequence can be
//! validated without a network.

use std::path::PathBuf;

use tracing::info;

use super::require_app_name;
use crate::args;
use crate::exec::CommandRunner;
use crate::resolve::ResolvedBuild;
use crate::types::{ConfigError, DeployConfig, DeployOutcome, Error, Step, UploadError};

/// HockeyApp service root.
pub const HOCKEYAPP_BASE_URL: &str = "https://rink.hockeyapp.net";

/// Header carrying the API token.
pub const HOCKEYAPP_TOKEN_HEADER: &str = "X-HockeyAppToken";

/// Everything one upload sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub api_token: String,
    pub app_identifier: String,
    pub ipa_file: PathBuf,
    pub dsym_zip_file: PathBuf,
    pub notes: Option<String>,
    pub notes_type: Option<String>,
    pub notify: Option<String>,
    pub status: Option<String>,
    pub mandatory: Option<String>,
    pub tags: Option<String>,
}

impl DeployRequest {
    /// Upload URL for this app under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/api/2/apps/{}/app_versions",
            base_url.trim_end_matches('/'),
            self.app_identifier
        )
    }

    /// Optional text parts as `(multipart field name, value)`, in send order.
    pub fn text_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("notes", &self.notes),
            ("notes_type", &self.notes_type),
            ("notify", &self.notify),
            ("status", &self.status),
            ("mandatory", &self.mandatory),
            ("tags", &self.tags),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

/// What the service answered, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status_line: String,
    pub body: String,
}

/// Sends a [`DeployRequest`] as one multipart POST.
pub trait Uploader {
    fn upload(&self, request: &DeployRequest) -> Result<UploadReceipt, UploadError>;
}

/// Checks the app name, credentials and the ipa before anything runs.
pub fn validate(resolved: &ResolvedBuild, deploy: &DeployConfig) -> Result<(), Error> {
    require_app_name(resolved)?;
    if is_blank(deploy.api_token.as_deref()) {
        return Err(ConfigError::MissingParameter {
            name: "apiToken",
            purpose: "to upload to HockeyApp",
        }
        .into());
    }
    if is_blank(deploy.app_identifier.as_deref()) {
        return Err(ConfigError::MissingParameter {
            name: "appIdentifier",
            purpose: "to upload to HockeyApp",
        }
        .into());
    }
    if !resolved.artifacts.ipa.is_file() {
        return Err(UploadError::MissingArtifact {
            kind: "ipa file",
            path: resolved.artifacts.ipa.clone(),
        }
        .into());
    }
    Ok(())
}

/// Validates, zips the dSYM and uploads.
pub fn run(
    resolved: &ResolvedBuild,
    deploy: &DeployConfig,
    runner: &dyn CommandRunner,
    uploader: &dyn Uploader,
) -> Result<DeployOutcome, Error> {
    validate(resolved, deploy)?;

    info!("Deploying to HockeyApp...");
    runner
        .execute(&args::zip_dsym(resolved))
        .map_err(Error::step(Step::ZipDsym))?;

    let artifacts = &resolved.artifacts;
    let request = DeployRequest {
        api_token: deploy.api_token.clone().unwrap_or_default(),
        app_identifier: deploy.app_identifier.clone().unwrap_or_default(),
        ipa_file: artifacts.ipa.clone(),
        dsym_zip_file: artifacts.dsym_zip.clone(),
        notes: deploy.notes.clone(),
        notes_type: deploy.notes_type.clone(),
        notify: deploy.notify.clone(),
        status: deploy.status.clone(),
        mandatory: deploy.mandatory.clone(),
        tags: deploy.tags.clone(),
    };

    let receipt = uploader.upload(&request)?;
    info!("{}", receipt.status_line);
    info!("{}", receipt.body);

    Ok(DeployOutcome {
        status_line: receipt.status_line,
        body: receipt.body,
        ipa: request.ipa_file,
        dsym_zip: request.dsym_zip_file,
    })
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
