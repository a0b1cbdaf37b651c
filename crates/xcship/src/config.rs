//! Configuration file support for xcship.
//!
//! This module provides support for `xcship.toml` configuration files that
//! persist project settings so build commands need few or no flags.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. The path passed with `--config`
//! 2. Current working directory (`./xcship.toml`)
//! 3. Parent directories (up to the repository root or filesystem root)
//!
//! The directory holding the file is the project base directory; relative
//! paths in the file are resolved against it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! version = "1.4.0"
//!
//! [ios]
//! source_dir = "ios"
//! app_name = "Demo"
//! workspace_name = "Demo"
//! scheme = "Demo"
//!
//! [ios.build_settings]
//! ONLY_ACTIVE_ARCH = "NO"
//!
//! [keychain]
//! path = "/Users/ci/Library/Keychains/ci.keychain"
//! password = "${CI_KEYCHAIN_PASSWORD}"
//!
//! [hockeyapp]
//! api_token = "${HOCKEYAPP_API_TOKEN}"
//! app_identifier = "0123456789abcdef"
//! ```
//!
//! ## Credentials
//!
//! `${VAR}` placeholders in credential fields are expanded from the
//! environment. A placeholder naming an unset variable leaves the field
//! unset. Unset credentials fall back to `HOCKEYAPP_API_TOKEN`,
//! `HOCKEYAPP_APP_ID` and `XCSHIP_KEYCHAIN_PASSWORD`.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xcship_sdk::{
    BuildConfig, BuildToolPreference, DeployConfig, KeychainConfig, ProjectMetadata, VersionConfig,
};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "xcship.toml";

/// Environment fallback for `[hockeyapp].api_token`.
pub const ENV_API_TOKEN: &str = "HOCKEYAPP_API_TOKEN";

/// Environment fallback for `[hockeyapp].app_identifier`.
pub const ENV_APP_ID: &str = "HOCKEYAPP_APP_ID";

/// Environment fallback for `[keychain].password`.
pub const ENV_KEYCHAIN_PASSWORD: &str = "XCSHIP_KEYCHAIN_PASSWORD";

/// Root configuration structure for `xcship.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct XcshipConfig {
    pub project: ProjectSection,
    pub ios: IosSection,
    pub keychain: KeychainSection,
    pub version: VersionSection,
    pub hockeyapp: HockeyAppSection,
}

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    /// Build output directory, relative to the project base directory.
    ///
    /// Defaults to `target/` if not specified.
    pub target_dir: Option<PathBuf>,

    /// Base name of produced artifacts.
    ///
    /// Defaults to `{app_name}-{version}`, or `app_name` without a version.
    pub final_name: Option<String>,

    /// Project version, used as the iOS marketing version unless
    /// `[version].version` is set.
    pub version: Option<String>,
}

/// Xcode project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IosSection {
    /// Directory containing the Xcode project.
    pub source_dir: Option<PathBuf>,

    /// Name of the `.app` bundle the build produces.
    pub app_name: Option<String>,

    pub project_name: Option<String>,
    pub workspace_name: Option<String>,
    pub scheme: Option<String>,
    pub target: Option<String>,

    /// Defaults to "iphoneos".
    pub sdk: Option<String>,

    /// Defaults to "Adhoc".
    pub build_configuration: Option<String>,

    pub code_sign_identity: Option<String>,

    /// Skip `pod install`/`pod update` before building.
    pub skip_pods_update: bool,

    /// Delete `Podfile.lock` and `Pods/` during clean. Defaults to true.
    pub clean_pods: bool,

    /// `auto`, `xcodebuild` or `xctool`.
    pub build_tool: BuildToolPreference,

    /// Extra `KEY=VALUE` settings, passed in file order.
    pub build_settings: IndexMap<String, String>,
}

impl Default for IosSection {
    fn default() -> Self {
        Self {
            source_dir: None,
            app_name: None,
            project_name: None,
            workspace_name: None,
            scheme: None,
            target: None,
            sdk: None,
            build_configuration: None,
            code_sign_identity: None,
            skip_pods_update: false,
            clean_pods: true,
            build_tool: BuildToolPreference::Auto,
            build_settings: IndexMap::new(),
        }
    }
}

/// Keychain to unlock before building.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeychainSection {
    pub path: Option<PathBuf>,
    pub password: Option<String>,
}

/// Defaults for `update-version`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionSection {
    pub version: Option<String>,
    pub build_number: Option<String>,
    pub increment_build_number: bool,
}

/// HockeyApp upload parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HockeyAppSection {
    pub api_token: Option<String>,
    pub app_identifier: Option<String>,
    pub notes: Option<String>,
    pub notes_type: Option<String>,
    pub notify: Option<String>,
    pub status: Option<String>,
    pub mandatory: Option<String>,
    pub tags: Option<String>,
}

impl XcshipConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: XcshipConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified directory.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Generates a starter configuration file as a formatted TOML string.
    pub fn generate_starter_toml(app_name: &str) -> String {
        format!(
            r#"# xcship configuration file
# CLI flags override these settings when provided.

[project]
# Project version, used as the iOS marketing version
version = "1.0.0"

# Build output directory (default: target)
# target_dir = "target"

# Base name of produced artifacts (default: {{app_name}}-{{version}})
# final_name = "{app_name}"

[ios]
# Directory containing the Xcode project
source_dir = "ios"

# Name of the .app bundle the build produces
app_name = "{app_name}"

# Build a workspace (requires scheme) or a project
workspace_name = "{app_name}"
scheme = "{app_name}"
# project_name = "{app_name}"
# target = "{app_name}"

# SDK and configuration (defaults: iphoneos, Adhoc)
# sdk = "iphoneos"
# build_configuration = "Adhoc"

# Signing identity for the build and packaging (optional)
# code_sign_identity = "iPhone Distribution: Example Inc."

# Build tool: auto (xctool if installed), xcodebuild or xctool
build_tool = "auto"

# CocoaPods handling
skip_pods_update = false
clean_pods = true

[ios.build_settings]
# ONLY_ACTIVE_ARCH = "NO"

[keychain]
# Unlocked before building when both are set
# path = "/Users/ci/Library/Keychains/ci.keychain"
# password = "${{{keychain_env}}}"

[version]
# build_number = "42"
increment_build_number = false

[hockeyapp]
api_token = "${{{token_env}}}"
app_identifier = "${{{app_id_env}}}"
# notes = "Built by xcship"
# notes_type = "1"
# notify = "0"
# status = "2"
# mandatory = "0"
# tags = "beta"
"#,
            app_name = app_name,
            keychain_env = ENV_KEYCHAIN_PASSWORD,
            token_env = ENV_API_TOKEN,
            app_id_env = ENV_APP_ID,
        )
    }
}

/// Build-family values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub source_dir: Option<PathBuf>,
    pub scheme: Option<String>,
    pub configuration: Option<String>,
    pub sdk: Option<String>,
}

/// `update-version` values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct VersionOverrides {
    pub version: Option<String>,
    pub build_number: Option<String>,
    pub increment: bool,
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<XcshipConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,

    /// Project base directory: the config file's directory, else the start directory.
    pub base_dir: PathBuf,
}

impl ConfigResolver {
    /// Loads `explicit` when given, otherwise discovers a config file from the
    /// current directory upward.
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::from_dir(&cwd, explicit)
    }

    /// Like [`ConfigResolver::new`] with `start_dir` standing in for the current directory.
    pub fn from_dir(start_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let found = match explicit {
            Some(path) => {
                let path = start_dir.join(path);
                Some((XcshipConfig::load_from_file(&path)?, path))
            }
            None => XcshipConfig::discover_from(start_dir)?,
        };

        match found {
            Some((config, path)) => {
                debug!("Using config file {:?}", path);
                let base_dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| start_dir.to_path_buf());
                Ok(Self {
                    config: Some(config),
                    config_path: Some(path),
                    base_dir,
                })
            }
            None => {
                debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                Ok(Self {
                    config: None,
                    config_path: None,
                    base_dir: start_dir.to_path_buf(),
                })
            }
        }
    }

    /// Path of the `.env.local` file loaded before credentials are resolved.
    pub fn dotenv_path(&self) -> PathBuf {
        self.base_dir.join(".env.local")
    }

    fn section<T, F>(&self, getter: F) -> T
    where
        T: Default,
        F: FnOnce(&XcshipConfig) -> T,
    {
        self.config.as_ref().map(getter).unwrap_or_default()
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// The resolved value prefers CLI over config over default.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&XcshipConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }

    /// Returns the project metadata for the base directory.
    pub fn project_metadata(&self) -> ProjectMetadata {
        let project = self.section(|c| c.project.clone());
        ProjectMetadata {
            base_dir: self.base_dir.clone(),
            target_dir: project.target_dir,
            final_name: project.final_name,
            version: project.version,
        }
    }

    /// Builds the SDK build configuration, reading credentials from the process environment.
    pub fn build_config(&self, overrides: &BuildOverrides) -> BuildConfig {
        self.build_config_with(overrides, &|name: &str| std::env::var(name).ok())
    }

    /// [`ConfigResolver::build_config`] with an explicit environment lookup.
    pub fn build_config_with(&self, overrides: &BuildOverrides, env: &EnvLookup) -> BuildConfig {
        let ios = self.section(|c| c.ios.clone());
        let keychain = self.section(|c| c.keychain.clone());

        BuildConfig {
            source_dir: self.resolve(
                overrides.source_dir.clone(),
                |c| c.ios.source_dir.clone(),
                PathBuf::new(),
            ),
            app_name: ios.app_name.unwrap_or_default(),
            project_name: ios.project_name,
            workspace_name: ios.workspace_name,
            scheme: overrides.scheme.clone().or(ios.scheme),
            target: ios.target,
            sdk: overrides.sdk.clone().or(ios.sdk),
            build_configuration: overrides.configuration.clone().or(ios.build_configuration),
            code_sign_identity: ios.code_sign_identity,
            build_settings: ios.build_settings,
            keychain: KeychainConfig {
                path: keychain.path,
                password: credential(keychain.password.as_deref(), ENV_KEYCHAIN_PASSWORD, env),
            },
            skip_pods_update: ios.skip_pods_update,
            clean_pods: ios.clean_pods,
            build_tool: ios.build_tool,
        }
    }

    /// Builds the update-version inputs.
    pub fn version_config(&self, overrides: &VersionOverrides) -> VersionConfig {
        let version = self.section(|c| c.version.clone());
        VersionConfig {
            source_dir: self.section(|c| c.ios.source_dir.clone()).unwrap_or_default(),
            version: overrides.version.clone().or(version.version),
            build_number: overrides.build_number.clone().or(version.build_number),
            increment_build_number: overrides.increment || version.increment_build_number,
        }
    }

    /// Builds the deploy parameters, reading credentials from the process environment.
    pub fn deploy_config(&self, notes: Option<String>) -> DeployConfig {
        self.deploy_config_with(notes, &|name: &str| std::env::var(name).ok())
    }

    /// [`ConfigResolver::deploy_config`] with an explicit environment lookup.
    pub fn deploy_config_with(&self, notes: Option<String>, env: &EnvLookup) -> DeployConfig {
        let hockeyapp = self.section(|c| c.hockeyapp.clone());
        DeployConfig {
            api_token: credential(hockeyapp.api_token.as_deref(), ENV_API_TOKEN, env),
            app_identifier: credential(hockeyapp.app_identifier.as_deref(), ENV_APP_ID, env),
            notes: notes.or(hockeyapp.notes),
            notes_type: hockeyapp.notes_type,
            notify: hockeyapp.notify,
            status: hockeyapp.status,
            mandatory: hockeyapp.mandatory,
            tags: hockeyapp.tags,
        }
    }
}

/// Environment variable lookup.
pub type EnvLookup = dyn Fn(&str) -> Option<String>;

/// File value with `${VAR}` expanded, else the `fallback` variable. Empty counts as unset.
fn credential(file_value: Option<&str>, fallback: &str, env: &EnvLookup) -> Option<String> {
    file_value
        .and_then(|v| expand_vars(v, env))
        .filter(|v| !v.is_empty())
        .or_else(|| env(fallback).filter(|v| !v.is_empty()))
}

/// Replaces every `${VAR}` in `value`. Returns `None` if a variable is unset.
fn expand_vars(value: &str, env: &EnvLookup) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated, keep literally
            out.push_str(&rest[start..]);
            return Some(out);
        };
        let name = &after[..end];
        match env(name) {
            Some(v) => out.push_str(&v),
            None => {
                warn!(
                    "Environment variable {} referenced in {} is not set",
                    name, CONFIG_FILE_NAME
                );
                return None;
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Some(out)
}
