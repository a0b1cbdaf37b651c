use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use xcship_sdk::exec::ProcessRunner;
use xcship_sdk::resolve::{resolve, resolve_for_build};
use xcship_sdk::workflows;

use config::{BuildOverrides, CONFIG_FILE_NAME, ConfigResolver, VersionOverrides, XcshipConfig};
use hockeyapp::HockeyAppClient;

mod config;
mod hockeyapp;

/// Build, package, version and deploy iOS apps with the Xcode command-line tools.
#[derive(Parser, Debug)]
#[command(name = "xcship", author, version, about = "iOS build automation", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Path to xcship.toml (default: discovered upward from the current directory)"
    )]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log every line of tool output")]
    verbose: bool,
    #[arg(long, global = true, help = "Optional output path for a JSON run summary")]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install pods, build the app and package it as an ipa.
    Build(BuildArgs),
    /// Clean build products and CocoaPods state.
    Clean(BuildArgs),
    /// Zip the ipa and its dSYM into one distributable archive.
    Package(BuildArgs),
    /// Stamp the marketing version and build number with agvtool.
    UpdateVersion {
        #[arg(
            long = "version",
            help = "Marketing version (default: [version].version or [project].version)"
        )]
        marketing_version: Option<String>,
        #[arg(long, help = "Explicit build number; wins over --increment")]
        build_number: Option<String>,
        #[arg(long, help = "Increment the build number")]
        increment: bool,
    },
    /// Upload the ipa and zipped dSYM to HockeyApp.
    Deploy {
        #[command(flatten)]
        build: BuildArgs,
        #[arg(long, help = "Release notes for this version")]
        notes: Option<String>,
    },
    /// Scaffold a starter xcship.toml.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        path: PathBuf,
        #[arg(long, help = "App name (default: current directory name)")]
        app_name: Option<String>,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct BuildArgs {
    #[arg(long, help = "Directory containing the Xcode project")]
    source_dir: Option<PathBuf>,
    #[arg(long)]
    scheme: Option<String>,
    #[arg(long, help = "Build configuration (default: Adhoc)")]
    configuration: Option<String>,
    #[arg(long, help = "SDK (default: iphoneos)")]
    sdk: Option<String>,
}

impl From<BuildArgs> for BuildOverrides {
    fn from(args: BuildArgs) -> Self {
        Self {
            source_dir: args.source_dir,
            scheme: args.scheme,
            configuration: args.configuration,
            sdk: args.sdk,
        }
    }
}

/// JSON document written with `--output`.
#[derive(Debug, Serialize)]
struct RunSummary {
    operation: &'static str,
    xcship_version: &'static str,
    config_path: Option<PathBuf>,
    outcome: Value,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let runner = ProcessRunner::new();

    let (operation, outcome, config_path) = match cli.command {
        Command::Init {
            path,
            app_name,
            force,
        } => return init(&path, app_name.as_deref(), force),
        Command::Build(args) => {
            let resolver = load_project(cli.config.as_deref())?;
            let config = resolver.build_config(&args.into());
            let resolved = resolve_for_build(&config, &resolver.project_metadata(), &runner)?;
            let outcome = workflows::build::run(&resolved, &runner).context("build failed")?;
            println!("Built {}", outcome.artifacts.ipa.display());
            (
                "build",
                serde_json::to_value(&outcome)?,
                resolver.config_path,
            )
        }
        Command::Clean(args) => {
            let resolver = load_project(cli.config.as_deref())?;
            let config = resolver.build_config(&args.into());
            let resolved = resolve_for_build(&config, &resolver.project_metadata(), &runner)?;
            let outcome = workflows::clean::run(&resolved, &runner).context("clean failed")?;
            for path in &outcome.failed {
                println!("Could not delete {}", path.display());
            }
            println!("Cleaned {}", resolved.work_dir.display());
            (
                "clean",
                serde_json::to_value(&outcome)?,
                resolver.config_path,
            )
        }
        Command::Package(args) => {
            let resolver = load_project(cli.config.as_deref())?;
            let config = resolver.build_config(&args.into());
            let resolved = resolve(&config, &resolver.project_metadata())?;
            let outcome =
                workflows::package::run(&resolved, &runner).context("package failed")?;
            println!("Packaged {}", outcome.artifact.display());
            (
                "package",
                serde_json::to_value(&outcome)?,
                resolver.config_path,
            )
        }
        Command::UpdateVersion {
            marketing_version,
            build_number,
            increment,
        } => {
            let resolver = load_project(cli.config.as_deref())?;
            let config = resolver.version_config(&VersionOverrides {
                version: marketing_version,
                build_number,
                increment,
            });
            let outcome = workflows::version::run(&config, &resolver.project_metadata(), &runner)
                .context("update-version failed")?;
            println!("Version {} ({})", outcome.version, outcome.build_number);
            (
                "update-version",
                serde_json::to_value(&outcome)?,
                resolver.config_path,
            )
        }
        Command::Deploy { build, notes } => {
            let resolver = load_project(cli.config.as_deref())?;
            let config = resolver.build_config(&build.into());
            let resolved = resolve(&config, &resolver.project_metadata())?;
            let deploy = resolver.deploy_config(notes);
            let client = HockeyAppClient::new()?;
            let outcome = workflows::deploy::run(&resolved, &deploy, &runner, &client)
                .context("deploy failed")?;
            println!("Deployed {}: {}", outcome.ipa.display(), outcome.status_line);
            (
                "deploy",
                serde_json::to_value(&outcome)?,
                resolver.config_path,
            )
        }
    };

    if let Some(path) = cli.output.as_deref() {
        let summary = RunSummary {
            operation,
            xcship_version: xcship_sdk::VERSION,
            config_path,
            outcome,
        };
        write_summary(&summary, path)?;
    }
    Ok(())
}

/// Loads `xcship.toml` and the `.env.local` next to it.
fn load_project(explicit: Option<&Path>) -> Result<ConfigResolver> {
    let resolver = ConfigResolver::new(explicit)?;
    load_dotenv(&resolver.dotenv_path());
    Ok(resolver)
}

/// Installs the global subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,xcship=debug,xcship_sdk=debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

fn load_dotenv(path: &Path) {
    if path.is_file() {
        debug!("Loading environment from {:?}", path);
        let _ = dotenvy::from_path(path);
    }
}

fn init(path: &Path, app_name: Option<&str>, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{:?} already exists (use --force to overwrite)", path);
    }
    let app_name = match app_name {
        Some(name) => name.to_string(),
        None => default_app_name()?,
    };
    write_file(path, XcshipConfig::generate_starter_toml(&app_name).as_bytes())?;
    println!("Wrote starter config to {:?}", path);
    Ok(())
}

fn default_app_name() -> Result<String> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    Ok(cwd
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "App".to_string()))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {:?}", path))
}

fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    write_file(path, json.as_bytes())?;
    println!("Wrote run summary to {:?}", path);
    Ok(())
}
