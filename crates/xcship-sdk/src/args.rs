//! Argument lists for the external tools.
//!
//! Every function here is pure: identical inputs give identical
//! [`ExecutionRequest`]s. Filesystem checks (is there a `Podfile.lock`?) are
//! made by the caller and passed in.

use std::path::Path;

use crate::exec::ExecutionRequest;
use crate::resolve::ResolvedBuild;
use crate::types::{DEFAULT_SHARED_PRECOMPS_DIR, KeychainConfig};

pub const WORKSPACE_SUFFIX: &str = ".xcworkspace";
pub const PROJECT_SUFFIX: &str = ".xcodeproj";

/// Appends `suffix` unless `name` already ends with it (case-sensitive).
pub fn with_suffix(name: &str, suffix: &str) -> String {
    if name.ends_with(suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// `-workspace`/`-project` followed by `-scheme`/`-target`.
///
/// A workspace wins over a project and a scheme wins over a target.
fn selection(resolved: &ResolvedBuild) -> Vec<String> {
    let config = &resolved.config;
    let mut args = Vec::new();

    if let Some(workspace) = &config.workspace_name {
        args.push("-workspace".to_string());
        args.push(with_suffix(workspace, WORKSPACE_SUFFIX));
    } else if let Some(project) = &config.project_name {
        args.push("-project".to_string());
        args.push(with_suffix(project, PROJECT_SUFFIX));
    }

    if let Some(scheme) = &config.scheme {
        args.push("-scheme".to_string());
        args.push(scheme.clone());
    } else if let Some(target) = &config.target {
        args.push("-target".to_string());
        args.push(target.clone());
    }

    args
}

fn code_sign_identity(resolved: &ResolvedBuild) -> Option<&str> {
    resolved
        .config
        .code_sign_identity
        .as_deref()
        .filter(|id| !id.is_empty())
}

/// Build tool invocation.
///
/// `[tool, selection.., -sdk, <sdk>, -configuration, <cfg>, KEY=VALUE.., CODE_SIGN_IDENTITY=.., SYMROOT=.., SHARED_PRECOMPS_DIR=..]`
pub fn build(resolved: &ResolvedBuild) -> ExecutionRequest {
    let mut request = ExecutionRequest::new(resolved.build_tool.command())
        .args(selection(resolved))
        .args(["-sdk", resolved.sdk.as_str()])
        .args(["-configuration", resolved.configuration.as_str()])
        .args(
            resolved
                .config
                .build_settings
                .iter()
                .map(|(key, value)| format!("{key}={value}")),
        );

    if let Some(identity) = code_sign_identity(resolved) {
        request = request.arg(format!("CODE_SIGN_IDENTITY={identity}"));
    }

    request
        .arg(format!("SYMROOT={}", resolved.target_dir.display()))
        .arg(format!(
            "SHARED_PRECOMPS_DIR={}",
            resolved.target_dir.join(DEFAULT_SHARED_PRECOMPS_DIR).display()
        ))
        .current_dir(&resolved.work_dir)
}

/// Build tool clean. `-configuration` only appears when explicitly configured.
pub fn clean(resolved: &ResolvedBuild) -> ExecutionRequest {
    let mut request = ExecutionRequest::new(resolved.build_tool.command())
        .args(selection(resolved))
        .args(["clean", "-alltargets"]);

    if let Some(configuration) = resolved.explicit_configuration() {
        request = request.args(["-configuration", configuration]);
    }

    request.current_dir(&resolved.work_dir)
}

/// `xcrun PackageApplication` turning the `.app` bundle into the ipa.
pub fn package_application(resolved: &ResolvedBuild) -> ExecutionRequest {
    let artifacts = &resolved.artifacts;
    let mut request = ExecutionRequest::new("xcrun")
        .args(["-sdk", resolved.sdk.as_str(), "PackageApplication"])
        .arg("-v")
        .arg(artifacts.app_bundle.display().to_string())
        .arg("-o")
        .arg(artifacts.ipa.display().to_string());

    if let Some(identity) = code_sign_identity(resolved) {
        request = request.args(["--sign", identity]);
    }

    request.current_dir(&resolved.work_dir)
}

/// `pod update` when a lock file exists, `pod install` otherwise.
pub fn pods(work_dir: &Path, lock_file_present: bool) -> ExecutionRequest {
    let action = if lock_file_present { "update" } else { "install" };
    ExecutionRequest::new("pod").arg(action).current_dir(work_dir)
}

/// `security unlock-keychain`, or `None` unless both path and password are set.
///
/// The password is marked secret so it never shows up in the logged command.
pub fn unlock_keychain(keychain: &KeychainConfig) -> Option<ExecutionRequest> {
    let path = keychain.path.as_ref()?;
    let password = keychain.password.as_ref()?;
    Some(
        ExecutionRequest::new("security")
            .args(["unlock-keychain", "-p"])
            .secret_arg(password.as_str())
            .arg(path.display().to_string()),
    )
}

pub fn marketing_version(work_dir: &Path, version: &str) -> ExecutionRequest {
    ExecutionRequest::new("agvtool")
        .args(["new-marketing-version", version])
        .current_dir(work_dir)
}

/// Stamps `build_number` if given, else bumps the number if `increment`, else nothing.
pub fn build_number(
    work_dir: &Path,
    build_number: Option<&str>,
    increment: bool,
) -> Option<ExecutionRequest> {
    let request = match (build_number, increment) {
        (Some(number), _) => {
            ExecutionRequest::new("agvtool").args(["new-version", "-all", number])
        }
        (None, true) => ExecutionRequest::new("agvtool").args(["next-version", "-all"]),
        (None, false) => return None,
    };
    Some(request.current_dir(work_dir))
}

pub fn read_build_number(work_dir: &Path) -> ExecutionRequest {
    ExecutionRequest::new("agvtool")
        .args(["what-version", "-terse"])
        .current_dir(work_dir)
}

/// Zips the renamed dSYM and the ipa into `{final_name}.zip`, run inside the app dir.
pub fn zip_package(resolved: &ResolvedBuild) -> ExecutionRequest {
    let name = &resolved.final_name;
    ExecutionRequest::new("zip")
        .arg("-r")
        .arg(format!("{name}.zip"))
        .arg(format!("{name}.app.dSYM"))
        .arg(format!("{name}.ipa"))
        .current_dir(&resolved.artifacts.app_dir)
}

/// Zips the renamed dSYM into `{final_name}.dSYM.zip`, run inside the app dir.
pub fn zip_dsym(resolved: &ResolvedBuild) -> ExecutionRequest {
    let name = &resolved.final_name;
    ExecutionRequest::new("zip")
        .arg("-r")
        .arg(format!("{name}.dSYM.zip"))
        .arg(format!("{name}.app.dSYM"))
        .current_dir(&resolved.artifacts.app_dir)
}

pub fn which(tool: &str) -> ExecutionRequest {
    ExecutionRequest::new("which").arg(tool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{BuildTool, resolve};
    use crate::types::{BuildConfig, ProjectMetadata};
    use std::path::PathBuf;

    fn project() -> ProjectMetadata {
        ProjectMetadata {
            base_dir: PathBuf::from("/work/demo"),
            target_dir: Some(PathBuf::from("/work/demo/target")),
            final_name: Some("Demo-1.0".into()),
            version: None,
        }
    }

    fn demo() -> BuildConfig {
        BuildConfig {
            source_dir: PathBuf::from("."),
            app_name: "Demo".into(),
            project_name: Some("Demo".into()),
            scheme: Some("Demo".into()),
            ..BuildConfig::default()
        }
    }

    fn argv(request: &ExecutionRequest) -> Vec<&str> {
        request.argv().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_build_args_for_project_with_defaults() {
        let resolved = resolve(&demo(), &project()).unwrap();
        let request = build(&resolved);
        assert_eq!(
            argv(&request),
            vec![
                "xcodebuild",
                "-project",
                "Demo.xcodeproj",
                "-scheme",
                "Demo",
                "-sdk",
                "iphoneos",
                "-configuration",
                "Adhoc",
                "SYMROOT=/work/demo/target",
                "SHARED_PRECOMPS_DIR=/work/demo/target/SharedPrecompiledHeaders",
            ]
        );
        assert_eq!(request.working_dir(), Some(Path::new("/work/demo/.")));
    }

    #[test]
    fn test_build_args_workspace_preferred_over_project() {
        let config = BuildConfig {
            workspace_name: Some("Demo".into()),
            target: Some("DemoTarget".into()),
            ..demo()
        };
        let resolved = resolve(&config, &project()).unwrap();
        let args = argv(&build(&resolved)).join(" ");
        assert!(args.contains("-workspace Demo.xcworkspace"));
        assert!(!args.contains("-project"));
        // scheme wins over target
        assert!(args.contains("-scheme Demo"));
        assert!(!args.contains("-target"));
    }

    #[test]
    fn test_build_args_target_when_no_scheme() {
        let config = BuildConfig {
            scheme: None,
            target: Some("DemoTarget".into()),
            ..demo()
        };
        let resolved = resolve(&config, &project()).unwrap();
        let args = argv(&build(&resolved)).join(" ");
        assert!(args.contains("-target DemoTarget"));
    }

    #[test]
    fn test_suffix_normalization_is_idempotent() {
        assert_eq!(with_suffix("Demo", PROJECT_SUFFIX), "Demo.xcodeproj");
        assert_eq!(with_suffix("Demo.xcodeproj", PROJECT_SUFFIX), "Demo.xcodeproj");
        assert_eq!(
            with_suffix(&with_suffix("Demo", WORKSPACE_SUFFIX), WORKSPACE_SUFFIX),
            "Demo.xcworkspace"
        );
        // case-sensitive match
        assert_eq!(
            with_suffix("Demo.XCODEPROJ", PROJECT_SUFFIX),
            "Demo.XCODEPROJ.xcodeproj"
        );

        let config = BuildConfig {
            project_name: Some("Demo.xcodeproj".into()),
            ..demo()
        };
        let resolved = resolve(&config, &project()).unwrap();
        assert!(argv(&build(&resolved)).contains(&"Demo.xcodeproj"));
    }

    #[test]
    fn test_build_args_settings_and_identity_in_order() {
        let mut config = demo();
        config.build_settings.insert("ONLY_ACTIVE_ARCH".into(), "NO".into());
        config.build_settings.insert("ENABLE_BITCODE".into(), "NO".into());
        config.code_sign_identity = Some("iPhone Distribution: Demo".into());
        let resolved = resolve(&config, &project()).unwrap();
        let request = build(&resolved);
        let args = argv(&request);
        let tail: Vec<&str> = args[9..].to_vec();
        assert_eq!(
            tail,
            vec![
                "ONLY_ACTIVE_ARCH=NO",
                "ENABLE_BITCODE=NO",
                "CODE_SIGN_IDENTITY=iPhone Distribution: Demo",
                "SYMROOT=/work/demo/target",
                "SHARED_PRECOMPS_DIR=/work/demo/target/SharedPrecompiledHeaders",
            ]
        );
    }

    #[test]
    fn test_empty_identity_is_omitted() {
        let config = BuildConfig {
            code_sign_identity: Some(String::new()),
            ..demo()
        };
        let resolved = resolve(&config, &project()).unwrap();
        assert!(
            !argv(&build(&resolved))
                .iter()
                .any(|a| a.starts_with("CODE_SIGN_IDENTITY"))
        );
        assert!(!argv(&package_application(&resolved)).contains(&"--sign"));
    }

    #[test]
    fn test_build_args_are_deterministic() {
        let mut config = demo();
        config.build_settings.insert("A".into(), "1".into());
        config.build_settings.insert("B".into(), "2".into());
        let resolved = resolve(&config, &project()).unwrap();
        assert_eq!(build(&resolved), build(&resolved));
        assert_eq!(clean(&resolved), clean(&resolved));
    }

    #[test]
    fn test_build_args_use_resolved_tool() {
        let resolved = resolve(&demo(), &project())
            .unwrap()
            .with_build_tool(BuildTool::Xctool(PathBuf::from("/usr/local/bin/xctool")));
        assert_eq!(build(&resolved).program(), "/usr/local/bin/xctool");
        assert_eq!(clean(&resolved).program(), "/usr/local/bin/xctool");
    }

    #[test]
    fn test_clean_args_configuration_only_when_explicit() {
        let resolved = resolve(&demo(), &project()).unwrap();
        assert_eq!(
            argv(&clean(&resolved)),
            vec![
                "xcodebuild",
                "-project",
                "Demo.xcodeproj",
                "-scheme",
                "Demo",
                "clean",
                "-alltargets"
            ]
        );

        let config = BuildConfig {
            build_configuration: Some("Release".into()),
            ..demo()
        };
        let resolved = resolve(&config, &project()).unwrap();
        let request = clean(&resolved);
        let args = argv(&request);
        assert_eq!(&args[args.len() - 2..], &["-configuration", "Release"]);
    }

    #[test]
    fn test_package_args() {
        let config = BuildConfig {
            code_sign_identity: Some("iPhone Distribution".into()),
            ..demo()
        };
        let resolved = resolve(&config, &project()).unwrap();
        assert_eq!(
            argv(&package_application(&resolved)),
            vec![
                "xcrun",
                "-sdk",
                "iphoneos",
                "PackageApplication",
                "-v",
                "/work/demo/target/Adhoc-iphoneos/Demo.app",
                "-o",
                "/work/demo/target/Adhoc-iphoneos/Demo-1.0.ipa",
                "--sign",
                "iPhone Distribution",
            ]
        );
    }

    #[test]
    fn test_pods_args_choose_update_or_install() {
        let dir = Path::new("/work/demo");
        assert_eq!(argv(&pods(dir, true)), vec!["pod", "update"]);
        assert_eq!(argv(&pods(dir, false)), vec!["pod", "install"]);
        assert_eq!(pods(dir, true).working_dir(), Some(dir));
    }

    #[test]
    fn test_unlock_keychain_requires_path_and_password() {
        let only_path = KeychainConfig {
            path: Some(PathBuf::from("/k.keychain")),
            password: None,
        };
        assert!(unlock_keychain(&only_path).is_none());

        let only_password = KeychainConfig {
            path: None,
            password: Some("pw".into()),
        };
        assert!(unlock_keychain(&only_password).is_none());

        let both = KeychainConfig {
            path: Some(PathBuf::from("/k.keychain")),
            password: Some("pw".into()),
        };
        let request = unlock_keychain(&both).unwrap();
        assert_eq!(
            argv(&request),
            vec!["security", "unlock-keychain", "-p", "pw", "/k.keychain"]
        );
        assert!(!request.display_command().contains("pw "));
    }

    #[test]
    fn test_version_args() {
        let dir = Path::new("/work/demo");
        assert_eq!(
            argv(&marketing_version(dir, "1.2.0")),
            vec!["agvtool", "new-marketing-version", "1.2.0"]
        );
        assert_eq!(
            argv(&build_number(dir, Some("42"), true).unwrap()),
            vec!["agvtool", "new-version", "-all", "42"]
        );
        assert_eq!(
            argv(&build_number(dir, None, true).unwrap()),
            vec!["agvtool", "next-version", "-all"]
        );
        assert!(build_number(dir, None, false).is_none());
        assert_eq!(
            argv(&read_build_number(dir)),
            vec!["agvtool", "what-version", "-terse"]
        );
    }

    #[test]
    fn test_zip_args_run_in_app_dir() {
        let resolved = resolve(&demo(), &project()).unwrap();
        let package = zip_package(&resolved);
        assert_eq!(
            argv(&package),
            vec!["zip", "-r", "Demo-1.0.zip", "Demo-1.0.app.dSYM", "Demo-1.0.ipa"]
        );
        assert_eq!(
            package.working_dir(),
            Some(Path::new("/work/demo/target/Adhoc-iphoneos"))
        );
        assert_eq!(
            argv(&zip_dsym(&resolved)),
            vec!["zip", "-r", "Demo-1.0.dSYM.zip", "Demo-1.0.app.dSYM"]
        );
    }
}
