//! The `tdpm` binary.

use crate::common::{TestProject, header};
use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use tdpm_cli::manifest::ManifestLock;
use tdpm_cli::test_utils::{ManifestFixture, TestRegistry};

async fn registry() -> Result<TestRegistry> {
    let registry = TestRegistry::start().await?;
    registry.publish("a", "1.0", &header("a", "1.0", &[("b", Some("2.0"))]), "declare const a: 1;");
    registry.publish("b", "2.0", &header("b", "2.0", &[]), "declare const b: 2;");
    Ok(registry)
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("tdpm")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_conflicting_flags_are_usage_errors() {
    Command::cargo_bin("tdpm")
        .unwrap()
        .args(["-v", "-q", "install"])
        .assert()
        .code(2);
    Command::cargo_bin("tdpm")
        .unwrap()
        .args(["install", "--save", "--save-dev", "a"])
        .assert()
        .code(2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_install_bootstraps_project() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;

    let output = project.run_tdpm(&registry.url(), &["install", "a@1.0"])?;

    output.assert_success().assert_stdout_contains("2 installed, 0 already present, 0 removed");
    assert_eq!(project.resolved_names()?, vec!["a", "b"]);
    assert_eq!(project.read_file("typings/b/index.d.ts")?, "declare const b: 2;");
    assert_eq!(project.manifest_json()?["declarations"][0]["kind"], "runtime");

    let again = project.run_tdpm(&registry.url(), &["install"])?;
    again.assert_success().assert_stdout_contains("0 installed, 2 already present, 0 removed");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_install_without_project_fails() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;

    let output = project.run_tdpm(&registry.url(), &["install"])?;

    output.assert_code(1).assert_stderr_contains("No tdpm.json found");
    assert!(!project.manifest_path().exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resolution_failure_reports_dependency_path() -> Result<()> {
    let registry = registry().await?;
    registry.publish("top", "1.0", &header("top", "1.0", &[("ghost", Some("1.0"))]), "top");
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;

    let output = project.run_tdpm(&registry.url(), &["install", "top@1.0"])?;

    output.assert_code(1).assert_stderr_contains("root -> top -> ghost");
    assert_eq!(project.manifest_bytes()?, ManifestFixture::empty().content.into_bytes());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_install_fails_while_manifest_is_locked() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;
    let _held = ManifestLock::try_acquire(project.project_path(), &project.manifest_path()).await?;

    let output = project.run_tdpm(&registry.url(), &["install", "a@1.0"])?;

    output.assert_code(1).assert_stderr_contains("locked");
    assert_eq!(project.manifest_bytes()?, ManifestFixture::empty().content.into_bytes());
    assert_eq!(registry.total_requests(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_name_is_rejected() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;

    let output = project.run_tdpm(&registry.url(), &["install", "../escape"])?;

    output.assert_code(1).assert_stderr_contains("Invalid dependency '");
    assert!(!project.manifest_path().exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_uninstall_removes_files() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;
    project.run_tdpm(&registry.url(), &["install", "-D", "a@1.0"])?.assert_success();

    let output = project.run_tdpm(&registry.url(), &["rm", "a", "nothing"])?;

    output
        .assert_success()
        .assert_stderr_contains("nothing is not a declared dependency")
        .assert_stdout_contains("1 removed");
    assert!(project.resolved_names()?.is_empty());
    assert!(!project.file_exists("typings/a"));
    assert!(!project.file_exists("typings/b"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quiet_install_prints_nothing() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;

    let output = project.run_tdpm(&registry.url(), &["-q", "install", "b@2.0"])?;

    output.assert_success();
    assert!(output.stdout.is_empty(), "unexpected stdout: {}", output.stdout);
    assert!(project.file_exists("typings/b/index.d.ts"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cache_info_and_clean() -> Result<()> {
    let registry = registry().await?;
    let project = TestProject::new()?;
    project.run_tdpm(&registry.url(), &["install", "a@1.0"])?.assert_success();

    let info = project.run_tdpm(&registry.url(), &["cache", "info"])?;
    info.assert_success().assert_stdout_contains("4 entries");

    project.run_tdpm(&registry.url(), &["cache", "clean"])?.assert_success();
    let info = project.run_tdpm(&registry.url(), &["cache", "info"])?;
    info.assert_success().assert_stdout_contains("0 entries");

    // Installed files are unaffected by cleaning the cache.
    assert!(project.file_exists("typings/a/index.d.ts"));
    Ok(())
}
