//! The manifest lock and cancellation.

use crate::common::TestProject;
use anyhow::Result;
use std::time::Duration;
use tdpm_cli::core::TdpmError;
use tdpm_cli::installer::{Installer, InstallerConfig};
use tdpm_cli::manifest::{Declaration, ManifestLock, SaveKind};
use tdpm_cli::test_utils::{ManifestFixture, MemorySource};

fn slow_source(delay: Duration) -> MemorySource {
    MemorySource::new()
        .with_artifact("a", "1.0", &[], "declare const a: 1;")
        .with_artifact("b", "1.0", &[], "declare const b: 1;")
        .with_delay("a", delay)
        .with_delay("b", delay)
}

fn runtime(spec: &str) -> Declaration {
    Declaration::parse(spec, SaveKind::Runtime).unwrap()
}

#[tokio::test]
async fn test_concurrent_installs_fail_fast_with_manifest_locked() -> Result<()> {
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;
    let installer = Installer::new(slow_source(Duration::from_millis(300)), InstallerConfig::default());

    let (first, second) = tokio::join!(
        installer.install(project.project_path(), vec![runtime("a@1.0")]),
        installer.install(project.project_path(), vec![runtime("b@1.0")]),
    );

    let (winner, loser) = match (first, second) {
        (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
        other => panic!("expected exactly one install to succeed, got {other:?}"),
    };
    assert!(matches!(loser, TdpmError::ManifestLocked { .. }), "{loser:?}");

    let winner_name = winner.installed[0].name.clone();
    let manifest = project.manifest_json()?;
    let declarations = manifest["declarations"].as_array().unwrap();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0]["name"], winner_name.as_str());
    assert_eq!(project.resolved_names()?, vec![winner_name]);
    Ok(())
}

#[tokio::test]
async fn test_lock_is_released_after_failure() -> Result<()> {
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;
    let installer = Installer::new(slow_source(Duration::ZERO), InstallerConfig::default());

    let err = installer.install(project.project_path(), vec![runtime("missing@1.0")]).await.unwrap_err();
    assert!(matches!(err, TdpmError::Resolution(_)), "{err:?}");

    installer.install(project.project_path(), vec![runtime("a@1.0")]).await?;
    assert_eq!(project.resolved_names()?, vec!["a"]);
    let manifest = project.manifest_path();
    assert!(ManifestLock::try_acquire(project.project_path(), &manifest).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_cancelled_install_leaves_manifest_untouched() -> Result<()> {
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::four_space().content)?;
    let before = project.manifest_bytes()?;
    let installer = Installer::new(slow_source(Duration::from_millis(500)), InstallerConfig::default());

    let outcome = tokio::time::timeout(
        Duration::from_millis(100),
        installer.install(project.project_path(), vec![runtime("a@1.0")]),
    )
    .await;

    assert!(outcome.is_err(), "install should still be waiting on the source");
    assert_eq!(project.manifest_bytes()?, before);
    assert!(!project.file_exists("typings"));

    // Dropping the operation released the lock.
    let result = installer.install(project.project_path(), vec![runtime("a@1.0")]).await?;
    assert_eq!(result.installed.len(), 1);
    Ok(())
}
