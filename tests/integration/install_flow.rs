//! Installing from an HTTP registry.

use crate::common::{TestProject, header};
use anyhow::Result;
use tdpm_cli::core::TdpmError;
use tdpm_cli::manifest::{Declaration, SaveKind};
use tdpm_cli::test_utils::{ManifestFixture, TestRegistry};

fn runtime(spec: &str) -> Declaration {
    Declaration::parse(spec, SaveKind::Runtime).unwrap()
}

async fn chain_registry() -> Result<TestRegistry> {
    let registry = TestRegistry::start().await?;
    registry.publish("a", "1.0", &header("a", "1.0", &[("b", Some("2.0"))]), "declare const a: 1;");
    registry.publish("a", "2.0", &header("a", "2.0", &[]), "declare const a: 2;");
    registry.publish("b", "2.0", &header("b", "2.0", &[]), "declare const b: 2;");
    Ok(registry)
}

#[tokio::test]
async fn test_install_resolves_transitive_dependency() -> Result<()> {
    let registry = chain_registry().await?;
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;
    let installer = project.installer(&registry.url())?;

    let result = installer.install(project.project_path(), vec![runtime("a@1.0")]).await?;

    let graph = &result.graph;
    assert_eq!(graph.get("a").unwrap().resolved_ref, "1.0");
    assert_eq!(graph.get("b").unwrap().resolved_ref, "2.0");
    let edges: Vec<String> =
        graph.edges().iter().map(|edge| format!("{}->{}", edge.from, edge.to)).collect();
    assert_eq!(edges, vec!["root->a", "a->b"]);

    assert_eq!(project.read_file("typings/a/index.d.ts")?, "declare const a: 1;");
    assert_eq!(project.read_file("typings/b/index.d.ts")?, "declare const b: 2;");

    let manifest = project.manifest_json()?;
    assert_eq!(project.resolved_names()?, vec!["a", "b"]);
    assert_eq!(manifest["resolved"]["b"]["path"], "typings/b/index.d.ts");
    assert_eq!(manifest["resolved"]["b"]["url"], format!("{}/b/2.0/index.d.ts", registry.url()));
    assert!(manifest["resolved"]["a"]["checksum"].as_str().unwrap().starts_with("sha256:"));
    Ok(())
}

#[tokio::test]
async fn test_reinstall_with_new_ref_replaces_declaration() -> Result<()> {
    let registry = chain_registry().await?;
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;
    let installer = project.installer(&registry.url())?;

    installer.install(project.project_path(), vec![runtime("a@1.0")]).await?;
    let result = installer.install(project.project_path(), vec![runtime("a@2.0")]).await?;

    let manifest = project.manifest_json()?;
    let declarations = manifest["declarations"].as_array().unwrap();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0]["name"], "a");
    assert_eq!(declarations[0]["ref"], "2.0");

    assert_eq!(project.resolved_names()?, vec!["a"]);
    assert_eq!(result.removed.len(), 1);
    assert!(!project.file_exists("typings/b"));
    assert_eq!(project.read_file("typings/a/index.d.ts")?, "declare const a: 2;");
    Ok(())
}

#[tokio::test]
async fn test_second_install_makes_no_content_requests() -> Result<()> {
    let registry = chain_registry().await?;
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;

    project.installer(&registry.url())?.install(project.project_path(), vec![runtime("a@1.0")]).await?;
    let before = registry.total_requests();
    let fresh = project.installer(&registry.url())?;
    let result = fresh.install(project.project_path(), Vec::new()).await?;

    assert_eq!(result.already_present.len(), 2);
    assert!(result.installed.is_empty());
    // Pinned headers come from the cache; present files are not fetched.
    assert_eq!(registry.total_requests(), before);
    assert_eq!(fresh.source().fetcher().network_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_transitive_aborts_without_changes() -> Result<()> {
    let registry = TestRegistry::start().await?;
    registry.publish("a", "1.0", &header("a", "1.0", &[("ghost", Some("9.9"))]), "a");
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::four_space().content)?;
    let before = project.manifest_bytes()?;

    let err = project
        .installer(&registry.url())?
        .install(project.project_path(), vec![runtime("a@1.0")])
        .await
        .unwrap_err();

    let TdpmError::Resolution(resolution) = &err else {
        panic!("expected resolution error, got {err:?}");
    };
    assert_eq!(resolution.path, vec!["a", "ghost"]);
    assert_eq!(resolution.cause.status(), Some(404));
    assert!(err.to_string().starts_with("root -> a -> ghost: "));
    assert_eq!(project.manifest_bytes()?, before);
    assert!(!project.file_exists("typings"));
    Ok(())
}

#[tokio::test]
async fn test_latest_is_recorded_as_concrete_version() -> Result<()> {
    let registry = TestRegistry::start().await?;
    registry.set("/a/latest/tdpm.json", header("a", "3.1.0", &[]));
    registry.publish("a", "3.1.0", &header("a", "3.1.0", &[]), "declare const a: 3;");
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;

    project.installer(&registry.url())?.install(project.project_path(), vec![runtime("a")]).await?;

    let manifest = project.manifest_json()?;
    assert_eq!(manifest["declarations"][0]["name"], "a");
    assert!(manifest["declarations"][0].get("ref").is_none());
    assert_eq!(manifest["resolved"]["a"]["ref"], "3.1.0");
    assert_eq!(project.read_file("typings/a/index.d.ts")?, "declare const a: 3;");
    Ok(())
}

#[tokio::test]
async fn test_scoped_names_install_under_scope_directory() -> Result<()> {
    let registry = TestRegistry::start().await?;
    registry.publish("@types/node", "18.0.0", &header("@types/node", "18.0.0", &[]), "declare module 'fs';");
    let project = TestProject::new()?;

    let result = project
        .installer(&registry.url())?
        .install(project.project_path(), vec![Declaration::parse("@types/node@18.0.0", SaveKind::Ambient)?])
        .await?;

    assert_eq!(result.project_root, project.project_path());
    assert_eq!(project.read_file("typings/@types/node/index.d.ts")?, "declare module 'fs';");
    assert_eq!(project.manifest_json()?["declarations"][0]["kind"], "ambient");
    Ok(())
}

#[tokio::test]
async fn test_install_from_subdirectory_uses_project_root() -> Result<()> {
    let registry = chain_registry().await?;
    let project = TestProject::new()?;
    project.write_manifest(&ManifestFixture::empty().content)?;
    let nested = project.project_path().join("src").join("deep");
    std::fs::create_dir_all(&nested)?;

    let result = project.installer(&registry.url())?.install(&nested, vec![runtime("b@2.0")]).await?;

    assert_eq!(result.project_root, project.project_path());
    assert!(project.file_exists("typings/b/index.d.ts"));
    assert!(!nested.join("tdpm.json").exists());
    Ok(())
}

#[tokio::test]
async fn test_unknown_manifest_fields_survive_install() -> Result<()> {
    let registry = chain_registry().await?;
    let project = TestProject::new()?;
    project.write_manifest("{\n\t\"name\": \"app\",\n\t\"declarations\": [],\n\t\"resolved\": {}\n}\n")?;

    project.installer(&registry.url())?.install(project.project_path(), vec![runtime("b@2.0")]).await?;

    let text = String::from_utf8(project.manifest_bytes()?)?;
    assert!(text.starts_with("{\n\t\"declarations\": ["), "{text}");
    assert!(text.ends_with("}\n"));
    assert_eq!(project.manifest_json()?["name"], "app");
    Ok(())
}
