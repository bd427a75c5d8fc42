//! Artifact cache integration: restore, invalidation, eviction and removal

use std::ops::ControlFlow;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use weft_cache::MetaLookup;
use weft_registry::{ModuleRegistry, SourceEvent};
use weft_test_fixtures::{init_tracing, ScriptedEngine, TestProject};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn page_with_button(project: &TestProject) {
    project
        .write(
            "/pages/index.tsx",
            "import \"/components/button.tsx\";\nexport default function Page() {}",
        )
        .write("/components/button.tsx", "export const Button = () => null;");
}

#[tokio::test]
async fn test_fresh_registry_restores_from_cache() -> TestResult {
    init_tracing();
    let project = TestProject::new();
    page_with_button(&project);

    let first = {
        let registry = ModuleRegistry::new(project.config(), Arc::new(ScriptedEngine::new()))?;
        registry.compile("/pages/index.tsx").await?
    };

    let engine = Arc::new(ScriptedEngine::new());
    let registry = ModuleRegistry::new(project.config(), engine.clone())?;
    let restored = registry.compile("/pages/index.tsx").await?;

    assert_eq!(engine.total_calls(), 0);
    assert_eq!(restored.source_hash, first.source_hash);
    assert_eq!(restored.compiled, first.compiled);
    assert_eq!(restored.deps, first.deps);
    assert_eq!(
        registry.dependents_of("/components/button.tsx"),
        vec!["/pages/index.tsx"]
    );
    Ok(())
}

#[tokio::test]
async fn test_engine_version_change_discards_cache() -> TestResult {
    let project = TestProject::new();
    page_with_button(&project);
    {
        let registry = ModuleRegistry::new(project.config(), Arc::new(ScriptedEngine::new()))?;
        registry.compile("/pages/index.tsx").await?;
    }

    let engine = Arc::new(ScriptedEngine::with_version("2.0.0"));
    let registry = ModuleRegistry::new(project.config(), engine.clone())?;
    assert!(!registry.cache().compiled_path("/pages/index.tsx").exists());
    assert!(!registry.cache().meta_path("/components/button.tsx").exists());

    registry.compile("/pages/index.tsx").await?;
    assert_eq!(engine.calls("/pages/index.tsx"), 1);
    assert_eq!(engine.calls("/components/button.tsx"), 1);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_sidecar_forces_retransform() -> TestResult {
    let project = TestProject::new();
    page_with_button(&project);
    let meta_path = {
        let registry = ModuleRegistry::new(project.config(), Arc::new(ScriptedEngine::new()))?;
        registry.compile("/pages/index.tsx").await?;
        registry.cache().meta_path("/components/button.tsx")
    };
    std::fs::write(&meta_path, b"{ not json")?;

    let engine = Arc::new(ScriptedEngine::new());
    let registry = ModuleRegistry::new(project.config(), engine.clone())?;
    registry.compile("/pages/index.tsx").await?;

    assert_eq!(engine.calls("/components/button.tsx"), 1);
    assert_eq!(engine.calls("/pages/index.tsx"), 0);
    assert!(matches!(
        registry.cache().read_meta("/components/button.tsx").await,
        MetaLookup::Found(_)
    ));
    Ok(())
}

#[tokio::test]
async fn test_evicted_bytes_reload_on_read() -> TestResult {
    let project = TestProject::new();
    page_with_button(&project);
    let mut config = project.config();
    config.max_resident_modules = 1;
    let registry = ModuleRegistry::new(config, Arc::new(ScriptedEngine::new()))?;

    registry.compile("/pages/index.tsx").await?;
    let button = registry.get("/components/button.tsx").expect("registered");
    assert!(button.compiled.is_none(), "least recently used bytes are evicted");

    let bytes = registry.read("/components/button.tsx").await?.expect("on disk");
    let on_disk = std::fs::read(registry.cache().compiled_path("/components/button.tsx"))?;
    assert_eq!(bytes, on_disk);
    assert!(registry.get("/components/button.tsx").and_then(|m| m.compiled).is_some());
    assert!(registry.get("/pages/index.tsx").and_then(|m| m.compiled).is_none());
    Ok(())
}

#[tokio::test]
async fn test_removed_event_unregisters_module() -> TestResult {
    let project = TestProject::new();
    page_with_button(&project);
    let registry = ModuleRegistry::new(project.config(), Arc::new(ScriptedEngine::new()))?;
    registry.compile("/pages/index.tsx").await?;

    let noop = |_: &str| {};
    registry
        .handle_source_event(&SourceEvent::Removed("/pages/index.tsx".to_string()), &noop)
        .await?;

    assert!(!registry.contains("/pages/index.tsx"));
    assert!(registry.contains("/components/button.tsx"));
    assert!(registry.dependents_of("/components/button.tsx").is_empty());
    assert!(!registry.cache().compiled_path("/pages/index.tsx").exists());
    assert!(!registry.cache().meta_path("/pages/index.tsx").exists());

    registry
        .handle_source_event(&SourceEvent::Modified("/untracked.ts".to_string()), &noop)
        .await?;
    assert_eq!(registry.specifiers(), vec!["/components/button.tsx"]);
    Ok(())
}

#[tokio::test]
async fn test_lookup_deps_is_breadth_first_per_module() -> TestResult {
    let project = TestProject::new();
    project
        .write("/a.ts", "import \"/b.ts\";\nimport \"/c.ts\";\nexport {};")
        .write("/b.ts", "import \"/d.ts\";\nexport {};")
        .write("/c.ts", "import \"/d.ts\";\nexport {};")
        .write("/d.ts", "export {};");
    let registry = ModuleRegistry::new(project.config(), Arc::new(ScriptedEngine::new()))?;
    registry.compile("/a.ts").await?;

    let mut visited = Vec::new();
    let flow = registry.lookup_deps("/a.ts", &mut |dep| {
        visited.push(dep.specifier.clone());
        ControlFlow::Continue(())
    });
    assert_eq!(flow, ControlFlow::Continue(()));
    assert_eq!(visited, vec!["/b.ts", "/c.ts", "/d.ts", "/d.ts"]);

    let mut visited = Vec::new();
    let flow = registry.lookup_deps("/a.ts", &mut |dep| {
        visited.push(dep.specifier.clone());
        if dep.specifier == "/c.ts" {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    assert_eq!(flow, ControlFlow::Break(()));
    assert_eq!(visited, vec!["/b.ts", "/c.ts"]);
    Ok(())
}
