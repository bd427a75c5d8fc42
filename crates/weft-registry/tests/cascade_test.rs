//! Hash cascade: dependents are patched in place, never re-transformed

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use weft_core::hash::{read_short_hash, short_hash, SHORT_HASH_LEN};
use weft_registry::{ModuleRegistry, SourceEvent};
use weft_test_fixtures::{init_tracing, ScriptedEngine, TestProject};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Records every specifier passed to the patch callback
#[derive(Default)]
struct Patched(Mutex<Vec<String>>);

impl Patched {
    fn record(&self, specifier: &str) {
        self.0.lock().unwrap().push(specifier.to_string());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

fn marker_at(registry: &ModuleRegistry, importer: &str, dep: &str) -> usize {
    registry
        .get(importer)
        .and_then(|m| m.dependency(dep).and_then(|d| d.hash_location))
        .expect("marker location recorded")
}

fn current_short(registry: &ModuleRegistry, specifier: &str) -> String {
    short_hash(&registry.aggregate_hash(specifier).expect("module built")).to_string()
}

#[tokio::test]
async fn test_changed_dependency_patches_importer_without_retransform() -> TestResult {
    init_tracing();
    let project = TestProject::new();
    project
        .write(
            "/pages/index.tsx",
            "import \"/components/button.tsx\";\nexport default function Page() { return Button; }",
        )
        .write("/components/button.tsx", "export const label = 'v1';");
    let engine = Arc::new(ScriptedEngine::new());
    let invalidated = Arc::new(Mutex::new(Vec::new()));
    let registry = {
        let invalidated = Arc::clone(&invalidated);
        ModuleRegistry::builder(project.config(), engine.clone())
            .on_invalidate(move |specifier| invalidated.lock().unwrap().push(specifier.to_string()))
            .build()?
    };

    let before = registry.compile("/pages/index.tsx").await?;
    let before_bytes = before.compiled.clone().expect("compiled");
    let location = marker_at(&registry, "/pages/index.tsx", "/components/button.tsx");
    let old_short = current_short(&registry, "/components/button.tsx");
    assert_eq!(read_short_hash(&before_bytes, location), Some(old_short.as_str()));

    project.write("/components/button.tsx", "export const label = 'v2';");
    let patched = Patched::default();
    registry
        .handle_source_event(
            &SourceEvent::Modified("/components/button.tsx".to_string()),
            &|s: &str| patched.record(s),
        )
        .await?;

    let new_short = current_short(&registry, "/components/button.tsx");
    assert_ne!(old_short, new_short);

    let after_bytes = registry.read("/pages/index.tsx").await?.expect("compiled");
    assert_eq!(after_bytes.len(), before_bytes.len());
    assert_eq!(read_short_hash(&after_bytes, location), Some(new_short.as_str()));
    assert_eq!(after_bytes[..location], before_bytes[..location]);
    assert_eq!(
        after_bytes[location + SHORT_HASH_LEN..],
        before_bytes[location + SHORT_HASH_LEN..]
    );

    let after = registry.get("/pages/index.tsx").expect("registered");
    assert_eq!(after.source_hash, before.source_hash);
    assert_eq!(engine.calls("/pages/index.tsx"), 1);
    assert_eq!(engine.calls("/components/button.tsx"), 2);

    let on_disk = std::fs::read(registry.cache().compiled_path("/pages/index.tsx"))?;
    assert_eq!(on_disk, after_bytes);

    assert_eq!(patched.take(), vec!["/pages/index.tsx"]);
    assert_eq!(*invalidated.lock().unwrap(), vec!["/pages/index.tsx"]);
    Ok(())
}

#[tokio::test]
async fn test_cascade_reaches_transitive_dependents() -> TestResult {
    let project = TestProject::new();
    project
        .write("/pages/index.tsx", "import \"/components/button.tsx\";\nexport default 1;")
        .write("/components/button.tsx", "import \"/lib/theme.ts\";\nexport const b = 1;")
        .write("/lib/theme.ts", "export const color = 'red';");
    let engine = Arc::new(ScriptedEngine::new());
    let registry = ModuleRegistry::new(project.config(), engine.clone())?;
    registry.compile("/pages/index.tsx").await?;

    project.write("/lib/theme.ts", "export const color = 'blue';");
    let patched = Patched::default();
    registry
        .recompile("/lib/theme.ts", &|s: &str| patched.record(s))
        .await?;

    assert_eq!(
        patched.take(),
        vec!["/components/button.tsx", "/pages/index.tsx"]
    );

    let button = registry.read("/components/button.tsx").await?.expect("button");
    let loc = marker_at(&registry, "/components/button.tsx", "/lib/theme.ts");
    assert_eq!(
        read_short_hash(&button, loc),
        Some(current_short(&registry, "/lib/theme.ts").as_str())
    );

    let index = registry.read("/pages/index.tsx").await?.expect("index");
    let loc = marker_at(&registry, "/pages/index.tsx", "/components/button.tsx");
    assert_eq!(
        read_short_hash(&index, loc),
        Some(current_short(&registry, "/components/button.tsx").as_str())
    );

    assert_eq!(engine.calls("/pages/index.tsx"), 1);
    assert_eq!(engine.calls("/components/button.tsx"), 1);
    assert_eq!(engine.calls("/lib/theme.ts"), 2);
    Ok(())
}

#[tokio::test]
async fn test_unchanged_source_does_not_cascade() -> TestResult {
    let project = TestProject::new();
    project
        .write("/pages/index.tsx", "import \"/lib/util.ts\";\nexport default 1;")
        .write("/lib/util.ts", "export const x = 1;");
    let engine = Arc::new(ScriptedEngine::new());
    let registry = ModuleRegistry::new(project.config(), engine.clone())?;
    registry.compile("/pages/index.tsx").await?;

    let patched = Patched::default();
    registry
        .recompile("/lib/util.ts", &|s: &str| patched.record(s))
        .await?;

    assert!(patched.take().is_empty());
    assert_eq!(engine.calls("/lib/util.ts"), 1);
    Ok(())
}

#[tokio::test]
async fn test_cascade_terminates_on_cycles() -> TestResult {
    let project = TestProject::new();
    project
        .write("/a.ts", "import \"/b.ts\";\nexport const a = 1;")
        .write("/b.ts", "import \"/a.ts\";\nexport const b = 1;");
    let engine = Arc::new(ScriptedEngine::new());
    let registry = ModuleRegistry::new(project.config(), engine.clone())?;
    registry.compile("/a.ts").await?;

    project.write("/b.ts", "import \"/a.ts\";\nexport const b = 2;");
    let patched = Patched::default();
    tokio::time::timeout(
        Duration::from_secs(5),
        registry.recompile("/b.ts", &|s: &str| patched.record(s)),
    )
    .await??;

    // `/b.ts` itself was transformed; only its importer counts as patched
    assert_eq!(patched.take(), vec!["/a.ts"]);
    assert_eq!(engine.calls("/a.ts"), 1);
    assert_eq!(engine.calls("/b.ts"), 2);

    let a = registry.read("/a.ts").await?.expect("a");
    let loc = marker_at(&registry, "/a.ts", "/b.ts");
    assert_eq!(read_short_hash(&a, loc), Some(current_short(&registry, "/b.ts").as_str()));
    let b = registry.read("/b.ts").await?.expect("b");
    let loc = marker_at(&registry, "/b.ts", "/a.ts");
    assert_eq!(read_short_hash(&b, loc), Some(current_short(&registry, "/a.ts").as_str()));
    Ok(())
}

#[tokio::test]
async fn test_cascade_reloads_evicted_dependents() -> TestResult {
    let project = TestProject::new();
    project
        .write("/pages/a.tsx", "import \"/lib/shared.ts\";\nexport default 1;")
        .write("/pages/b.tsx", "import \"/lib/shared.ts\";\nexport default 2;")
        .write("/lib/shared.ts", "export const v = 1;");
    let mut config = project.config();
    config.max_resident_modules = 1;
    let engine = Arc::new(ScriptedEngine::new());
    let registry = ModuleRegistry::new(config, engine.clone())?;
    registry.compile("/pages/a.tsx").await?;
    registry.compile("/pages/b.tsx").await?;

    project.write("/lib/shared.ts", "export const v = 2;");
    let patched = Patched::default();
    registry
        .recompile("/lib/shared.ts", &|s: &str| patched.record(s))
        .await?;

    assert_eq!(patched.take(), vec!["/pages/a.tsx", "/pages/b.tsx"]);
    let expected = current_short(&registry, "/lib/shared.ts");
    for page in ["/pages/a.tsx", "/pages/b.tsx"] {
        let on_disk = std::fs::read(registry.cache().compiled_path(page))?;
        let loc = marker_at(&registry, page, "/lib/shared.ts");
        assert_eq!(read_short_hash(&on_disk, loc), Some(expected.as_str()));
    }
    assert_eq!(engine.calls("/pages/a.tsx"), 1);
    assert_eq!(engine.calls("/pages/b.tsx"), 1);
    Ok(())
}
