use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use futures::FutureExt;
use weft_core::hash::placeholder_marker;
use weft_core::specifier::is_local;
use weft_core::{
    DependencyDescriptor, EngineFingerprint, ModuleMetadata, TransformEngine, TransformOutput,
    TransformRequest,
};

/// Transform engine for tests
///
/// Source is read line by line:
///
/// ```text
/// import "/components/button.tsx";   static dependency
/// dynamic "/lib/chart.ts";           dynamic dependency
/// @style                             sets `is_style`
/// @fetch ssr                         sets `data_fetch_fn`
/// anything else                      copied to the output
/// ```
///
/// Static imports of local specifiers are emitted with a `#<spec>@000000`
/// marker, the way a real engine rewrites local imports.
#[derive(Debug)]
pub struct ScriptedEngine {
    fingerprint: EngineFingerprint,
    calls: DashMap<String, usize>,
    failing: DashSet<String>,
    delay: Option<Duration>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::with_version("1.0.0")
    }

    pub fn with_version(version: &str) -> Self {
        Self {
            fingerprint: EngineFingerprint::new(version, format!("scripted-{version}")),
            calls: DashMap::new(),
            failing: DashSet::new(),
            delay: None,
        }
    }

    /// Sleep this long inside every transform
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every later transform of `specifier` fail
    pub fn fail_on(&self, specifier: &str) {
        self.failing.insert(specifier.to_string());
    }

    pub fn calls(&self, specifier: &str) -> usize {
        self.calls.get(specifier).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    /// Run the script language without counting a call
    pub fn render(specifier: &str, source: &str) -> TransformOutput {
        let mut code = format!("// {specifier}\n");
        let mut deps: Vec<DependencyDescriptor> = Vec::new();
        let mut metadata = ModuleMetadata::default();

        for line in source.lines() {
            let trimmed = line.trim();
            if let Some(dep) = quoted_arg(trimmed, "import") {
                // One statement, and so one marker, per imported specifier
                if deps.iter().any(|d| d.specifier == dep) {
                    continue;
                }
                if is_local(dep) {
                    code.push_str(&format!("import \"{dep}{}\";\n", placeholder_marker(dep)));
                } else {
                    code.push_str(&format!("import \"{dep}\";\n"));
                }
                deps.push(DependencyDescriptor::new(dep));
            } else if let Some(dep) = quoted_arg(trimmed, "dynamic") {
                code.push_str(&format!("const lazy = () => import(\"{dep}\");\n"));
                deps.push(DependencyDescriptor {
                    specifier: dep.to_string(),
                    is_dynamic: true,
                });
            } else if trimmed == "@style" {
                metadata.is_style = true;
            } else if let Some(name) = trimmed.strip_prefix("@fetch ") {
                metadata.data_fetch_fn = Some(name.trim().to_string());
            } else {
                code.push_str(line);
                code.push('\n');
            }
        }

        TransformOutput {
            code,
            map: None,
            deps,
            metadata,
        }
    }
}

fn quoted_arg<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

impl TransformEngine for ScriptedEngine {
    fn fingerprint(&self) -> EngineFingerprint {
        self.fingerprint.clone()
    }

    fn transform<'a>(
        &'a self,
        request: TransformRequest<'a>,
    ) -> BoxFuture<'a, anyhow::Result<TransformOutput>> {
        async move {
            *self.calls.entry(request.specifier.to_string()).or_insert(0) += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(request.specifier) {
                anyhow::bail!("scripted failure for {}", request.specifier);
            }
            let source = String::from_utf8_lossy(request.code);
            Ok(Self::render(request.specifier, &source))
        }
        .boxed()
    }
}
