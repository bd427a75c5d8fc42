//! Import map applied to specifiers before resolver hooks run

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Mapping of bare or prefixed specifiers to their targets
///
/// Keys ending in `/` act as prefixes; all other keys must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportMap {
    imports: BTreeMap<String, String>,
}

impl ImportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.imports.insert(key.into(), target.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }

    /// Entries in key order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.imports.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rewrite a specifier: exact key first, then the longest matching prefix key
    pub fn resolve<'a>(&self, specifier: &'a str) -> Cow<'a, str> {
        if let Some(target) = self.imports.get(specifier) {
            return Cow::Owned(target.clone());
        }

        let prefix_match = self
            .imports
            .iter()
            .filter(|(key, _)| key.ends_with('/') && specifier.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len());

        match prefix_match {
            Some((key, target)) => Cow::Owned(format!("{}{}", target, &specifier[key.len()..])),
            None => Cow::Borrowed(specifier),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ImportMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            imports: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
