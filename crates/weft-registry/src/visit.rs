use dashmap::DashSet;

/// Specifiers already claimed by one traversal
///
/// A new set is created per compile pass, per cascade and per dependency walk.
/// Claiming is atomic, so concurrent branches of a pass never both proceed with
/// the same specifier.
#[derive(Debug, Default)]
pub struct VisitSet {
    seen: DashSet<String>,
}

impl VisitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `specifier` was not yet claimed
    pub fn claim(&self, specifier: &str) -> bool {
        self.seen.insert(specifier.to_string())
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.seen.contains(specifier)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// State shared by every branch of one compile pass
#[derive(Debug, Default)]
pub(crate) struct Pass {
    pub(crate) visit: VisitSet,
    /// Modules whose markers were refreshed without being transformed
    pub(crate) relinked: VisitSet,
}

impl Pass {
    pub(crate) fn relinked_sorted(&self) -> Vec<String> {
        let mut relinked: Vec<String> = self.relinked.seen.iter().map(|s| s.clone()).collect();
        relinked.sort();
        relinked
    }
}
