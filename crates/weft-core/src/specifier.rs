//! Specifier classification helpers
//!
//! A specifier is either path-like (`/pages/index.tsx`) and resolved against the
//! project root, or URL-like (`https://deno.land/x/mod.ts`) and fetched remotely.

/// Returns `true` for `http://` and `https://` specifiers
pub fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("https://") || specifier.starts_with("http://")
}

/// Returns `true` for anything that is not fetched over the network
pub fn is_local(specifier: &str) -> bool {
    !is_remote(specifier)
}

/// The specifier without its query string or fragment
pub fn strip_query(specifier: &str) -> &str {
    specifier
        .split(['?', '#'])
        .next()
        .unwrap_or(specifier)
}

/// The query string of a specifier, without the leading `?`
pub fn query(specifier: &str) -> Option<&str> {
    let without_fragment = specifier.split('#').next().unwrap_or(specifier);
    without_fragment
        .split_once('?')
        .map(|(_, q)| q)
        .filter(|q| !q.is_empty())
}

/// File extension of the last path segment, ignoring query strings and fragments
pub fn extension(specifier: &str) -> Option<&str> {
    let path = strip_query(specifier);
    let name = path.rsplit('/').next()?;
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_detection() {
        assert!(is_remote("https://deno.land/x/mod.ts"));
        assert!(is_remote("http://localhost:8080/a.js"));
        assert!(!is_remote("/pages/index.tsx"));
        assert!(is_local("/components/button.tsx"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/pages/index.tsx"), Some("tsx"));
        assert_eq!(extension("https://esm.sh/react.js?dev"), Some("js"));
        assert_eq!(extension("/style/app.css#hash"), Some("css"));
        assert_eq!(extension("https://esm.sh/react@17"), None);
        assert_eq!(extension("/.env"), None);
    }

    #[test]
    fn test_query() {
        assert_eq!(query("https://esm.sh/react?dev&target=es2020"), Some("dev&target=es2020"));
        assert_eq!(query("https://esm.sh/react?"), None);
        assert_eq!(query("/pages/index.tsx"), None);
        assert_eq!(strip_query("/a.ts?x=1#frag"), "/a.ts");
    }
}
