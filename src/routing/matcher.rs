//! Route matching logic.
//!
//! # Design Decisions
//! - Host matching is case-insensitive and ignores the port
//! - Path matching is case-sensitive and segment-aware (`/api` does not
//!   match `/apiary`)
//! - Empty condition = always matches (wildcard)

use std::fmt::Debug;

/// The parts of a request routes are matched on.
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    pub host: Option<&'a str>,
    pub path: &'a str,
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + Debug {
    fn matches(&self, target: &RequestTarget<'_>) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        target
            .host
            .map(|h| h.split(':').next().unwrap_or(h).eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches a path prefix on segment boundaries.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: trimmed.to_string(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        path_has_prefix(target.path, &self.prefix)
    }
}

/// Whether `path` lies under `prefix` on a segment boundary.
///
/// `/api` covers `/api` and `/api/x` but not `/apiary`. A trailing slash on
/// the prefix is ignored; an empty prefix or `/` covers every path.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, target: &RequestTarget<'_>) -> bool {
        self.matchers.iter().all(|m| m.matches(target))
    }
}
