//! Route lookup.
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order; first match wins
//! - Explicit no-match rather than a silent default

use crate::config::{AccessLevel, RouteConfig};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RequestTarget};

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub access: AccessLevel,
    priority: u32,
    matcher: AndMatcher,
}

/// Priority-ordered route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .map(|config| {
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if let Some(host) = &config.host {
                    matchers.push(Box::new(HostMatcher::new(host.clone())));
                }
                if let Some(prefix) = &config.path_prefix {
                    matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
                }
                Route {
                    name: config.name.clone(),
                    access: config.access,
                    priority: config.priority,
                    matcher: AndMatcher::new(matchers),
                }
            })
            .collect();

        // Stable sort keeps config order among equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self { routes }
    }

    pub fn match_target(&self, target: &RequestTarget<'_>) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(target))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
