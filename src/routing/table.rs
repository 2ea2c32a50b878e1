//! Endpoint table and path resolution.
//!
//! # Responsibilities
//! - Store endpoint → handler bindings
//! - Resolve a request path to the most specific matching endpoint
//! - Return bound parameters or an explicit `NoMatch`
//!
//! # Design Decisions
//! - Static non-family endpoints are indexed by their literal path: O(1) lookup
//! - Everything else is a linear scan scored by specificity
//! - Ties are broken deterministically (see [`EndpointTable::resolve`])
//! - Re-registering an identical endpoint replaces its handler in place
//! - Immutable while serving; resolve takes `&self` only

use std::collections::HashMap;
use thiserror::Error;

use crate::routing::endpoint::{ConfigurationError, Endpoint};
use crate::routing::path::segments;

/// No registered endpoint matches the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no endpoint matches the request path")]
pub struct NoMatch;

/// How a resolution was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact literal lookup, no pattern matching involved.
    Static,
    /// Found by scanning and scoring candidates.
    Pattern,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Static => "static",
            MatchKind::Pattern => "pattern",
        }
    }
}

/// A successful resolution.
#[derive(Debug)]
pub struct Resolution<'t, H> {
    pub endpoint: &'t Endpoint,
    pub handler: &'t H,
    /// Parameter bindings in template order.
    pub params: Vec<(String, String)>,
    pub kind: MatchKind,
}

#[derive(Debug)]
struct Binding<H> {
    endpoint: Endpoint,
    handler: H,
}

/// Collection of endpoint → handler bindings.
#[derive(Debug)]
pub struct EndpointTable<H> {
    bindings: Vec<Binding<H>>,
    index: HashMap<Endpoint, usize>,
    statics: HashMap<String, usize>,
}

impl<H> Default for EndpointTable<H> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            index: HashMap::new(),
            statics: HashMap::new(),
        }
    }
}

impl<H> EndpointTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `template` and bind it to `handler`.
    ///
    /// Returns the handler previously bound to an identical endpoint, if any.
    /// The replaced binding keeps its registration slot.
    pub fn register(
        &mut self,
        template: &str,
        handler: H,
        family: bool,
    ) -> Result<Option<H>, ConfigurationError> {
        let endpoint = Endpoint::parse(template, family)?;

        if let Some(&slot) = self.index.get(&endpoint) {
            tracing::debug!(
                template = %template,
                previous = %self.bindings[slot].endpoint.template(),
                "Endpoint re-registered, replacing handler"
            );
            let previous = std::mem::replace(
                &mut self.bindings[slot],
                Binding {
                    endpoint: endpoint.clone(),
                    handler,
                },
            );
            // insert() would keep the old key; swap it so stored names follow the new template.
            self.index.remove(&endpoint);
            self.index.insert(endpoint, slot);
            return Ok(Some(previous.handler));
        }

        let slot = self.bindings.len();
        if !endpoint.is_family() {
            if let Some(literal) = endpoint.literal_path() {
                self.statics.insert(literal, slot);
            }
        }
        self.index.insert(endpoint.clone(), slot);
        self.bindings.push(Binding { endpoint, handler });

        tracing::debug!(template = %template, family, "Endpoint registered");
        Ok(None)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Registered endpoints in registration order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.bindings.iter().map(|b| &b.endpoint)
    }

    /// Look up the handler bound exactly to a literal path, skipping pattern
    /// matching entirely.
    pub fn lookup_static(&self, path: &str) -> Option<(&Endpoint, &H)> {
        self.statics.get(path).map(|&slot| {
            let binding = &self.bindings[slot];
            (&binding.endpoint, &binding.handler)
        })
    }

    /// Resolve a standardized path.
    ///
    /// Candidates are ranked by, in order: literal segment count, total
    /// template segment count, non-family before family, earlier registration.
    pub fn resolve(&self, path: &str) -> Result<Resolution<'_, H>, NoMatch> {
        if let Some((endpoint, handler)) = self.lookup_static(path) {
            return Ok(Resolution {
                endpoint,
                handler,
                params: Vec::new(),
                kind: MatchKind::Static,
            });
        }

        let pieces = segments(path);
        let best = self
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, binding)| binding.endpoint.matches(&pieces))
            .max_by_key(|(slot, binding)| {
                let endpoint = &binding.endpoint;
                (
                    endpoint.literal_count(),
                    endpoint.segments().len(),
                    !endpoint.is_family(),
                    std::cmp::Reverse(*slot),
                )
            })
            .map(|(_, binding)| binding)
            .ok_or(NoMatch)?;

        Ok(Resolution {
            endpoint: &best.endpoint,
            handler: &best.handler,
            params: best.endpoint.extract(&pieces),
            kind: MatchKind::Pattern,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &'static str, bool)]) -> EndpointTable<&'static str> {
        let mut table = EndpointTable::new();
        for (template, name, family) in entries {
            table.register(template, *name, *family).unwrap();
        }
        table
    }

    #[test]
    fn test_empty_table_never_matches() {
        let table: EndpointTable<()> = EndpointTable::new();
        assert!(table.is_empty());
        assert_eq!(table.resolve("/").unwrap_err(), NoMatch);
        assert_eq!(table.resolve("/anything/at/all").unwrap_err(), NoMatch);
    }

    #[test]
    fn test_static_paths_use_fast_path() {
        let table = table(&[("/a/b", "ab", false), ("/", "root", false)]);

        let hit = table.resolve("/a/b").unwrap();
        assert_eq!(*hit.handler, "ab");
        assert_eq!(hit.kind, MatchKind::Static);
        assert!(hit.params.is_empty());

        let root = table.resolve("/").unwrap();
        assert_eq!(*root.handler, "root");
    }

    #[test]
    fn test_placeholder_binding() {
        let table = table(&[("/users/{id}", "user", false)]);

        let hit = table.resolve("/users/42").unwrap();
        assert_eq!(*hit.handler, "user");
        assert_eq!(hit.kind, MatchKind::Pattern);
        assert_eq!(hit.params, vec![("id".to_string(), "42".to_string())]);

        assert_eq!(table.resolve("/users/42/extra").unwrap_err(), NoMatch);
    }

    #[test]
    fn test_family_variant_catches_longer_paths() {
        let table = table(&[
            ("/users/{id}", "user", false),
            ("/users/{id}/*", "user-family", false),
        ]);

        let hit = table.resolve("/users/42/extra").unwrap();
        assert_eq!(*hit.handler, "user-family");
        assert_eq!(hit.params, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn test_literal_beats_placeholder() {
        let table = table(&[("/a/{x}", "param", false), ("/a/b", "static", false)]);
        assert_eq!(*table.resolve("/a/b").unwrap().handler, "static");
        assert_eq!(*table.resolve("/a/c").unwrap().handler, "param");
    }

    #[test]
    fn test_more_literals_win_in_pattern_scan() {
        let table = table(&[
            ("/{a}/{b}/{c}", "none", false),
            ("/x/{b}/{c}", "one", false),
            ("/x/y/{c}", "two", false),
        ]);
        assert_eq!(*table.resolve("/x/y/z").unwrap().handler, "two");
        assert_eq!(*table.resolve("/x/q/z").unwrap().handler, "one");
        assert_eq!(*table.resolve("/p/q/z").unwrap().handler, "none");
    }

    #[test]
    fn test_family_never_matches_shorter_path() {
        let table = table(&[("/static/assets", "assets", true)]);
        assert!(table.resolve("/static/assets").is_ok());
        assert!(table.resolve("/static/assets/css/site.css").is_ok());
        assert_eq!(table.resolve("/static").unwrap_err(), NoMatch);
    }

    #[test]
    fn test_ties_prefer_longer_then_exact_then_earlier() {
        // Same literal count, the longer template wins.
        let table1 = table(&[("/a/*", "short-family", false), ("/a/{x}", "long", false)]);
        assert_eq!(*table1.resolve("/a/b").unwrap().handler, "long");

        // Same literal count and length, non-family wins.
        let table2 = table(&[("/a/{x}/*", "family", false), ("/a/{x}", "exact", false)]);
        assert_eq!(*table2.resolve("/a/c").unwrap().handler, "exact");
        assert_eq!(*table2.resolve("/a/c/d").unwrap().handler, "family");
        let table3 = table(&[("/{y}/*", "family", false), ("/{y}", "exact", false)]);
        assert_eq!(*table3.resolve("/b").unwrap().handler, "exact");

        // Identical scores, earliest registration wins.
        let table4 = table(&[("/{a}/x", "first", false), ("/x/{b}", "second", false)]);
        assert_eq!(*table4.resolve("/x/x").unwrap().handler, "first");
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut table = EndpointTable::new();
        assert_eq!(table.register("/a/{x}", "first", false).unwrap(), None);
        assert_eq!(table.register("/a/{y}", "second", false).unwrap(), Some("first"));
        assert_eq!(table.len(), 1);

        let hit = table.resolve("/a/1").unwrap();
        assert_eq!(*hit.handler, "second");
        assert_eq!(hit.params, vec![("y".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_family_flag_keeps_a_separate_binding() {
        let mut table = EndpointTable::new();
        assert_eq!(table.register("/a", "exact", false).unwrap(), None);
        assert_eq!(table.register("/a", "family", true).unwrap(), None);
        assert_eq!(table.len(), 2);

        assert_eq!(*table.resolve("/a").unwrap().handler, "exact");
        assert_eq!(*table.resolve("/a/b").unwrap().handler, "family");
    }

    #[test]
    fn test_register_rejects_malformed_template() {
        let mut table = EndpointTable::new();
        assert!(table.register("/a//b", (), false).is_err());
        assert!(table.is_empty());
    }
}
