//! Compiled endpoint templates.
//!
//! # Responsibilities
//! - Compile a `/`-separated path template into classified segments
//! - Record where each named parameter sits in the path
//! - Decide whether a request path structurally matches
//! - Extract parameter values from a matching path
//!
//! # Template Syntax
//! - `users` is a literal segment, compared byte for byte
//! - `{id}` is a placeholder, matching any non-empty segment and binding it to `id`
//! - `*` as the final segment turns the endpoint into a family endpoint
//!
//! # Design Decisions
//! - Malformed templates fail at registration, never at request time
//! - Placeholder names are not part of an endpoint's identity:
//!   `/a/{x}` and `/a/{y}` hash and compare equal
//! - The family marker is: `/a/{x}` and `/a/{x}/*` are distinct endpoints

use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors raised while compiling a path template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The template contains `//` somewhere other than its ends.
    #[error("template `{template}` contains an empty segment")]
    EmptySegment { template: String },

    /// A placeholder has no name (`{}`).
    #[error("template `{template}` contains a placeholder without a name")]
    EmptyParameterName { template: String },

    /// Braces that do not wrap a whole segment, or nested braces.
    #[error("template `{template}` has a malformed placeholder in segment `{segment}`")]
    MalformedPlaceholder { template: String, segment: String },

    /// The same parameter name appears twice.
    #[error("template `{template}` binds parameter `{name}` more than once")]
    DuplicateParameter { template: String, name: String },

    /// `*` used anywhere but the final segment.
    #[error("template `{template}` uses `*` before its final segment")]
    MisplacedWildcard { template: String },
}

/// One classified template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly.
    Literal(String),
    /// Matches any non-empty request segment and binds it to the name.
    Param(String),
}

impl Segment {
    fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// An immutable compiled path template.
#[derive(Debug, Clone)]
pub struct Endpoint {
    template: String,
    segments: Vec<Segment>,
    family: bool,
    params: Vec<(String, usize)>,
    literal_count: usize,
}

impl Endpoint {
    /// Compile a template.
    ///
    /// `family` forces family matching; a trailing `*` segment has the same
    /// effect.
    pub fn parse(template: &str, family: bool) -> Result<Self, ConfigurationError> {
        let body = template.strip_prefix('/').unwrap_or(template);
        let body = body.strip_suffix('/').unwrap_or(body);

        let raw: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/').collect()
        };

        let mut segments = Vec::with_capacity(raw.len());
        let mut params: Vec<(String, usize)> = Vec::new();
        let mut family = family;

        for (i, piece) in raw.iter().enumerate() {
            if piece.is_empty() {
                return Err(ConfigurationError::EmptySegment {
                    template: template.to_string(),
                });
            }

            if *piece == "*" {
                if i + 1 != raw.len() {
                    return Err(ConfigurationError::MisplacedWildcard {
                        template: template.to_string(),
                    });
                }
                family = true;
                continue;
            }

            match classify(template, piece)? {
                Segment::Param(name) => {
                    if params.iter().any(|(existing, _)| *existing == name) {
                        return Err(ConfigurationError::DuplicateParameter {
                            template: template.to_string(),
                            name,
                        });
                    }
                    params.push((name.clone(), segments.len()));
                    segments.push(Segment::Param(name));
                }
                literal => segments.push(literal),
            }
        }

        let literal_count = segments.iter().filter(|s| s.is_literal()).count();

        Ok(Self {
            template: template.to_string(),
            segments,
            family,
            params,
            literal_count,
        })
    }

    /// The template text this endpoint was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True when trailing request segments beyond the template are accepted.
    pub fn is_family(&self) -> bool {
        self.family
    }

    /// Parameter names with the segment index they read from, in template order.
    pub fn param_positions(&self) -> &[(String, usize)] {
        &self.params
    }

    /// Number of literal segments, the specificity measure used by resolution.
    pub fn literal_count(&self) -> usize {
        self.literal_count
    }

    /// True when the template has no placeholders.
    pub fn is_static(&self) -> bool {
        self.params.is_empty()
    }

    /// Canonical literal path of a static endpoint (`"/a/b"`), `None` otherwise.
    pub fn literal_path(&self) -> Option<String> {
        if !self.is_static() {
            return None;
        }
        let mut path = String::new();
        for segment in &self.segments {
            if let Segment::Literal(text) = segment {
                path.push('/');
                path.push_str(text);
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Some(path)
    }

    /// Structural match against already split request segments.
    pub fn matches(&self, path: &[&str]) -> bool {
        let length_ok = if self.family {
            path.len() >= self.segments.len()
        } else {
            path.len() == self.segments.len()
        };

        length_ok
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(segment, piece)| match segment {
                    Segment::Literal(text) => text == piece,
                    Segment::Param(_) => !piece.is_empty(),
                })
    }

    /// Read parameter values out of a path this endpoint matches.
    pub fn extract(&self, path: &[&str]) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter_map(|(name, index)| {
                path.get(*index)
                    .map(|value| (name.clone(), (*value).to_string()))
            })
            .collect()
    }
}

fn classify(template: &str, piece: &str) -> Result<Segment, ConfigurationError> {
    let malformed = || ConfigurationError::MalformedPlaceholder {
        template: template.to_string(),
        segment: piece.to_string(),
    };

    match piece.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        Some(name) => {
            if name.is_empty() {
                return Err(ConfigurationError::EmptyParameterName {
                    template: template.to_string(),
                });
            }
            if name.contains(['{', '}']) {
                return Err(malformed());
            }
            Ok(Segment::Param(name.to_string()))
        }
        None if piece.contains(['{', '}']) => Err(malformed()),
        None => Ok(Segment::Literal(piece.to_string())),
    }
}

// Identity covers segment kinds, literal text and the family marker.
// The marker is deliberately part of it: `/a` and family `/a` are separate
// bindings, so registering one never overwrites the other.
impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family
            && self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    _ => false,
                })
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family.hash(state);
        self.segments.len().hash(state);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    0u8.hash(state);
                    text.hash(state);
                }
                Segment::Param(_) => 1u8.hash(state),
            }
        }
    }
}
