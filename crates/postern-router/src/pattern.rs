//! Path patterns with typed holes.

use std::fmt;

/// One segment of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Must equal this text exactly.
    Literal(String),
    /// Captures any single segment as a string.
    Str(String),
    /// Captures a single segment that parses as an `i64`.
    Int(String),
    /// Captures the rest of the path, slashes included. Last segment only.
    Rest(String),
}

/// Error types for pattern parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Patterns must start with `/`.
    MissingLeadingSlash,
    /// A hole has no name (`{}` or `{:int}`).
    EmptyHoleName,
    /// A hole names an unknown type.
    UnknownHoleType {
        /// The unrecognized type annotation.
        ty: String,
    },
    /// A `{name:rest}` hole is only valid as the final segment.
    RestNotLast,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLeadingSlash => write!(f, "pattern must start with '/'"),
            Self::EmptyHoleName => write!(f, "hole has no name"),
            Self::UnknownHoleType { ty } => write!(f, "unknown hole type {ty:?}"),
            Self::RestNotLast => write!(f, "rest hole must be the last segment"),
        }
    }
}

impl std::error::Error for PatternError {}

/// A path pattern: literal segments interleaved with typed holes.
///
/// Syntax: `/users/{id:int}/files/{path:rest}`. A bare `{name}` captures a
/// single segment as a string; `{name:int}` only matches segments that
/// parse as an `i64`; `{name:rest}` swallows the remainder of the path and
/// must come last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern string.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash);
        };
        let mut segments = Vec::new();
        if rest.is_empty() {
            return Ok(Self { segments });
        }
        let raw: Vec<&str> = rest.split('/').collect();
        for (i, part) in raw.iter().enumerate() {
            let segment = Self::parse_segment(part)?;
            if matches!(segment, Segment::Rest(_)) && i + 1 != raw.len() {
                return Err(PatternError::RestNotLast);
            }
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    fn parse_segment(part: &str) -> Result<Segment, PatternError> {
        let Some(hole) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) else {
            return Ok(Segment::Literal(part.to_string()));
        };
        let (name, ty) = match hole.split_once(':') {
            Some((name, ty)) => (name, ty),
            None => (hole, "str"),
        };
        if name.is_empty() {
            return Err(PatternError::EmptyHoleName);
        }
        match ty {
            "str" => Ok(Segment::Str(name.to_string())),
            "int" => Ok(Segment::Int(name.to_string())),
            "rest" => Ok(Segment::Rest(name.to_string())),
            _ => Err(PatternError::UnknownHoleType { ty: ty.to_string() }),
        }
    }

    /// Match a request path (query already stripped) against this pattern.
    ///
    /// Returns the captured hole values on a match.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<RouteParams> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut params = RouteParams::default();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest(name) => {
                    let remainder = parts.get(i..).unwrap_or(&[]).join("/");
                    params.push(name, remainder);
                    return Some(params);
                }
                Segment::Literal(lit) => {
                    if *parts.get(i)? != lit {
                        return None;
                    }
                }
                Segment::Str(name) => {
                    params.push(name, (*parts.get(i)?).to_string());
                }
                Segment::Int(name) => {
                    let part = *parts.get(i)?;
                    part.parse::<i64>().ok()?;
                    params.push(name, part.to_string());
                }
            }
        }
        if parts.len() != self.segments.len() {
            return None;
        }
        Some(params)
    }
}

/// Hole values captured by a pattern match.
#[derive(Debug, Default, Clone)]
pub struct RouteParams {
    params: Vec<(String, String)>,
}

impl RouteParams {
    fn push(&mut self, name: &str, value: String) {
        self.params.push((name.to_string(), value));
    }

    /// Get a captured value by hole name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get an `{name:int}` capture. Matching already validated the value,
    /// so this only returns `None` for absent or non-integer holes.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name)?.parse().ok()
    }

    /// Number of captured holes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate over captures as (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn parses_literals_and_holes() {
        let p = Pattern::parse("/users/{id:int}/files/{path:rest}").unwrap();
        assert_eq!(p.segments.len(), 4);
        assert!(Pattern::parse("/").unwrap().segments.is_empty());
    }

    #[test]
    fn rejects_missing_leading_slash() {
        assert_eq!(
            Pattern::parse("users"),
            Err(PatternError::MissingLeadingSlash)
        );
    }

    #[test]
    fn rejects_unnamed_hole() {
        assert_eq!(Pattern::parse("/x/{}"), Err(PatternError::EmptyHoleName));
        assert_eq!(
            Pattern::parse("/x/{:int}"),
            Err(PatternError::EmptyHoleName)
        );
    }

    #[test]
    fn rejects_unknown_hole_type() {
        assert_eq!(
            Pattern::parse("/x/{v:float}"),
            Err(PatternError::UnknownHoleType { ty: "float".into() })
        );
    }

    #[test]
    fn rejects_rest_before_end() {
        assert_eq!(
            Pattern::parse("/files/{p:rest}/meta"),
            Err(PatternError::RestNotLast)
        );
    }

    // ========================================================================
    // Matching
    // ========================================================================

    #[test]
    fn literal_match_is_exact() {
        let p = Pattern::parse("/api/users").unwrap();
        assert!(p.matches("/api/users").is_some());
        assert!(p.matches("/api/user").is_none());
        assert!(p.matches("/api").is_none());
        assert!(p.matches("/api/users/7").is_none());
    }

    #[test]
    fn root_pattern_matches_root_only() {
        let p = Pattern::parse("/").unwrap();
        assert!(p.matches("/").is_some());
        assert!(p.matches("/x").is_none());
    }

    #[test]
    fn string_hole_captures_segment() {
        let p = Pattern::parse("/users/{name}").unwrap();
        let params = p.matches("/users/ada").unwrap();
        assert_eq!(params.get("name"), Some("ada"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn int_hole_requires_integer() {
        let p = Pattern::parse("/items/{id:int}").unwrap();
        let params = p.matches("/items/42").unwrap();
        assert_eq!(params.get_int("id"), Some(42));
        assert!(p.matches("/items/forty-two").is_none());
        assert!(p.matches("/items/-3").is_some());
    }

    #[test]
    fn rest_hole_swallows_remainder() {
        let p = Pattern::parse("/static/{path:rest}").unwrap();
        let params = p.matches("/static/css/site/main.css").unwrap();
        assert_eq!(params.get("path"), Some("css/site/main.css"));
        // An empty remainder is still a match.
        let params = p.matches("/static").unwrap();
        assert_eq!(params.get("path"), Some(""));
    }

    #[test]
    fn mixed_pattern_end_to_end() {
        let p = Pattern::parse("/users/{id:int}/files/{path:rest}").unwrap();
        let params = p.matches("/users/7/files/a/b.txt").unwrap();
        assert_eq!(params.get_int("id"), Some(7));
        assert_eq!(params.get("path"), Some("a/b.txt"));
        assert!(p.matches("/users/x/files/a").is_none());
    }

    #[test]
    fn params_iteration_preserves_order() {
        let p = Pattern::parse("/{a}/{b}").unwrap();
        let params = p.matches("/1/2").unwrap();
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2")]);
    }
}
