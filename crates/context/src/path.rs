//! Dotted context paths with JSON-pointer escapes.

use std::fmt;

use crate::error::ContextError;

/// A parsed context path.
///
/// The string form is dotted segments; a dot always separates segments, so
/// segment text uses JSON-pointer escapes for the two reserved characters:
/// `~0` for `~` and `~1` for `/`. Numeric segments index into arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextPath {
    raw: String,
    segments: Vec<String>,
}

impl ContextPath {
    /// Parse a dotted path string.
    pub fn parse(raw: &str) -> Result<Self, ContextError> {
        if raw.is_empty() {
            return Err(ContextError::PathSyntax {
                path: raw.to_owned(),
                reason: "empty path",
            });
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(ContextError::PathSyntax {
                    path: raw.to_owned(),
                    reason: "empty segment",
                });
            }
            segments.push(unescape(part).ok_or(ContextError::PathSyntax {
                path: raw.to_owned(),
                reason: "dangling `~` escape",
            })?);
        }
        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    /// The unescaped segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment (the region name).
    #[must_use]
    pub fn region(&self) -> &str {
        &self.segments[0]
    }

    /// The segments after the region.
    #[must_use]
    pub fn rest(&self) -> &[String] {
        &self.segments[1..]
    }

    /// The original string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Escape one segment for embedding in a dotted path.
#[must_use]
pub fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Unescape one segment. Returns `None` on a dangling `~`.
#[must_use]
pub fn unescape(segment: &str) -> Option<String> {
    if !segment.contains('~') {
        return Some(segment.to_owned());
    }
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_plain_path() {
        let p = ContextPath::parse("state.results.0").unwrap();
        assert_eq!(p.region(), "state");
        assert_eq!(p.rest(), &["results".to_owned(), "0".to_owned()]);
        assert_eq!(p.as_str(), "state.results.0");
    }

    #[test]
    fn parse_rejects_empty_and_double_dots() {
        assert!(ContextPath::parse("").is_err());
        assert!(ContextPath::parse("state..x").is_err());
        assert!(ContextPath::parse(".state").is_err());
        assert!(ContextPath::parse("state.").is_err());
    }

    #[test]
    fn unescapes_reserved_characters() {
        let p = ContextPath::parse("state.a~1b.c~0d").unwrap();
        assert_eq!(p.rest(), &["a/b".to_owned(), "c~d".to_owned()]);
    }

    #[test]
    fn dangling_escape_is_an_error() {
        let err = ContextPath::parse("state.bad~").unwrap_err();
        assert!(err.to_string().contains("dangling"));
        assert!(ContextPath::parse("state.bad~2").is_err());
    }

    #[test]
    fn escape_unescape_examples() {
        assert_eq!(escape("a/b"), "a~1b");
        assert_eq!(escape("a~b"), "a~0b");
        assert_eq!(escape("~/"), "~0~1");
        assert_eq!(unescape("~0~1").unwrap(), "~/");
    }

    proptest::proptest! {
        #[test]
        fn escape_roundtrips(segment in "[a-z~/]{0,12}") {
            let escaped = escape(&segment);
            proptest::prop_assert_eq!(unescape(&escaped).unwrap(), segment);
        }
    }
}
