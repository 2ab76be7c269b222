//! Source name patterns
//!
//! Supported forms: `*` (any), `name` (exact), `prefix*`, `*suffix` and
//! `*contains*`. A `*` anywhere else is rejected at compile time.

use crate::error::{Result, RoutingError};

/// Compiled name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    Any,
    Exact(Box<str>),
    Prefix(Box<str>),
    Suffix(Box<str>),
    Contains(Box<str>),
}

impl NamePattern {
    /// Parse a pattern. When `case_sensitive` is false the needle is folded
    /// to lowercase and callers must fold the name they match against.
    pub fn parse(pattern: &str, case_sensitive: bool) -> Result<Self> {
        let folded;
        let text = if case_sensitive {
            pattern
        } else {
            folded = pattern.to_lowercase();
            folded.as_str()
        };

        if text == "*" || text == "**" {
            return Ok(Self::Any);
        }

        let starts = text.starts_with('*');
        let ends = text.len() > 1 && text.ends_with('*');
        let inner = match (starts, ends) {
            (true, true) => &text[1..text.len() - 1],
            (true, false) => &text[1..],
            (false, true) => &text[..text.len() - 1],
            (false, false) => text,
        };

        if inner.contains('*') {
            return Err(RoutingError::invalid_pattern(pattern));
        }

        let needle: Box<str> = inner.into();
        Ok(match (starts, ends) {
            (true, true) => Self::Contains(needle),
            (true, false) => Self::Suffix(needle),
            (false, true) => Self::Prefix(needle),
            (false, false) => Self::Exact(needle),
        })
    }

    /// Test a (possibly folded) source name
    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(s) => name == &**s,
            Self::Prefix(s) => name.starts_with(&**s),
            Self::Suffix(s) => name.ends_with(&**s),
            Self::Contains(s) => name.contains(&**s),
        }
    }
}
