//! Fuzzy column resolution
//!
//! Source headers drift from year to year, so columns are located by
//! keyword predicates over the header text instead of exact names. Each
//! semantic role resolves to the first header (in file order) that matches.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PipelineError, Result};

/// Keyword predicate over a trimmed header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMatch {
    /// Header contains every keyword.
    AllOf(Vec<String>),
    /// Header contains at least one keyword.
    AnyOf(Vec<String>),
    /// Header equals the given text.
    Exact(String),
}

impl KeywordMatch {
    pub fn all_of(keywords: &[&str]) -> Self {
        KeywordMatch::AllOf(keywords.iter().map(|k| k.to_string()).collect())
    }

    pub fn any_of(keywords: &[&str]) -> Self {
        KeywordMatch::AnyOf(keywords.iter().map(|k| k.to_string()).collect())
    }

    pub fn matches(&self, header: &str) -> bool {
        let header = header.trim();
        match self {
            KeywordMatch::AllOf(keywords) => {
                !keywords.is_empty() && keywords.iter().all(|k| header.contains(k.as_str()))
            }
            KeywordMatch::AnyOf(keywords) => keywords.iter().any(|k| header.contains(k.as_str())),
            KeywordMatch::Exact(name) => header == name,
        }
    }

    /// Keywords for error messages.
    pub fn keywords(&self) -> Vec<String> {
        match self {
            KeywordMatch::AllOf(k) | KeywordMatch::AnyOf(k) => k.clone(),
            KeywordMatch::Exact(name) => vec![name.clone()],
        }
    }
}

/// A semantic role a column can play in a source table.
#[derive(Debug, Clone)]
pub struct ColumnRole<'a> {
    pub name: &'a str,
    pub matcher: &'a KeywordMatch,
    pub required: bool,
}

impl<'a> ColumnRole<'a> {
    pub fn required(name: &'a str, matcher: &'a KeywordMatch) -> Self {
        Self {
            name,
            matcher,
            required: true,
        }
    }

    pub fn optional(name: &'a str, matcher: &'a KeywordMatch) -> Self {
        Self {
            name,
            matcher,
            required: false,
        }
    }
}

/// Find the first header matching `matcher`.
pub fn find_column(headers: &[String], matcher: &KeywordMatch) -> Option<usize> {
    let mut hits = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| matcher.matches(h))
        .map(|(i, _)| i);

    let first = hits.next()?;
    let ignored: Vec<&str> = hits.map(|i| headers[i].as_str()).collect();
    if !ignored.is_empty() {
        debug!(
            "column '{}' chosen for {:?}; also matched {:?}",
            headers[first], matcher, ignored
        );
    }
    Some(first)
}

/// Column indices for a set of resolved roles, in role order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedColumns {
    slots: Vec<(String, Option<usize>)>,
}

impl ResolvedColumns {
    /// Index of the column resolved for `role`, if any.
    pub fn get(&self, role: &str) -> Option<usize> {
        self.slots
            .iter()
            .find(|(name, _)| name == role)
            .and_then(|(_, idx)| *idx)
    }

    /// Resolved `(role, index)` pairs, skipping absent optional roles.
    pub fn present(&self) -> impl Iterator<Item = (&str, usize)> {
        self.slots
            .iter()
            .filter_map(|(name, idx)| idx.map(|i| (name.as_str(), i)))
    }
}

/// Resolve every role against `headers`.
///
/// Fails on the first required role without a match; optional roles
/// resolve to absent.
pub fn resolve_columns(headers: &[String], roles: &[ColumnRole<'_>], file: &str) -> Result<ResolvedColumns> {
    let mut slots = Vec::with_capacity(roles.len());

    for role in roles {
        let idx = find_column(headers, role.matcher);
        if idx.is_none() && role.required {
            return Err(PipelineError::MissingColumn {
                file: file.to_string(),
                role: role.name.to_string(),
            });
        }
        slots.push((role.name.to_string(), idx));
    }

    Ok(ResolvedColumns { slots })
}
