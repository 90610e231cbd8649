//! `SeriesSelector` identifies a series (or a family of series) within a
//! configured source.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// The conventional tag name used as the primary identifier when a source
/// has a flat name space.
pub const SERIES_NAME_TAG: &str = "series name";

/// The default field selected when a selector does not name one explicitly.
pub const DEFAULT_FIELD: &str = "value";

/// Identifies a series: which source it lives in, the tags that narrow it
/// down within that source, and which measured field of a multi-field
/// series is selected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesSelector {
    pub source: String,
    pub tags: BTreeMap<String, String>,
    pub field: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseSelectorError {
    #[error("source name must not be empty")]
    EmptySource,
    #[error("tag entry \"{0}\" has an empty name or value")]
    EmptyTagEntry(String),
    #[error("field must not be empty")]
    EmptyField,
}

impl SeriesSelector {
    /// Build a selector directly from a source name and a `series name` tag,
    /// selecting the default field.
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(SERIES_NAME_TAG.to_string(), name.into());
        SeriesSelector {
            source: source.into(),
            tags,
            field: DEFAULT_FIELD.to_string(),
        }
    }

    /// Build a selector that only names a source, with no tags. Used to
    /// search an entire source.
    pub fn for_source(source: impl Into<String>) -> Self {
        SeriesSelector {
            source: source.into(),
            tags: BTreeMap::new(),
            field: DEFAULT_FIELD.to_string(),
        }
    }

    /// Parse the canonical tag string (as produced by [`Self::canonical_tags`])
    /// for the given source. This is the inverse of canonical-form rendering.
    pub fn from_name(
        source: impl Into<String>,
        canonical: &str,
    ) -> Result<Self, ParseSelectorError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(ParseSelectorError::EmptySource);
        }
        let trimmed = canonical.trim();

        let (entries_part, field) = match trimmed.rsplit_once("::") {
            Some((entries, field)) if !field.is_empty() => (entries, field.to_string()),
            _ => (trimmed, DEFAULT_FIELD.to_string()),
        };

        let mut tags = BTreeMap::new();
        if !entries_part.is_empty() {
            for entry in entries_part.split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                match entry.split_once('=') {
                    Some((k, v)) => {
                        if k.trim().is_empty() || v.trim().is_empty() {
                            return Err(ParseSelectorError::EmptyTagEntry(entry.to_string()));
                        }
                        tags.insert(k.trim().to_string(), v.trim().to_string());
                    }
                    None => {
                        tags.insert(SERIES_NAME_TAG.to_string(), entry.to_string());
                    }
                }
            }
        }

        Ok(SeriesSelector {
            source,
            tags,
            field,
        })
    }

    /// The conventional primary name, if a `series name` tag is present.
    pub fn name(&self) -> Option<&str> {
        self.tags.get(SERIES_NAME_TAG).map(String::as_str)
    }

    /// Canonical string form of the tags and field, used for logs and wire
    /// identity. The `series name` tag (if present) is emitted first as a
    /// bare value; remaining tags follow in sorted `key=value` form; the
    /// field is appended as `::field` when it isn't `"value"`.
    pub fn canonical_tags(&self) -> String {
        let mut parts = Vec::with_capacity(self.tags.len());
        if let Some(name) = self.name() {
            parts.push(name.to_string());
        }
        for (k, v) in &self.tags {
            if k == SERIES_NAME_TAG {
                continue;
            }
            parts.push(format!("{k}={v}"));
        }
        let mut out = parts.join(",");
        if self.field != DEFAULT_FIELD {
            out.push_str("::");
            out.push_str(&self.field);
        }
        out
    }
}

impl fmt::Display for SeriesSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.source, self.canonical_tags())
    }
}
