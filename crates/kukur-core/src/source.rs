//! The source adapter contract: the only polymorphism a backend must
//! satisfy. Optional capabilities (`get_plot_data`, `get_source_structure`)
//! are modeled as a capability bit set (`supports_plot`/`supports_structure`)
//! rather than a deeper trait hierarchy.

use std::pin::Pin;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::{DataType as ArrowDataType, Field, Schema, SchemaRef, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::{KukurError, Result};
use crate::metadata::Metadata;
use crate::selector::SeriesSelector;

/// One item of a `search` stream: either a bare identity or a fully
/// populated metadata record. A mixed stream is legal.
#[derive(Debug, Clone)]
pub enum SearchResult {
    Selector(SeriesSelector),
    Metadata(Metadata),
}

impl SearchResult {
    pub fn series(&self) -> &SeriesSelector {
        match self {
            SearchResult::Selector(selector) => selector,
            SearchResult::Metadata(metadata) => &metadata.series,
        }
    }
}

/// Enumerations of known tag keys, known tag values, and known fields for a
/// source, used to drive discovery UIs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStructure {
    pub tag_keys: Vec<String>,
    pub tag_values: Vec<(String, String)>,
    pub fields: Vec<String>,
}

/// A single-pass, lazy producer of search results. Consumers must iterate
/// to completion or drop it explicitly; adapters may hold a cursor behind
/// it.
pub type SearchStream = Pin<Box<dyn Stream<Item = Result<SearchResult>> + Send>>;

/// The standard columnar schema for a data/plot response: `ts` (UTC
/// microsecond timestamp), `value` (the given type), and an optional
/// `quality` (int8, {0,1}) column.
pub fn standard_schema(value_type: ArrowDataType, with_quality: bool) -> SchemaRef {
    let mut fields = vec![
        Field::new("ts", ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())), false),
        Field::new("value", value_type, true),
    ];
    if with_quality {
        fields.push(Field::new("quality", ArrowDataType::Int8, true));
    }
    Arc::new(Schema::new(fields))
}

/// Everything a backend adapter must implement to serve metadata search and
/// lookup. Split from [`DataSource`] because a source's metadata adapter
/// and data adapter may be different instances (`metadata_type` in
/// configuration).
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Stream search results for `selector`. The adapter may ignore any
    /// populated tags, or use them to narrow the search; it may also return
    /// a mix of bare selectors and full metadata.
    fn search(&self, selector: &SeriesSelector) -> SearchStream;

    /// Exactly one, fully qualified metadata record for `selector`.
    async fn get_metadata(&self, selector: &SeriesSelector) -> Result<Metadata>;
}

/// Everything a backend adapter must implement to serve data requests.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch `[start, end)`. The half-open interval is expected but not
    /// enforced; the dispatcher re-applies the predicate when composing
    /// results.
    async fn get_data(
        &self,
        selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RecordBatch>;

    /// Whether [`Self::get_plot_data`] is implemented for this adapter.
    fn supports_plot(&self) -> bool {
        false
    }

    /// Downsampled data suitable for visualization.
    async fn get_plot_data(
        &self,
        selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_count: usize,
    ) -> Result<RecordBatch> {
        let _ = (selector, start, end, interval_count);
        Err(KukurError::NotSupported("plot data".to_string()))
    }

    /// Whether [`Self::get_source_structure`] is implemented for this
    /// adapter.
    fn supports_structure(&self) -> bool {
        false
    }

    /// Enumerations of known tag keys/values/fields, or `None` if
    /// unsupported.
    async fn get_source_structure(
        &self,
        selector: &SeriesSelector,
    ) -> Result<Option<SourceStructure>> {
        let _ = selector;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_schema_omits_quality_by_default() {
        let schema = standard_schema(ArrowDataType::Float64, false);
        assert_eq!(schema.fields().len(), 2);
    }

    #[test]
    fn standard_schema_includes_quality_when_requested() {
        let schema = standard_schema(ArrowDataType::Float64, true);
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field(2).name(), "quality");
    }
}
