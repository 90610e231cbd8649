//! A non-persistent in-memory adapter, used to exercise the dispatcher
//! without a real backend: the test suite's fixture, and the thing the
//! `kukur test` CLI subcommand talks to when a configuration registers a
//! source of type `"memory"`.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::TimestampMicrosecondType;
use arrow_array::RecordBatch;
use arrow_schema::DataType as ArrowDataType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use kukur_core::{
    DataSource, KukurError, Metadata, MetadataSource, Result, SearchResult, SearchStream,
    SeriesSelector, SourceStructure,
};

/// One series known to a [`MemorySource`]: its identity, its metadata, and
/// its full data table (filtered to a requested interval on read).
#[derive(Debug, Clone)]
pub struct SeriesFixture {
    pub selector: SeriesSelector,
    pub metadata: Metadata,
    pub data: RecordBatch,
}

impl SeriesFixture {
    pub fn new(selector: SeriesSelector, metadata: Metadata, data: RecordBatch) -> Self {
        SeriesFixture {
            selector,
            metadata,
            data,
        }
    }
}

/// An in-memory `DataSource + MetadataSource` seeded at construction time.
/// Held behind an `Arc` by callers that register it with a registry.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    series: Vec<SeriesFixture>,
    structure: Option<SourceStructure>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn with_series(mut self, fixture: SeriesFixture) -> Self {
        self.series.push(fixture);
        self
    }

    pub fn with_structure(mut self, structure: SourceStructure) -> Self {
        self.structure = Some(structure);
        self
    }

    fn matches(&self, query: &SeriesSelector, fixture: &SeriesFixture) -> bool {
        if query.tags.is_empty() {
            return true;
        }
        query
            .tags
            .iter()
            .all(|(k, v)| fixture.selector.tags.get(k).is_some_and(|fv| fv == v))
    }

    fn find(&self, selector: &SeriesSelector) -> Option<&SeriesFixture> {
        self.series.iter().find(|f| f.selector == *selector)
    }
}

#[async_trait]
impl MetadataSource for MemorySource {
    fn search(&self, selector: &SeriesSelector) -> SearchStream {
        let results: Vec<Result<SearchResult>> = self
            .series
            .iter()
            .filter(|fixture| self.matches(selector, fixture))
            .map(|fixture| Ok(SearchResult::Metadata(fixture.metadata.clone())))
            .collect();
        Box::pin(stream::iter(results))
    }

    async fn get_metadata(&self, selector: &SeriesSelector) -> Result<Metadata> {
        if selector.name().is_none() {
            return Ok(Metadata::new(selector.clone()));
        }
        self.find(selector)
            .map(|fixture| fixture.metadata.clone())
            .ok_or_else(|| KukurError::InvalidData(format!("unknown series: {selector}")))
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn get_data(
        &self,
        selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RecordBatch> {
        let fixture = self
            .find(selector)
            .ok_or_else(|| KukurError::InvalidData(format!("unknown series: {selector}")))?;
        filter_interval(&fixture.data, start, end)
    }

    fn supports_plot(&self) -> bool {
        true
    }

    async fn get_plot_data(
        &self,
        selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_count: usize,
    ) -> Result<RecordBatch> {
        let filtered = self.get_data(selector, start, end).await?;
        if interval_count == 0 || filtered.num_rows() <= interval_count {
            return Ok(filtered);
        }
        let stride = (filtered.num_rows() + interval_count - 1) / interval_count;
        let indices: Vec<u32> = (0..filtered.num_rows() as u32).step_by(stride).collect();
        let index_array = arrow_array::UInt32Array::from(indices);
        let columns = filtered
            .columns()
            .iter()
            .map(|col| arrow_select::take::take(col, &index_array, None))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| KukurError::Transient(e.into()))?;
        RecordBatch::try_new(filtered.schema(), columns)
            .map_err(|e| KukurError::Transient(e.into()))
    }

    fn supports_structure(&self) -> bool {
        self.structure.is_some()
    }

    async fn get_source_structure(
        &self,
        _selector: &SeriesSelector,
    ) -> Result<Option<SourceStructure>> {
        Ok(self.structure.clone())
    }
}

fn filter_interval(
    table: &RecordBatch,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<RecordBatch> {
    let ts_column = table
        .column_by_name("ts")
        .ok_or_else(|| KukurError::InvalidData("missing ts column".to_string()))?;
    if !matches!(ts_column.data_type(), ArrowDataType::Timestamp(_, _)) {
        return Err(KukurError::InvalidData(
            "ts column is not a timestamp".to_string(),
        ));
    }
    let ts_array = ts_column.as_primitive::<TimestampMicrosecondType>();
    let start_us = start.timestamp_micros();
    let end_us = end.timestamp_micros();
    let mask: arrow_array::BooleanArray = ts_array
        .iter()
        .map(|v| v.map(|ts| ts >= start_us && ts < end_us))
        .collect();

    let columns = table
        .columns()
        .iter()
        .map(|col| arrow_select::filter::filter(col, &mask))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| KukurError::Transient(e.into()))?;
    RecordBatch::try_new(table.schema(), columns).map_err(|e| KukurError::Transient(e.into()))
}

/// Build a `Vec<Arc<dyn ...>>`-friendly handle, since `MemorySource`
/// implements both adapter traits on the same value.
pub fn as_combined_source(source: MemorySource) -> Arc<MemorySource> {
    Arc::new(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Float64Array, TimestampMicrosecondArray};
    use arrow_schema::{Field, Schema, TimeUnit};
    use chrono::TimeZone;
    use futures::StreamExt;
    use kukur_core::SeriesSelector;
    use std::sync::Arc as StdArc;

    fn sample_batch() -> RecordBatch {
        let schema = StdArc::new(Schema::new(vec![
            Field::new(
                "ts",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("value", ArrowDataType::Float64, true),
        ]));
        let ts = TimestampMicrosecondArray::from(vec![
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().timestamp_micros(),
            Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap().timestamp_micros(),
        ])
        .with_timezone("UTC");
        let value = Float64Array::from(vec![1.0, 2.0]);
        RecordBatch::try_new(schema, vec![StdArc::new(ts), StdArc::new(value)]).unwrap()
    }

    #[tokio::test]
    async fn get_data_filters_to_the_half_open_interval() {
        let selector = SeriesSelector::new("memory", "Tank01");
        let source = MemorySource::new().with_series(SeriesFixture::new(
            selector.clone(),
            Metadata::new(selector.clone()),
            sample_batch(),
        ));
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let table = source.get_data(&selector, start, end).await.unwrap();
        assert_eq!(table.num_rows(), 1);
    }

    #[tokio::test]
    async fn search_yields_every_registered_series() {
        let a = SeriesSelector::new("memory", "A");
        let b = SeriesSelector::new("memory", "B");
        let source = MemorySource::new()
            .with_series(SeriesFixture::new(
                a.clone(),
                Metadata::new(a.clone()),
                sample_batch(),
            ))
            .with_series(SeriesFixture::new(
                b.clone(),
                Metadata::new(b.clone()),
                sample_batch(),
            ));
        let results: Vec<_> = source.search(&SeriesSelector::for_source("memory")).collect().await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn get_metadata_for_unknown_series_is_invalid_data() {
        let source = MemorySource::new();
        let selector = SeriesSelector::new("memory", "Missing");
        let result = source.get_metadata(&selector).await;
        assert!(matches!(result, Err(KukurError::InvalidData(_))));
    }
}
