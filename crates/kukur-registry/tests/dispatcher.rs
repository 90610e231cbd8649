//! End-to-end dispatcher scenarios against the in-memory fixture adapter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow_array::{Array, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow_schema::{DataType as ArrowDataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use kukur_core::{
    DataSource, KukurError, Metadata, MetadataSource, Result, SearchResult, SearchStream,
    SeriesSelector,
};
use kukur_registry::{AuxiliaryMetadataSource, CommonOptions, SourceWrapper};
use kukur_testsource::{MemorySource, SeriesFixture};

fn schema(value_type: ArrowDataType) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(
            "ts",
            ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("value", value_type, true),
    ]))
}

fn ts_array(timestamps: &[DateTime<Utc>]) -> TimestampMicrosecondArray {
    TimestampMicrosecondArray::from(
        timestamps.iter().map(|t| t.timestamp_micros()).collect::<Vec<_>>(),
    )
    .with_timezone("UTC")
}

/// Returns exactly two rows, `(start, 42.0)` and `(end, 24.0)`, for every
/// sub-interval it is asked for — grounding for S1.
struct TwoRowPerIntervalSource;

#[async_trait]
impl DataSource for TwoRowPerIntervalSource {
    async fn get_data(
        &self,
        _selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<arrow_array::RecordBatch> {
        let ts = ts_array(&[start, end]);
        let value = Float64Array::from(vec![42.0, 24.0]);
        Ok(arrow_array::RecordBatch::try_new(
            schema(ArrowDataType::Float64),
            vec![Arc::new(ts), Arc::new(value)],
        )
        .unwrap())
    }
}

fn no_metadata_source() -> Arc<dyn MetadataSource> {
    struct Empty;
    #[async_trait]
    impl MetadataSource for Empty {
        fn search(&self, _selector: &SeriesSelector) -> SearchStream {
            Box::pin(futures::stream::empty())
        }
        async fn get_metadata(&self, selector: &SeriesSelector) -> Result<Metadata> {
            Ok(Metadata::new(selector.clone()))
        }
    }
    Arc::new(Empty)
}

#[tokio::test]
async fn s1_interval_splitting_concatenation() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(TwoRowPerIntervalSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions {
            data_query_interval: Some(chrono::Duration::seconds(86_400)),
            ..Default::default()
        },
    );

    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();
    let table = wrapper.get_data(&selector, start, end).await.unwrap();

    assert_eq!(table.num_rows(), 62);
    let ts = table
        .column_by_name("ts")
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .unwrap();
    let value = table
        .column_by_name("value")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(ts.value(0), start.timestamp_micros());
    assert_eq!(value.value(0), 42.0);
    assert_eq!(ts.value(61), end.timestamp_micros());
    assert_eq!(value.value(61), 24.0);
}

/// Two rows on even-hour starts, zero otherwise — grounding for S2.
struct EvenHourSource;

#[async_trait]
impl DataSource for EvenHourSource {
    async fn get_data(
        &self,
        _selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<arrow_array::RecordBatch> {
        if start.hour() % 2 != 0 {
            return Ok(arrow_array::RecordBatch::new_empty(schema(ArrowDataType::Float64)));
        }
        let ts = ts_array(&[start, end]);
        let value = Float64Array::from(vec![1.0, 2.0]);
        Ok(arrow_array::RecordBatch::try_new(
            schema(ArrowDataType::Float64),
            vec![Arc::new(ts), Arc::new(value)],
        )
        .unwrap())
    }
}

use chrono::Timelike;

#[tokio::test]
async fn s2_empty_sub_interval_is_skipped() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(EvenHourSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions {
            data_query_interval: Some(chrono::Duration::seconds(3_600)),
            ..Default::default()
        },
    );

    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    let table = wrapper.get_data(&selector, start, end).await.unwrap();
    assert_eq!(table.num_rows(), 24);
}

/// First sub-interval returns a string, second a float — grounding for S3.
struct MixedTypeSource;

#[async_trait]
impl DataSource for MixedTypeSource {
    async fn get_data(
        &self,
        _selector: &SeriesSelector,
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<arrow_array::RecordBatch> {
        if start.hour() == 0 {
            let ts = ts_array(&[start]);
            let value = StringArray::from(vec!["A"]);
            Ok(arrow_array::RecordBatch::try_new(
                schema(ArrowDataType::Utf8),
                vec![Arc::new(ts), Arc::new(value)],
            )
            .unwrap())
        } else {
            let ts = ts_array(&[start]);
            let value = Float64Array::from(vec![2.5]);
            Ok(arrow_array::RecordBatch::try_new(
                schema(ArrowDataType::Float64),
                vec![Arc::new(ts), Arc::new(value)],
            )
            .unwrap())
        }
    }
}

#[tokio::test]
async fn s3_value_type_reconciliation_to_string() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(MixedTypeSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions {
            data_query_interval: Some(chrono::Duration::seconds(3_600)),
            ..Default::default()
        },
    );

    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 1, 2, 0, 0).unwrap();
    let table = wrapper.get_data(&selector, start, end).await.unwrap();

    assert_eq!(table.num_rows(), 2);
    let value = table
        .column_by_name("value")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(value.value(0), "A");
    assert_eq!(value.value(1), "2.5");
}

/// Fails `fail_count` times with `Transient`, then succeeds — grounding for
/// S4 and invariant #7.
struct FlakySource {
    remaining_failures: Mutex<u32>,
}

#[async_trait]
impl DataSource for FlakySource {
    async fn get_data(
        &self,
        _selector: &SeriesSelector,
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<arrow_array::RecordBatch> {
        let mut remaining = self.remaining_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(KukurError::Transient(anyhow::anyhow!("temporary backend hiccup")));
        }
        let ts = ts_array(&[start]);
        let value = Float64Array::from(vec![2.5]);
        Ok(arrow_array::RecordBatch::try_new(
            schema(ArrowDataType::Float64),
            vec![Arc::new(ts), Arc::new(value)],
        )
        .unwrap())
    }
}

#[tokio::test]
async fn s4_retry_then_success() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(FlakySource {
            remaining_failures: Mutex::new(1),
        }),
        no_metadata_source(),
        Vec::new(),
        CommonOptions {
            query_retry_count: 1,
            query_retry_delay: Duration::from_millis(10),
            ..Default::default()
        },
    );

    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap();
    let table = wrapper.get_data(&selector, start, end).await.unwrap();
    assert_eq!(table.num_rows(), 1);
}

#[tokio::test]
async fn invariant_7_retry_fails_when_attempts_exceed_budget() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(FlakySource {
            remaining_failures: Mutex::new(2),
        }),
        no_metadata_source(),
        Vec::new(),
        CommonOptions {
            query_retry_count: 1,
            ..Default::default()
        },
    );

    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 1, 1, 0, 0).unwrap();
    let result = wrapper.get_data(&selector, start, end).await;
    assert!(result.is_err());
}

struct SingleMetadataSource {
    metadata: Metadata,
}

#[async_trait]
impl MetadataSource for SingleMetadataSource {
    fn search(&self, _selector: &SeriesSelector) -> SearchStream {
        Box::pin(futures::stream::iter(vec![Ok(SearchResult::Metadata(
            self.metadata.clone(),
        ))]))
    }

    async fn get_metadata(&self, _selector: &SeriesSelector) -> Result<Metadata> {
        Ok(self.metadata.clone())
    }
}

#[tokio::test]
async fn s5_auxiliary_metadata_precedence() {
    let selector = SeriesSelector::new("historian", "Tank01");

    let mut primary_metadata = Metadata::new(selector.clone());
    primary_metadata.set_field(
        "description",
        serde_json::Value::String("primary desc".to_string()),
    );
    primary_metadata.set_field("unit", serde_json::Value::String(String::new()));

    let mut aux_metadata = Metadata::new(selector.clone());
    aux_metadata.set_field(
        "description",
        serde_json::Value::String("aux desc".to_string()),
    );
    aux_metadata.set_field("unit", serde_json::Value::String("kg".to_string()));

    let wrapper = SourceWrapper::new(
        Arc::new(TwoRowPerIntervalSource),
        Arc::new(SingleMetadataSource {
            metadata: primary_metadata,
        }),
        vec![AuxiliaryMetadataSource {
            source: Arc::new(SingleMetadataSource {
                metadata: aux_metadata,
            }),
            fields: Vec::new(),
        }],
        CommonOptions::default(),
    );

    let result = wrapper.get_metadata(&selector).await.unwrap();
    assert_eq!(result.description(), "primary desc");
    assert_eq!(result.unit(), "kg");
}

#[tokio::test]
async fn invariant_2_equal_start_and_end_returns_empty_table() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(TwoRowPerIntervalSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions::default(),
    );
    let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let table = wrapper.get_data(&selector, t, t).await.unwrap();
    assert_eq!(table.num_rows(), 0);
    assert_eq!(table.num_columns(), 2);
}

#[tokio::test]
async fn get_data_without_series_name_returns_empty_table() {
    let selector = SeriesSelector::for_source("historian");
    let wrapper = SourceWrapper::new(
        Arc::new(TwoRowPerIntervalSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions::default(),
    );
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    let table = wrapper.get_data(&selector, start, end).await.unwrap();
    assert_eq!(table.num_rows(), 0);
}

#[tokio::test]
async fn get_metadata_without_series_name_is_empty_without_calling_adapters() {
    let selector = SeriesSelector::for_source("historian");
    let wrapper = SourceWrapper::new(
        Arc::new(TwoRowPerIntervalSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions::default(),
    );
    let metadata = wrapper.get_metadata(&selector).await.unwrap();
    assert_eq!(metadata.description(), "");
}

#[tokio::test]
async fn plot_data_surfaces_not_supported_when_adapter_lacks_it() {
    let selector = SeriesSelector::new("historian", "Tank01");
    let wrapper = SourceWrapper::new(
        Arc::new(TwoRowPerIntervalSource),
        no_metadata_source(),
        Vec::new(),
        CommonOptions::default(),
    );
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    let result = wrapper.get_plot_data(&selector, start, end, 10).await;
    assert!(matches!(result, Err(KukurError::NotSupported(_))));
}

#[tokio::test]
async fn memory_source_plot_data_downsamples() {
    let selector = SeriesSelector::new("memory", "Tank01");
    let schema = schema(ArrowDataType::Float64);
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let timestamps: Vec<DateTime<Utc>> = (0..100)
        .map(|i| start + chrono::Duration::seconds(i))
        .collect();
    let ts = ts_array(&timestamps);
    let values = Float64Array::from((0..100).map(|i| i as f64).collect::<Vec<_>>());
    let batch = arrow_array::RecordBatch::try_new(schema, vec![Arc::new(ts), Arc::new(values)]).unwrap();

    let fixture = SeriesFixture::new(selector.clone(), Metadata::new(selector.clone()), batch);
    let memory = MemorySource::new().with_series(fixture);
    let wrapper = SourceWrapper::new(Arc::new(memory.clone()), Arc::new(memory), Vec::new(), CommonOptions::default());

    let end = start + chrono::Duration::seconds(100);
    let table = wrapper.get_plot_data(&selector, start, end, 10).await.unwrap();
    assert!(table.num_rows() <= 10);
}
