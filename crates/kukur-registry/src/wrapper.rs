//! `SourceWrapper`: the dispatcher. Composes one data adapter, one primary
//! metadata adapter, and N auxiliary metadata adapters behind the policy
//! described in the component design (interval splitting, retry, auxiliary
//! metadata fan-out, value-type reconciliation).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use arrow_array::RecordBatch;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use kukur_core::{
    field_registry, DataSource, KukurError, Metadata, MetadataSource, Result, SearchResult,
    SearchStream, SeriesSelector, SourceStructure,
};

use crate::concat::{empty_table, reconcile_and_concat};

/// Retry/interval-splitting policy shared by every call through a
/// [`SourceWrapper`].
#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    pub data_query_interval: Option<ChronoDuration>,
    pub query_retry_count: u32,
    pub query_retry_delay: StdDuration,
    pub query_timeout: Option<StdDuration>,
}

/// A secondary metadata adapter consulted to fill in fields missing from
/// the primary one. An empty `fields` whitelist means "copy everything".
#[derive(Clone)]
pub struct AuxiliaryMetadataSource {
    pub source: Arc<dyn MetadataSource>,
    pub fields: Vec<String>,
}

struct Inner {
    data: Arc<dyn DataSource>,
    metadata: Arc<dyn MetadataSource>,
    auxiliary: Vec<AuxiliaryMetadataSource>,
    options: CommonOptions,
}

/// The per-source dispatcher. Cheap to clone — every call shares the same
/// adapter handles and policy through an `Arc`.
#[derive(Clone)]
pub struct SourceWrapper {
    inner: Arc<Inner>,
}

fn is_unset(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Null)
        || matches!(value, serde_json::Value::String(s) if s.is_empty())
}

impl SourceWrapper {
    pub fn new(
        data: Arc<dyn DataSource>,
        metadata: Arc<dyn MetadataSource>,
        auxiliary: Vec<AuxiliaryMetadataSource>,
        options: CommonOptions,
    ) -> Self {
        SourceWrapper {
            inner: Arc::new(Inner {
                data,
                metadata,
                auxiliary,
                options,
            }),
        }
    }

    /// Run `f` until it succeeds, a non-retryable error occurs, or the
    /// configured retry budget (`query_retry_count + 1` total attempts) is
    /// exhausted. Each adapter call is individually bounded by
    /// `query_timeout`, surfacing [`KukurError::Timeout`] (itself
    /// retryable) on expiry.
    async fn retry<T, F, Fut>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let total_attempts = self.inner.options.query_retry_count + 1;
        let mut last_error = None;
        for attempt in 0..total_attempts {
            let outcome = match self.inner.options.query_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, f()).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(attempt, ?timeout, "adapter call timed out");
                        Err(KukurError::Timeout(
                            "adapter call exceeded configured timeout".to_string(),
                        ))
                    }
                },
                None => f().await,
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < total_attempts => {
                    tracing::debug!(attempt, total_attempts, error = %err, "retrying after a retryable error");
                    last_error = Some(err);
                    if !self.inner.options.query_retry_delay.is_zero() {
                        tokio::time::sleep(self.inner.options.query_retry_delay).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        let err = last_error.expect("retry loop always attempts at least once");
        tracing::warn!(total_attempts, error = %err, "retry budget exhausted");
        Err(err)
    }

    /// §4.3.1 — stream the primary adapter's results, filling in empty
    /// fields of each metadata result from the auxiliary sources
    /// (earlier-listed auxiliary wins). Bare selectors pass through
    /// unchanged. Initiating the stream is not itself retried: once begun,
    /// a mid-stream failure surfaces to the consumer as that item's error.
    pub fn search(&self, selector: &SeriesSelector) -> SearchStream {
        let primary = self.inner.metadata.search(selector);
        if self.inner.auxiliary.is_empty() {
            return primary;
        }
        let wrapper = self.clone();
        Box::pin(primary.then(move |item| {
            let wrapper = wrapper.clone();
            async move {
                let item = item?;
                match item {
                    SearchResult::Selector(s) => Ok(SearchResult::Selector(s)),
                    SearchResult::Metadata(metadata) => {
                        if metadata.series.name().is_none() {
                            return Ok(SearchResult::Metadata(metadata));
                        }
                        let filled = wrapper.fill_from_auxiliary(metadata).await?;
                        Ok(SearchResult::Metadata(filled))
                    }
                }
            }
        }))
    }

    async fn fill_from_auxiliary(&self, mut metadata: Metadata) -> Result<Metadata> {
        let selector = metadata.series.clone();
        let mut aux_results = Vec::with_capacity(self.inner.auxiliary.len());
        for aux in &self.inner.auxiliary {
            let result = self.retry(|| aux.source.get_metadata(&selector)).await?;
            aux_results.push(result);
        }

        let mut field_names: Vec<String> = field_registry()
            .iter()
            .map(|f| f.canonical_name.to_string())
            .collect();
        for aux_metadata in &aux_results {
            for (name, _) in aux_metadata.iter_fields() {
                if !field_names.iter().any(|n| n == name) {
                    field_names.push(name.to_string());
                }
            }
        }

        for name in &field_names {
            if metadata.is_set(name) {
                continue;
            }
            for aux_metadata in &aux_results {
                if aux_metadata.is_set(name) {
                    metadata.set_field(name, aux_metadata.get_field(name).unwrap().clone());
                    break;
                }
            }
        }
        Ok(metadata)
    }

    /// §4.3.2 — reverse-auxiliary-then-primary-last precedence: every
    /// source overwrites the accumulator's non-null/non-empty fields, so
    /// whichever is applied last wins. The primary adapter is applied last,
    /// so it takes precedence; among auxiliaries, earlier-listed wins
    /// because it is applied closer to last.
    pub async fn get_metadata(&self, selector: &SeriesSelector) -> Result<Metadata> {
        if selector.name().is_none() {
            return Ok(Metadata::new(selector.clone()));
        }
        let mut accumulator = Metadata::new(selector.clone());
        for aux in self.inner.auxiliary.iter().rev() {
            let result = self.retry(|| aux.source.get_metadata(selector)).await?;
            copy_set_fields(&mut accumulator, &result, &aux.fields);
        }
        let primary = self.retry(|| self.inner.metadata.get_metadata(selector)).await?;
        copy_set_fields(&mut accumulator, &primary, &[]);
        Ok(accumulator)
    }

    /// §4.3.3 — split `[start, end)` into sub-intervals, fetch each with
    /// retry, drop empty sub-intervals, and reconcile value types across
    /// what remains.
    pub async fn get_data(
        &self,
        selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RecordBatch> {
        if start == end || selector.name().is_none() {
            return Ok(empty_table());
        }

        let mut tables = Vec::new();
        for (sub_start, sub_end) in self.sub_intervals(start, end) {
            let table = self
                .retry(|| self.inner.data.get_data(selector, sub_start, sub_end))
                .await?;
            if table.num_rows() > 0 {
                tables.push(table);
            }
        }

        if tables.is_empty() {
            return Ok(empty_table());
        }
        reconcile_and_concat(tables)
    }

    fn sub_intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        match self.inner.options.data_query_interval {
            Some(delta) if delta > ChronoDuration::zero() => {
                let mut intervals = Vec::new();
                let mut current = start;
                while current < end {
                    let next = std::cmp::min(current + delta, end);
                    intervals.push((current, next));
                    current = next;
                }
                intervals
            }
            _ => vec![(start, end)],
        }
    }

    /// §4.3.4 — a single retried call, no interval splitting.
    /// `NotSupported` when the data adapter doesn't implement plot data.
    pub async fn get_plot_data(
        &self,
        selector: &SeriesSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_count: usize,
    ) -> Result<RecordBatch> {
        if !self.inner.data.supports_plot() {
            return Err(KukurError::NotSupported("plot data".to_string()));
        }
        self.retry(|| {
            self.inner
                .data
                .get_plot_data(selector, start, end, interval_count)
        })
        .await
    }

    /// §4.3.6 — delegated to the primary data adapter; `None` when
    /// unsupported.
    pub async fn get_source_structure(
        &self,
        selector: &SeriesSelector,
    ) -> Result<Option<SourceStructure>> {
        if !self.inner.data.supports_structure() {
            return Ok(None);
        }
        self.retry(|| self.inner.data.get_source_structure(selector)).await
    }
}

fn copy_set_fields(target: &mut Metadata, source: &Metadata, whitelist: &[String]) {
    let names: Vec<String> = if whitelist.is_empty() {
        source.iter_fields().map(|(name, _)| name.to_string()).collect()
    } else {
        whitelist.to_vec()
    };
    for name in names {
        if let Some(value) = source.get_field(&name) {
            if !is_unset(value) {
                target.set_field(&name, value.clone());
            }
        }
    }
}
