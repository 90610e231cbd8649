//! Get-mode handlers: a JSON ticket selects `get_data` or `get_plot_data`;
//! the response streams Arrow `FlightData`. Grounded in
//! `kukur/flight.py::KukurFlightServer.get_data`/`get_plot_data`.

use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::FlightData;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use kukur_app::Kukur;
use kukur_core::{KukurError, Result};
use serde_json::Value;

use crate::json::selector_from_request;

const GET_DATA: &str = "get_data";
const GET_PLOT_DATA: &str = "get_plot_data";

pub async fn handle_ticket(
    app: &Kukur,
    ticket_bytes: &[u8],
) -> Result<BoxStream<'static, std::result::Result<FlightData, FlightError>>> {
    let request: Value = serde_json::from_slice(ticket_bytes)
        .map_err(|e| KukurError::InvalidData(format!("malformed ticket: {e}")))?;

    let query = request
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| KukurError::InvalidData("ticket is missing \"query\"".to_string()))?;

    let selector_json = request
        .get("selector")
        .ok_or_else(|| KukurError::InvalidData("ticket is missing \"selector\"".to_string()))?;
    let selector = selector_from_request(selector_json)?;
    let start_date = parse_date(&request, "start_date")?;
    let end_date = parse_date(&request, "end_date")?;

    let batch = match query {
        GET_DATA => app.get_data(&selector, start_date, end_date).await?,
        GET_PLOT_DATA => {
            let interval_count = request
                .get("interval_count")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    KukurError::InvalidData(
                        "get_plot_data ticket is missing \"interval_count\"".to_string(),
                    )
                })? as usize;
            app.get_plot_data(&selector, start_date, end_date, interval_count).await?
        }
        other => {
            return Err(KukurError::InvalidData(format!("unknown query \"{other}\"")));
        }
    };

    let encoded = FlightDataEncoderBuilder::new()
        .build(stream::iter(vec![Ok(batch)]))
        .boxed();
    Ok(encoded)
}

fn parse_date(request: &Value, key: &str) -> Result<DateTime<Utc>> {
    let raw = request
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| KukurError::InvalidData(format!("ticket is missing \"{key}\"")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| KukurError::InvalidData(format!("invalid \"{key}\": {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kukur_registry::{AdapterContext, BuiltSource, SourceRegistryBuilder};
    use kukur_testsource::MemorySource;
    use std::sync::Arc;

    fn app_with_memory_source(dir: &std::path::Path) -> Kukur {
        let mut builder = SourceRegistryBuilder::new();
        builder.register_source_type(
            "memory",
            Arc::new(|_ctx: &AdapterContext| {
                let source = Arc::new(MemorySource::new());
                Ok(BuiltSource {
                    data: source.clone(),
                    metadata: source,
                })
            }),
        );
        let config: toml::Value = toml::from_str(&format!(
            "data_dir = \"{}\"\n[source.plant]\ntype = \"memory\"\n",
            dir.display()
        ))
        .unwrap();
        Kukur::new(&config, &builder).unwrap()
    }

    #[tokio::test]
    async fn unknown_query_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_memory_source(dir.path());
        let ticket = serde_json::json!({
            "query": "bogus",
            "selector": {"source": "plant", "name": "Tank01"},
            "start_date": "2020-01-01T00:00:00Z",
            "end_date": "2020-01-02T00:00:00Z",
        });
        let result = handle_ticket(&app, &serde_json::to_vec(&ticket).unwrap()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_data_ticket_produces_a_flight_data_stream() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_memory_source(dir.path());
        let ticket = serde_json::json!({
            "query": "get_data",
            "selector": {"source": "plant", "name": "Tank01"},
            "start_date": "2020-01-01T00:00:00Z",
            "end_date": "2020-01-02T00:00:00Z",
        });
        let mut stream = handle_ticket(&app, &serde_json::to_vec(&ticket).unwrap())
            .await
            .unwrap();
        assert!(stream.next().await.is_some());
    }
}
