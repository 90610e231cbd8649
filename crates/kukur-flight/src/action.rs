//! Action-mode handlers: JSON request in, JSON response stream out.
//! Grounded in `kukur/flight.py::KukurFlightServer`'s `search`,
//! `get_metadata`, `get_source_structure` and `Kukur.list_sources`.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use kukur_app::Kukur;
use kukur_core::{KukurError, Result, SearchResult};
use serde_json::Value;

use crate::json::{selector_from_request, selector_to_response, source_structure_to_response};

pub const SEARCH: &str = "search";
pub const GET_METADATA: &str = "get_metadata";
pub const GET_SOURCE_STRUCTURE: &str = "get_source_structure";
pub const LIST_SOURCES: &str = "list_sources";

pub const ALL_ACTIONS: &[&str] = &[SEARCH, GET_METADATA, GET_SOURCE_STRUCTURE, LIST_SOURCES];

/// A lazy stream of encoded JSON response bodies, one per search result.
pub type JsonStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// One JSON document per search result, streamed out as the dispatcher
/// produces them rather than collected up front — `do_action` consumes this
/// stream directly, so a slow or unbounded search never materializes in
/// memory all at once.
pub fn search(app: &Kukur, body: &[u8]) -> Result<JsonStream> {
    let request: Value = parse_body(body)?;
    let selector = selector_from_request(&request)?;
    let stream = app.search(&selector)?;

    let encoded = stream.map(|item| {
        let item = item?;
        let document = match item {
            SearchResult::Selector(s) => selector_to_response(&s),
            SearchResult::Metadata(metadata) => metadata.to_data(),
        };
        serde_json::to_vec(&document).map_err(json_encode_error)
    });
    Ok(Box::pin(encoded))
}

pub async fn get_metadata(app: &Kukur, body: &[u8]) -> Result<Vec<u8>> {
    let request: Value = parse_body(body)?;
    let selector = selector_from_request(&request)?;
    let metadata = app.get_metadata(&selector).await?;
    serde_json::to_vec(&metadata.to_data()).map_err(json_encode_error)
}

pub async fn get_source_structure(app: &Kukur, body: &[u8]) -> Result<Vec<u8>> {
    let request: Value = parse_body(body)?;
    let selector = selector_from_request(&request)?;
    let structure = app.get_source_structure(&selector).await?;
    let document = match &structure {
        Some(structure) => source_structure_to_response(structure),
        None => Value::Null,
    };
    serde_json::to_vec(&document).map_err(json_encode_error)
}

pub fn list_sources(app: &Kukur) -> Result<Vec<u8>> {
    serde_json::to_vec(app.list_sources()).map_err(json_encode_error)
}

fn parse_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body)
        .map_err(|e| KukurError::InvalidData(format!("malformed JSON request: {e}")))
}

fn json_encode_error(e: serde_json::Error) -> KukurError {
    KukurError::InvalidData(format!("failed to encode response: {e}"))
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

    #[test]
    fn search_with_malformed_json_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_memory_source(dir.path());
        let result = search(&app, b"not json");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn search_stream_is_not_collected_until_polled() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_memory_source(dir.path());
        let mut stream = search(&app, br#"{"source": "plant"}"#).unwrap();
        // Constructing the stream must not itself drain it; polling it does.
        let _ = stream.next().await;
    }

    #[test]
    fn list_sources_encodes_configured_names() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_memory_source(dir.path());
        let body = list_sources(&app).unwrap();
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(names, vec!["plant".to_string()]);
    }

    #[tokio::test]
    async fn get_metadata_for_unknown_source_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_memory_source(dir.path());
        let body = get_metadata(&app, br#"{"source": "nope", "name": "Tank01"}"#).await;
        assert!(body.is_err());
    }
}
