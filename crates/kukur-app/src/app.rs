//! The application facade (C6): looks up a configured source by name,
//! routes search/metadata/data requests to it, and exposes API-key
//! administration. Grounded in `kukur/app.py::Kukur`.

use std::path::PathBuf;

use kukur_apikey::ApiKeyRepository;
use kukur_core::{KukurError, Metadata, Result, SearchStream, SeriesSelector};
use kukur_registry::{SourceRegistry, SourceRegistryBuilder};
use toml::Value;

pub struct Kukur {
    registry: SourceRegistry,
    api_key_repository: ApiKeyRepository,
}

impl Kukur {
    /// Build the source registry from `config` via `builder`, and open (or
    /// create) the API-key database under `config.data_dir` (default `.`).
    pub fn new(config: &Value, builder: &SourceRegistryBuilder) -> Result<Self> {
        let registry = builder.build(config)?;

        let data_dir: PathBuf = config
            .get("data_dir")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .into();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            KukurError::InvalidConfiguration(format!(
                "cannot create data_dir {}: {e}",
                data_dir.display()
            ))
        })?;
        let api_key_repository = ApiKeyRepository::open(data_dir.join("apikeys.sqlite"))?;

        Ok(Kukur {
            registry,
            api_key_repository,
        })
    }

    pub fn search(&self, selector: &SeriesSelector) -> Result<SearchStream> {
        Ok(self.registry.get(&selector.source)?.search(selector))
    }

    pub async fn get_metadata(&self, selector: &SeriesSelector) -> Result<Metadata> {
        self.registry.get(&selector.source)?.get_metadata(selector).await
    }

    pub async fn get_data(
        &self,
        selector: &SeriesSelector,
        start_date: chrono::DateTime<chrono::Utc>,
        end_date: chrono::DateTime<chrono::Utc>,
    ) -> Result<arrow_array::RecordBatch> {
        self.registry
            .get(&selector.source)?
            .get_data(selector, start_date, end_date)
            .await
    }

    pub async fn get_plot_data(
        &self,
        selector: &SeriesSelector,
        start_date: chrono::DateTime<chrono::Utc>,
        end_date: chrono::DateTime<chrono::Utc>,
        interval_count: usize,
    ) -> Result<arrow_array::RecordBatch> {
        self.registry
            .get(&selector.source)?
            .get_plot_data(selector, start_date, end_date, interval_count)
            .await
    }

    pub async fn get_source_structure(
        &self,
        selector: &SeriesSelector,
    ) -> Result<Option<kukur_core::SourceStructure>> {
        self.registry.get(&selector.source)?.get_source_structure(selector).await
    }

    pub fn api_keys(&self) -> kukur_apikey::ApiKeys<'_> {
        kukur_apikey::ApiKeys::new(&self.api_key_repository)
    }

    /// Configured source names, in configuration order.
    pub fn list_sources(&self) -> &[String] {
        self.registry.names()
    }
}
