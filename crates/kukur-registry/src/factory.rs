//! Source registry / factory (C4): builds `SourceWrapper`s from a parsed
//! configuration tree by calling the adapter factory registered for each
//! source's `type`.
//!
//! The registry ships with no built-in adapter factories — individual
//! backend adapters are out of scope here (see `kukur-testsource` for the
//! one fixture this workspace does ship). A binary links in whichever
//! adapter crates it needs and calls [`SourceRegistryBuilder::register_source_type`]
//! before building the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use kukur_core::{
    DataSource, KukurError, MetadataFieldMapper, MetadataSource, MetadataValueMapper,
    QualityMapper, QualityMappingEntry, Result,
};
use toml::value::Table;
use toml::Value;

use crate::wrapper::{AuxiliaryMetadataSource, CommonOptions, SourceWrapper};

/// The resolved collaborators handed to an adapter factory, matching
/// "the factory receives exactly those objects it declares as
/// dependencies" — in Rust, every factory receives the full context and
/// reads only what it needs.
pub struct AdapterContext<'a> {
    pub source_name: &'a str,
    pub config: &'a Table,
    pub metadata_mapper: Option<&'a MetadataFieldMapper>,
    pub metadata_value_mapper: Option<&'a MetadataValueMapper>,
    pub quality_mapper: Option<&'a QualityMapper>,
}

/// A constructed adapter may serve data and metadata through the same
/// instance (the common case) or through two different ones when a
/// source's `metadata_type` differs from its `type`.
pub struct BuiltSource {
    pub data: Arc<dyn DataSource>,
    pub metadata: Arc<dyn MetadataSource>,
}

pub type SourceFactory = Arc<dyn Fn(&AdapterContext) -> Result<BuiltSource> + Send + Sync>;

/// Mutable only during startup wiring; produces a read-only
/// [`SourceRegistry`].
#[derive(Default, Clone)]
pub struct SourceRegistryBuilder {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistryBuilder {
    pub fn new() -> Self {
        SourceRegistryBuilder::default()
    }

    pub fn register_source_type(
        &mut self,
        type_name: impl Into<String>,
        factory: SourceFactory,
    ) -> &mut Self {
        self.factories.insert(type_name.into(), factory);
        self
    }

    /// Resolve every `[source.<name>]` entry in `config` into a
    /// [`SourceWrapper`], eagerly, so that lookups afterward never fail for
    /// reasons other than "unknown source name".
    pub fn build(&self, config: &Value) -> Result<SourceRegistry> {
        let sources_table = table_section(config, "source")?;
        let metadata_table = config.get("metadata").and_then(Value::as_table);
        let field_mapping_table = config.get("metadata_mapping").and_then(Value::as_table);
        let value_mapping_table = config
            .get("metadata_value_mapping")
            .and_then(Value::as_table);
        let quality_mapping_table = config.get("quality_mapping").and_then(Value::as_table);

        let mut names = Vec::new();
        let mut wrappers = HashMap::new();

        let Some(sources_table) = sources_table else {
            return Ok(SourceRegistry {
                names,
                wrappers,
            });
        };

        for (name, entry) in sources_table {
            let entry_table = entry.as_table().ok_or_else(|| {
                KukurError::InvalidSource(format!("source \"{name}\" must be a table"))
            })?;

            let type_name = entry_table
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    KukurError::InvalidSource(format!("source \"{name}\" is missing \"type\""))
                })?;

            let mappers = self.resolve_mappers(
                entry_table,
                field_mapping_table,
                value_mapping_table,
                quality_mapping_table,
            )?;

            let built = self.build_adapter(name, type_name, entry_table, &mappers)?;

            let metadata_type = entry_table.get("metadata_type").and_then(Value::as_str);
            let metadata = match metadata_type {
                Some(metadata_type) if metadata_type != type_name => {
                    self.build_adapter(name, metadata_type, entry_table, &mappers)?
                        .metadata
                }
                _ => built.metadata,
            };

            let auxiliary = self.resolve_auxiliary(
                name,
                entry_table,
                metadata_table,
                field_mapping_table,
                value_mapping_table,
                quality_mapping_table,
            )?;

            let options = common_options(entry_table);
            let wrapper = SourceWrapper::new(built.data, metadata, auxiliary, options);

            names.push(name.clone());
            wrappers.insert(name.clone(), wrapper);
        }

        Ok(SourceRegistry { names, wrappers })
    }

    fn resolve_mappers(
        &self,
        entry_table: &Table,
        field_mapping_table: Option<&Table>,
        value_mapping_table: Option<&Table>,
        quality_mapping_table: Option<&Table>,
    ) -> Result<ResolvedMappers> {
        let metadata_mapper = entry_table
            .get("metadata_mapping")
            .and_then(Value::as_str)
            .and_then(|mapping_name| {
                field_mapping_table.and_then(|t| t.get(mapping_name)).and_then(Value::as_table)
            })
            .map(build_field_mapper);

        let metadata_value_mapper = entry_table
            .get("metadata_value_mapping")
            .and_then(Value::as_str)
            .and_then(|mapping_name| {
                value_mapping_table.and_then(|t| t.get(mapping_name)).and_then(Value::as_table)
            })
            .map(build_value_mapper);

        let quality_mapper = entry_table
            .get("quality_mapping")
            .and_then(Value::as_str)
            .and_then(|mapping_name| {
                quality_mapping_table.and_then(|t| t.get(mapping_name)).and_then(Value::as_table)
            })
            .map(build_quality_mapper);

        Ok(ResolvedMappers {
            metadata_mapper,
            metadata_value_mapper,
            quality_mapper,
        })
    }

    fn build_adapter(
        &self,
        source_name: &str,
        type_name: &str,
        entry_table: &Table,
        mappers: &ResolvedMappers,
    ) -> Result<BuiltSource> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            KukurError::InvalidSource(format!(
                "source \"{source_name}\" has unknown type \"{type_name}\""
            ))
        })?;
        let context = AdapterContext {
            source_name,
            config: entry_table,
            metadata_mapper: mappers.metadata_mapper.as_ref(),
            metadata_value_mapper: mappers.metadata_value_mapper.as_ref(),
            quality_mapper: mappers.quality_mapper.as_ref(),
        };
        factory(&context)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_auxiliary(
        &self,
        source_name: &str,
        entry_table: &Table,
        metadata_table: Option<&Table>,
        field_mapping_table: Option<&Table>,
        value_mapping_table: Option<&Table>,
        quality_mapping_table: Option<&Table>,
    ) -> Result<Vec<AuxiliaryMetadataSource>> {
        let Some(aux_names) = entry_table.get("metadata_sources").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut auxiliary = Vec::with_capacity(aux_names.len());
        for aux_name_value in aux_names {
            let aux_name = aux_name_value.as_str().ok_or_else(|| {
                KukurError::InvalidSource(format!(
                    "source \"{source_name}\" has a non-string entry in \"metadata_sources\""
                ))
            })?;
            let aux_entry = metadata_table
                .and_then(|t| t.get(aux_name))
                .and_then(Value::as_table)
                .ok_or_else(|| {
                    KukurError::InvalidSource(format!(
                        "source \"{source_name}\" references unknown auxiliary metadata source \"{aux_name}\""
                    ))
                })?;

            let aux_type = aux_entry.get("type").and_then(Value::as_str).ok_or_else(|| {
                KukurError::InvalidSource(format!(
                    "auxiliary metadata source \"{aux_name}\" is missing \"type\""
                ))
            })?;

            let mappers = self.resolve_mappers(
                aux_entry,
                field_mapping_table,
                value_mapping_table,
                quality_mapping_table,
            )?;
            let built = self.build_adapter(aux_name, aux_type, aux_entry, &mappers)?;

            let fields = aux_entry
                .get("fields")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            auxiliary.push(AuxiliaryMetadataSource {
                source: built.metadata,
                fields,
            });
        }
        Ok(auxiliary)
    }
}

struct ResolvedMappers {
    metadata_mapper: Option<MetadataFieldMapper>,
    metadata_value_mapper: Option<MetadataValueMapper>,
    quality_mapper: Option<QualityMapper>,
}

fn table_section<'a>(config: &'a Value, key: &str) -> Result<Option<&'a Table>> {
    match config.get(key) {
        Some(Value::Table(table)) => Ok(Some(table)),
        Some(_) => Err(KukurError::InvalidConfiguration(format!(
            "\"{key}\" must be a table"
        ))),
        None => Ok(None),
    }
}

fn build_field_mapper(table: &Table) -> MetadataFieldMapper {
    let mut mapper = MetadataFieldMapper::new();
    for (canonical, external) in table {
        if let Some(external) = external.as_str() {
            mapper.add_mapping(canonical, external);
        }
    }
    mapper
}

fn build_value_mapper(table: &Table) -> MetadataValueMapper {
    let mut mapper = MetadataValueMapper::new();
    for (field_name, values) in table {
        let Some(values_table) = values.as_table() else {
            continue;
        };
        for (canonical_value, external) in values_table {
            match external {
                Value::String(s) => mapper.add_mapping(field_name, canonical_value, s),
                Value::Integer(i) => mapper.add_mapping(field_name, canonical_value, &i.to_string()),
                Value::Array(items) => {
                    let externals: Vec<String> = items
                        .iter()
                        .filter_map(|v| match v {
                            Value::String(s) => Some(s.clone()),
                            Value::Integer(i) => Some(i.to_string()),
                            _ => None,
                        })
                        .collect();
                    mapper.add_mapping_many(field_name, canonical_value, &externals);
                }
                _ => {}
            }
        }
    }
    mapper
}

fn build_quality_mapper(table: &Table) -> QualityMapper {
    let mut entries = Vec::new();
    if let Some(Value::Array(good_values)) = table.get("GOOD") {
        for value in good_values {
            match value {
                Value::Integer(i) => entries.push(QualityMappingEntry::Integer(*i)),
                Value::String(s) => entries.push(QualityMappingEntry::Text(s.clone())),
                Value::Array(range) if range.len() == 2 => {
                    if let (Some(lo), Some(hi)) = (range[0].as_integer(), range[1].as_integer()) {
                        entries.push(QualityMappingEntry::Range(lo, hi));
                    }
                }
                _ => {}
            }
        }
    }
    QualityMapper::from_entries(entries)
}

fn common_options(entry_table: &Table) -> CommonOptions {
    let data_query_interval = entry_table
        .get("data_query_interval_seconds")
        .and_then(Value::as_float)
        .filter(|secs| *secs > 0.0)
        .map(|secs| ChronoDuration::milliseconds((secs * 1000.0).round() as i64));

    let query_retry_count = entry_table
        .get("query_retry_count")
        .and_then(Value::as_integer)
        .map(|v| v.max(0) as u32)
        .unwrap_or(0);

    let query_retry_delay = entry_table
        .get("query_retry_delay")
        .and_then(Value::as_float)
        .map(StdDuration::from_secs_f64)
        .unwrap_or(StdDuration::ZERO);

    let query_timeout = entry_table
        .get("query_timeout_seconds")
        .and_then(Value::as_float)
        .map(StdDuration::from_secs_f64);

    CommonOptions {
        data_query_interval,
        query_retry_count,
        query_retry_delay,
        query_timeout,
    }
}

/// Built once at startup from configuration; read-only and safe to share
/// across every RPC task without locking.
pub struct SourceRegistry {
    names: Vec<String>,
    wrappers: HashMap<String, SourceWrapper>,
}

impl SourceRegistry {
    pub fn get(&self, name: &str) -> Result<&SourceWrapper> {
        self.wrappers
            .get(name)
            .ok_or_else(|| KukurError::UnknownSource(name.to_string()))
    }

    /// Names in configuration order, matching the deterministic
    /// `list_sources` contract.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kukur_testsource::MemorySource;

    fn memory_factory() -> SourceFactory {
        Arc::new(|_ctx: &AdapterContext| {
            let source = Arc::new(MemorySource::new());
            Ok(BuiltSource {
                data: source.clone(),
                metadata: source,
            })
        })
    }

    #[test]
    fn builds_sources_in_configuration_order() {
        let config: Value = toml::from_str(
            r#"
            [source.second]
            type = "memory"

            [source.first]
            type = "memory"
            "#,
        )
        .unwrap();

        let mut builder = SourceRegistryBuilder::new();
        builder.register_source_type("memory", memory_factory());
        let registry = builder.build(&config).unwrap();

        assert_eq!(registry.names(), &["second".to_string(), "first".to_string()]);
        assert!(registry.get("first").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(KukurError::UnknownSource(_))
        ));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let config: Value = toml::from_str(
            r#"
            [source.main]
            type = "does-not-exist"
            "#,
        )
        .unwrap();

        let builder = SourceRegistryBuilder::new();
        let result = builder.build(&config);
        assert!(matches!(result, Err(KukurError::InvalidSource(_))));
    }

    #[test]
    fn missing_type_is_fatal() {
        let config: Value = toml::from_str(
            r#"
            [source.main]
            some_option = 1
            "#,
        )
        .unwrap();

        let builder = SourceRegistryBuilder::new();
        let result = builder.build(&config);
        assert!(matches!(result, Err(KukurError::InvalidSource(_))));
    }

    #[test]
    fn unknown_auxiliary_source_is_fatal() {
        let config: Value = toml::from_str(
            r#"
            [source.main]
            type = "memory"
            metadata_sources = ["missing-aux"]
            "#,
        )
        .unwrap();

        let mut builder = SourceRegistryBuilder::new();
        builder.register_source_type("memory", memory_factory());
        let result = builder.build(&config);
        assert!(matches!(result, Err(KukurError::InvalidSource(_))));
    }

    #[test]
    fn common_options_parses_seconds_fields() {
        let table: Table = toml::from_str(
            r#"
            data_query_interval_seconds = 3600
            query_retry_count = 2
            query_retry_delay = 0.5
            query_timeout_seconds = 10
            "#,
        )
        .unwrap();
        let options = common_options(&table);
        assert_eq!(options.query_retry_count, 2);
        assert_eq!(options.query_retry_delay, StdDuration::from_millis(500));
        assert_eq!(options.query_timeout, Some(StdDuration::from_secs(10)));
        assert_eq!(
            options.data_query_interval,
            Some(ChronoDuration::seconds(3600))
        );
    }
}
