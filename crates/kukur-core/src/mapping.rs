//! Bidirectional name and value mappers between a backend's vocabulary and
//! Kukur's canonical one.

use std::collections::HashMap;

/// One bidirectional dictionary per source: canonical field name ↔
/// adapter-side field name.
#[derive(Debug, Clone, Default)]
pub struct MetadataFieldMapper {
    to_external: HashMap<String, String>,
    to_canonical: HashMap<String, String>,
}

impl MetadataFieldMapper {
    pub fn new() -> Self {
        MetadataFieldMapper::default()
    }

    /// Build from a `{canonical_name: external_name}` configuration table.
    pub fn from_config(config: &HashMap<String, String>) -> Self {
        let mut mapper = MetadataFieldMapper::new();
        for (canonical, external) in config {
            mapper.add_mapping(canonical, external);
        }
        mapper
    }

    pub fn add_mapping(&mut self, canonical_name: &str, external_name: &str) {
        self.to_external
            .insert(canonical_name.to_string(), external_name.to_string());
        self.to_canonical
            .insert(external_name.to_string(), canonical_name.to_string());
    }

    /// The adapter-side name for a canonical field, or the canonical name
    /// unchanged when no mapping is registered.
    pub fn from_kukur(&self, canonical_name: &str) -> String {
        self.to_external
            .get(canonical_name)
            .cloned()
            .unwrap_or_else(|| canonical_name.to_string())
    }

    /// The canonical name for an adapter-side name, or the external name
    /// unchanged when no mapping is registered.
    pub fn to_kukur(&self, external_name: &str) -> String {
        self.to_canonical
            .get(external_name)
            .cloned()
            .unwrap_or_else(|| external_name.to_string())
    }
}

/// For a specific (field, backend value), returns the canonical value.
/// Configuration maps one external value, or a list of external values, to
/// a single canonical value: `{field: {canonical_value: external_value |
/// [external_value, ...]}}`. Internally this is stored keyed by external
/// value so lookup during ingestion is O(1).
#[derive(Debug, Clone, Default)]
pub struct MetadataValueMapper {
    // field name -> external value -> canonical value
    mapping: HashMap<String, HashMap<String, String>>,
}

impl MetadataValueMapper {
    pub fn new() -> Self {
        MetadataValueMapper::default()
    }

    pub fn add_mapping(&mut self, field_name: &str, canonical_value: &str, external_value: &str) {
        self.mapping
            .entry(field_name.to_string())
            .or_default()
            .insert(external_value.to_string(), canonical_value.to_string());
    }

    /// Register several external spellings for the same canonical value in
    /// one call, matching a `[ext1, ext2, ...] -> canonical` configuration
    /// entry.
    pub fn add_mapping_many(
        &mut self,
        field_name: &str,
        canonical_value: &str,
        external_values: &[String],
    ) {
        for external_value in external_values {
            self.add_mapping(field_name, canonical_value, external_value);
        }
    }

    /// The canonical value for `(field_name, external_value)`, or
    /// `external_value` itself when no mapping applies.
    pub fn from_source(&self, field_name: &str, external_value: &str) -> String {
        self.mapping
            .get(field_name)
            .and_then(|by_value| by_value.get(external_value))
            .cloned()
            .unwrap_or_else(|| external_value.to_string())
    }
}
