//! The process-wide metadata field registry and the `Metadata` value type
//! built on top of it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde_json::Value;

use crate::base::{DataType, Dictionary, InterpolationType, ProcessType};
use crate::selector::SeriesSelector;

/// A registered metadata field: how it is named, how it defaults, and how it
/// moves between the wire representation and a typed value.
///
/// `serialize`/`deserialize` operate on `serde_json::Value` so the registry
/// can stay a single, uniform, process-wide list rather than one generic
/// type per field — see `Metadata`'s storage for how typed accessors are
/// layered back on top.
pub struct MetadataField {
    pub canonical_name: &'static str,
    pub serialized_name: &'static str,
    pub default: Value,
    pub deserialize: fn(&Value) -> Value,
}

fn identity(value: &Value) -> Value {
    value.clone()
}

fn coerce_optional_number(value: &Value) -> Value {
    match value {
        Value::Number(_) | Value::Null => value.clone(),
        Value::String(s) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_interpolation_type(value: &Value) -> Value {
    match value {
        Value::String(s) => InterpolationType::from_canonical_str(s)
            .map(|t| Value::String(t.as_canonical_str().to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_data_type(value: &Value) -> Value {
    match value {
        Value::String(s) => DataType::from_canonical_str(s)
            .map(|t| Value::String(t.as_canonical_str().to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_process_type(value: &Value) -> Value {
    match value {
        Value::String(s) => ProcessType::from_canonical_str(s)
            .map(|t| Value::String(t.as_canonical_str().to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn coerce_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Null => Value::String(String::new()),
        other => Value::String(other.to_string()),
    }
}

fn default_fields() -> Vec<MetadataField> {
    vec![
        MetadataField {
            canonical_name: "description",
            serialized_name: "description",
            default: Value::String(String::new()),
            deserialize: coerce_string,
        },
        MetadataField {
            canonical_name: "unit",
            serialized_name: "unit",
            default: Value::String(String::new()),
            deserialize: coerce_string,
        },
        MetadataField {
            canonical_name: "lower limit",
            serialized_name: "limitLow",
            default: Value::Null,
            deserialize: coerce_optional_number,
        },
        MetadataField {
            canonical_name: "upper limit",
            serialized_name: "limitHigh",
            default: Value::Null,
            deserialize: coerce_optional_number,
        },
        MetadataField {
            canonical_name: "accuracy",
            serialized_name: "accuracy",
            default: Value::Null,
            deserialize: coerce_optional_number,
        },
        MetadataField {
            canonical_name: "interpolation type",
            serialized_name: "interpolationType",
            default: Value::Null,
            deserialize: coerce_interpolation_type,
        },
        MetadataField {
            canonical_name: "data type",
            serialized_name: "dataType",
            default: Value::Null,
            deserialize: coerce_data_type,
        },
        MetadataField {
            canonical_name: "dictionary name",
            serialized_name: "dictionaryName",
            default: Value::Null,
            deserialize: coerce_string,
        },
        MetadataField {
            canonical_name: "dictionary",
            serialized_name: "dictionary",
            default: Value::Null,
            deserialize: identity,
        },
        MetadataField {
            canonical_name: "process type",
            serialized_name: "processType",
            default: Value::Null,
            deserialize: coerce_process_type,
        },
    ]
}

static FIELD_REGISTRY: OnceLock<Vec<MetadataField>> = OnceLock::new();

/// The process-wide, insertion-ordered metadata field registry. Populated
/// once on first use; read-only thereafter.
pub fn field_registry() -> &'static [MetadataField] {
    FIELD_REGISTRY.get_or_init(default_fields)
}

pub fn find_field(canonical_name: &str) -> Option<&'static MetadataField> {
    field_registry()
        .iter()
        .find(|f| f.canonical_name == canonical_name)
}

pub fn find_field_by_serialized_name(serialized_name: &str) -> Option<&'static MetadataField> {
    field_registry()
        .iter()
        .find(|f| f.serialized_name == serialized_name)
}

/// A `SeriesSelector` plus a set of typed field values. Registered fields
/// always have a value (falling back to the field's default); unknown
/// fields received from a backend are retained verbatim alongside them in
/// the same map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub series: SeriesSelector,
    values: BTreeMap<String, Value>,
}

fn is_unset(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

impl Metadata {
    /// A fresh `Metadata` with every registered field at its default.
    pub fn new(series: SeriesSelector) -> Self {
        let mut values = BTreeMap::new();
        for field in field_registry() {
            values.insert(field.canonical_name.to_string(), field.default.clone());
        }
        Metadata { series, values }
    }

    /// Set a registered or unknown field by canonical name, coercing
    /// through the field's deserializer when the field is registered.
    pub fn set_field(&mut self, canonical_name: &str, value: Value) {
        let coerced = match find_field(canonical_name) {
            Some(field) => (field.deserialize)(&value),
            None => value,
        };
        self.values.insert(canonical_name.to_string(), coerced);
    }

    pub fn get_field(&self, canonical_name: &str) -> Option<&Value> {
        self.values.get(canonical_name)
    }

    /// Whether this metadata has a non-null, non-empty value for `name`.
    pub fn is_set(&self, canonical_name: &str) -> bool {
        self.values
            .get(canonical_name)
            .is_some_and(|v| !is_unset(v))
    }

    /// Iterate all fields (registered, in registry order, then unknown
    /// fields in name order) as `(canonical_name, value)` pairs.
    pub fn iter_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        let known: Vec<&str> = field_registry().iter().map(|f| f.canonical_name).collect();
        let registered = known
            .into_iter()
            .filter_map(move |name| self.values.get(name).map(|v| (name, v)));
        let unknown = self.values.iter().filter_map(move |(name, v)| {
            if find_field(name).is_none() {
                Some((name.as_str(), v))
            } else {
                None
            }
        });
        registered.chain(unknown)
    }

    /// Serialize to the wire representation: `{series: ..., <serializedName>: value, ...}`
    /// using `serde_json::Value` for the document so unknown fields pass
    /// through unchanged under their own name.
    pub fn to_data(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("series".to_string(), self.series_to_json());
        for (name, value) in self.iter_fields() {
            let wire_name = find_field(name)
                .map(|f| f.serialized_name.to_string())
                .unwrap_or_else(|| name.to_string());
            map.insert(wire_name, value.clone());
        }
        Value::Object(map)
    }

    fn series_to_json(&self) -> Value {
        let mut tags = serde_json::Map::new();
        for (k, v) in &self.series.tags {
            tags.insert(k.clone(), Value::String(v.clone()));
        }
        serde_json::json!({
            "source": self.series.source,
            "tags": tags,
            "field": self.series.field,
        })
    }

    /// Build `Metadata` from a wire document, keyed by serialized field
    /// name; a `series` key is required unless `series` is supplied
    /// directly (e.g. when the caller already resolved the selector from a
    /// request envelope).
    pub fn from_data(data: &Value, series: Option<SeriesSelector>) -> Option<Self> {
        let series = series.or_else(|| series_from_json(data.get("series")?))?;
        let mut metadata = Metadata::new(series);
        if let Value::Object(map) = data {
            for (wire_name, value) in map {
                if wire_name == "series" {
                    continue;
                }
                let canonical = find_field_by_serialized_name(wire_name)
                    .map(|f| f.canonical_name.to_string())
                    .unwrap_or_else(|| wire_name.clone());
                metadata.set_field(&canonical, value.clone());
            }
        }
        Some(metadata)
    }

    pub fn description(&self) -> &str {
        self.get_field("description").and_then(Value::as_str).unwrap_or("")
    }

    pub fn unit(&self) -> &str {
        self.get_field("unit").and_then(Value::as_str).unwrap_or("")
    }

    pub fn lower_limit(&self) -> Option<f64> {
        self.get_field("lower limit").and_then(Value::as_f64)
    }

    pub fn upper_limit(&self) -> Option<f64> {
        self.get_field("upper limit").and_then(Value::as_f64)
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.get_field("accuracy").and_then(Value::as_f64)
    }

    pub fn interpolation_type(&self) -> Option<InterpolationType> {
        self.get_field("interpolation type")
            .and_then(Value::as_str)
            .and_then(InterpolationType::from_canonical_str)
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.get_field("data type")
            .and_then(Value::as_str)
            .and_then(DataType::from_canonical_str)
    }

    pub fn dictionary_name(&self) -> Option<&str> {
        self.get_field("dictionary name").and_then(Value::as_str)
    }

    pub fn process_type(&self) -> Option<ProcessType> {
        self.get_field("process type")
            .and_then(Value::as_str)
            .and_then(ProcessType::from_canonical_str)
    }

    pub fn dictionary(&self) -> Option<Dictionary> {
        let value = self.get_field("dictionary")?;
        let entries = value.as_object()?;
        let parsed: Vec<(i64, String)> = entries
            .iter()
            .filter_map(|(k, v)| {
                let code = k.parse::<i64>().ok()?;
                let label = v.as_str()?.to_string();
                Some((code, label))
            })
            .collect();
        Dictionary::from_entries(parsed).ok()
    }

    pub fn set_dictionary(&mut self, dictionary: &Dictionary) {
        let mut map = serde_json::Map::new();
        for (code, label) in dictionary.iter() {
            map.insert(code.to_string(), Value::String(label.clone()));
        }
        self.values
            .insert("dictionary".to_string(), Value::Object(map));
    }
}

fn series_from_json(value: &Value) -> Option<SeriesSelector> {
    let source = value.get("source")?.as_str()?.to_string();
    let field = value
        .get("field")
        .and_then(Value::as_str)
        .unwrap_or(crate::selector::DEFAULT_FIELD)
        .to_string();
    let mut tags = std::collections::BTreeMap::new();
    if let Some(Value::Object(map)) = value.get("tags") {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                tags.insert(k.clone(), s.to_string());
            }
        }
    } else if let Some(name) = value.get("name").and_then(Value::as_str) {
        tags.insert(crate::selector::SERIES_NAME_TAG.to_string(), name.to_string());
    }
    Some(SeriesSelector {
        source,
        tags,
        field,
    })
}
