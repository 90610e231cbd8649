//! Small value types shared by the metadata model: the enumerations
//! registered as default metadata fields, and the order-preserving
//! `Dictionary` used for enumerated-valued series.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a series' value should be interpolated between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpolationType {
    Linear,
    Stepped,
}

impl InterpolationType {
    pub fn as_canonical_str(&self) -> &'static str {
        match self {
            InterpolationType::Linear => "LINEAR",
            InterpolationType::Stepped => "STEPPED",
        }
    }

    pub fn from_canonical_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "LINEAR" => Some(InterpolationType::Linear),
            "STEPPED" => Some(InterpolationType::Stepped),
            _ => None,
        }
    }
}

impl fmt::Display for InterpolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_canonical_str())
    }
}

/// The storage type of a series' value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Float32,
    Float64,
    String,
    Dictionary,
    Categorical,
}

impl DataType {
    pub fn as_canonical_str(&self) -> &'static str {
        match self {
            DataType::Float32 => "FLOAT32",
            DataType::Float64 => "FLOAT64",
            DataType::String => "STRING",
            DataType::Dictionary => "DICTIONARY",
            DataType::Categorical => "CATEGORICAL",
        }
    }

    pub fn from_canonical_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "FLOAT32" => Some(DataType::Float32),
            "FLOAT64" => Some(DataType::Float64),
            "STRING" => Some(DataType::String),
            "DICTIONARY" => Some(DataType::Dictionary),
            "CATEGORICAL" => Some(DataType::Categorical),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_canonical_str())
    }
}

/// How a process that produces a series behaves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessType {
    Continuous,
    Regime,
    Batch,
}

impl ProcessType {
    pub fn as_canonical_str(&self) -> &'static str {
        match self {
            ProcessType::Continuous => "CONTINUOUS",
            ProcessType::Regime => "REGIME",
            ProcessType::Batch => "BATCH",
        }
    }

    pub fn from_canonical_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CONTINUOUS" => Some(ProcessType::Continuous),
            "REGIME" => Some(ProcessType::Regime),
            "BATCH" => Some(ProcessType::Batch),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_canonical_str())
    }
}

/// An order-preserving, code-unique integer-to-label mapping for an
/// enumerated-valued series.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dictionary {
    entries: Vec<(i64, String)>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("duplicate dictionary code: {0}")]
    DuplicateCode(i64),
    #[error("dictionary label for code {0} must not be empty")]
    EmptyLabel(i64),
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary::default()
    }

    /// Build a dictionary from an ordered list of `(code, label)` pairs,
    /// rejecting duplicate codes or empty labels.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (i64, String)>,
    ) -> Result<Self, DictionaryError> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (code, label) in entries {
            if label.is_empty() {
                return Err(DictionaryError::EmptyLabel(code));
            }
            if !seen.insert(code) {
                return Err(DictionaryError::DuplicateCode(code));
            }
            out.push((code, label));
        }
        Ok(Dictionary { entries: out })
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i64, String)> {
        self.entries.iter()
    }

    pub fn label(&self, code: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Two-value quality domain every backend quality code maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Bad = 0,
    Good = 1,
}

impl Quality {
    pub fn as_i8(&self) -> i8 {
        *self as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_type_round_trip() {
        for variant in [InterpolationType::Linear, InterpolationType::Stepped] {
            let s = variant.as_canonical_str();
            assert_eq!(InterpolationType::from_canonical_str(s), Some(variant));
        }
    }

    #[test]
    fn data_type_is_case_insensitive() {
        assert_eq!(DataType::from_canonical_str("float64"), Some(DataType::Float64));
    }

    #[test]
    fn dictionary_rejects_duplicate_codes() {
        let result = Dictionary::from_entries(vec![
            (0, "off".to_string()),
            (0, "on".to_string()),
        ]);
        assert_eq!(result, Err(DictionaryError::DuplicateCode(0)));
    }

    #[test]
    fn dictionary_rejects_empty_labels() {
        let result = Dictionary::from_entries(vec![(0, String::new())]);
        assert_eq!(result, Err(DictionaryError::EmptyLabel(0)));
    }

    #[test]
    fn dictionary_preserves_insertion_order() {
        let dict = Dictionary::from_entries(vec![
            (2, "two".to_string()),
            (1, "one".to_string()),
        ])
        .unwrap();
        let codes: Vec<i64> = dict.iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![2, 1]);
    }
}
