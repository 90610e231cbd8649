//! Maps backend-specific quality codes onto the two-value {GOOD, BAD}
//! domain used throughout the dispatcher.

use std::collections::HashSet;

use arrow_array::{Array, BooleanArray, Int8Array, StringArray};

use crate::base::Quality;

/// A single entry in a quality mapping configuration: either a scalar
/// backend value or an inclusive integer range, both meaning GOOD.
#[derive(Debug, Clone)]
pub enum QualityMappingEntry {
    Integer(i64),
    Text(String),
    Range(i64, i64),
}

/// Built from a `{"GOOD": [v1, v2, [lo, hi], ...]}`-shaped configuration.
/// Every value not in the GOOD set maps to BAD.
#[derive(Debug, Clone, Default)]
pub struct QualityMapper {
    good_integers: HashSet<i64>,
    good_text: HashSet<String>,
}

impl QualityMapper {
    pub fn new() -> Self {
        QualityMapper::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = QualityMappingEntry>) -> Self {
        let mut mapper = QualityMapper::new();
        for entry in entries {
            mapper.add_entry(entry);
        }
        mapper
    }

    pub fn add_entry(&mut self, entry: QualityMappingEntry) {
        match entry {
            QualityMappingEntry::Integer(v) => {
                self.good_integers.insert(v);
            }
            QualityMappingEntry::Text(v) => {
                self.good_text.insert(v);
            }
            QualityMappingEntry::Range(lo, hi) => {
                self.good_integers.extend(lo..=hi);
            }
        }
    }

    /// Whether any GOOD values have been configured.
    pub fn is_present(&self) -> bool {
        !self.good_integers.is_empty() || !self.good_text.is_empty()
    }

    pub fn from_source_int(&self, value: i64) -> Quality {
        if self.good_integers.contains(&value) {
            Quality::Good
        } else {
            Quality::Bad
        }
    }

    pub fn from_source_str(&self, value: &str) -> Quality {
        if self.good_text.contains(value) {
            Quality::Good
        } else {
            Quality::Bad
        }
    }

    /// Vectorized form over an Arrow array of backend quality codes,
    /// producing an `int8` column of {0,1}.
    pub fn map_array(&self, array: &dyn Array) -> Int8Array {
        if let Some(int_array) = array.as_any().downcast_ref::<arrow_array::Int64Array>() {
            let mask: BooleanArray = int_array
                .iter()
                .map(|v| v.map(|v| self.good_integers.contains(&v)))
                .collect();
            return mask
                .iter()
                .map(|v| v.map(|good| if good { Quality::Good.as_i8() } else { Quality::Bad.as_i8() }))
                .collect();
        }
        if let Some(str_array) = array.as_any().downcast_ref::<StringArray>() {
            return str_array
                .iter()
                .map(|v| {
                    v.map(|s| {
                        if self.good_text.contains(s) {
                            Quality::Good.as_i8()
                        } else {
                            Quality::Bad.as_i8()
                        }
                    })
                })
                .collect();
        }
        Int8Array::from(vec![Quality::Bad.as_i8(); array.len()])
    }
}
