//! Identity & metadata model, quality/value mappers, and the source
//! adapter contract shared by every other Kukur crate.

pub mod base;
pub mod error;
pub mod mapping;
pub mod metadata;
pub mod quality;
pub mod selector;
pub mod source;

pub use base::{DataType, Dictionary, DictionaryError, InterpolationType, ProcessType, Quality};
pub use error::{KukurError, Result};
pub use mapping::{MetadataFieldMapper, MetadataValueMapper};
pub use metadata::{field_registry, find_field, find_field_by_serialized_name, Metadata, MetadataField};
pub use quality::{QualityMapper, QualityMappingEntry};
pub use selector::{ParseSelectorError, SeriesSelector, DEFAULT_FIELD, SERIES_NAME_TAG};
pub use source::{standard_schema, DataSource, MetadataSource, SearchResult, SearchStream, SourceStructure};
