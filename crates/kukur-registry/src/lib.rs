//! The source registry/factory and the dispatcher (`SourceWrapper`) that
//! applies per-source policy on top of whatever adapter the registry built.

mod concat;
mod factory;
mod wrapper;

pub use concat::{empty_table, reconcile_and_concat, reconciled_value_type};
pub use factory::{
    AdapterContext, BuiltSource, SourceFactory, SourceRegistry, SourceRegistryBuilder,
};
pub use wrapper::{AuxiliaryMetadataSource, CommonOptions, SourceWrapper};
