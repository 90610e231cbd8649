//! Value-type reconciliation: the rule for concatenating data tables whose
//! `value` columns may come back from a backend with different Arrow
//! types across sub-intervals.

use std::sync::Arc;

use arrow_array::{Array, RecordBatch};
use arrow_schema::DataType as ArrowDataType;
use kukur_core::{standard_schema, KukurError, Result};

fn value_type(table: &RecordBatch) -> Option<&ArrowDataType> {
    table.column_by_name("value").map(|c| c.data_type())
}

fn is_string_type(dt: &ArrowDataType) -> bool {
    matches!(dt, ArrowDataType::Utf8 | ArrowDataType::LargeUtf8)
}

fn is_integer_type(dt: &ArrowDataType) -> bool {
    matches!(
        dt,
        ArrowDataType::Int8
            | ArrowDataType::Int16
            | ArrowDataType::Int32
            | ArrowDataType::Int64
            | ArrowDataType::UInt8
            | ArrowDataType::UInt16
            | ArrowDataType::UInt32
            | ArrowDataType::UInt64
    )
}

/// Pick the reconciled value column type for a set of non-empty tables:
/// string wins over everything, all-integer narrows to `int64`, anything
/// else (a mix including at least one float) becomes `float64`.
pub fn reconciled_value_type(tables: &[RecordBatch]) -> ArrowDataType {
    let has_string = tables
        .iter()
        .filter_map(value_type)
        .any(is_string_type);
    if has_string {
        return ArrowDataType::Utf8;
    }
    let all_integer = tables
        .iter()
        .filter_map(value_type)
        .all(is_integer_type);
    if all_integer {
        ArrowDataType::Int64
    } else {
        ArrowDataType::Float64
    }
}

/// Cast each table's `value` column to the reconciled type and concatenate
/// `ts`/`value`[/`quality`] across every table, preserving row order.
pub fn reconcile_and_concat(tables: Vec<RecordBatch>) -> Result<RecordBatch> {
    if tables.is_empty() {
        return Ok(empty_table());
    }
    let target = reconciled_value_type(&tables);
    let with_quality = tables
        .iter()
        .any(|t| t.column_by_name("quality").is_some());

    let mut ts_parts = Vec::with_capacity(tables.len());
    let mut value_parts = Vec::with_capacity(tables.len());
    let mut quality_parts = Vec::with_capacity(tables.len());

    for table in &tables {
        let ts = table
            .column_by_name("ts")
            .ok_or_else(|| KukurError::InvalidData("missing ts column".to_string()))?;
        ts_parts.push(ts.clone());

        let value = table
            .column_by_name("value")
            .ok_or_else(|| KukurError::InvalidData("missing value column".to_string()))?;
        let cast_value = arrow_cast::cast(value, &target).map_err(|e| KukurError::Transient(e.into()))?;
        value_parts.push(cast_value);

        if with_quality {
            let quality = table.column_by_name("quality").ok_or_else(|| {
                KukurError::InvalidData(
                    "a quality column is present in one sub-interval but missing in another"
                        .to_string(),
                )
            })?;
            quality_parts.push(quality.clone());
        }
    }

    let ts_refs: Vec<&dyn Array> = ts_parts.iter().map(|a| a.as_ref()).collect();
    let ts_concat =
        arrow_select::concat::concat(&ts_refs).map_err(|e| KukurError::Transient(e.into()))?;

    let value_refs: Vec<&dyn Array> = value_parts.iter().map(|a| a.as_ref()).collect();
    let value_concat =
        arrow_select::concat::concat(&value_refs).map_err(|e| KukurError::Transient(e.into()))?;

    let mut columns = vec![ts_concat, value_concat];
    let schema = standard_schema(target, with_quality);
    if with_quality {
        let quality_refs: Vec<&dyn Array> = quality_parts.iter().map(|a| a.as_ref()).collect();
        columns.push(
            arrow_select::concat::concat(&quality_refs).map_err(|e| KukurError::Transient(e.into()))?,
        );
    }

    RecordBatch::try_new(schema, columns).map_err(|e| KukurError::Transient(e.into()))
}

/// The standard empty two-column table returned when a data request spans
/// no time or every sub-interval came back empty.
pub fn empty_table() -> RecordBatch {
    let schema = standard_schema(ArrowDataType::Float64, false);
    RecordBatch::new_empty(schema)
}
