//! Parquet Dataset Loading
//!
//! Decodes the replay dataset into row-major form: selected feature
//! values cast to f64, optional sensor and timestamp columns resolved
//! per row.

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::compute;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use thiserror::Error;
use tracing::info;

/// Errors from dataset decode and column selection
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Parquet decode failed: {0}")]
    Parquet(String),

    #[error("Missing feature columns in source file: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Found only {got} numeric columns but {requested} were requested")]
    NotEnoughNumeric { got: usize, requested: usize },

    #[error("No numeric columns found; set FEATURE_KEYS or FEATURE_COUNT")]
    NoNumericColumns,
}

/// Choose the columns published as features.
///
/// Priority: explicit keys (every name must exist in the schema), else
/// the first `feature_count` numeric columns, else every numeric column.
pub fn select_feature_columns(
    schema: &Schema,
    explicit: Option<&[String]>,
    feature_count: usize,
) -> Result<Vec<String>, DatasetError> {
    if let Some(keys) = explicit {
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| schema.column_with_name(key).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DatasetError::MissingColumns(missing));
        }
        return Ok(keys.to_vec());
    }

    let numeric: Vec<String> = schema
        .fields()
        .iter()
        .filter(|field| field.data_type().is_numeric())
        .map(|field| field.name().clone())
        .collect();

    if feature_count > 0 {
        if numeric.len() < feature_count {
            return Err(DatasetError::NotEnoughNumeric {
                got: numeric.len(),
                requested: feature_count,
            });
        }
        return Ok(numeric[..feature_count].to_vec());
    }
    if numeric.is_empty() {
        return Err(DatasetError::NoNumericColumns);
    }
    Ok(numeric)
}

/// One dataset row in replay form.
#[derive(Debug, Clone)]
pub struct ReplayRow {
    /// Sensor column value, when configured and non-null.
    pub sensor_id: Option<String>,
    /// Raw timestamp column value, when configured and castable.
    pub raw_timestamp: Option<f64>,
    /// Selected feature values in column order; 0.0 where the cell is
    /// null or not castable.
    pub features: Vec<f64>,
}

/// Replay dataset materialized from Parquet bytes.
pub struct ReplayDataset {
    feature_columns: Vec<String>,
    rows: Vec<ReplayRow>,
}

impl ReplayDataset {
    /// Decode Parquet bytes and materialize replay rows.
    pub fn from_bytes(
        bytes: Vec<u8>,
        feature_keys: Option<&[String]>,
        feature_count: usize,
        sensor_column: Option<&str>,
        timestamp_column: Option<&str>,
    ) -> Result<Self, DatasetError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
            .map_err(|e| DatasetError::Parquet(format!("reader init failed: {e}")))?;
        let schema = builder.schema().clone();
        let feature_columns = select_feature_columns(&schema, feature_keys, feature_count)?;
        let reader = builder
            .build()
            .map_err(|e| DatasetError::Parquet(format!("reader build failed: {e}")))?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch =
                batch.map_err(|e| DatasetError::Parquet(format!("read batch failed: {e}")))?;
            append_rows(
                &mut rows,
                &batch,
                &feature_columns,
                sensor_column,
                timestamp_column,
            );
        }

        info!(
            rows = rows.len(),
            columns = ?feature_columns,
            "dataset loaded"
        );
        Ok(Self {
            feature_columns,
            rows,
        })
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn rows(&self) -> &[ReplayRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
impl ReplayDataset {
    pub(crate) fn from_rows(feature_columns: Vec<String>, rows: Vec<ReplayRow>) -> Self {
        Self {
            feature_columns,
            rows,
        }
    }
}

fn append_rows(
    rows: &mut Vec<ReplayRow>,
    batch: &RecordBatch,
    feature_columns: &[String],
    sensor_column: Option<&str>,
    timestamp_column: Option<&str>,
) {
    let feature_values: Vec<Vec<f64>> = feature_columns
        .iter()
        .map(|name| {
            column_as_f64(batch, name)
                .unwrap_or_else(|| vec![None; batch.num_rows()])
                .into_iter()
                .map(|value| value.filter(|v| v.is_finite()).unwrap_or(0.0))
                .collect()
        })
        .collect();
    let sensor_values = sensor_column.and_then(|name| column_as_string(batch, name));
    let timestamp_values = timestamp_column.and_then(|name| column_as_f64(batch, name));

    for index in 0..batch.num_rows() {
        rows.push(ReplayRow {
            sensor_id: sensor_values.as_ref().and_then(|values| values[index].clone()),
            raw_timestamp: timestamp_values
                .as_ref()
                .and_then(|values| values[index])
                .filter(|v| v.is_finite()),
            features: feature_values.iter().map(|column| column[index]).collect(),
        });
    }
}

/// Cast a column to f64 values; `None` cells where the cast nulls out.
/// Falls back through Int64 for types without a direct Float64 cast.
fn column_as_f64(batch: &RecordBatch, name: &str) -> Option<Vec<Option<f64>>> {
    let index = batch.schema().index_of(name).ok()?;
    let column = batch.column(index);

    if let Ok(cast) = compute::cast(column, &DataType::Float64) {
        let values = cast.as_any().downcast_ref::<Float64Array>()?;
        return Some(
            (0..values.len())
                .map(|i| values.is_valid(i).then(|| values.value(i)))
                .collect(),
        );
    }

    let cast = compute::cast(column, &DataType::Int64).ok()?;
    let values = cast.as_any().downcast_ref::<Int64Array>()?;
    Some(
        (0..values.len())
            .map(|i| values.is_valid(i).then(|| values.value(i) as f64))
            .collect(),
    )
}

fn column_as_string(batch: &RecordBatch, name: &str) -> Option<Vec<Option<String>>> {
    let index = batch.schema().index_of(name).ok()?;
    let cast = compute::cast(batch.column(index), &DataType::Utf8).ok()?;
    let values = cast.as_any().downcast_ref::<StringArray>()?;
    Some(
        (0..values.len())
            .map(|i| values.is_valid(i).then(|| values.value(i).to_string()))
            .collect(),
    )
}
