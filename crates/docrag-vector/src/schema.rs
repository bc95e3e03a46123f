//! Arrow layout of the local vector table.
//!
//! One row per chunk: `position` is the chunk's offset in `chunks.json`,
//! `vector` its unit-length embedding. The dimension is fixed by the first
//! batch ever written.
use anyhow::{ensure, Result};
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const TABLE_NAME: &str = "vectors";
pub const POSITION_COLUMN: &str = "position";
pub const VECTOR_COLUMN: &str = "vector";

pub fn build_index_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(POSITION_COLUMN, DataType::UInt32, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            true,
        ),
    ]))
}

/// Rows for `vectors`, numbered from `first_position`.
pub fn vectors_to_record_batch(first_position: u32, vectors: &[Vec<f32>]) -> Result<RecordBatch> {
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    ensure!(dim > 0, "cannot index empty vectors");
    ensure!(
        vectors.iter().all(|v| v.len() == dim),
        "embedding batch mixes dimensions"
    );
    let dim = i32::try_from(dim)?;

    let positions: Vec<u32> = (first_position..).take(vectors.len()).collect();
    let values = vectors
        .iter()
        .map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
    let batch = RecordBatch::try_new(
        build_index_schema(dim),
        vec![
            Arc::new(UInt32Array::from(positions)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(values, dim)),
        ],
    )?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Array;

    #[test]
    fn positions_continue_from_offset() {
        let batch = vectors_to_record_batch(7, &[vec![1.0, 0.0], vec![0.0, 1.0]]).expect("batch");
        assert_eq!(batch.num_rows(), 2);
        let positions = batch
            .column_by_name(POSITION_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
            .expect("positions");
        assert_eq!(positions.values().to_vec(), vec![7, 8]);
        let vectors = batch.column_by_name(VECTOR_COLUMN).expect("vectors");
        assert_eq!(vectors.data_type(), &DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), 2));
    }

    #[test]
    fn ragged_batch_is_rejected() {
        assert!(vectors_to_record_batch(0, &[vec![1.0, 0.0], vec![1.0]]).is_err());
        assert!(vectors_to_record_batch(0, &[]).is_err());
    }
}
