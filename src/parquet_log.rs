//! Parquet storage for detection records.
//!
//! Schema: `frame:int64, timestamp:float64?, track_id:int64?, class_id:int64,
//! confidence:float32, x1:float32, y1:float32, x2:float32, y2:float32`.
//! Readers cast numeric columns, so logs written by other tools (for example
//! float-typed `track_id` columns) load as well.

/// File extension of detection logs.
pub const LOG_EXTENSION: &str = "parquet";

#[cfg(feature = "parquet-log")]
pub use imp::{read_records, write_records};

#[cfg(not(feature = "parquet-log"))]
pub use disabled::{read_records, write_records};

#[cfg(not(feature = "parquet-log"))]
mod disabled {
    use std::path::Path;

    use anyhow::{anyhow, Result};

    use crate::records::DetectionRecord;

    pub fn write_records(path: &Path, _records: &[DetectionRecord]) -> Result<()> {
        Err(anyhow!(
            "cannot write {}: detection logging requires the parquet-log feature",
            path.display()
        ))
    }

    pub fn read_records(path: &Path) -> Result<Vec<DetectionRecord>> {
        Err(anyhow!(
            "cannot read {}: detection logs require the parquet-log feature",
            path.display()
        ))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn errors_name_the_missing_feature() {
            let path = Path::new("out/detections.parquet");
            let err = write_records(path, &[]).unwrap_err();
            assert!(err.to_string().contains("parquet-log"));
            let err = read_records(path).unwrap_err();
            assert!(err.to_string().contains("parquet-log"));
        }
    }
}

#[cfg(feature = "parquet-log")]
mod imp {
    use std::fs::File;
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};
    use arrow::array::{Array, ArrayRef, Float32Array, Float64Array, Int64Array};
    use arrow::compute::cast;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use parquet::arrow::ArrowWriter;
    use parquet::basic::Compression;
    use parquet::file::properties::WriterProperties;

    use crate::records::DetectionRecord;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("frame", DataType::Int64, false),
            Field::new("timestamp", DataType::Float64, true),
            Field::new("track_id", DataType::Int64, true),
            Field::new("class_id", DataType::Int64, false),
            Field::new("confidence", DataType::Float32, false),
            Field::new("x1", DataType::Float32, false),
            Field::new("y1", DataType::Float32, false),
            Field::new("x2", DataType::Float32, false),
            Field::new("y2", DataType::Float32, false),
        ])
    }

    /// Write all records as one Parquet file, replacing any existing file.
    pub fn write_records(path: &Path, records: &[DetectionRecord]) -> Result<()> {
        let f32_column = |get: fn(&DetectionRecord) -> f32| -> ArrayRef {
            Arc::new(Float32Array::from(records.iter().map(get).collect::<Vec<_>>()))
        };
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(
                records.iter().map(|r| r.frame as i64).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                records.iter().map(|r| r.timestamp).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                records
                    .iter()
                    .map(|r| r.track_id.map(|id| id as i64))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from(
                records.iter().map(|r| r.class_id as i64).collect::<Vec<_>>(),
            )),
            f32_column(|r| r.confidence),
            f32_column(|r| r.x1),
            f32_column(|r| r.y1),
            f32_column(|r| r.x2),
            f32_column(|r| r.y2),
        ];
        let batch = RecordBatch::try_new(Arc::new(schema()), columns)
            .context("build detection record batch")?;

        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .context("open parquet writer")?;
        writer.write(&batch).context("write detection rows")?;
        writer.close().context("finalize parquet file")?;
        Ok(())
    }

    /// Load every record of a detection log, in file order.
    pub fn read_records(path: &Path) -> Result<Vec<DetectionRecord>> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("{} is not a parquet file", path.display()))?
            .build()
            .context("build parquet reader")?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch.context("read parquet batch")?;
            append_batch(&batch, &mut records)?;
        }
        Ok(records)
    }

    fn append_batch(batch: &RecordBatch, out: &mut Vec<DetectionRecord>) -> Result<()> {
        let frame = int_column(batch, "frame")?;
        let class_id = int_column(batch, "class_id")?;
        let track_id = optional_column(batch, "track_id", DataType::Int64)?
            .map(|array| downcast::<Int64Array>(&array, "track_id"))
            .transpose()?;
        let timestamp = optional_column(batch, "timestamp", DataType::Float64)?
            .map(|array| downcast::<Float64Array>(&array, "timestamp"))
            .transpose()?;
        let confidence = float_column(batch, "confidence")?;
        let x1 = float_column(batch, "x1")?;
        let y1 = float_column(batch, "y1")?;
        let x2 = float_column(batch, "x2")?;
        let y2 = float_column(batch, "y2")?;

        for row in 0..batch.num_rows() {
            if frame.is_null(row) || class_id.is_null(row) {
                return Err(anyhow!("row {} has no frame or class_id", row));
            }
            let frame_idx = u64::try_from(frame.value(row))
                .map_err(|_| anyhow!("row {} has a negative frame index", row))?;
            let class = u32::try_from(class_id.value(row))
                .map_err(|_| anyhow!("row {} has an out-of-range class_id", row))?;
            let track = match &track_id {
                Some(ids) if !ids.is_null(row) => Some(
                    u64::try_from(ids.value(row))
                        .map_err(|_| anyhow!("row {} has a negative track_id", row))?,
                ),
                _ => None,
            };
            let ts = match &timestamp {
                Some(ts) if !ts.is_null(row) => Some(ts.value(row)),
                _ => None,
            };
            out.push(DetectionRecord {
                frame: frame_idx,
                timestamp: ts,
                track_id: track,
                class_id: class,
                confidence: value_or_nan(&confidence, row),
                x1: value_or_nan(&x1, row),
                y1: value_or_nan(&y1, row),
                x2: value_or_nan(&x2, row),
                y2: value_or_nan(&y2, row),
            });
        }
        Ok(())
    }

    fn optional_column(batch: &RecordBatch, name: &str, to: DataType) -> Result<Option<ArrayRef>> {
        match batch.column_by_name(name) {
            Some(column) => Ok(Some(
                cast(column, &to).with_context(|| format!("column '{}' has an unusable type", name))?,
            )),
            None => Ok(None),
        }
    }

    fn required_column(batch: &RecordBatch, name: &str, to: DataType) -> Result<ArrayRef> {
        optional_column(batch, name, to)?
            .ok_or_else(|| anyhow!("detection log is missing column '{}'", name))
    }

    fn int_column(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
        let array = required_column(batch, name, DataType::Int64)?;
        downcast::<Int64Array>(&array, name)
    }

    fn float_column(batch: &RecordBatch, name: &str) -> Result<Float32Array> {
        let array = required_column(batch, name, DataType::Float32)?;
        downcast::<Float32Array>(&array, name)
    }

    fn downcast<T: Array + Clone + 'static>(array: &ArrayRef, name: &str) -> Result<T> {
        array
            .as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| anyhow!("column '{}' could not be decoded", name))
    }

    fn value_or_nan(array: &Float32Array, row: usize) -> f32 {
        if array.is_null(row) {
            f32::NAN
        } else {
            array.value(row)
        }
    }
}
