//! Apache Arrow/Parquet export of generated examples
//!
//! Each split is written to its own Parquet file, whose columns follow the
//! dataset [`Features`]. Audio clips are stored as a struct of the encoded
//! clip bytes and the clip path, and the feature declaration is recorded in
//! the file metadata so that the sampling rate is not lost.

use crate::{
    join::Example,
    schema::{FeatureType, Features, Value},
    Result,
};
use anyhow::Context;
use arrow::{
    array::{ArrayRef, BinaryBuilder, Int64Builder, RecordBatch, StringBuilder, StructArray},
    datatypes::{DataType, Field, FieldRef, Fields, Schema, SchemaRef},
};
use parquet::{arrow::AsyncArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{collections::HashMap, num::NonZeroUsize, path::Path, sync::Arc};
use tokio::fs::File;

/// Parquet file that examples of one split are written to
pub struct ParquetSink {
    /// Schema of the output file
    schema: SchemaRef,

    /// Schema of the examples
    features: Features,

    /// Underlying Parquet writer
    writer: AsyncArrowWriter<File>,

    /// Examples that have not been written yet, one builder per column
    columns: Vec<ColumnBuilder>,

    /// Number of examples in `columns`
    buffered: usize,

    /// Number of examples that are buffered before being written out
    batch_size: NonZeroUsize,

    /// Number of examples that were written so far
    written: usize,
}
//
impl ParquetSink {
    /// Start writing a Parquet file
    pub async fn create(path: &Path, features: Features, batch_size: NonZeroUsize) -> Result<Self> {
        let schema = arrow_schema(&features)?;
        let file = File::create(path)
            .await
            .with_context(|| format!("creating output file {}", path.display()))?;
        let properties = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = AsyncArrowWriter::try_new(file, schema.clone(), Some(properties))
            .context("preparing to write down examples")?;
        let columns = features.iter().map(|f| ColumnBuilder::new(f.dtype)).collect();
        Ok(Self {
            schema,
            features,
            writer,
            columns,
            buffered: 0,
            batch_size,
            written: 0,
        })
    }

    /// Record an example, writing a batch out if enough are buffered
    pub async fn push(&mut self, example: &Example) -> Result<()> {
        let values = self.features.encode(example)?;
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.append(value);
        }
        self.buffered += 1;
        if self.buffered >= self.batch_size.get() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write out buffered examples
    async fn flush(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let columns = self.columns.iter_mut().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.schema.clone(), columns)
            .context("creating a batch of examples")?;
        self.writer
            .write(&batch)
            .await
            .context("writing a batch of examples")?;
        self.written += self.buffered;
        self.buffered = 0;
        Ok(())
    }

    /// Write out remaining examples and close the file
    ///
    /// Returns the number of examples that were written.
    pub async fn finish(mut self) -> Result<usize> {
        self.flush().await?;
        self.writer.close().await.context("closing output file")?;
        Ok(self.written)
    }
}

/// Arrow schema of the examples
fn arrow_schema(features: &Features) -> Result<SchemaRef> {
    let fields = features
        .iter()
        .map(|feature| match feature.dtype {
            FeatureType::String => Field::new(feature.name, DataType::Utf8, false),
            FeatureType::Int64 => Field::new(feature.name, DataType::Int64, true),
            FeatureType::Audio { .. } => {
                Field::new(feature.name, DataType::Struct(audio_fields()), false)
            }
        })
        .collect::<Vec<_>>();
    let features_json =
        serde_json::to_string(&features.to_json()).context("converting features to JSON")?;
    let metadata = HashMap::from([("huggingface".to_owned(), features_json)]);
    Ok(Arc::new(Schema::new(fields).with_metadata(metadata)))
}

/// Fields of the audio struct
fn audio_fields() -> Fields {
    Fields::from(vec![
        Field::new("bytes", DataType::Binary, true),
        Field::new("path", DataType::Utf8, true),
    ])
}

/// Accumulator for one column of a batch
enum ColumnBuilder {
    String(StringBuilder),
    Int64(Int64Builder),
    Audio {
        bytes: BinaryBuilder,
        paths: StringBuilder,
    },
}
//
impl ColumnBuilder {
    /// Set up an accumulator for some feature type
    fn new(dtype: FeatureType) -> Self {
        match dtype {
            FeatureType::String => Self::String(StringBuilder::new()),
            FeatureType::Int64 => Self::Int64(Int64Builder::new()),
            FeatureType::Audio { .. } => Self::Audio {
                bytes: BinaryBuilder::new(),
                paths: StringBuilder::new(),
            },
        }
    }

    /// Record a value
    ///
    /// # Panics
    ///
    /// If the value does not match the column's type, which would mean that
    /// the example was not encoded with the same features.
    fn append(&mut self, value: Value<'_>) {
        match (self, value) {
            (Self::String(builder), Value::String(s)) => builder.append_value(s),
            (Self::Int64(builder), Value::Int64(i)) => builder.append_option(i),
            (Self::Audio { bytes, paths }, Value::Audio(audio)) => {
                bytes.append_value(&audio.bytes);
                paths.append_value(&audio.path);
            }
            (_, value) => unreachable!("value {value:?} does not match its column type"),
        }
    }

    /// Extract recorded values, leaving the accumulator empty
    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::String(builder) => Arc::new(builder.finish()),
            Self::Int64(builder) => Arc::new(builder.finish()),
            Self::Audio { bytes, paths } => {
                let fields = audio_fields();
                let bytes = Arc::new(bytes.finish()) as ArrayRef;
                let paths = Arc::new(paths.finish()) as ArrayRef;
                let children: Vec<(FieldRef, ArrayRef)> =
                    fields.iter().cloned().zip([bytes, paths]).collect();
                Arc::new(StructArray::from(children))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{join::Audio, transcript::TranscriptRow};
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int64Type;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn example(idx: usize, up_votes: &str) -> Example {
        let path = format!("clips/{idx}.mp3");
        Example {
            row: [
                ("path", path.as_str()),
                ("sentence", "hello"),
                ("up_votes", up_votes),
            ]
            .into_iter()
            .collect::<TranscriptRow>(),
            audio: Audio {
                path: path.clone().into(),
                bytes: vec![idx as u8; 4],
            },
        }
    }

    #[tokio::test]
    async fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.parquet");
        let mut sink = ParquetSink::create(
            &path,
            Features::common_voice(),
            NonZeroUsize::new(2).unwrap(),
        )
        .await
        .unwrap();
        for (idx, up_votes) in ["1", "", "3"].into_iter().enumerate() {
            sink.push(&example(idx, up_votes)).await.unwrap();
        }
        assert_eq!(sink.finish().await.unwrap(), 3);

        let builder =
            ParquetRecordBatchReaderBuilder::try_new(std::fs::File::open(&path).unwrap()).unwrap();
        let features_json = &builder.schema().metadata()["huggingface"];
        assert!(features_json.contains("\"sampling_rate\":48000"));
        let reader = builder.build().unwrap();
        let batches = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(batches.iter().map(RecordBatch::num_rows).sum::<usize>(), 3);

        let first = &batches[0];
        let up_votes = first
            .column_by_name("up_votes")
            .unwrap()
            .as_primitive::<Int64Type>();
        assert_eq!(up_votes.value(0), 1);
        assert!(up_votes.is_null(1));
        let audio = first.column_by_name("audio").unwrap().as_struct();
        let paths = audio.column_by_name("path").unwrap().as_string::<i32>();
        assert_eq!(paths.value(1), "clips/1.mp3");
        let bytes = audio.column_by_name("bytes").unwrap().as_binary::<i32>();
        assert_eq!(bytes.value(1), [1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn bad_example_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ParquetSink::create(
            &dir.path().join("test.parquet"),
            Features::common_voice(),
            NonZeroUsize::new(10).unwrap(),
        )
        .await
        .unwrap();
        assert!(sink.push(&example(0, "lots")).await.is_err());
        assert_eq!(sink.finish().await.unwrap(), 0);
    }
}
