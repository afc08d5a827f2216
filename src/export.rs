use anyhow::{Context, Result};
use arrow::array::*;
use arrow::datatypes::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::info;

use crate::ranker::OutputRow;

// Macro for creating Arrow schema fields
macro_rules! field {
    ($name:expr, $data_type:expr) => {
        Field::new($name, $data_type, true)
    };
    ($name:expr, $data_type:expr, $nullable:expr) => {
        Field::new($name, $data_type, $nullable)
    };
}

// Macro for creating schemas with less boilerplate
macro_rules! schema {
    ($($name:expr => $data_type:expr $(, $nullable:expr)?);* $(;)?) => {
        Schema::new(vec![
            $(field!($name, $data_type $(, $nullable)?),)*
        ])
    };
}

// Macro for creating optional string arrays
macro_rules! string_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(StringArray::from_iter(
            $records.iter().map(|r| r.$field.as_deref()),
        ))
    };
}

// Macro for creating large string arrays (optional)
macro_rules! large_string_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(LargeStringArray::from_iter(
            $records.iter().map(|r| r.$field.as_deref()),
        ))
    };
}

// Macro for creating int32 arrays
macro_rules! int32_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(Int32Array::from_iter($records.iter().map(|r| r.$field)))
    };
}

// Macro for creating float arrays
macro_rules! float64_array_optional {
    ($records:expr, $field:ident) => {
        Arc::new(Float64Array::from_iter($records.iter().map(|r| r.$field)))
    };
}

// Macro for creating record batches with less boilerplate
macro_rules! record_batch {
    ($schema:expr, $($array:expr),* $(,)?) => {
        RecordBatch::try_new(Arc::new($schema), vec![$($array,)*])
    };
}

/// Column layout of the exported table.
pub fn output_schema() -> Schema {
    schema! {
        "title" => DataType::Utf8;
        "budget" => DataType::Float64;
        "year" => DataType::Int32;
        "revenue" => DataType::Float64;
        "rating" => DataType::Float64;
        "ratio" => DataType::Float64;
        "production_company" => DataType::Utf8;
        "wikipedia_link" => DataType::Utf8;
        "wikipedia_abstract" => DataType::LargeUtf8;
    }
}

pub fn rows_to_record_batch(rows: &[OutputRow]) -> Result<RecordBatch> {
    let batch = record_batch!(
        output_schema(),
        string_array_optional!(rows, title),
        float64_array_optional!(rows, budget),
        int32_array_optional!(rows, year),
        float64_array_optional!(rows, revenue),
        float64_array_optional!(rows, rating),
        float64_array_optional!(rows, ratio),
        string_array_optional!(rows, production_company),
        string_array_optional!(rows, wikipedia_link),
        large_string_array_optional!(rows, wikipedia_abstract),
    )?;

    Ok(batch)
}

fn create_parquet_writer(file: File, schema: Schema) -> Result<ArrowWriter<File>> {
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let writer = ArrowWriter::try_new(file, Arc::new(schema), Some(props))?;
    Ok(writer)
}

/// A fully written Parquet file that has not yet replaced its target.
/// Dropping it without `persist` removes the scratch file and leaves the target as it was.
pub struct StagedParquet {
    file: NamedTempFile,
    target: PathBuf,
    rows: usize,
}

impl StagedParquet {
    pub fn persist(self) -> Result<()> {
        self.file
            .persist(&self.target)
            .with_context(|| format!("replacing {}", self.target.display()))?;
        info!("Wrote {} rows to {}", self.rows, self.target.display());
        Ok(())
    }
}

/// Writes the output rows as a single-row-group Parquet file next to `output_path`,
/// without touching it. `persist` then replaces any existing file.
pub fn stage_parquet(output_path: &Path, rows: &[OutputRow]) -> Result<StagedParquet> {
    let dir = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating scratch file in {}", dir.display()))?;

    let mut writer = create_parquet_writer(file.as_file().try_clone()?, output_schema())?;
    if !rows.is_empty() {
        writer.write(&rows_to_record_batch(rows)?)?;
    }
    writer.close()?;

    Ok(StagedParquet {
        file,
        target: output_path.to_path_buf(),
        rows: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn write_parquet(path: &Path, rows: &[OutputRow]) {
        stage_parquet(path, rows).unwrap().persist().unwrap();
    }

    fn row(title: &str, ratio: f64) -> OutputRow {
        OutputRow {
            title: Some(title.to_string()),
            budget: Some(ratio * 1000.0),
            year: Some(1999),
            revenue: Some(1000.0),
            rating: None,
            ratio: Some(ratio),
            production_company: None,
            wikipedia_link: Some(format!("https://en.wikipedia.org/wiki/{}", title)),
            wikipedia_abstract: None,
        }
    }

    #[test]
    fn record_batch_matches_table_schema() {
        let batch = rows_to_record_batch(&[row("Heat", 2.0), row("Casino", 1.5)]).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let names: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "title",
                "budget",
                "year",
                "revenue",
                "rating",
                "ratio",
                "production_company",
                "wikipedia_link",
                "wikipedia_abstract"
            ]
        );

        let ratio = batch
            .column(5)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(ratio.value(1), 1.5);
        assert!(batch.column(4).is_null(0));
    }

    #[test]
    fn parquet_file_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratios.parquet");
        write_parquet(&path, &[row("Heat", 2.0), row("Casino", 1.5), row("Ronin", 1.2)]);

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 3);
    }

    fn row_count(path: &Path) -> usize {
        ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum()
    }

    #[test]
    fn unpersisted_output_leaves_existing_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratios.parquet");
        write_parquet(&path, &[row("Heat", 2.0)]);

        let staged = stage_parquet(&path, &[row("Heat", 2.0), row("Casino", 1.5)]).unwrap();
        assert_eq!(row_count(&path), 1);
        drop(staged);

        assert_eq!(row_count(&path), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn persisted_output_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratios.parquet");
        write_parquet(&path, &[row("Heat", 2.0)]);

        stage_parquet(&path, &[row("Heat", 2.0), row("Casino", 1.5)])
            .unwrap()
            .persist()
            .unwrap();
        assert_eq!(row_count(&path), 2);
    }

    #[test]
    fn empty_output_still_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        write_parquet(&path, &[]);
        assert!(path.exists());
    }
}
