//! Source batches: the raw tabular input of a run.
//!
//! A source hands the engine one batch per dimension plus one batch of
//! transactions. Each row is a flat mapping of field name to text.
//! Where the rows come from (CSV export, inline literals) is the
//! source's business; the engine only sees `SourceBatches`.

use crate::{
    config::{EtlConfig, SourceFiles},
    dimension::DimensionKind,
    error::{EtlError, EtlResult},
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

/// One incoming record: field name → raw text value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow(BTreeMap<String, String>);

impl SourceRow {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// The field value, or `None` if the field is absent or blank.
    pub fn non_blank(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|v| !v.trim().is_empty())
    }

}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SourceRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A named batch of rows plus the columns it was declared with.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl Batch {
    /// Build a batch from literal rows. Columns are the union of the
    /// fields seen across all rows.
    pub fn from_rows(name: impl Into<String>, rows: Vec<SourceRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for field in row.0.keys() {
                if !columns.contains(field) {
                    columns.push(field.clone());
                }
            }
        }
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fail with `MissingColumn` unless every listed column is declared.
    /// An empty literal batch with no declared columns passes: there is
    /// nothing to stage. CSV batches always declare a header.
    pub fn require_columns(&self, columns: &[&str]) -> EtlResult<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            return Ok(());
        }
        for column in columns {
            if !self.has_column(column) {
                return Err(EtlError::MissingColumn {
                    batch: self.name.clone(),
                    column: (*column).to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Everything a run ingests.
#[derive(Debug, Clone, Default)]
pub struct SourceBatches {
    pub wallets: Batch,
    pub categories: Batch,
    pub places: Batch,
    pub events: Batch,
    pub transactions: Batch,
}

impl SourceBatches {
    pub fn dimension(&self, kind: DimensionKind) -> &Batch {
        match kind {
            DimensionKind::Wallet => &self.wallets,
            DimensionKind::Category => &self.categories,
            DimensionKind::Place => &self.places,
            DimensionKind::Event => &self.events,
        }
    }
}

/// Anything that can produce the input batches of a run.
pub trait BatchSource {
    fn load(&self) -> EtlResult<SourceBatches>;
}

/// Inline literal sets are their own source.
impl BatchSource for SourceBatches {
    fn load(&self) -> EtlResult<SourceBatches> {
        Ok(self.clone())
    }
}

/// A directory of CSV exports, one file per batch.
#[derive(Debug, Clone)]
pub struct CsvDirectory {
    dir: PathBuf,
    files: SourceFiles,
    delimiter: u8,
}

impl CsvDirectory {
    pub fn new(dir: impl Into<PathBuf>, files: SourceFiles, delimiter: u8) -> Self {
        Self {
            dir: dir.into(),
            files,
            delimiter,
        }
    }

    pub fn from_config(config: &EtlConfig) -> EtlResult<Self> {
        Ok(Self::new(
            &config.source_dir,
            config.files.clone(),
            config.delimiter_byte()?,
        ))
    }

    fn read_file(&self, name: &str, file: &str) -> EtlResult<Batch> {
        let path = self.dir.join(file);
        log::debug!("Reading batch '{name}' from {}", path.display());
        let reader = std::fs::File::open(&path).map_err(|e| EtlError::Staging {
            batch: name.to_string(),
            row: 0,
            reason: format!("cannot open {}: {e}", path.display()),
        })?;
        read_batch(name, reader, self.delimiter)
    }
}

impl BatchSource for CsvDirectory {
    fn load(&self) -> EtlResult<SourceBatches> {
        Ok(SourceBatches {
            wallets: self.read_file("wallets", &self.files.wallets)?,
            categories: self.read_file("categories", &self.files.categories)?,
            places: self.read_file("places", &self.files.places)?,
            events: self.read_file("events", &self.files.events)?,
            transactions: self.read_file("transactions", &self.files.transactions)?,
        })
    }
}

/// Read one CSV batch. Header names are trimmed; values are kept verbatim.
///
/// A file without a header row is a staging error, never an empty batch:
/// an empty transactions batch prunes the whole month.
pub fn read_batch<R: Read>(name: &str, reader: R, delimiter: u8) -> EtlResult<Batch> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.iter().all(String::is_empty) {
        return Err(EtlError::Staging {
            batch: name.to_string(),
            row: 0,
            reason: "no header row".into(),
        });
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| EtlError::Staging {
            batch: name.to_string(),
            row: idx + 1,
            reason: e.to_string(),
        })?;
        let row: SourceRow = columns
            .iter()
            .zip(record.iter())
            .map(|(column, value)| (column.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(Batch {
        name: name.to_string(),
        columns,
        rows,
    })
}
