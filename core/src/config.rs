use crate::error::{EtlError, EtlResult};
use serde::{Deserialize, Serialize};

/// File names of the CSV exports inside `source_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub wallets: String,
    pub categories: String,
    pub places: String,
    pub events: String,
    pub transactions: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            wallets: "wallets.csv".into(),
            categories: "categories.csv".into(),
            places: "places.csv".into(),
            events: "events.csv".into(),
            transactions: "transactions.csv".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// SQLite database file.
    pub database: String,
    /// Directory holding the CSV exports.
    pub source_dir: String,
    /// Single-character CSV field delimiter.
    pub delimiter: String,
    pub files: SourceFiles,
    /// Extra `*.sql` migrations applied after the embedded ones.
    pub migrations_dir: Option<String>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: "data/db.db".into(),
            source_dir: "data/export".into(),
            delimiter: ",".into(),
            files: SourceFiles::default(),
            migrations_dir: None,
        }
    }
}

impl EtlConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EtlConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.delimiter_byte()?;
        Ok(config)
    }

    pub fn delimiter_byte(&self) -> EtlResult<u8> {
        match self.delimiter.as_bytes() {
            [b] => Ok(*b),
            _ => Err(EtlError::Other(anyhow::anyhow!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            ))),
        }
    }
}
