//! Transaction records at each stage of the pipeline.

use crate::{
    error::{EtlError, EtlResult},
    source::{Batch, SourceRow},
    types::{JobId, RowId},
};
use chrono::NaiveDate;
use serde::Serialize;

/// Columns a transactions batch must declare.
pub const REQUIRED_COLUMNS: [&str; 5] = ["day", "value", "wallet", "category", "place"];

/// One incoming transaction, exactly as exported apart from `value`
/// being coerced to an integer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTransaction {
    /// Two-digit day of month.
    pub day: String,
    /// Minor units. `None` when the export left it blank.
    pub value: Option<i64>,
    pub description: String,
    pub wallet: String,
    pub category: String,
    pub place: String,
    /// `None` when the event column is absent or blank.
    pub event: Option<String>,
}

impl RawTransaction {
    /// Coerce one source row. `row` is 1-based, for error messages.
    pub fn from_source(batch: &str, row: usize, source: &SourceRow) -> EtlResult<Self> {
        let value = match source.non_blank("value") {
            None => None,
            Some(text) => Some(text.trim().parse::<i64>().map_err(|_| EtlError::Staging {
                batch: batch.to_string(),
                row,
                reason: format!("value {text:?} is not an integer amount"),
            })?),
        };

        let text = |field: &str| source.get(field).unwrap_or_default().to_string();

        Ok(Self {
            day: text("day"),
            value,
            description: text("description"),
            wallet: text("wallet"),
            category: text("category"),
            place: text("place"),
            event: source.non_blank("event").map(str::to_string),
        })
    }

    /// Coerce a whole transactions batch.
    pub fn from_batch(batch: &Batch) -> EtlResult<Vec<Self>> {
        batch.require_columns(&REQUIRED_COLUMNS)?;
        batch
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| Self::from_source(&batch.name, idx + 1, row))
            .collect()
    }
}

/// A transaction resolved against the dimension tables.
///
/// Equality is the full tuple; two transactions are the same fact iff
/// every field matches, with `event_id: None` matching only `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CleanedTransaction {
    pub day: NaiveDate,
    pub value: i64,
    pub description: String,
    pub wallet_id: RowId,
    pub category_id: RowId,
    pub place_id: RowId,
    pub event_id: Option<RowId>,
}

/// A row of the `transactions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedTransaction {
    pub id: RowId,
    pub fact: CleanedTransaction,
    pub created_at: String,
    pub created_by: JobId,
}
