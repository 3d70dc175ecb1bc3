//! Dimension descriptors and the generic upsert-on-change routine.
//!
//! Wallets, categories, places and events share one shape: a natural
//! `key`, a handful of descriptive fields, and audit columns. Each is
//! described by a `Dimension` value; a single parametrised routine merges
//! the staged batch of any of them into its persistent table.
//!
//! RULES:
//!   - A row is written only when it is new or a mapped field changed.
//!   - Unchanged rows keep their `updated_by` / `updated_at`.
//!   - Dimension rows are never deleted.

use crate::{
    error::{EtlError, EtlResult},
    source::Batch,
    store::EtlStore,
    types::{timestamp_now, JobId},
};
use serde::Serialize;
use std::collections::HashSet;

/// Name of the natural-key field, in both the source batch and the table.
pub const KEY_FIELD: &str = "key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Wallet,
    Category,
    Place,
    Event,
}

impl DimensionKind {
    pub fn descriptor(self) -> &'static Dimension {
        match self {
            DimensionKind::Wallet => &WALLET,
            DimensionKind::Category => &CATEGORY,
            DimensionKind::Place => &PLACE,
            DimensionKind::Event => &EVENT,
        }
    }
}

/// Maps one source field onto one dimension column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: &'static str,
    pub column: &'static str,
    /// Required fields must be non-blank in every staged row.
    pub required: bool,
}

impl FieldMapping {
    /// Source field and column share a name.
    pub const fn identity(name: &'static str, required: bool) -> Self {
        Self {
            source: name,
            column: name,
            required,
        }
    }

    pub const fn renamed(source: &'static str, column: &'static str) -> Self {
        Self {
            source,
            column,
            required: false,
        }
    }
}

/// Everything the upserter needs to know about one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub kind: DimensionKind,
    /// Persistent table.
    pub table: &'static str,
    /// Connection-scoped staging table.
    pub staging_table: &'static str,
    /// Tracked fields, excluding the key.
    pub fields: &'static [FieldMapping],
}

impl Dimension {
    /// Staged source fields: the key plus every mapped field.
    pub fn source_columns(&self) -> Vec<&'static str> {
        std::iter::once(KEY_FIELD)
            .chain(self.fields.iter().map(|f| f.source))
            .collect()
    }

    /// Coerce a source batch into staged rows.
    ///
    /// The key and every required field must be declared and non-blank;
    /// optional fields may be missing from the batch entirely. Blank
    /// optional values stage as NULL. A key seen twice is an error.
    pub fn stage_rows(&self, batch: &Batch) -> EtlResult<Vec<StagedRow>> {
        let required: Vec<&str> = std::iter::once(KEY_FIELD)
            .chain(self.fields.iter().filter(|f| f.required).map(|f| f.source))
            .collect();
        batch.require_columns(&required)?;

        let staging_error = |row: usize, reason: String| EtlError::Staging {
            batch: batch.name.clone(),
            row,
            reason,
        };

        let mut seen = HashSet::new();
        let mut staged = Vec::with_capacity(batch.rows.len());
        for (idx, source) in batch.rows.iter().enumerate() {
            let row = idx + 1;
            let key = source
                .non_blank(KEY_FIELD)
                .ok_or_else(|| staging_error(row, "blank key".into()))?;
            if !seen.insert(key) {
                return Err(staging_error(row, format!("duplicate key {key:?}")));
            }

            let mut values = Vec::with_capacity(self.fields.len());
            for field in self.fields {
                let value = source.non_blank(field.source);
                if field.required && value.is_none() {
                    return Err(staging_error(
                        row,
                        format!("blank required field '{}' for key {key:?}", field.source),
                    ));
                }
                values.push(value.map(str::to_string));
            }

            staged.push(StagedRow {
                key: key.to_string(),
                values,
            });
        }
        Ok(staged)
    }

    /// Reject descriptors whose names cannot be safely spliced into SQL.
    pub fn validate(&self) -> EtlResult<()> {
        validate_identifier(self.table)?;
        validate_identifier(self.staging_table)?;
        for field in self.fields {
            validate_identifier(field.source)?;
            validate_identifier(field.column)?;
        }
        Ok(())
    }
}

/// One dimension row as staged: the key plus values in `fields` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    pub key: String,
    pub values: Vec<Option<String>>,
}

pub const WALLET: Dimension = Dimension {
    kind: DimensionKind::Wallet,
    table: "wallet",
    staging_table: "stage_wallet",
    fields: &[
        FieldMapping::identity("name", true),
        FieldMapping::renamed("group", "group_name"),
        FieldMapping::renamed("subgroup", "subgroup_name"),
        FieldMapping::identity("currency", false),
    ],
};

pub const CATEGORY: Dimension = Dimension {
    kind: DimensionKind::Category,
    table: "category",
    staging_table: "stage_category",
    fields: &[
        FieldMapping::identity("name", true),
        FieldMapping::renamed("group", "group_name"),
        FieldMapping::renamed("subgroup", "subgroup_name"),
    ],
};

pub const PLACE: Dimension = Dimension {
    kind: DimensionKind::Place,
    table: "place",
    staging_table: "stage_place",
    fields: &[
        FieldMapping::identity("name", true),
        FieldMapping::renamed("group", "group_name"),
        FieldMapping::renamed("subgroup", "subgroup_name"),
    ],
};

pub const EVENT: Dimension = Dimension {
    kind: DimensionKind::Event,
    table: "event",
    staging_table: "stage_event",
    fields: &[
        FieldMapping::identity("name", true),
        FieldMapping::renamed("group", "group_name"),
        FieldMapping::renamed("start", "start_date"),
        FieldMapping::renamed("end", "end_date"),
    ],
};

/// Upsert order. Fixed; transactions reference all four.
pub const ALL: [&Dimension; 4] = [&WALLET, &CATEGORY, &PLACE, &EVENT];

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn validate_identifier(name: &str) -> EtlResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(EtlError::InvalidIdentifier(name.to_string()))
    }
}

/// Merge the staged batch of `dim` into its table on behalf of `job_id`.
/// Returns the number of rows inserted or updated.
///
/// Must run inside the job's transaction (see `EtlStore::in_transaction`).
pub fn upsert(store: &EtlStore, dim: &Dimension, job_id: JobId) -> EtlResult<usize> {
    dim.validate()?;
    let affected = store.upsert_dimension(dim, job_id, &timestamp_now())?;
    log::debug!("Upserted {affected} row(s) into '{}'", dim.table);
    Ok(affected)
}
