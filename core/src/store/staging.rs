//! Staging area.
//!
//! Staging tables are TEMP tables: they live on this connection only and
//! are rebuilt from scratch every time a batch is loaded.

use super::EtlStore;
use crate::{
    dimension::{Dimension, StagedRow},
    error::EtlResult,
    transaction::RawTransaction,
};
use rusqlite::{params, params_from_iter};

const TRANSACTION_STAGING_TABLE: &str = "stage_transaction";

impl EtlStore {
    /// Replace the staging table of `dim` with `rows`.
    /// Returns the number of rows staged.
    pub fn stage_dimension(&self, dim: &Dimension, rows: &[StagedRow]) -> EtlResult<usize> {
        dim.validate()?;
        let columns = dim.source_columns();

        let ddl_columns = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i == 0 {
                    format!("\"{c}\" TEXT PRIMARY KEY NOT NULL")
                } else {
                    format!("\"{c}\" TEXT")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let table = dim.staging_table;
        self.in_transaction(|store| {
            store.conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS temp.\"{table}\";
                 CREATE TEMP TABLE \"{table}\" ({ddl_columns});"
            ))?;
            let mut stmt = store.conn.prepare(&format!(
                "INSERT INTO temp.\"{table}\" ({column_list}) VALUES ({placeholders})"
            ))?;
            for row in rows {
                let values = std::iter::once(Some(row.key.as_str()))
                    .chain(row.values.iter().map(|v| v.as_deref()));
                stmt.execute(params_from_iter(values))?;
            }
            Ok(())
        })?;

        log::debug!("Staged {} row(s) into '{table}'", rows.len());
        Ok(rows.len())
    }

    /// Replace the raw transaction staging table with `rows`.
    pub fn stage_transactions(&self, rows: &[RawTransaction]) -> EtlResult<usize> {
        self.in_transaction(|store| {
            store.conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS temp.{TRANSACTION_STAGING_TABLE};
                 CREATE TEMP TABLE {TRANSACTION_STAGING_TABLE} (
                     seq          INTEGER PRIMARY KEY,
                     day          TEXT    NOT NULL,
                     value        INTEGER,
                     description  TEXT    NOT NULL,
                     wallet       TEXT    NOT NULL,
                     category     TEXT    NOT NULL,
                     place        TEXT    NOT NULL,
                     event        TEXT
                 );"
            ))?;
            let mut stmt = store.conn.prepare(&format!(
                "INSERT INTO temp.{TRANSACTION_STAGING_TABLE}
                 (day, value, description, wallet, category, place, event)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))?;
            for raw in rows {
                stmt.execute(params![
                    raw.day,
                    raw.value,
                    raw.description,
                    raw.wallet,
                    raw.category,
                    raw.place,
                    raw.event,
                ])?;
            }
            Ok(())
        })?;

        log::debug!("Staged {} raw transaction(s)", rows.len());
        Ok(rows.len())
    }

    /// Raw transactions staged for this run, in input order.
    /// Empty if nothing was staged on this connection yet.
    pub fn staged_transactions(&self) -> EtlResult<Vec<RawTransaction>> {
        let staged: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM temp.sqlite_master WHERE type = 'table' AND name = ?1)",
            params![TRANSACTION_STAGING_TABLE],
            |row| row.get(0),
        )?;
        if !staged {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT day, value, description, wallet, category, place, event
             FROM temp.{TRANSACTION_STAGING_TABLE} ORDER BY seq ASC"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawTransaction {
                    day: row.get(0)?,
                    value: row.get(1)?,
                    description: row.get(2)?,
                    wallet: row.get(3)?,
                    category: row.get(4)?,
                    place: row.get(5)?,
                    event: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
