use super::EtlStore;
use crate::{
    error::EtlResult,
    transaction::{CleanedTransaction, PersistedTransaction},
    types::{JobId, Month, RowId, DATE_FORMAT},
};
use chrono::NaiveDate;
use rusqlite::params;

impl EtlStore {
    /// Persisted transactions whose day falls in `month`, ordered by id.
    pub fn transactions_in(&self, month: Month) -> EtlResult<Vec<PersistedTransaction>> {
        let first = month.first_day().format(DATE_FORMAT).to_string();
        let last = month.last_day().format(DATE_FORMAT).to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, day, value, description, wallet_id, category_id, place_id, event_id,
                    created_at, created_by
             FROM transactions
             WHERE day >= ?1 AND day <= ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![first, last], Self::map_transaction_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_transaction(
        &self,
        txn: &CleanedTransaction,
        created_by: JobId,
        created_at: &str,
    ) -> EtlResult<RowId> {
        self.insert_returning_id(
            "INSERT INTO transactions
             (day, value, description, wallet_id, category_id, place_id, event_id,
              created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                txn.day.format(DATE_FORMAT).to_string(),
                txn.value,
                txn.description,
                txn.wallet_id,
                txn.category_id,
                txn.place_id,
                txn.event_id,
                created_at,
                created_by,
            ],
        )
    }

    pub fn delete_transaction(&self, id: RowId) -> EtlResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])?)
    }

    pub fn transaction_count(&self) -> EtlResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn map_transaction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedTransaction> {
        let day: String = row.get(1)?;
        let day = NaiveDate::parse_from_str(&day, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(PersistedTransaction {
            id: row.get(0)?,
            fact: CleanedTransaction {
                day,
                value: row.get(2)?,
                description: row.get(3)?,
                wallet_id: row.get(4)?,
                category_id: row.get(5)?,
                place_id: row.get(6)?,
                event_id: row.get(7)?,
            },
            created_at: row.get(8)?,
            created_by: row.get(9)?,
        })
    }
}
