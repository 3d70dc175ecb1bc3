use super::EtlStore;
use crate::{
    dimension::{Dimension, DimensionKind, ALL, KEY_FIELD},
    error::EtlResult,
    types::{JobId, RowId},
};
use rusqlite::params;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Natural key → surrogate id, for every dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionIndex {
    pub wallets: HashMap<String, RowId>,
    pub categories: HashMap<String, RowId>,
    pub places: HashMap<String, RowId>,
    pub events: HashMap<String, RowId>,
}

impl DimensionIndex {
    pub fn keys(&self, kind: DimensionKind) -> &HashMap<String, RowId> {
        match kind {
            DimensionKind::Wallet => &self.wallets,
            DimensionKind::Category => &self.categories,
            DimensionKind::Place => &self.places,
            DimensionKind::Event => &self.events,
        }
    }

    fn keys_mut(&mut self, kind: DimensionKind) -> &mut HashMap<String, RowId> {
        match kind {
            DimensionKind::Wallet => &mut self.wallets,
            DimensionKind::Category => &mut self.categories,
            DimensionKind::Place => &mut self.places,
            DimensionKind::Event => &mut self.events,
        }
    }

    pub fn resolve(&self, kind: DimensionKind, key: &str) -> Option<RowId> {
        self.keys(kind).get(key).copied()
    }

    pub fn insert(&mut self, kind: DimensionKind, key: impl Into<String>, id: RowId) {
        self.keys_mut(kind).insert(key.into(), id);
    }
}

/// A persisted dimension row. `values` is keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionRow {
    pub id: RowId,
    pub key: String,
    pub values: BTreeMap<String, Option<String>>,
    pub updated_by: JobId,
    pub updated_at: String,
}

impl DimensionRow {
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }
}

/// Builds the single statement that merges a staging table into its
/// dimension table. Only rows that are new, or differ in at least one
/// mapped column, survive the WHERE clause; `IS NOT` keeps the comparison
/// NULL-aware and the default BINARY collation keeps it case-sensitive.
fn upsert_sql(dim: &Dimension) -> String {
    let q = |name: &str| format!("\"{name}\"");

    let insert_columns = std::iter::once(q(KEY_FIELD))
        .chain(dim.fields.iter().map(|f| q(f.column)))
        .chain([q("updated_by"), q("updated_at")])
        .collect::<Vec<_>>()
        .join(", ");
    let select_columns = std::iter::once(format!("s.{}", q(KEY_FIELD)))
        .chain(dim.fields.iter().map(|f| format!("s.{}", q(f.source))))
        .chain(["?1".to_string(), "?2".to_string()])
        .collect::<Vec<_>>()
        .join(", ");
    let changed = std::iter::once("d.\"id\" IS NULL".to_string())
        .chain(
            dim.fields
                .iter()
                .map(|f| format!("d.{} IS NOT s.{}", q(f.column), q(f.source))),
        )
        .collect::<Vec<_>>()
        .join(" OR ");
    let assignments = dim
        .fields
        .iter()
        .map(|f| f.column)
        .chain(["updated_by", "updated_at"])
        .map(|c| format!("{0} = excluded.{0}", q(c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} ({insert_columns})
         SELECT {select_columns}
         FROM temp.{staging} AS s
         LEFT JOIN main.{table} AS d ON d.{key} = s.{key}
         WHERE {changed}
         ON CONFLICT ({key}) DO UPDATE SET {assignments}",
        table = q(dim.table),
        staging = q(dim.staging_table),
        key = q(KEY_FIELD),
    )
}

impl EtlStore {
    /// Merge the staging table of `dim` into its dimension table.
    /// Returns the number of rows inserted or updated.
    pub fn upsert_dimension(&self, dim: &Dimension, job_id: JobId, now: &str) -> EtlResult<usize> {
        dim.validate()?;
        let affected = self.conn.execute(&upsert_sql(dim), params![job_id, now])?;
        Ok(affected)
    }

    /// Key → id maps of all four dimension tables as currently stored.
    pub fn dimension_index(&self) -> EtlResult<DimensionIndex> {
        let mut index = DimensionIndex::default();
        for dim in ALL {
            dim.validate()?;
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT \"key\", \"id\" FROM \"{}\"", dim.table))?;
            let pairs = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, RowId>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            for (key, id) in pairs {
                index.insert(dim.kind, key, id);
            }
        }
        Ok(index)
    }

    /// All rows of a dimension table, ordered by key.
    pub fn dimension_rows(&self, dim: &Dimension) -> EtlResult<Vec<DimensionRow>> {
        self.query_dimension_rows(dim, None)
    }

    pub fn dimension_row(&self, dim: &Dimension, key: &str) -> EtlResult<Option<DimensionRow>> {
        Ok(self.query_dimension_rows(dim, Some(key))?.into_iter().next())
    }

    pub fn dimension_count(&self, dim: &Dimension) -> EtlResult<usize> {
        dim.validate()?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", dim.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn query_dimension_rows(
        &self,
        dim: &Dimension,
        key: Option<&str>,
    ) -> EtlResult<Vec<DimensionRow>> {
        dim.validate()?;
        let columns = dim
            .fields
            .iter()
            .map(|f| format!("\"{}\"", f.column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT \"id\", \"key\", \"updated_by\", \"updated_at\", {columns}
             FROM \"{table}\"
             WHERE ?1 IS NULL OR \"key\" = ?1
             ORDER BY \"key\" ASC",
            table = dim.table,
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![key], |row| {
                let mut values = BTreeMap::new();
                for (i, field) in dim.fields.iter().enumerate() {
                    values.insert(field.column.to_string(), row.get::<_, Option<String>>(4 + i)?);
                }
                Ok(DimensionRow {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    updated_by: row.get(2)?,
                    updated_at: row.get(3)?,
                    values,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::WALLET;

    #[test]
    fn upsert_sql_maps_source_fields_onto_columns() {
        let sql = upsert_sql(&WALLET);
        assert!(sql.contains("INSERT INTO \"wallet\""));
        assert!(sql.contains("s.\"group\""));
        assert!(sql.contains("d.\"group_name\" IS NOT s.\"group\""));
        assert!(sql.contains("\"group_name\" = excluded.\"group_name\""));
        assert!(sql.contains("ON CONFLICT (\"key\")"));
        assert!(sql.contains("FROM temp.\"stage_wallet\""));
    }
}
