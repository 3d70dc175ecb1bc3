//! Transaction consolidator: makes the persisted transactions of one
//! month equal to the freshly cleaned set.
//!
//! Matching is one-to-one on the full transaction tuple: each persisted
//! row can satisfy at most one cleaned row. Cleaned rows left unmatched
//! are inserted; persisted rows left unmatched are deleted. Rows of other
//! months are never read, so they are never touched.

use crate::{
    error::EtlResult,
    store::EtlStore,
    transaction::{CleanedTransaction, PersistedTransaction},
    types::{timestamp_now, JobId, Month, RowId},
};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub inserted: usize,
    pub pruned: usize,
    pub unchanged: usize,
}

/// What has to change to turn `persisted` into `cleaned`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationPlan<'a> {
    pub to_insert: Vec<&'a CleanedTransaction>,
    pub to_prune: Vec<RowId>,
    pub unchanged: usize,
}

/// Pair cleaned rows with persisted rows by equality, one-to-one.
pub fn plan<'a>(
    cleaned: &'a [CleanedTransaction],
    persisted: &[PersistedTransaction],
) -> ConsolidationPlan<'a> {
    let mut available: HashMap<&CleanedTransaction, Vec<RowId>> = HashMap::new();
    for row in persisted {
        available.entry(&row.fact).or_default().push(row.id);
    }
    // Oldest rows are matched first; surplus duplicates are the newest.
    for ids in available.values_mut() {
        ids.sort_unstable_by(|a, b| b.cmp(a));
    }

    let mut plan = ConsolidationPlan::default();
    for txn in cleaned {
        match available.get_mut(txn).and_then(Vec::pop) {
            Some(_) => plan.unchanged += 1,
            None => plan.to_insert.push(txn),
        }
    }

    plan.to_prune = available.into_values().flatten().collect();
    plan.to_prune.sort_unstable();
    plan
}

/// Reconcile persisted transactions for `month` against `cleaned`.
///
/// Must run inside the job's transaction (see `EtlStore::in_transaction`).
/// Cleaned rows outside `month` are ignored.
pub fn consolidate(
    store: &EtlStore,
    cleaned: &[CleanedTransaction],
    month: Month,
    job_id: JobId,
) -> EtlResult<ConsolidationReport> {
    let in_month: Vec<CleanedTransaction> = cleaned
        .iter()
        .filter(|t| month.contains(t.day))
        .cloned()
        .collect();
    if in_month.len() != cleaned.len() {
        log::warn!(
            "Ignoring {} cleaned transaction(s) outside {month}",
            cleaned.len() - in_month.len()
        );
    }

    let persisted = store.transactions_in(month)?;
    let plan = plan(&in_month, &persisted);

    let now = timestamp_now();
    for txn in &plan.to_insert {
        store.insert_transaction(txn, job_id, &now)?;
    }
    for id in &plan.to_prune {
        store.delete_transaction(*id)?;
    }

    let report = ConsolidationReport {
        inserted: plan.to_insert.len(),
        pruned: plan.to_prune.len(),
        unchanged: plan.unchanged,
    };
    log::info!(
        "Consolidated {month}: {} inserted, {} pruned, {} unchanged",
        report.inserted,
        report.pruned,
        report.unchanged
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn txn(day: u32, value: i64, event_id: Option<RowId>) -> CleanedTransaction {
        CleanedTransaction {
            day: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            value,
            description: "coffee".into(),
            wallet_id: 1,
            category_id: 2,
            place_id: 3,
            event_id,
        }
    }

    fn persisted(id: RowId, fact: CleanedTransaction) -> PersistedTransaction {
        PersistedTransaction {
            id,
            fact,
            created_at: "2024-03-31 00:00:00.000".into(),
            created_by: 1,
        }
    }

    #[test]
    fn empty_store_inserts_everything() {
        let cleaned = vec![txn(1, -300, None), txn(2, -300, None)];
        let plan = plan(&cleaned, &[]);
        assert_eq!(plan.to_insert.len(), 2);
        assert!(plan.to_prune.is_empty());
    }

    #[test]
    fn matching_rows_are_left_alone() {
        let cleaned = vec![txn(1, -300, None), txn(2, -300, Some(7))];
        let stored = vec![persisted(10, txn(2, -300, Some(7))), persisted(11, txn(1, -300, None))];
        let plan = plan(&cleaned, &stored);
        assert!(plan.to_insert.is_empty());
        assert!(plan.to_prune.is_empty());
        assert_eq!(plan.unchanged, 2);
    }

    #[test]
    fn event_null_matches_only_null() {
        let cleaned = vec![txn(1, -300, None)];
        let stored = vec![persisted(10, txn(1, -300, Some(7)))];
        let plan = plan(&cleaned, &stored);
        assert_eq!(plan.to_insert, vec![&cleaned[0]]);
        assert_eq!(plan.to_prune, vec![10]);
    }

    #[test]
    fn corrected_rows_replace_stale_ones() {
        let cleaned = vec![txn(1, -350, None)];
        let stored = vec![persisted(10, txn(1, -300, None))];
        let plan = plan(&cleaned, &stored);
        assert_eq!(plan.to_insert.len(), 1);
        assert_eq!(plan.to_prune, vec![10]);
    }

    #[test]
    fn duplicates_are_matched_one_to_one() {
        // Two identical coffees in the export, one already stored.
        let cleaned = vec![txn(1, -300, None), txn(1, -300, None)];
        let stored = vec![persisted(10, txn(1, -300, None))];
        let extra = plan(&cleaned, &stored);
        assert_eq!(extra.to_insert.len(), 1);
        assert!(extra.to_prune.is_empty());

        // One coffee in the export, three stored: the two newest go.
        let cleaned = vec![txn(1, -300, None)];
        let stored = vec![
            persisted(12, txn(1, -300, None)),
            persisted(10, txn(1, -300, None)),
            persisted(11, txn(1, -300, None)),
        ];
        let surplus = plan(&cleaned, &stored);
        assert!(surplus.to_insert.is_empty());
        assert_eq!(surplus.to_prune, vec![11, 12]);
    }
}
