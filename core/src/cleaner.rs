//! Transaction cleaner. Resolves raw transactions against the dimension
//! tables and drops what cannot be fully resolved.
//!
//! A raw row survives only if:
//!   - wallet, category and place keys all resolve,
//!   - value is present,
//!   - the event key is either absent/blank, or resolves,
//!   - the day field builds a valid date inside the target month.

use crate::{
    dimension::DimensionKind,
    store::DimensionIndex,
    transaction::{CleanedTransaction, RawTransaction},
    types::Month,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a raw transaction was left out of the cleaned set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    UnknownWallet,
    UnknownCategory,
    UnknownPlace,
    DanglingEvent,
    MissingValue,
    InvalidDay,
}

/// Resolve one raw transaction.
pub fn resolve(
    raw: &RawTransaction,
    index: &DimensionIndex,
    month: Month,
) -> Result<CleanedTransaction, DropReason> {
    let wallet_id = index
        .resolve(DimensionKind::Wallet, &raw.wallet)
        .ok_or(DropReason::UnknownWallet)?;
    let category_id = index
        .resolve(DimensionKind::Category, &raw.category)
        .ok_or(DropReason::UnknownCategory)?;
    let place_id = index
        .resolve(DimensionKind::Place, &raw.place)
        .ok_or(DropReason::UnknownPlace)?;

    // Blank and absent event keys both mean "no event".
    let event_id = match raw.event.as_deref().filter(|k| !k.trim().is_empty()) {
        None => None,
        Some(key) => Some(
            index
                .resolve(DimensionKind::Event, key)
                .ok_or(DropReason::DanglingEvent)?,
        ),
    };

    let value = raw.value.ok_or(DropReason::MissingValue)?;

    let day = month
        .day(&raw.day)
        .filter(|d| month.contains(*d))
        .ok_or(DropReason::InvalidDay)?;

    Ok(CleanedTransaction {
        day,
        value,
        description: raw.description.clone(),
        wallet_id,
        category_id,
        place_id,
        event_id,
    })
}

/// Result of cleaning a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cleaned {
    pub transactions: Vec<CleanedTransaction>,
    pub dropped: BTreeMap<DropReason, usize>,
}

impl Cleaned {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }
}

/// Clean a batch of raw transactions for `month`, preserving input order.
pub fn clean(raw: &[RawTransaction], index: &DimensionIndex, month: Month) -> Cleaned {
    let mut cleaned = Cleaned::default();
    for txn in raw {
        match resolve(txn, index, month) {
            Ok(resolved) => cleaned.transactions.push(resolved),
            Err(reason) => {
                log::debug!("Dropping transaction {txn:?}: {reason:?}");
                *cleaned.dropped.entry(reason).or_default() += 1;
            }
        }
    }
    if cleaned.dropped_total() > 0 {
        log::warn!(
            "{} of {} raw transaction(s) dropped for {month}: {:?}",
            cleaned.dropped_total(),
            raw.len(),
            cleaned.dropped
        );
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn index() -> DimensionIndex {
        let mut index = DimensionIndex::default();
        index.insert(DimensionKind::Wallet, "W1", 1);
        index.insert(DimensionKind::Category, "C1", 10);
        index.insert(DimensionKind::Place, "P1", 100);
        index.insert(DimensionKind::Event, "E1", 1000);
        index
    }

    fn raw() -> RawTransaction {
        RawTransaction {
            day: "15".into(),
            value: Some(-4200),
            description: "groceries".into(),
            wallet: "W1".into(),
            category: "C1".into(),
            place: "P1".into(),
            event: None,
        }
    }

    fn raw_with(edit: impl FnOnce(&mut RawTransaction)) -> RawTransaction {
        let mut txn = raw();
        edit(&mut txn);
        txn
    }

    fn march() -> Month {
        "2024-03".parse().unwrap()
    }

    #[test]
    fn resolves_a_complete_row() {
        let cleaned = resolve(&raw(), &index(), march()).unwrap();
        assert_eq!(cleaned.day, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(cleaned.value, -4200);
        assert_eq!(
            (cleaned.wallet_id, cleaned.category_id, cleaned.place_id, cleaned.event_id),
            (1, 10, 100, None)
        );
    }

    #[test]
    fn resolves_a_present_event() {
        let txn = RawTransaction {
            event: Some("E1".into()),
            ..raw()
        };
        assert_eq!(resolve(&txn, &index(), march()).unwrap().event_id, Some(1000));
    }

    #[test]
    fn blank_event_key_is_treated_as_absent() {
        let txn = RawTransaction {
            event: Some("   ".into()),
            ..raw()
        };
        assert_eq!(resolve(&txn, &index(), march()).unwrap().event_id, None);
    }

    #[test]
    fn dangling_event_drops_the_row() {
        let txn = RawTransaction {
            event: Some("E404".into()),
            ..raw()
        };
        assert_eq!(resolve(&txn, &index(), march()), Err(DropReason::DanglingEvent));
    }

    #[test]
    fn unresolved_required_dimensions_drop_the_row() {
        let cases = [
            (raw_with(|t| t.wallet = "W9".into()), DropReason::UnknownWallet),
            (raw_with(|t| t.wallet.clear()), DropReason::UnknownWallet),
            (raw_with(|t| t.category = "c1".into()), DropReason::UnknownCategory),
            (raw_with(|t| t.place = "P2".into()), DropReason::UnknownPlace),
        ];
        for (txn, reason) in cases {
            assert_eq!(resolve(&txn, &index(), march()), Err(reason));
        }
    }

    #[test]
    fn missing_value_and_bad_day_drop_the_row() {
        let no_value = raw_with(|t| t.value = None);
        assert_eq!(
            resolve(&no_value, &index(), march()),
            Err(DropReason::MissingValue)
        );

        for day in ["32", "5", "", "aa"] {
            let txn = raw_with(|t| t.day = day.into());
            assert_eq!(
                resolve(&txn, &index(), march()),
                Err(DropReason::InvalidDay),
                "{day}"
            );
        }

        let feb: Month = "2023-02".parse().unwrap();
        let txn = raw_with(|t| t.day = "30".into());
        assert_eq!(resolve(&txn, &index(), feb), Err(DropReason::InvalidDay));
    }

    #[test]
    fn clean_keeps_order_and_counts_drops() {
        let batch = vec![
            raw(),
            raw_with(|t| t.place = "nowhere".into()),
            raw_with(|t| t.day = "01".into()),
            raw_with(|t| t.event = Some("E404".into())),
        ];
        let cleaned = clean(&batch, &index(), march());

        assert_eq!(cleaned.transactions.len(), 2);
        assert_eq!(cleaned.transactions[0].day.to_string(), "2024-03-15");
        assert_eq!(cleaned.transactions[1].day.to_string(), "2024-03-01");
        assert_eq!(cleaned.dropped_total(), 2);
        assert_eq!(cleaned.dropped.get(&DropReason::UnknownPlace), Some(&1));
        assert_eq!(cleaned.dropped.get(&DropReason::DanglingEvent), Some(&1));
    }
}
