//! Integration tests for the dimension upserter.
//!
//! 1. First sight of a key inserts; a repeat of the same batch writes nothing
//! 2. A changed field rewrites the row and moves updated_by / updated_at
//! 3. Comparison is exact: case changes and NULL ↔ value changes count
//! 4. Keys stay unique across runs

use budget_etl_core::{
    dimension::{self, Dimension, CATEGORY, EVENT, WALLET},
    job,
    source::{Batch, SourceRow},
    store::EtlStore,
};

fn store() -> EtlStore {
    let store = EtlStore::in_memory().expect("in-memory store");
    store.migrate().expect("migrate");
    store
}

fn batch(name: &str, rows: &[&[(&str, &str)]]) -> Batch {
    let rows: Vec<SourceRow> = rows
        .iter()
        .map(|pairs| pairs.iter().copied().collect::<SourceRow>())
        .collect();
    Batch::from_rows(name, rows)
}

/// Stage `rows` for `dim` and upsert them under a fresh job.
fn load(store: &EtlStore, dim: &Dimension, rows: &[&[(&str, &str)]]) -> (i64, usize) {
    let job_id = job::open(store).unwrap();
    let staged = dim.stage_rows(&batch(dim.table, rows)).unwrap();
    store.stage_dimension(dim, &staged).unwrap();
    let affected = store
        .in_transaction(|store| dimension::upsert(store, dim, job_id))
        .unwrap();
    (job_id, affected)
}

// ─────────────────────────────────────────────────────────────────────────────
// Idempotence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn identical_batch_writes_only_once() {
    let store = store();
    let rows: &[&[(&str, &str)]] = &[
        &[("key", "W1"), ("name", "Cash"), ("group", "Liquid")],
        &[("key", "W2"), ("name", "Bank"), ("group", "Liquid"), ("currency", "EUR")],
    ];

    let (first_job, affected) = load(&store, &WALLET, rows);
    assert_eq!(affected, 2);
    let before = store.dimension_rows(&WALLET).unwrap();
    assert!(before.iter().all(|r| r.updated_by == first_job));

    let (_, affected) = load(&store, &WALLET, rows);
    assert_eq!(affected, 0, "second identical run must not write");
    let after = store.dimension_rows(&WALLET).unwrap();
    assert_eq!(before, after, "updated_by / updated_at must be untouched");
}

// ─────────────────────────────────────────────────────────────────────────────
// Change detection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn changed_name_is_written() {
    let store = store();
    load(&store, &CATEGORY, &[&[("key", "A"), ("name", "X")]]);
    let original = store.dimension_row(&CATEGORY, "A").unwrap().unwrap();

    let (second_job, affected) = load(&store, &CATEGORY, &[&[("key", "A"), ("name", "Y")]]);
    assert_eq!(affected, 1);

    let row = store.dimension_row(&CATEGORY, "A").unwrap().unwrap();
    assert_eq!(row.id, original.id, "update must keep the surrogate id");
    assert_eq!(row.value("name"), Some("Y"));
    assert_eq!(row.updated_by, second_job);
    assert!(row.updated_at >= original.updated_at);
}

#[test]
fn unchanged_row_is_not_written() {
    let store = store();
    let (first_job, _) = load(&store, &CATEGORY, &[&[("key", "A"), ("name", "X")]]);

    let (_, affected) = load(&store, &CATEGORY, &[&[("key", "A"), ("name", "X")]]);
    assert_eq!(affected, 0);
    let row = store.dimension_row(&CATEGORY, "A").unwrap().unwrap();
    assert_eq!(row.updated_by, first_job);
}

#[test]
fn comparison_is_case_sensitive() {
    let store = store();
    load(&store, &CATEGORY, &[&[("key", "A"), ("name", "groceries")]]);
    let (_, affected) = load(&store, &CATEGORY, &[&[("key", "A"), ("name", "Groceries")]]);
    assert_eq!(affected, 1);
    assert_eq!(
        store.dimension_row(&CATEGORY, "A").unwrap().unwrap().value("name"),
        Some("Groceries")
    );
}

#[test]
fn null_and_value_transitions_are_changes() {
    let store = store();
    load(&store, &WALLET, &[&[("key", "W1"), ("name", "Cash")]]);
    assert_eq!(
        store.dimension_row(&WALLET, "W1").unwrap().unwrap().value("subgroup_name"),
        None
    );

    let (_, affected) = load(
        &store,
        &WALLET,
        &[&[("key", "W1"), ("name", "Cash"), ("subgroup", "Pocket")]],
    );
    assert_eq!(affected, 1);
    assert_eq!(
        store.dimension_row(&WALLET, "W1").unwrap().unwrap().value("subgroup_name"),
        Some("Pocket")
    );

    let (_, affected) = load(
        &store,
        &WALLET,
        &[&[("key", "W1"), ("name", "Cash"), ("subgroup", "")]],
    );
    assert_eq!(affected, 1, "blank value stages as NULL and clears the column");
}

#[test]
fn renamed_fields_land_in_their_columns() {
    let store = store();
    load(
        &store,
        &EVENT,
        &[&[
            ("key", "E1"),
            ("name", "Holiday"),
            ("group", "Travel"),
            ("start", "2024-03-10"),
            ("end", "2024-03-20"),
        ]],
    );
    let row = store.dimension_row(&EVENT, "E1").unwrap().unwrap();
    assert_eq!(row.value("group_name"), Some("Travel"));
    assert_eq!(row.value("start_date"), Some("2024-03-10"));
    assert_eq!(row.value("end_date"), Some("2024-03-20"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Key uniqueness
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn keys_stay_unique_across_runs() {
    let store = store();
    load(&store, &WALLET, &[&[("key", "W1"), ("name", "Cash")]]);
    load(
        &store,
        &WALLET,
        &[
            &[("key", "W1"), ("name", "Cash (old)")],
            &[("key", "W2"), ("name", "Bank")],
        ],
    );
    load(&store, &WALLET, &[&[("key", "W2"), ("name", "Bank")]]);

    let rows = store.dimension_rows(&WALLET).unwrap();
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["W1", "W2"]);
    // A key missing from a later batch is kept, never deleted.
    assert_eq!(rows[0].value("name"), Some("Cash (old)"));
}
