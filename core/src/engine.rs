//! The run orchestrator.
//!
//! PHASES (fixed, never reordered):
//!   1. INIT                  open a job in the ledger
//!   2. STAGING               load source batches, bulk-load staging tables
//!   3. DIMENSION_UPSERT      merge wallets, categories, places, events
//!   4. TRANSACTION_RECONCILE clean raw transactions, consolidate the month
//!   5. COMPLETE | FAILED     close the job exactly once
//!
//! RULES:
//!   - Phases 3 and 4 share one database transaction. Any error there
//!     rolls back dimension and transaction changes alike.
//!   - A staging error never reaches the database transaction.
//!   - The engine reports the outcome; it never exits the process.

use crate::{
    cleaner::{self, DropReason},
    consolidator::{self, ConsolidationReport},
    dimension::{self, DimensionKind},
    error::{EtlError, EtlResult},
    job,
    source::BatchSource,
    store::EtlStore,
    transaction::RawTransaction,
    types::{JobId, Month},
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Staging,
    DimensionUpsert,
    TransactionReconcile,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionStats {
    pub dimension: DimensionKind,
    pub staged: usize,
    pub upserted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dimensions: Vec<DimensionStats>,
    pub raw_transactions: usize,
    pub cleaned_transactions: usize,
    pub dropped: BTreeMap<DropReason, usize>,
    pub consolidation: ConsolidationReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Complete(RunSummary),
    Failed { phase: RunPhase, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub job_id: JobId,
    pub month: Month,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Complete(_))
    }

    pub fn failure_message(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Complete(_) => None,
            RunOutcome::Failed { message, .. } => Some(message),
        }
    }
}

pub struct EtlEngine {
    pub store: EtlStore,
}

impl EtlEngine {
    pub fn new(store: EtlStore) -> Self {
        Self { store }
    }

    /// Execute one full run for `month`.
    ///
    /// Returns `Err` only if the job ledger itself cannot be written;
    /// every pipeline failure is recorded on the job and reported as
    /// `RunOutcome::Failed`.
    pub fn run(&self, source: &dyn BatchSource, month: Month) -> EtlResult<RunReport> {
        log::info!("Run for {month}: {:?}", RunPhase::Init);
        let job_id = job::open(&self.store)?;

        log::info!("Job {job_id}: {:?}", RunPhase::Staging);
        let mut summary = match self.stage(source) {
            Ok(summary) => summary,
            Err(e) => return self.fail(job_id, month, RunPhase::Staging, e),
        };

        let mut phase = RunPhase::DimensionUpsert;
        let reconciled = self.store.in_transaction(|store| {
            Self::reconcile(store, job_id, month, &mut summary, &mut phase)
        });
        if let Err(e) = reconciled {
            return self.fail(job_id, month, phase, e);
        }

        job::complete(&self.store, job_id)?;
        log::info!(
            "Job {job_id}: {:?} ({} cleaned, {} dropped, {} inserted, {} pruned)",
            RunPhase::Complete,
            summary.cleaned_transactions,
            summary.dropped.values().sum::<usize>(),
            summary.consolidation.inserted,
            summary.consolidation.pruned
        );
        Ok(RunReport {
            job_id,
            month,
            outcome: RunOutcome::Complete(summary),
        })
    }

    /// Load every batch and replace the staging tables with it.
    fn stage(&self, source: &dyn BatchSource) -> EtlResult<RunSummary> {
        let batches = source.load()?;
        let mut summary = RunSummary::default();

        for dim in dimension::ALL {
            let rows = dim.stage_rows(batches.dimension(dim.kind))?;
            let staged = self.store.stage_dimension(dim, &rows)?;
            summary.dimensions.push(DimensionStats {
                dimension: dim.kind,
                staged,
                upserted: 0,
            });
        }

        let raw = RawTransaction::from_batch(&batches.transactions)?;
        summary.raw_transactions = self.store.stage_transactions(&raw)?;
        Ok(summary)
    }

    /// Phases 3 and 4. Runs inside the job's database transaction.
    fn reconcile(
        store: &EtlStore,
        job_id: JobId,
        month: Month,
        summary: &mut RunSummary,
        phase: &mut RunPhase,
    ) -> EtlResult<()> {
        log::info!("Job {job_id}: {phase:?}");
        for dim in dimension::ALL {
            let upserted = dimension::upsert(store, dim, job_id)?;
            if let Some(stats) = summary
                .dimensions
                .iter_mut()
                .find(|s| s.dimension == dim.kind)
            {
                stats.upserted = upserted;
            }
        }

        *phase = RunPhase::TransactionReconcile;
        log::info!("Job {job_id}: {phase:?}");
        let index = store.dimension_index()?;
        let raw = store.staged_transactions()?;
        let cleaned = cleaner::clean(&raw, &index, month);
        summary.cleaned_transactions = cleaned.transactions.len();
        summary.dropped = cleaned.dropped;
        summary.consolidation =
            consolidator::consolidate(store, &cleaned.transactions, month, job_id)?;
        Ok(())
    }

    fn fail(
        &self,
        job_id: JobId,
        month: Month,
        phase: RunPhase,
        error: EtlError,
    ) -> EtlResult<RunReport> {
        let message = error.to_string();
        log::error!("Job {job_id}: {:?} during {phase:?}", RunPhase::Failed);
        job::fail(&self.store, job_id, &message)?;
        Ok(RunReport {
            job_id,
            month,
            outcome: RunOutcome::Failed { phase, message },
        })
    }
}
