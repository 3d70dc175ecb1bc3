//! Job ledger: one row per run.
//!
//! A job is opened when a run starts and closed exactly once, either
//! as completed or as failed with the error text that ended the run.

use crate::{
    error::EtlResult,
    store::EtlStore,
    types::{timestamp_now, JobId},
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub failed: bool,
    pub message: Option<String>,
    pub created_at: String,
    /// `None` while the run is in flight.
    pub updated_at: Option<String>,
}

impl Job {
    pub fn is_finished(&self) -> bool {
        self.updated_at.is_some()
    }
}

pub fn open(store: &EtlStore) -> EtlResult<JobId> {
    let job_id = store.insert_job(&timestamp_now())?;
    log::info!("Job {job_id} opened");
    Ok(job_id)
}

pub fn complete(store: &EtlStore, job_id: JobId) -> EtlResult<()> {
    store.finish_job(job_id, false, None, &timestamp_now())?;
    log::info!("Job {job_id} completed");
    Ok(())
}

pub fn fail(store: &EtlStore, job_id: JobId, message: &str) -> EtlResult<()> {
    store.finish_job(job_id, true, Some(message), &timestamp_now())?;
    log::error!("Job {job_id} failed: {message}");
    Ok(())
}
