use super::EtlStore;
use crate::{
    error::{EtlError, EtlResult},
    job::Job,
    types::JobId,
};
use rusqlite::{params, OptionalExtension};

impl EtlStore {
    pub fn insert_job(&self, created_at: &str) -> EtlResult<JobId> {
        self.insert_returning_id(
            "INSERT INTO job (failed, message, created_at, updated_at)
             VALUES (0, NULL, ?1, NULL)",
            params![created_at],
        )
    }

    /// Record the terminal outcome of a job. A job can be finished once;
    /// a second call fails with `JobAlreadyFinished`.
    pub fn finish_job(
        &self,
        job_id: JobId,
        failed: bool,
        message: Option<&str>,
        updated_at: &str,
    ) -> EtlResult<()> {
        let changed = self.conn.execute(
            "UPDATE job SET failed = ?1, message = ?2, updated_at = ?3
             WHERE id = ?4 AND updated_at IS NULL",
            params![failed, message, updated_at, job_id],
        )?;
        if changed == 0 {
            return match self.job(job_id)? {
                Some(_) => Err(EtlError::JobAlreadyFinished(job_id)),
                None => Err(EtlError::JobNotFound(job_id)),
            };
        }
        Ok(())
    }

    pub fn job(&self, job_id: JobId) -> EtlResult<Option<Job>> {
        let job = self
            .conn
            .query_row(
                "SELECT id, failed, message, created_at, updated_at FROM job WHERE id = ?1",
                params![job_id],
                Self::map_job_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Most recent jobs first.
    pub fn recent_jobs(&self, limit: usize) -> EtlResult<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, failed, message, created_at, updated_at
             FROM job ORDER BY id DESC LIMIT ?1",
        )?;
        let jobs = stmt
            .query_map(params![limit as i64], Self::map_job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn map_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
        Ok(Job {
            id: row.get(0)?,
            failed: row.get(1)?,
            message: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}
