//! Durable checkpoint store.
//!
//! Every executor transition appends a checkpoint keyed by
//! (thread_id, seq): the post-step state, the next step to run, and
//! whether the run is suspended awaiting external input. Rows are
//! immutable once written; later sequence numbers supersede earlier
//! ones, so history stays available for rollback and audit. Nothing is
//! garbage-collected by the engine — `purge` is an explicit external
//! action.
//!
//! Distinct thread_ids write concurrently without interference; the
//! sequence number is computed and inserted under the same connection
//! lock, so it is strictly increasing per thread.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::EngineError;
use crate::state::WorkflowState;

/// An immutable snapshot of one executor transition.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub thread_id: String,
    pub seq: i64,
    pub state: WorkflowState,
    pub next_step: String,
    pub interrupted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a checkpoint. Never overwrites: the sequence number is
    /// allocated as max(seq)+1 for the thread within a single locked
    /// connection.
    pub async fn save(
        &self,
        thread_id: &str,
        state: &WorkflowState,
        next_step: &str,
        interrupted: bool,
    ) -> Result<Checkpoint, EngineError> {
        let tid = thread_id.to_string();
        let state_json = state.snapshot();
        let next = next_step.to_string();
        let created_at = Utc::now();
        let created_millis = created_at.timestamp_millis();

        let seq = self
            .db
            .with_conn_async(move |conn| {
                let seq: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM checkpoints WHERE thread_id = ?1",
                    rusqlite::params![tid],
                    |row| row.get(0),
                )?;
                conn.execute(
                    "INSERT INTO checkpoints (thread_id, seq, state, next_step, interrupted, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![tid, seq, state_json, next, interrupted as i64, created_millis],
                )?;
                Ok(seq)
            })
            .await?;

        tracing::debug!(
            thread_id,
            seq,
            next_step,
            interrupted,
            "checkpoint written"
        );

        Ok(Checkpoint {
            thread_id: thread_id.to_string(),
            seq,
            state: state.clone(),
            next_step: next_step.to_string(),
            interrupted,
            created_at,
        })
    }

    /// The most recent checkpoint for a thread, or `NotFound`.
    pub async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint, EngineError> {
        let tid = thread_id.to_string();
        let row = self
            .db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT thread_id, seq, state, next_step, interrupted, created_at
                     FROM checkpoints WHERE thread_id = ?1
                     ORDER BY seq DESC LIMIT 1",
                )?;
                stmt.query_row(rusqlite::params![tid], row_to_checkpoint)
                    .optional()
            })
            .await?;

        row.ok_or_else(|| EngineError::NotFound(format!("thread '{}'", thread_id)))
    }

    /// Full history for a thread in ascending sequence order, for
    /// audit and debugging.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, EngineError> {
        let tid = thread_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT thread_id, seq, state, next_step, interrupted, created_at
                     FROM checkpoints WHERE thread_id = ?1 ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![tid], row_to_checkpoint)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Delete every checkpoint for a thread. Explicit external purge
    /// only; the engine never calls this.
    pub async fn purge(&self, thread_id: &str) -> Result<usize, EngineError> {
        let tid = thread_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM checkpoints WHERE thread_id = ?1",
                    rusqlite::params![tid],
                )
            })
            .await
    }
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> Result<Checkpoint, rusqlite::Error> {
    let state_json: String = row.get(2)?;
    let state: WorkflowState = serde_json::from_str(&state_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_millis: i64 = row.get(5)?;
    Ok(Checkpoint {
        thread_id: row.get(0)?,
        seq: row.get(1)?,
        state,
        next_step: row.get(3)?,
        interrupted: row.get::<_, i64>(4)? != 0,
        created_at: Utc
            .timestamp_millis_opt(created_millis)
            .single()
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{field, StateDelta};

    fn state_with_counter(n: i64) -> WorkflowState {
        let mut state = WorkflowState::new();
        state.apply(StateDelta::new().set(field::ITERATION_COUNT, n));
        state
    }

    #[tokio::test]
    async fn sequence_is_strictly_increasing_and_latest_wins() {
        let store = CheckpointStore::new(Database::open_in_memory().unwrap());

        let first = store
            .save("t1", &state_with_counter(0), "coder", false)
            .await
            .unwrap();
        let second = store
            .save("t1", &state_with_counter(1), "reviewer", false)
            .await
            .unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);

        let latest = store.load_latest("t1").await.unwrap();
        assert_eq!(latest.seq, 2);
        assert_eq!(latest.next_step, "reviewer");
        assert_eq!(latest.state.iteration_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let store = CheckpointStore::new(Database::open_in_memory().unwrap());
        assert!(matches!(
            store.load_latest("ghost").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn history_enumerates_in_order_and_threads_are_isolated() {
        let store = CheckpointStore::new(Database::open_in_memory().unwrap());
        store
            .save("a", &state_with_counter(0), "coder", false)
            .await
            .unwrap();
        store
            .save("b", &state_with_counter(9), "tester", false)
            .await
            .unwrap();
        store
            .save("a", &state_with_counter(1), "reviewer", true)
            .await
            .unwrap();

        let history = store.history("a").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].seq, 1);
        assert_eq!(history[1].seq, 2);
        assert!(history[1].interrupted);

        let other = store.history("b").await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].state.iteration_count().unwrap(), 9);
    }

    #[tokio::test]
    async fn purge_removes_only_the_named_thread() {
        let store = CheckpointStore::new(Database::open_in_memory().unwrap());
        store
            .save("a", &state_with_counter(0), "coder", false)
            .await
            .unwrap();
        store
            .save("b", &state_with_counter(0), "coder", false)
            .await
            .unwrap();

        assert_eq!(store.purge("a").await.unwrap(), 1);
        assert!(store.load_latest("a").await.is_err());
        assert!(store.load_latest("b").await.is_ok());
    }
}
