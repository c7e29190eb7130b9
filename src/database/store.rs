use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::{Attempt, AutoSaveData, Finalization};
use crate::models::question::Question;
use crate::models::test::Test;
use crate::models::timing::ActionEvent;

/// Persistence contract for attempt records.
///
/// Every mutating call is scoped by attempt id *and* owning student and only
/// touches attempts that are still in progress. A `false`/`None` result means
/// that predicate matched nothing; callers decide which error that is.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>>;

    async fn find_in_progress(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<Attempt>>;

    /// Stores `attempt` unless the student already has an in-progress attempt
    /// for the same test, in which case that one is returned. The flag is true
    /// when a new record was created.
    async fn insert_or_resume(&self, attempt: Attempt) -> Result<(Attempt, bool)>;

    /// `at` is the client's timestamp; `now` stamps `updated_at`.
    async fn record_heartbeat(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
        current_question: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replaces the autosave snapshot wholesale and raises `time_spent` to at
    /// least the snapshot's value.
    async fn save_autosave(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        data: AutoSaveData,
    ) -> Result<bool>;

    /// Applies one timing event to a question entry as a single atomic append.
    /// An event the entry cannot absorb is an error and nothing is written.
    async fn record_action(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        question_index: i32,
        question_id: &str,
        event: &ActionEvent,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Compare-and-swap out of `in-progress`: grades `answers[]` against
    /// `questions` and writes the terminal status. Returns the finalized record,
    /// or `None` if no in-progress attempt matched.
    async fn finalize(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        finalization: &Finalization,
        questions: &[Question],
    ) -> Result<Option<Attempt>>;

    /// In-progress attempts whose last heartbeat is older than `cutoff`.
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>>;

    async fn list_terminal_for_test(&self, test_id: Uuid) -> Result<Vec<Attempt>>;

    /// Writes the analytics rank of a terminal attempt.
    async fn set_rank(&self, attempt_id: Uuid, rank: i32) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestCatalog: Send + Sync {
    async fn find_test(&self, test_id: Uuid) -> Result<Option<Test>>;

    async fn insert_test(&self, test: Test) -> Result<Test>;
}
