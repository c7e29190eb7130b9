use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::database::store::{AttemptStore, TestCatalog};
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AutoSaveData, Finalization};
use crate::models::question::Question;
use crate::models::test::Test;
use crate::models::timing::ActionEvent;
use crate::services::grading_service::GradingService;

/// Single-process store. Each operation holds the mutex for its whole
/// read-check-write, which gives the same atomicity the Postgres store gets
/// from row locks.
#[derive(Clone, Default)]
pub struct MemoryStore {
    attempts: Arc<Mutex<HashMap<Uuid, Attempt>>>,
    tests: Arc<Mutex<HashMap<Uuid, Test>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn attempts(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Attempt>>> {
        self.attempts
            .lock()
            .map_err(|e| Error::Internal(format!("attempt store poisoned: {}", e)))
    }

    fn tests(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Test>>> {
        self.tests
            .lock()
            .map_err(|e| Error::Internal(format!("test catalog poisoned: {}", e)))
    }
}

fn owned_in_progress<'a>(
    guard: &'a mut HashMap<Uuid, Attempt>,
    attempt_id: Uuid,
    student_id: Uuid,
) -> Option<&'a mut Attempt> {
    guard
        .get_mut(&attempt_id)
        .filter(|a| a.student_id == student_id && a.is_in_progress())
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        Ok(self.attempts()?.get(&attempt_id).cloned())
    }

    async fn find_in_progress(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<Attempt>> {
        Ok(self
            .attempts()?
            .values()
            .find(|a| a.student_id == student_id && a.test_id == test_id && a.is_in_progress())
            .cloned())
    }

    async fn insert_or_resume(&self, attempt: Attempt) -> Result<(Attempt, bool)> {
        let mut guard = self.attempts()?;
        if let Some(existing) = guard.values().find(|a| {
            a.student_id == attempt.student_id && a.test_id == attempt.test_id && a.is_in_progress()
        }) {
            return Ok((existing.clone(), false));
        }
        guard.insert(attempt.id, attempt.clone());
        Ok((attempt, true))
    }

    async fn record_heartbeat(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
        current_question: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut guard = self.attempts()?;
        let Some(attempt) = owned_in_progress(&mut guard, attempt_id, student_id) else {
            return Ok(false);
        };
        attempt.last_heartbeat = Some(at);
        attempt.current_question = current_question;
        attempt.updated_at = now;
        Ok(true)
    }

    async fn save_autosave(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        data: AutoSaveData,
    ) -> Result<bool> {
        let mut guard = self.attempts()?;
        let Some(attempt) = owned_in_progress(&mut guard, attempt_id, student_id) else {
            return Ok(false);
        };
        attempt.time_spent = attempt.time_spent.max(data.time_spent);
        attempt.updated_at = data.last_saved;
        attempt.auto_save_data = Some(data);
        Ok(true)
    }

    async fn record_action(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        question_index: i32,
        question_id: &str,
        event: &ActionEvent,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut guard = self.attempts()?;
        let Some(attempt) = owned_in_progress(&mut guard, attempt_id, student_id) else {
            return Ok(false);
        };
        attempt.answer_entry(question_index, question_id).apply(event)?;
        attempt.updated_at = now;
        Ok(true)
    }

    async fn finalize(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        finalization: &Finalization,
        questions: &[Question],
    ) -> Result<Option<Attempt>> {
        let mut guard = self.attempts()?;
        let Some(attempt) = owned_in_progress(&mut guard, attempt_id, student_id) else {
            return Ok(None);
        };

        attempt.score = GradingService::grade(questions, attempt.score.total, &mut attempt.answers);
        attempt.status = finalization.outcome.status();
        attempt.submit_reason = finalization.outcome.reason();
        attempt.end_time = Some(finalization.end_time);
        attempt.time_spent = finalization.final_time_spent(attempt.time_spent, attempt.start_time);
        attempt.updated_at = finalization.end_time;
        Ok(Some(attempt.clone()))
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>> {
        Ok(self
            .attempts()?
            .values()
            .filter(|a| a.is_in_progress() && a.last_heartbeat.is_some_and(|hb| hb < cutoff))
            .cloned()
            .collect())
    }

    async fn list_terminal_for_test(&self, test_id: Uuid) -> Result<Vec<Attempt>> {
        Ok(self
            .attempts()?
            .values()
            .filter(|a| a.test_id == test_id && a.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn set_rank(&self, attempt_id: Uuid, rank: i32) -> Result<bool> {
        let mut guard = self.attempts()?;
        match guard.get_mut(&attempt_id) {
            Some(attempt) if attempt.status.is_terminal() => {
                attempt.rank = Some(rank);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.attempts().map(|_| ())
    }
}

#[async_trait]
impl TestCatalog for MemoryStore {
    async fn find_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        Ok(self.tests()?.get(&test_id).cloned())
    }

    async fn insert_test(&self, test: Test) -> Result<Test> {
        self.tests()?.insert(test.id, test.clone());
        Ok(test)
    }
}
