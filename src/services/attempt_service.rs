use crate::database::store::{AttemptStore, TestCatalog};
use crate::dto::attempt_dto::{AttemptViewResponse, SubmitRequest, TrackTimeRequest};
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, Finalization, Outcome};
use crate::models::test::Test;
use crate::models::timing::QuestionAction;
use crate::services::timing_service::{check_answer, TimingService};
use crate::utils::time::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// The attempt lifecycle: `in-progress` to exactly one of `completed` or
/// `auto-submitted`.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
    tests: Arc<dyn TestCatalog>,
    clock: Arc<dyn Clock>,
    timing: TimingService,
}

#[derive(Debug, Clone)]
pub struct StartedAttempt {
    pub attempt: Attempt,
    pub resumed: bool,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub attempt: Attempt,
    pub already_finalized: bool,
}

impl AttemptService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        tests: Arc<dyn TestCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timing = TimingService::new(store.clone(), tests.clone(), clock.clone());
        Self {
            store,
            tests,
            clock,
            timing,
        }
    }

    pub async fn load_test(&self, test_id: Uuid) -> Result<Test> {
        self.tests
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    /// The student's attempt, or `NotFound` when absent or owned by someone else.
    pub async fn get_owned(&self, attempt_id: Uuid, student_id: Uuid) -> Result<Attempt> {
        self.store
            .find_attempt(attempt_id)
            .await?
            .filter(|a| a.student_id == student_id)
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    pub async fn start(&self, student_id: Uuid, test_id: Uuid) -> Result<StartedAttempt> {
        let test = self.load_test(test_id).await?;
        if !test.is_active {
            return Err(Error::NotFound(format!("Test {} is not available", test_id)));
        }

        let candidate = Attempt::new(student_id, test_id, test.total_marks, self.clock.now());
        let (attempt, created) = self.store.insert_or_resume(candidate).await?;
        if created {
            tracing::info!(attempt_id = %attempt.id, %student_id, %test_id, "attempt started");
        } else {
            tracing::info!(attempt_id = %attempt.id, %student_id, %test_id, "attempt resumed");
        }

        Ok(StartedAttempt {
            attempt,
            resumed: !created,
        })
    }

    /// Moves an in-progress attempt to its terminal status and grades it.
    ///
    /// Fails with `InvalidTransition` if the attempt is already terminal and
    /// `NotFound` if it does not exist or belongs to another student.
    pub async fn finalize(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        outcome: Outcome,
        reported_time_spent: Option<i64>,
    ) -> Result<Attempt> {
        let current = self.get_owned(attempt_id, student_id).await?;
        if current.status.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "Attempt {} is already {}",
                attempt_id, current.status
            )));
        }
        let test = self.load_test(current.test_id).await?;

        let finalization = Finalization {
            outcome,
            end_time: self.clock.now(),
            reported_time_spent,
        };
        match self
            .store
            .finalize(attempt_id, student_id, &finalization, &test.questions)
            .await?
        {
            Some(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    status = %attempt.status,
                    reason = ?attempt.submit_reason,
                    obtained = ?attempt.score.obtained,
                    total = %attempt.score.total,
                    "attempt finalized"
                );
                Ok(attempt)
            }
            None => Err(rejection(self.store.as_ref(), attempt_id, student_id, "finalize").await),
        }
    }

    /// Manual submit. Answers in the payload go through the timing tracker so
    /// `answers[]` stays the single graded source. Every answer is checked
    /// against the test before any is recorded. Losing a race against
    /// auto-submit is reported as `already_finalized`, not as an error.
    pub async fn submit(&self, student_id: Uuid, req: SubmitRequest) -> Result<SubmitOutcome> {
        req.validate()?;
        let now = self.clock.now();

        let tracks = req
            .answers
            .iter()
            .map(|answer| TrackTimeRequest {
                attempt_id: req.attempt_id,
                question_index: answer.question_index,
                action: QuestionAction::Answer,
                time_spent: 0,
                timestamp: now,
                selected_answer: answer.selected_answer,
                numerical_answer: answer.numerical_answer,
            })
            .collect::<Vec<_>>();
        for track in &tracks {
            track.validate()?;
        }

        let current = self.get_owned(req.attempt_id, student_id).await?;
        if current.status.is_terminal() {
            return self.already_finalized(req.attempt_id, student_id).await;
        }
        if !tracks.is_empty() {
            let test = self.load_test(current.test_id).await?;
            for track in &tracks {
                check_answer(&test, track.question_index, track.answer_value())?;
            }
        }

        for track in tracks {
            match self.timing.record_action(student_id, track).await {
                Ok(()) => {}
                Err(Error::InvalidState(_)) => {
                    return self.already_finalized(req.attempt_id, student_id).await;
                }
                Err(e) => return Err(e),
            }
        }

        match self
            .finalize(req.attempt_id, student_id, Outcome::Completed, req.time_spent)
            .await
        {
            Ok(attempt) => Ok(SubmitOutcome {
                attempt,
                already_finalized: false,
            }),
            Err(Error::InvalidTransition(_)) => self.already_finalized(req.attempt_id, student_id).await,
            Err(e) => Err(e),
        }
    }

    async fn already_finalized(&self, attempt_id: Uuid, student_id: Uuid) -> Result<SubmitOutcome> {
        let attempt = self.get_owned(attempt_id, student_id).await?;
        tracing::warn!(
            attempt_id = %attempt_id,
            status = %attempt.status,
            "submit arrived after the attempt was finalized"
        );
        Ok(SubmitOutcome {
            attempt,
            already_finalized: true,
        })
    }

    /// Student-facing view: the attempt plus the test with its answer key removed.
    pub async fn view(&self, attempt_id: Uuid, student_id: Uuid) -> Result<AttemptViewResponse> {
        let attempt = self.get_owned(attempt_id, student_id).await?;
        let test = self.load_test(attempt.test_id).await?;
        let time_remaining_secs = (i64::from(test.duration_minutes) * 60 - attempt.time_spent).max(0);

        Ok(AttemptViewResponse {
            test: test.to_public(),
            attempt,
            time_remaining_secs,
        })
    }

    /// Competition ranking ("1, 1, 3") of a test's finalized attempts by
    /// obtained score. Returns how many attempts were ranked.
    pub async fn annotate_ranks(&self, test_id: Uuid) -> Result<usize> {
        self.load_test(test_id).await?;
        let attempts = self.store.list_terminal_for_test(test_id).await?;
        let ranks = competition_ranks(&attempts);

        let mut ranked = 0;
        for (attempt_id, rank) in ranks {
            if self.store.set_rank(attempt_id, rank).await? {
                ranked += 1;
            }
        }
        tracing::info!(%test_id, ranked, "ranks annotated");
        Ok(ranked)
    }
}

fn competition_ranks(attempts: &[Attempt]) -> HashMap<Uuid, i32> {
    let mut scored: Vec<_> = attempts
        .iter()
        .map(|a| (a.id, a.score.obtained.unwrap_or_default()))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let mut ranks = HashMap::with_capacity(scored.len());
    let mut previous = None;
    let mut rank = 0;
    for (position, (id, score)) in scored.into_iter().enumerate() {
        if previous != Some(score) {
            rank = position as i32 + 1;
            previous = Some(score);
        }
        ranks.insert(id, rank);
    }
    ranks
}

/// Explains why a scoped conditional update matched nothing.
pub(crate) async fn rejection(
    store: &dyn AttemptStore,
    attempt_id: Uuid,
    student_id: Uuid,
    operation: &str,
) -> Error {
    match store.find_attempt(attempt_id).await {
        Ok(Some(attempt)) if attempt.student_id == student_id => {
            if attempt.status.is_terminal() {
                if operation == "finalize" {
                    Error::InvalidTransition(format!("Attempt {} is already {}", attempt_id, attempt.status))
                } else {
                    Error::InvalidState(format!(
                        "Cannot {} attempt {}: it is {}",
                        operation, attempt_id, attempt.status
                    ))
                }
            } else {
                Error::Internal(format!("Attempt {} rejected {} while in progress", attempt_id, operation))
            }
        }
        Ok(_) => Error::NotFound(format!("Attempt {} not found", attempt_id)),
        Err(e) => e,
    }
}
