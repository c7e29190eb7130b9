use crate::database::store::{AttemptStore, TestCatalog};
use crate::dto::attempt_dto::TrackTimeRequest;
use crate::error::{Error, Result};
use crate::models::question::{Question, QuestionDetails};
use crate::models::test::Test;
use crate::models::timing::{ActionEvent, AnswerValue};
use crate::services::attempt_service::rejection;
use crate::utils::time::Clock;
use crate::utils::validation::field_error;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Records client-reported per-question actions. Deltas and timestamps are
/// taken as reported; the log is not a server-verified clock.
#[derive(Clone)]
pub struct TimingService {
    store: Arc<dyn AttemptStore>,
    tests: Arc<dyn TestCatalog>,
    clock: Arc<dyn Clock>,
}

impl TimingService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        tests: Arc<dyn TestCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tests,
            clock,
        }
    }

    pub async fn record_action(&self, student_id: Uuid, req: TrackTimeRequest) -> Result<()> {
        req.validate()?;

        let attempt = self
            .store
            .find_attempt(req.attempt_id)
            .await?
            .filter(|a| a.student_id == student_id)
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", req.attempt_id)))?;
        if attempt.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "Cannot track time on attempt {}: it is {}",
                attempt.id, attempt.status
            )));
        }

        let test = self
            .tests
            .find_test(attempt.test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", attempt.test_id)))?;
        let answer = req.answer_value();
        let question = check_answer(&test, req.question_index, answer)?;

        let event = ActionEvent {
            action: req.action,
            time_spent: req.time_spent,
            timestamp: req.timestamp,
            answer,
        };
        let applied = self
            .store
            .record_action(
                req.attempt_id,
                student_id,
                req.question_index,
                &question.id,
                &event,
                self.clock.now(),
            )
            .await?;
        if !applied {
            return Err(rejection(self.store.as_ref(), req.attempt_id, student_id, "track time on").await);
        }

        tracing::debug!(
            attempt_id = %req.attempt_id,
            question_index = req.question_index,
            action = req.action.as_str(),
            time_spent = req.time_spent,
            "question action recorded"
        );
        Ok(())
    }
}

/// Resolves `question_index` within `test` and checks that `answer` fits the
/// question: an existing option for single choice, a number for numerical.
pub fn check_answer(test: &Test, question_index: i32, answer: Option<AnswerValue>) -> Result<&Question> {
    let question = usize::try_from(question_index)
        .ok()
        .and_then(|idx| test.question(idx))
        .ok_or_else(|| {
            Error::Validation(field_error(
                "question_index",
                "out_of_range",
                format!(
                    "question_index {} is outside a test of {} questions",
                    question_index,
                    test.questions.len()
                ),
            ))
        })?;

    match (&question.details, answer) {
        (QuestionDetails::SingleChoice(sc), Some(AnswerValue::Selected(idx)))
            if idx < 0 || idx as usize >= sc.options.len() =>
        {
            Err(Error::Validation(field_error(
                "selected_answer",
                "out_of_range",
                format!("option {} does not exist", idx),
            )))
        }
        (QuestionDetails::SingleChoice(_), Some(AnswerValue::Numerical(_))) => {
            Err(Error::Validation(field_error(
                "numerical_answer",
                "wrong_kind",
                "this question takes selected_answer",
            )))
        }
        (QuestionDetails::Numerical(_), Some(AnswerValue::Selected(_))) => {
            Err(Error::Validation(field_error(
                "selected_answer",
                "wrong_kind",
                "this question takes numerical_answer",
            )))
        }
        _ => Ok(question),
    }
}
