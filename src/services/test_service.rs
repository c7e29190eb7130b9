use crate::database::store::TestCatalog;
use crate::dto::admin_dto::CreateTestRequest;
use crate::error::{Error, Result};
use crate::models::question::{Question, QuestionDetails};
use crate::models::test::Test;
use crate::utils::time::Clock;
use crate::utils::validation::field_error;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct TestService {
    tests: Arc<dyn TestCatalog>,
    clock: Arc<dyn Clock>,
}

impl TestService {
    pub fn new(tests: Arc<dyn TestCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self { tests, clock }
    }

    pub async fn create_test(&self, req: CreateTestRequest) -> Result<Test> {
        req.validate()?;

        let mut seen = HashSet::new();
        if let Some(dup) = req.questions.iter().find(|q| !seen.insert(q.id.as_str())) {
            return Err(Error::Validation(field_error(
                "questions",
                "duplicate_id",
                format!("question id '{}' is used more than once", dup.id),
            )));
        }
        for question in &req.questions {
            check_answer_key(question)?;
        }

        let total_marks = req
            .total_marks
            .unwrap_or_else(|| req.questions.iter().map(|q| q.marks).sum::<Decimal>());

        let test = Test {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            duration_minutes: req.duration_minutes,
            total_marks,
            questions: req.questions,
            is_active: req.is_active.unwrap_or(true),
            created_at: self.clock.now(),
        };

        let test = self.tests.insert_test(test).await?;
        tracing::info!(test_id = %test.id, questions = test.questions.len(), "test created");
        Ok(test)
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        self.tests
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }
}

/// A question must be answerable: the correct option exists and the
/// numerical tolerance is not negative.
fn check_answer_key(question: &Question) -> Result<()> {
    match &question.details {
        QuestionDetails::SingleChoice(sc)
            if sc.correct_answer < 0 || sc.correct_answer as usize >= sc.options.len() =>
        {
            Err(Error::Validation(field_error(
                "questions",
                "answer_key_out_of_range",
                format!(
                    "question '{}' marks option {} correct but has {} options",
                    question.id,
                    sc.correct_answer,
                    sc.options.len()
                ),
            )))
        }
        QuestionDetails::Numerical(n) if n.tolerance.is_some_and(|t| !(t >= 0.0)) => {
            Err(Error::Validation(field_error(
                "questions",
                "negative_tolerance",
                format!("question '{}' has a negative tolerance", question.id),
            )))
        }
        _ => Ok(()),
    }
}
