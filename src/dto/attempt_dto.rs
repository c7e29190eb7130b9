use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::attempt::{Attempt, AttemptStatus, AutoSubmitReason, Score};
use crate::models::test::PublicTest;
use crate::models::timing::{AnswerValue, QuestionAction};
use crate::utils::validation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptRequest {
    pub test_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAttemptResponse {
    pub attempt: Attempt,
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AutosaveRequest {
    pub attempt_id: Uuid,
    #[serde(default)]
    pub answers: Vec<JsonValue>,
    #[validate(range(min = 0))]
    pub time_spent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveResponse {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub attempt_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub current_question: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_track_time"))]
pub struct TrackTimeRequest {
    pub attempt_id: Uuid,
    #[validate(range(min = 0))]
    pub question_index: i32,
    pub action: QuestionAction,
    /// Seconds since the previous event, capped at one day.
    #[validate(range(min = 0, max = 86400))]
    pub time_spent: i64,
    pub timestamp: DateTime<Utc>,
    pub selected_answer: Option<i32>,
    pub numerical_answer: Option<f64>,
}

impl TrackTimeRequest {
    pub fn answer_value(&self) -> Option<AnswerValue> {
        match (self.selected_answer, self.numerical_answer) {
            (Some(idx), _) => Some(AnswerValue::Selected(idx)),
            (None, Some(v)) => Some(AnswerValue::Numerical(v)),
            (None, None) => None,
        }
    }
}

fn validate_track_time(req: &TrackTimeRequest) -> Result<(), ValidationError> {
    if req.selected_answer.is_some() && req.numerical_answer.is_some() {
        return Err(validation::error(
            "exclusive_answer",
            "selected_answer and numerical_answer are mutually exclusive",
        ));
    }
    if req.action == QuestionAction::Answer && req.answer_value().is_none() {
        return Err(validation::error(
            "missing_answer",
            "an answer action needs selected_answer or numerical_answer",
        ));
    }
    if req.numerical_answer.is_some_and(|v| !v.is_finite()) {
        return Err(validation::error("invalid_number", "numerical_answer must be finite"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackTimeResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSubmitRequest {
    pub attempt_id: Uuid,
    pub reason: AutoSubmitReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSubmitResponse {
    pub status: AttemptStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VisibilityRequest {
    pub attempt_id: Uuid,
    #[validate(range(min = 0))]
    pub hidden_for_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityResponse {
    pub status: AttemptStatus,
    pub auto_submitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_index: i32,
    pub selected_answer: Option<i32>,
    pub numerical_answer: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    pub attempt_id: Uuid,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    #[validate(range(min = 0))]
    pub time_spent: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub attempt_id: Uuid,
    pub status: AttemptStatus,
    pub score: Score,
    /// True when another request finalized the attempt first.
    pub already_finalized: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptViewResponse {
    pub attempt: Attempt,
    pub test: PublicTest,
    pub time_remaining_secs: i64,
}
