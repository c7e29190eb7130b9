//! Per-question time tracking and question-state transitions.
//!
//! Everything here is pure: stores call [`QuestionAnswer::apply`] while holding
//! whatever lock makes the update atomic for them.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionAction {
    View,
    Answer,
    Mark,
    Clear,
    NavigateAway,
}

impl QuestionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionAction::View => "view",
            QuestionAction::Answer => "answer",
            QuestionAction::Mark => "mark",
            QuestionAction::Clear => "clear",
            QuestionAction::NavigateAway => "navigate-away",
        }
    }
}

impl std::str::FromStr for QuestionAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "view" => Ok(QuestionAction::View),
            "answer" => Ok(QuestionAction::Answer),
            "mark" => Ok(QuestionAction::Mark),
            "clear" => Ok(QuestionAction::Clear),
            "navigate-away" => Ok(QuestionAction::NavigateAway),
            other => Err(format!("unknown question action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionState {
    #[default]
    NotVisited,
    Visited,
    Answered,
    MarkedForReview,
    AnsweredAndMarked,
}

impl QuestionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionState::NotVisited => "not-visited",
            QuestionState::Visited => "visited",
            QuestionState::Answered => "answered",
            QuestionState::MarkedForReview => "marked-for-review",
            QuestionState::AnsweredAndMarked => "answered-and-marked",
        }
    }

    fn is_marked(&self) -> bool {
        matches!(
            self,
            QuestionState::MarkedForReview | QuestionState::AnsweredAndMarked
        )
    }

    /// State after `action` given whether an answer is held once the action is applied.
    pub fn next(self, action: QuestionAction, has_answer: bool) -> QuestionState {
        let marked = self.is_marked();
        match action {
            QuestionAction::View | QuestionAction::NavigateAway => match self {
                QuestionState::NotVisited => QuestionState::Visited,
                other => other,
            },
            QuestionAction::Mark => match (marked, has_answer) {
                (false, true) => QuestionState::AnsweredAndMarked,
                (false, false) => QuestionState::MarkedForReview,
                (true, true) => QuestionState::Answered,
                (true, false) => QuestionState::Visited,
            },
            QuestionAction::Answer | QuestionAction::Clear => match (marked, has_answer) {
                (true, true) => QuestionState::AnsweredAndMarked,
                (true, false) => QuestionState::MarkedForReview,
                (false, true) => QuestionState::Answered,
                (false, false) => QuestionState::Visited,
            },
        }
    }
}

impl std::str::FromStr for QuestionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not-visited" => Ok(QuestionState::NotVisited),
            "visited" => Ok(QuestionState::Visited),
            "answered" => Ok(QuestionState::Answered),
            "marked-for-review" => Ok(QuestionState::MarkedForReview),
            "answered-and-marked" => Ok(QuestionState::AnsweredAndMarked),
            other => Err(format!("unknown question state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSession {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub action: QuestionAction,
    pub time_spent: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValue {
    Selected(i32),
    Numerical(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeTracking {
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub total_view_time: i64,
    pub view_sessions: Vec<ViewSession>,
}

/// One client-reported event for a question.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvent {
    pub action: QuestionAction,
    pub time_spent: i64,
    pub timestamp: DateTime<Utc>,
    pub answer: Option<AnswerValue>,
}

/// What an applied event appended, so stores can persist only the new rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAction {
    pub log_entry: ActionLogEntry,
    pub view_session: Option<ViewSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_index: i32,
    pub question_id: String,
    pub selected_answer: Option<i32>,
    pub numerical_answer: Option<f64>,
    pub is_correct: Option<bool>,
    pub marks_obtained: Option<Decimal>,
    pub question_state: QuestionState,
    pub time_tracking: TimeTracking,
    pub action_log: Vec<ActionLogEntry>,
}

impl QuestionAnswer {
    pub fn new(question_index: i32, question_id: impl Into<String>) -> Self {
        Self {
            question_index,
            question_id: question_id.into(),
            selected_answer: None,
            numerical_answer: None,
            is_correct: None,
            marks_obtained: None,
            question_state: QuestionState::NotVisited,
            time_tracking: TimeTracking::default(),
            action_log: Vec::new(),
        }
    }

    pub fn has_answer(&self) -> bool {
        self.selected_answer.is_some() || self.numerical_answer.is_some()
    }

    pub fn answer_value(&self) -> Option<AnswerValue> {
        match (self.selected_answer, self.numerical_answer) {
            (Some(idx), _) => Some(AnswerValue::Selected(idx)),
            (None, Some(v)) => Some(AnswerValue::Numerical(v)),
            (None, None) => None,
        }
    }

    /// Apply one event. Timestamps are client-supplied and never reordered.
    ///
    /// A delta that cannot be placed on the timeline or added to the running
    /// total is rejected before anything is changed.
    pub fn apply(&mut self, event: &ActionEvent) -> Result<AppliedAction> {
        let view_session = if event.time_spent > 0 {
            let started_at = Duration::try_seconds(event.time_spent)
                .and_then(|delta| event.timestamp.checked_sub_signed(delta))
                .ok_or_else(|| out_of_range(event.time_spent))?;
            Some(ViewSession {
                started_at,
                ended_at: event.timestamp,
                duration: event.time_spent,
            })
        } else {
            None
        };
        let total_view_time = self
            .time_tracking
            .total_view_time
            .checked_add(view_session.as_ref().map_or(0, |s| s.duration))
            .ok_or_else(|| out_of_range(event.time_spent))?;

        let tracking = &mut self.time_tracking;
        if tracking.first_viewed_at.is_none() {
            tracking.first_viewed_at = Some(event.timestamp);
        }
        tracking.last_viewed_at = Some(event.timestamp);
        tracking.total_view_time = total_view_time;
        if let Some(session) = &view_session {
            tracking.view_sessions.push(session.clone());
        }

        match (event.action, event.answer) {
            (QuestionAction::Answer, Some(AnswerValue::Selected(idx))) => {
                self.selected_answer = Some(idx);
                self.numerical_answer = None;
            }
            (QuestionAction::Answer, Some(AnswerValue::Numerical(v))) => {
                self.numerical_answer = Some(v);
                self.selected_answer = None;
            }
            (QuestionAction::Clear, _) => {
                self.selected_answer = None;
                self.numerical_answer = None;
            }
            _ => {}
        }
        self.question_state = self.question_state.next(event.action, self.has_answer());

        let log_entry = ActionLogEntry {
            action: event.action,
            time_spent: event.time_spent,
            timestamp: event.timestamp,
            answer: event.answer,
        };
        self.action_log.push(log_entry.clone());

        Ok(AppliedAction {
            log_entry,
            view_session,
        })
    }
}

fn out_of_range(time_spent: i64) -> Error {
    Error::BadRequest(format!("time_spent {} is out of range", time_spent))
}
