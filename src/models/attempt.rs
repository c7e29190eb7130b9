use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::timing::QuestionAnswer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    AutoSubmitted,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::AutoSubmitted => "auto-submitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "auto-submitted" => Ok(AttemptStatus::AutoSubmitted),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt was finalized without the student pressing submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoSubmitReason {
    PageHidden,
    PageUnload,
    HeartbeatTimeout,
}

impl AutoSubmitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoSubmitReason::PageHidden => "page-hidden",
            AutoSubmitReason::PageUnload => "page-unload",
            AutoSubmitReason::HeartbeatTimeout => "heartbeat-timeout",
        }
    }
}

impl std::str::FromStr for AutoSubmitReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "page-hidden" => Ok(AutoSubmitReason::PageHidden),
            "page-unload" => Ok(AutoSubmitReason::PageUnload),
            "heartbeat-timeout" => Ok(AutoSubmitReason::HeartbeatTimeout),
            other => Err(format!("unknown auto-submit reason '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub obtained: Option<Decimal>,
    pub total: Decimal,
    pub percentage: Option<Decimal>,
}

/// Last client snapshot; scratch data for resuming, never graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoSaveData {
    pub answers: Vec<JsonValue>,
    pub time_spent: i64,
    pub last_saved: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    pub status: AttemptStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub time_spent: i64,
    pub answers: Vec<QuestionAnswer>,
    pub auto_save_data: Option<AutoSaveData>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub current_question: Option<i32>,
    pub score: Score,
    pub submit_reason: Option<AutoSubmitReason>,
    pub rank: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn new(student_id: Uuid, test_id: Uuid, total_marks: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            test_id,
            status: AttemptStatus::InProgress,
            start_time: now,
            end_time: None,
            time_spent: 0,
            answers: Vec::new(),
            auto_save_data: None,
            last_heartbeat: None,
            current_question: None,
            score: Score {
                obtained: None,
                total: total_marks,
                percentage: None,
            },
            submit_reason: None,
            rank: None,
            updated_at: now,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn answer_for(&self, question_index: i32) -> Option<&QuestionAnswer> {
        self.answers
            .iter()
            .find(|a| a.question_index == question_index)
    }

    /// Per-question entry, created on first reference.
    pub fn answer_entry(&mut self, question_index: i32, question_id: &str) -> &mut QuestionAnswer {
        let pos = match self
            .answers
            .iter()
            .position(|a| a.question_index == question_index)
        {
            Some(pos) => pos,
            None => {
                self.answers
                    .push(QuestionAnswer::new(question_index, question_id));
                self.answers.len() - 1
            }
        };
        &mut self.answers[pos]
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.has_answer()).count()
    }
}

/// Terminal outcome requested by a finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    AutoSubmitted(AutoSubmitReason),
}

impl Outcome {
    pub fn status(&self) -> AttemptStatus {
        match self {
            Outcome::Completed => AttemptStatus::Completed,
            Outcome::AutoSubmitted(_) => AttemptStatus::AutoSubmitted,
        }
    }

    pub fn reason(&self) -> Option<AutoSubmitReason> {
        match self {
            Outcome::Completed => None,
            Outcome::AutoSubmitted(reason) => Some(*reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finalization {
    pub outcome: Outcome,
    pub end_time: DateTime<Utc>,
    /// Client-reported elapsed seconds, if any; the stored value never decreases.
    pub reported_time_spent: Option<i64>,
}

impl Finalization {
    /// Final elapsed seconds: the larger of stored and reported time, or the
    /// wall-clock span when the client never reported any.
    pub fn final_time_spent(&self, stored: i64, start_time: DateTime<Utc>) -> i64 {
        let reported = stored.max(self.reported_time_spent.unwrap_or(0));
        if reported > 0 {
            reported
        } else {
            (self.end_time - start_time).num_seconds().max(0)
        }
    }
}
