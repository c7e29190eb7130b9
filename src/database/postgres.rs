use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::database::store::{AttemptStore, TestCatalog};
use crate::error::{Error, Result};
use crate::models::attempt::{
    Attempt, AttemptStatus, AutoSaveData, AutoSubmitReason, Finalization, Score,
};
use crate::models::question::Question;
use crate::models::test::{Test, TestRow};
use crate::models::timing::{
    ActionEvent, ActionLogEntry, AnswerValue, QuestionAction, QuestionAnswer, QuestionState,
    TimeTracking, ViewSession,
};
use crate::services::grading_service::GradingService;

const ATTEMPT_COLUMNS: &str = r#"
    id, student_id, test_id, status, start_time, end_time, time_spent, auto_save_data,
    last_heartbeat, current_question, score_obtained, score_total, score_percentage,
    submit_reason, rank, updated_at
"#;

const ANSWER_COLUMNS: &str = r#"
    attempt_id, question_index, question_id, selected_answer, numerical_answer, is_correct,
    marks_obtained, question_state, first_viewed_at, last_viewed_at, total_view_time
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_many(&self, ids: Vec<Uuid>) -> Result<Vec<Attempt>> {
        let mut conn = self.pool.acquire().await?;
        let mut attempts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(attempt) = load_attempt(&mut conn, id).await? {
                attempts.push(attempt);
            }
        }
        Ok(attempts)
    }
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    student_id: Uuid,
    test_id: Uuid,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    time_spent: i64,
    auto_save_data: Option<JsonValue>,
    last_heartbeat: Option<DateTime<Utc>>,
    current_question: Option<i32>,
    score_obtained: Option<Decimal>,
    score_total: Decimal,
    score_percentage: Option<Decimal>,
    submit_reason: Option<String>,
    rank: Option<i32>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AnswerRow {
    #[allow(dead_code)]
    attempt_id: Uuid,
    question_index: i32,
    question_id: String,
    selected_answer: Option<i32>,
    numerical_answer: Option<f64>,
    is_correct: Option<bool>,
    marks_obtained: Option<Decimal>,
    question_state: String,
    first_viewed_at: Option<DateTime<Utc>>,
    last_viewed_at: Option<DateTime<Utc>>,
    total_view_time: i64,
}

impl AnswerRow {
    fn into_answer(self) -> Result<QuestionAnswer> {
        Ok(QuestionAnswer {
            question_index: self.question_index,
            question_id: self.question_id,
            selected_answer: self.selected_answer,
            numerical_answer: self.numerical_answer,
            is_correct: self.is_correct,
            marks_obtained: self.marks_obtained,
            question_state: self
                .question_state
                .parse::<QuestionState>()
                .map_err(Error::Internal)?,
            time_tracking: TimeTracking {
                first_viewed_at: self.first_viewed_at,
                last_viewed_at: self.last_viewed_at,
                total_view_time: self.total_view_time,
                view_sessions: Vec::new(),
            },
            action_log: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
struct ViewSessionRow {
    question_index: i32,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    duration: i64,
}

#[derive(Debug, FromRow)]
struct ActionLogRow {
    question_index: i32,
    action: String,
    time_spent: i64,
    recorded_at: DateTime<Utc>,
    answer: Option<JsonValue>,
}

async fn load_answer(
    conn: &mut PgConnection,
    attempt_id: Uuid,
    question_index: i32,
) -> Result<Option<QuestionAnswer>> {
    let row = sqlx::query_as::<_, AnswerRow>(&format!(
        "SELECT {} FROM attempt_answers WHERE attempt_id = $1 AND question_index = $2",
        ANSWER_COLUMNS
    ))
    .bind(attempt_id)
    .bind(question_index)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(AnswerRow::into_answer).transpose()
}

async fn load_answers(conn: &mut PgConnection, attempt_id: Uuid) -> Result<Vec<QuestionAnswer>> {
    let rows = sqlx::query_as::<_, AnswerRow>(&format!(
        "SELECT {} FROM attempt_answers WHERE attempt_id = $1 ORDER BY question_index",
        ANSWER_COLUMNS
    ))
    .bind(attempt_id)
    .fetch_all(&mut *conn)
    .await?;
    let mut answers = rows
        .into_iter()
        .map(AnswerRow::into_answer)
        .collect::<Result<Vec<_>>>()?;

    let sessions = sqlx::query_as::<_, ViewSessionRow>(
        r#"SELECT question_index, started_at, ended_at, duration
           FROM attempt_view_sessions WHERE attempt_id = $1 ORDER BY id"#,
    )
    .bind(attempt_id)
    .fetch_all(&mut *conn)
    .await?;
    for s in sessions {
        if let Some(answer) = answers.iter_mut().find(|a| a.question_index == s.question_index) {
            answer.time_tracking.view_sessions.push(ViewSession {
                started_at: s.started_at,
                ended_at: s.ended_at,
                duration: s.duration,
            });
        }
    }

    let log = sqlx::query_as::<_, ActionLogRow>(
        r#"SELECT question_index, action, time_spent, recorded_at, answer
           FROM attempt_action_log WHERE attempt_id = $1 ORDER BY id"#,
    )
    .bind(attempt_id)
    .fetch_all(&mut *conn)
    .await?;
    for entry in log {
        if let Some(answer) = answers.iter_mut().find(|a| a.question_index == entry.question_index) {
            answer.action_log.push(ActionLogEntry {
                action: entry
                    .action
                    .parse::<QuestionAction>()
                    .map_err(Error::Internal)?,
                time_spent: entry.time_spent,
                timestamp: entry.recorded_at,
                answer: entry
                    .answer
                    .map(serde_json::from_value::<AnswerValue>)
                    .transpose()?,
            });
        }
    }

    Ok(answers)
}

async fn load_attempt(conn: &mut PgConnection, attempt_id: Uuid) -> Result<Option<Attempt>> {
    let row = sqlx::query_as::<_, AttemptRow>(&format!(
        "SELECT {} FROM attempts WHERE id = $1",
        ATTEMPT_COLUMNS
    ))
    .bind(attempt_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let answers = load_answers(conn, attempt_id).await?;
    Ok(Some(Attempt {
        id: row.id,
        student_id: row.student_id,
        test_id: row.test_id,
        status: row.status.parse::<AttemptStatus>().map_err(Error::Internal)?,
        start_time: row.start_time,
        end_time: row.end_time,
        time_spent: row.time_spent,
        answers,
        auto_save_data: row
            .auto_save_data
            .map(serde_json::from_value::<AutoSaveData>)
            .transpose()?,
        last_heartbeat: row.last_heartbeat,
        current_question: row.current_question,
        score: Score {
            obtained: row.score_obtained,
            total: row.score_total,
            percentage: row.score_percentage,
        },
        submit_reason: row
            .submit_reason
            .map(|r| r.parse::<AutoSubmitReason>())
            .transpose()
            .map_err(Error::Internal)?,
        rank: row.rank,
        updated_at: row.updated_at,
    }))
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        let mut conn = self.pool.acquire().await?;
        load_attempt(&mut conn, attempt_id).await
    }

    async fn find_in_progress(&self, student_id: Uuid, test_id: Uuid) -> Result<Option<Attempt>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM attempts
               WHERE student_id = $1 AND test_id = $2 AND status = 'in-progress'"#,
        )
        .bind(student_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => self.find_attempt(id).await,
            None => Ok(None),
        }
    }

    async fn insert_or_resume(&self, attempt: Attempt) -> Result<(Attempt, bool)> {
        // A concurrent finalize can close the conflicting attempt between the
        // insert and the lookup; retrying then inserts cleanly.
        for _ in 0..3 {
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r#"
                INSERT INTO attempts (id, student_id, test_id, status, start_time, time_spent, score_total, updated_at)
                VALUES ($1, $2, $3, 'in-progress', $4, 0, $5, $4)
                ON CONFLICT (student_id, test_id) WHERE status = 'in-progress' DO NOTHING
                RETURNING id
                "#,
            )
            .bind(attempt.id)
            .bind(attempt.student_id)
            .bind(attempt.test_id)
            .bind(attempt.start_time)
            .bind(attempt.score.total)
            .fetch_optional(&self.pool)
            .await?;

            if inserted.is_some() {
                return Ok((attempt, true));
            }
            if let Some(existing) = self.find_in_progress(attempt.student_id, attempt.test_id).await? {
                return Ok((existing, false));
            }
        }
        Err(Error::Internal(format!(
            "could not start or resume attempt for student {} on test {}",
            attempt.student_id, attempt.test_id
        )))
    }

    async fn record_heartbeat(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        at: DateTime<Utc>,
        current_question: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET last_heartbeat = $3, current_question = $4, updated_at = $5
            WHERE id = $1 AND student_id = $2 AND status = 'in-progress'
            "#,
        )
        .bind(attempt_id)
        .bind(student_id)
        .bind(at)
        .bind(current_question)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_autosave(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        data: AutoSaveData,
    ) -> Result<bool> {
        let snapshot = serde_json::to_value(&data)?;
        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET auto_save_data = $3,
                time_spent = GREATEST(time_spent, $4),
                updated_at = $5
            WHERE id = $1 AND student_id = $2 AND status = 'in-progress'
            "#,
        )
        .bind(attempt_id)
        .bind(student_id)
        .bind(snapshot)
        .bind(data.time_spent)
        .bind(data.last_saved)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
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
        let mut tx = self.pool.begin().await?;

        // Locks the attempt row until commit, serialising events per attempt
        // and excluding a concurrent finalize.
        let locked: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE attempts SET updated_at = $3
            WHERE id = $1 AND student_id = $2 AND status = 'in-progress'
            RETURNING id
            "#,
        )
        .bind(attempt_id)
        .bind(student_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Ok(false);
        }

        let mut answer = load_answer(&mut tx, attempt_id, question_index)
            .await?
            .unwrap_or_else(|| QuestionAnswer::new(question_index, question_id));
        let applied = answer.apply(event)?;
        let added_time = applied.view_session.as_ref().map_or(0, |s| s.duration);

        sqlx::query(
            r#"
            INSERT INTO attempt_answers (
                attempt_id, question_index, question_id, selected_answer, numerical_answer,
                question_state, first_viewed_at, last_viewed_at, total_view_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (attempt_id, question_index) DO UPDATE SET
                selected_answer = EXCLUDED.selected_answer,
                numerical_answer = EXCLUDED.numerical_answer,
                question_state = EXCLUDED.question_state,
                first_viewed_at = COALESCE(attempt_answers.first_viewed_at, EXCLUDED.first_viewed_at),
                last_viewed_at = EXCLUDED.last_viewed_at,
                total_view_time = attempt_answers.total_view_time + $9
            "#,
        )
        .bind(attempt_id)
        .bind(question_index)
        .bind(&answer.question_id)
        .bind(answer.selected_answer)
        .bind(answer.numerical_answer)
        .bind(answer.question_state.as_str())
        .bind(answer.time_tracking.first_viewed_at)
        .bind(answer.time_tracking.last_viewed_at)
        .bind(added_time)
        .execute(&mut *tx)
        .await?;

        if let Some(session) = &applied.view_session {
            sqlx::query(
                r#"
                INSERT INTO attempt_view_sessions (attempt_id, question_index, started_at, ended_at, duration)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(attempt_id)
            .bind(question_index)
            .bind(session.started_at)
            .bind(session.ended_at)
            .bind(session.duration)
            .execute(&mut *tx)
            .await?;
        }

        let logged_answer = applied
            .log_entry
            .answer
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO attempt_action_log (attempt_id, question_index, action, time_spent, recorded_at, answer)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt_id)
        .bind(question_index)
        .bind(applied.log_entry.action.as_str())
        .bind(applied.log_entry.time_spent)
        .bind(applied.log_entry.timestamp)
        .bind(logged_answer)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn finalize(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        finalization: &Finalization,
        questions: &[Question],
    ) -> Result<Option<Attempt>> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_as::<_, (DateTime<Utc>, i64, Decimal)>(
            r#"
            SELECT start_time, time_spent, score_total FROM attempts
            WHERE id = $1 AND student_id = $2 AND status = 'in-progress'
            FOR UPDATE
            "#,
        )
        .bind(attempt_id)
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((start_time, stored_time_spent, total)) = locked else {
            return Ok(None);
        };

        let mut answers = load_answers(&mut tx, attempt_id).await?;
        let score = GradingService::grade(questions, total, &mut answers);
        for answer in &answers {
            sqlx::query(
                r#"
                UPDATE attempt_answers SET is_correct = $3, marks_obtained = $4
                WHERE attempt_id = $1 AND question_index = $2
                "#,
            )
            .bind(attempt_id)
            .bind(answer.question_index)
            .bind(answer.is_correct)
            .bind(answer.marks_obtained)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            r#"
            UPDATE attempts
            SET status = $2, end_time = $3, time_spent = $4,
                score_obtained = $5, score_percentage = $6, submit_reason = $7,
                updated_at = $3
            WHERE id = $1 AND status = 'in-progress'
            "#,
        )
        .bind(attempt_id)
        .bind(finalization.outcome.status().as_str())
        .bind(finalization.end_time)
        .bind(finalization.final_time_spent(stored_time_spent, start_time))
        .bind(score.obtained)
        .bind(score.percentage)
        .bind(finalization.outcome.reason().map(|r| r.as_str()))
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let finalized = load_attempt(&mut tx, attempt_id).await?;
        tx.commit().await?;
        Ok(finalized)
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM attempts
            WHERE status = 'in-progress'
              AND last_heartbeat IS NOT NULL
              AND last_heartbeat < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        self.load_many(ids).await
    }

    async fn list_terminal_for_test(&self, test_id: Uuid) -> Result<Vec<Attempt>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM attempts WHERE test_id = $1 AND status <> 'in-progress'"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        self.load_many(ids).await
    }

    async fn set_rank(&self, attempt_id: Uuid, rank: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE attempts SET rank = $2 WHERE id = $1 AND status <> 'in-progress'"#,
        )
        .bind(attempt_id)
        .bind(rank)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TestCatalog for PgStore {
    async fn find_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        let row = sqlx::query_as::<_, TestRow>(
            r#"
            SELECT id, title, description, duration_minutes, total_marks, questions, is_active, created_at
            FROM tests WHERE id = $1
            "#,
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Test::try_from).transpose()?)
    }

    async fn insert_test(&self, test: Test) -> Result<Test> {
        let row = sqlx::query_as::<_, TestRow>(
            r#"
            INSERT INTO tests (id, title, description, duration_minutes, total_marks, questions, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, title, description, duration_minutes, total_marks, questions, is_active, created_at
            "#,
        )
        .bind(test.id)
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.duration_minutes)
        .bind(test.total_marks)
        .bind(serde_json::to_value(&test.questions)?)
        .bind(test.is_active)
        .bind(test.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(Test::try_from(row)?)
    }
}
