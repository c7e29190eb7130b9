use crate::database::store::AttemptStore;
use crate::dto::attempt_dto::HeartbeatRequest;
use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::services::attempt_service::rejection;
use crate::utils::time::{seconds_between, Clock};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct HeartbeatService {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl HeartbeatService {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Records client liveness. The client timestamp is stored as sent.
    pub async fn heartbeat(&self, student_id: Uuid, req: HeartbeatRequest) -> Result<DateTime<Utc>> {
        let attempt = self
            .store
            .find_attempt(req.attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", req.attempt_id)))?;
        if attempt.student_id != student_id {
            tracing::warn!(attempt_id = %req.attempt_id, %student_id, "heartbeat for another student's attempt");
            return Err(Error::Forbidden(format!(
                "Attempt {} belongs to another student",
                req.attempt_id
            )));
        }
        if attempt.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "Attempt {} is {}",
                attempt.id, attempt.status
            )));
        }

        let recorded = self
            .store
            .record_heartbeat(
                req.attempt_id,
                student_id,
                req.timestamp,
                req.current_question,
                self.clock.now(),
            )
            .await?;
        if !recorded {
            return Err(rejection(self.store.as_ref(), req.attempt_id, student_id, "heartbeat").await);
        }

        tracing::debug!(
            attempt_id = %req.attempt_id,
            current_question = ?req.current_question,
            "heartbeat"
        );
        Ok(req.timestamp)
    }

    /// True once an in-progress attempt has been silent for more than
    /// `threshold_secs`. Attempts that never sent a heartbeat are not stale.
    pub fn is_stale(attempt: &Attempt, now: DateTime<Utc>, threshold_secs: i64) -> bool {
        attempt.is_in_progress()
            && attempt
                .last_heartbeat
                .is_some_and(|hb| seconds_between(hb, now) > threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::MockAttemptStore;
    use crate::models::attempt::AttemptStatus;
    use crate::utils::time::ManualClock;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn attempt(student: Uuid) -> Attempt {
        Attempt::new(student, Uuid::new_v4(), Decimal::from(10), Utc::now())
    }

    #[test]
    fn staleness_follows_the_threshold() {
        let now = Utc::now();
        let mut a = attempt(Uuid::new_v4());
        assert!(!HeartbeatService::is_stale(&a, now, 120));

        a.last_heartbeat = Some(now - Duration::seconds(120));
        assert!(!HeartbeatService::is_stale(&a, now, 120));

        a.last_heartbeat = Some(now - Duration::seconds(121));
        assert!(HeartbeatService::is_stale(&a, now, 120));

        a.status = AttemptStatus::Completed;
        assert!(!HeartbeatService::is_stale(&a, now, 120));
    }

    #[tokio::test]
    async fn foreign_heartbeat_is_forbidden_and_not_written() {
        let owner = Uuid::new_v4();
        let existing = attempt(owner);
        let attempt_id = existing.id;

        let mut store = MockAttemptStore::new();
        store
            .expect_find_attempt()
            .returning(move |_| Ok(Some(existing.clone())));
        store.expect_record_heartbeat().never();

        let service = HeartbeatService::new(Arc::new(store), Arc::new(ManualClock::new(Utc::now())));
        let err = service
            .heartbeat(
                Uuid::new_v4(),
                HeartbeatRequest {
                    attempt_id,
                    timestamp: Utc::now(),
                    current_question: Some(1),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn heartbeat_stamps_write_with_service_clock() {
        let owner = Uuid::new_v4();
        let existing = attempt(owner);
        let attempt_id = existing.id;
        let server_now = existing.start_time + Duration::minutes(3);
        let client_ts = server_now - Duration::seconds(7);

        let mut store = MockAttemptStore::new();
        store
            .expect_find_attempt()
            .returning(move |_| Ok(Some(existing.clone())));
        store
            .expect_record_heartbeat()
            .withf(move |_, _, at, question, now| {
                *at == client_ts && *question == Some(2) && *now == server_now
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(true));

        let service = HeartbeatService::new(Arc::new(store), Arc::new(ManualClock::new(server_now)));
        let recorded = service
            .heartbeat(
                owner,
                HeartbeatRequest {
                    attempt_id,
                    timestamp: client_ts,
                    current_question: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(recorded, client_ts);
    }

    #[tokio::test]
    async fn terminal_attempt_rejects_heartbeat() {
        let owner = Uuid::new_v4();
        let mut existing = attempt(owner);
        existing.status = AttemptStatus::AutoSubmitted;
        let attempt_id = existing.id;

        let mut store = MockAttemptStore::new();
        store
            .expect_find_attempt()
            .returning(move |_| Ok(Some(existing.clone())));
        store.expect_record_heartbeat().never();

        let service = HeartbeatService::new(Arc::new(store), Arc::new(ManualClock::new(Utc::now())));
        let err = service
            .heartbeat(
                owner,
                HeartbeatRequest {
                    attempt_id,
                    timestamp: Utc::now(),
                    current_question: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
