use crate::database::store::AttemptStore;
use crate::dto::attempt_dto::AutosaveRequest;
use crate::error::Result;
use crate::models::attempt::AutoSaveData;
use crate::services::attempt_service::rejection;
use crate::utils::time::Clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AutosaveService {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl AutosaveService {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Replaces the resume snapshot. Answer payloads are stored opaque.
    pub async fn autosave(&self, student_id: Uuid, req: AutosaveRequest) -> Result<DateTime<Utc>> {
        req.validate()?;

        let last_saved = self.clock.now();
        let answers = req.answers.len();
        let data = AutoSaveData {
            answers: req.answers,
            time_spent: req.time_spent,
            last_saved,
        };

        let saved = self
            .store
            .save_autosave(req.attempt_id, student_id, data)
            .await?;
        if !saved {
            return Err(rejection(self.store.as_ref(), req.attempt_id, student_id, "autosave").await);
        }

        tracing::debug!(
            attempt_id = %req.attempt_id,
            answers,
            time_spent = req.time_spent,
            "autosaved"
        );
        Ok(last_saved)
    }
}
