use crate::config::Config;
use crate::database::store::AttemptStore;
use crate::error::{Error, Result};
use crate::models::attempt::{AttemptStatus, AutoSubmitReason, Outcome};
use crate::services::attempt_service::AttemptService;
use crate::services::heartbeat_service::HeartbeatService;
use crate::utils::time::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Thresholds that decide when an attempt is submitted on the student's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSubmitPolicy {
    pub hidden_dwell_secs: i64,
    pub heartbeat_stale_secs: i64,
}

impl AutoSubmitPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hidden_dwell_secs: config.hidden_dwell_secs,
            heartbeat_stale_secs: config.heartbeat_stale_secs,
        }
    }

    pub fn should_submit_hidden(&self, hidden_for_secs: i64) -> bool {
        hidden_for_secs >= self.hidden_dwell_secs
    }

    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.heartbeat_stale_secs)
    }
}

/// `auto_submitted` is true only when this call performed the finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSubmitOutcome {
    pub status: AttemptStatus,
    pub auto_submitted: bool,
}

#[derive(Clone)]
pub struct AutoSubmitService {
    store: Arc<dyn AttemptStore>,
    attempts: AttemptService,
    clock: Arc<dyn Clock>,
    policy: AutoSubmitPolicy,
}

impl AutoSubmitService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        attempts: AttemptService,
        clock: Arc<dyn Clock>,
        policy: AutoSubmitPolicy,
    ) -> Self {
        Self {
            store,
            attempts,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> AutoSubmitPolicy {
        self.policy
    }

    /// Finalizes as `auto-submitted`. Losing the race to another finalize is
    /// not an error: the attempt's current status is returned instead.
    pub async fn auto_submit(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        reason: AutoSubmitReason,
    ) -> Result<AutoSubmitOutcome> {
        match self
            .attempts
            .finalize(attempt_id, student_id, Outcome::AutoSubmitted(reason), None)
            .await
        {
            Ok(attempt) => Ok(AutoSubmitOutcome {
                status: attempt.status,
                auto_submitted: true,
            }),
            Err(Error::InvalidTransition(msg)) => {
                tracing::warn!(%attempt_id, reason = reason.as_str(), "auto-submit ignored: {}", msg);
                let current = self.attempts.get_owned(attempt_id, student_id).await?;
                Ok(AutoSubmitOutcome {
                    status: current.status,
                    auto_submitted: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Client report of how long the page has been hidden.
    pub async fn report_visibility(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        hidden_for_secs: i64,
    ) -> Result<AutoSubmitOutcome> {
        if !self.policy.should_submit_hidden(hidden_for_secs) {
            let attempt = self.attempts.get_owned(attempt_id, student_id).await?;
            return Ok(AutoSubmitOutcome {
                status: attempt.status,
                auto_submitted: false,
            });
        }

        tracing::info!(%attempt_id, hidden_for_secs, "hidden dwell exceeded");
        self.auto_submit(attempt_id, student_id, AutoSubmitReason::PageHidden)
            .await
    }

    /// Auto-submits every in-progress attempt whose heartbeat went stale.
    /// Returns how many this pass finalized.
    pub async fn sweep_stale(&self) -> Result<usize> {
        let now = self.clock.now();
        let stale = self.store.find_stale(self.policy.stale_cutoff(now)).await?;

        let mut submitted = 0;
        for attempt in stale {
            if !HeartbeatService::is_stale(&attempt, now, self.policy.heartbeat_stale_secs) {
                continue;
            }
            match self
                .attempts
                .finalize(
                    attempt.id,
                    attempt.student_id,
                    Outcome::AutoSubmitted(AutoSubmitReason::HeartbeatTimeout),
                    None,
                )
                .await
            {
                Ok(_) => submitted += 1,
                Err(Error::InvalidTransition(_)) => {}
                Err(e) => {
                    tracing::error!(attempt_id = %attempt.id, "stale sweep failed: {}", e);
                }
            }
        }

        if submitted > 0 {
            tracing::info!(submitted, "stale attempts auto-submitted");
        }
        Ok(submitted)
    }
}
