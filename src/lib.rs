pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::memory::MemoryStore;
use crate::database::store::{AttemptStore, TestCatalog};
use crate::services::{
    attempt_service::AttemptService,
    auto_submit_service::{AutoSubmitPolicy, AutoSubmitService},
    autosave_service::AutosaveService,
    heartbeat_service::HeartbeatService,
    test_service::TestService,
    timing_service::TimingService,
};
use crate::utils::time::Clock;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn AttemptStore>,
    pub tests: Arc<dyn TestCatalog>,
    pub clock: Arc<dyn Clock>,
    pub attempt_service: AttemptService,
    pub autosave_service: AutosaveService,
    pub heartbeat_service: HeartbeatService,
    pub timing_service: TimingService,
    pub auto_submit_service: AutoSubmitService,
    pub test_service: TestService,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn AttemptStore>,
        tests: Arc<dyn TestCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let attempt_service = AttemptService::new(store.clone(), tests.clone(), clock.clone());
        let autosave_service = AutosaveService::new(store.clone(), clock.clone());
        let heartbeat_service = HeartbeatService::new(store.clone(), clock.clone());
        let timing_service = TimingService::new(store.clone(), tests.clone(), clock.clone());
        let auto_submit_service = AutoSubmitService::new(
            store.clone(),
            attempt_service.clone(),
            clock.clone(),
            AutoSubmitPolicy::from_config(&config),
        );
        let test_service = TestService::new(tests.clone(), clock.clone());

        Self {
            config: Arc::new(config),
            store,
            tests,
            clock,
            attempt_service,
            autosave_service,
            heartbeat_service,
            timing_service,
            auto_submit_service,
            test_service,
        }
    }

    /// State backed by a fresh in-memory store.
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Self {
        let store = MemoryStore::new();
        Self::new(config, Arc::new(store.clone()), Arc::new(store), clock)
    }
}
