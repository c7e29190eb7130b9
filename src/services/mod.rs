pub mod attempt_service;
pub mod auto_submit_service;
pub mod autosave_service;
pub mod grading_service;
pub mod heartbeat_service;
pub mod test_service;
pub mod timing_service;
