pub mod admin;
pub mod attempt;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::auth::{require_admin, require_bearer_auth};
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let student_api = Router::new()
        .route("/api/attempts/start", post(attempt::start_attempt))
        .route("/api/attempts/autosave", post(attempt::autosave))
        .route("/api/attempts/heartbeat", post(attempt::heartbeat))
        .route("/api/attempts/track-time", post(attempt::track_time))
        .route("/api/attempts/auto-submit", post(attempt::auto_submit))
        .route("/api/attempts/visibility", post(attempt::report_visibility))
        .route("/api/attempts/submit", post(attempt::submit))
        .route("/api/attempts/:id", get(attempt::get_attempt))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_bearer_auth,
        ));

    let admin_api = Router::new()
        .route("/api/admin/tests", post(admin::create_test))
        .route("/api/admin/tests/:id", get(admin::get_test))
        .route("/api/admin/tests/:id/ranks", post(admin::annotate_ranks))
        .route("/api/admin/attempts/sweep", post(admin::sweep_stale))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(student_api)
        .merge(admin_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
