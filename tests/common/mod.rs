#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use exam_attempt_backend::{
    config::Config, middleware::auth::Claims, routes, utils::time::ManualClock, AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub admin_token: String,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()
}

pub fn spawn_app() -> TestApp {
    let clock = ManualClock::new(start_time());
    let state = AppState::in_memory(Config::local(JWT_SECRET), Arc::new(clock.clone()));
    TestApp {
        router: routes::router(state.clone()),
        state,
        clock,
        admin_token: token(&Uuid::new_v4().to_string(), Some("admin")),
    }
}

pub fn token(sub: &str, role: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role: role.map(str::to_string),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub struct Student {
    pub id: Uuid,
    pub token: String,
}

pub fn student() -> Student {
    let id = Uuid::new_v4();
    Student {
        id,
        token: token(&id.to_string(), None),
    }
}

impl TestApp {
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null);
        (status, body)
    }

    pub async fn post(&self, uri: &str, token: &str, body: JsonValue) -> (StatusCode, JsonValue) {
        self.call("POST", uri, Some(token), Some(body)).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, JsonValue) {
        self.call("GET", uri, Some(token), None).await
    }

    /// Three questions worth 4 marks each: two single choice, one numerical.
    pub async fn create_test(&self) -> Uuid {
        let (status, body) = self
            .post(
                "/api/admin/tests",
                &self.admin_token,
                json!({
                    "title": "Arithmetic",
                    "description": "Warm-up quiz",
                    "duration_minutes": 30,
                    "questions": [
                        {"id": "q1", "question": "2 + 2?", "marks": 4, "options": ["3", "4", "5"], "correct_answer": 1},
                        {"id": "q2", "question": "3 * 3?", "marks": 4, "negative_marks": 1, "options": ["6", "9"], "correct_answer": 1},
                        {"id": "q3", "question": "pi to two places", "marks": 4, "correct_value": 3.14, "tolerance": 0.005}
                    ]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn start(&self, student: &Student, test_id: Uuid) -> (Uuid, JsonValue) {
        let (status, body) = self
            .post(
                "/api/attempts/start",
                &student.token,
                json!({"test_id": test_id}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        (body["attempt"]["id"].as_str().unwrap().parse().unwrap(), body)
    }

    pub async fn view(&self, student: &Student, attempt_id: Uuid) -> JsonValue {
        let (status, body) = self
            .get(&format!("/api/attempts/{}", attempt_id), &student.token)
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    /// Client-side timestamp `secs` after the fixed start time.
    pub fn at(&self, secs: i64) -> String {
        (start_time() + Duration::seconds(secs)).to_rfc3339()
    }
}

pub fn decimal(value: &JsonValue) -> rust_decimal::Decimal {
    match value {
        JsonValue::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}
