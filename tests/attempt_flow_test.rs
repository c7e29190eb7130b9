mod common;

use axum::http::StatusCode;
use common::{decimal, spawn_app, student};
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn start_twice_resumes_the_same_attempt() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();

    let (first, body) = app.start(&alice, test_id).await;
    assert_eq!(body["resumed"], json!(false));
    assert_eq!(body["attempt"]["status"], json!("in-progress"));

    let (second, body) = app.start(&alice, test_id).await;
    assert_eq!(body["resumed"], json!(true));
    assert_eq!(first, second);
}

#[tokio::test]
async fn view_sessions_sum_to_total_view_time() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let (attempt_id, _) = app.start(&alice, test_id).await;

    for (delta, at) in [(40, 40), (25, 90), (35, 200)] {
        let (status, body) = app
            .post(
                "/api/attempts/track-time",
                &alice.token,
                json!({
                    "attempt_id": attempt_id,
                    "question_index": 1,
                    "action": "view",
                    "time_spent": delta,
                    "timestamp": app.at(at)
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["success"], json!(true));
    }

    let view = app.view(&alice, attempt_id).await;
    let entry = &view["attempt"]["answers"][0];
    assert_eq!(entry["question_id"], json!("q2"));
    assert_eq!(entry["question_state"], json!("visited"));

    let tracking = &entry["time_tracking"];
    let sessions = tracking["view_sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 3);
    let summed: i64 = sessions.iter().map(|s| s["duration"].as_i64().unwrap()).sum();
    assert_eq!(summed, 100);
    assert_eq!(tracking["total_view_time"], json!(100));
    assert_eq!(entry["action_log"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn track_time_validates_the_question_and_answer() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let (attempt_id, _) = app.start(&alice, test_id).await;

    let (status, body) = app
        .post(
            "/api/attempts/track-time",
            &alice.token,
            json!({
                "attempt_id": attempt_id,
                "question_index": 0,
                "action": "answer",
                "time_spent": 0,
                "timestamp": app.at(5),
                "selected_answer": 1,
                "numerical_answer": 4.0
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, _) = app
        .post(
            "/api/attempts/track-time",
            &alice.token,
            json!({
                "attempt_id": attempt_id,
                "question_index": 7,
                "action": "view",
                "time_spent": 3,
                "timestamp": app.at(5)
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/attempts/track-time",
            &alice.token,
            json!({
                "attempt_id": attempt_id,
                "question_index": 0,
                "action": "answer",
                "time_spent": 0,
                "timestamp": app.at(5),
                "selected_answer": 9
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_grades_answers_and_freezes_the_attempt() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let (attempt_id, _) = app.start(&alice, test_id).await;
    app.clock.advance(chrono::Duration::seconds(90));

    let (status, body) = app
        .post(
            "/api/attempts/submit",
            &alice.token,
            json!({
                "attempt_id": attempt_id,
                "answers": [
                    {"question_index": 0, "selected_answer": 1},
                    {"question_index": 1, "selected_answer": 0},
                    {"question_index": 2, "numerical_answer": 3.141}
                ],
                "time_spent": 80
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], json!("completed"));
    assert_eq!(body["already_finalized"], json!(false));
    // 4 - 1 + 4
    assert_eq!(decimal(&body["score"]["obtained"]), Decimal::from(7));
    assert_eq!(decimal(&body["score"]["total"]), Decimal::from(12));

    let view = app.view(&alice, attempt_id).await;
    assert_eq!(view["attempt"]["time_spent"], json!(80));
    assert!(view["attempt"]["end_time"].is_string());
    assert_eq!(view["time_remaining_secs"], json!(30 * 60 - 80));

    let writes = [
        (
            "/api/attempts/autosave",
            json!({"attempt_id": attempt_id, "answers": [], "time_spent": 500}),
        ),
        (
            "/api/attempts/heartbeat",
            json!({"attempt_id": attempt_id, "timestamp": app.at(120), "current_question": 0}),
        ),
        (
            "/api/attempts/track-time",
            json!({"attempt_id": attempt_id, "question_index": 0, "action": "view", "time_spent": 10, "timestamp": app.at(120)}),
        ),
    ];
    for (uri, body) in writes {
        let (status, body) = app.post(uri, &alice.token, body).await;
        assert_eq!(status, StatusCode::CONFLICT, "{} -> {}", uri, body);
        assert_eq!(body["error"], json!("invalid_state"));
    }

    let (status, body) = app
        .post(
            "/api/attempts/auto-submit",
            &alice.token,
            json!({"attempt_id": attempt_id, "reason": "page-unload"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("completed"));

    let (status, body) = app
        .post(
            "/api/attempts/submit",
            &alice.token,
            json!({"attempt_id": attempt_id}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_finalized"], json!(true));

    let after = app.view(&alice, attempt_id).await;
    assert_eq!(after["attempt"], view["attempt"]);
}

#[tokio::test]
async fn heartbeat_from_another_student_is_forbidden() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let mallory = student();
    let (attempt_id, _) = app.start(&alice, test_id).await;

    let (status, body) = app
        .post(
            "/api/attempts/heartbeat",
            &alice.token,
            json!({"attempt_id": attempt_id, "timestamp": app.at(30), "current_question": 2}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .post(
            "/api/attempts/heartbeat",
            &mallory.token,
            json!({"attempt_id": attempt_id, "timestamp": app.at(60), "current_question": 0}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], json!("forbidden"));

    let view = app.view(&alice, attempt_id).await;
    assert_eq!(
        view["attempt"]["last_heartbeat"].as_str().map(|s| s.parse::<chrono::DateTime<chrono::Utc>>().unwrap()),
        Some(common::start_time() + chrono::Duration::seconds(30))
    );
    assert_eq!(view["attempt"]["current_question"], json!(2));

    let (status, _) = app
        .get(&format!("/api/attempts/{}", attempt_id), &mallory.token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn autosave_replaces_the_snapshot() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let (attempt_id, _) = app.start(&alice, test_id).await;

    for (answers, time_spent) in [(json!([{"q": 0, "a": 1}]), 40), (json!([{"q": 1}]), 30)] {
        let (status, body) = app
            .post(
                "/api/attempts/autosave",
                &alice.token,
                json!({"attempt_id": attempt_id, "answers": answers, "time_spent": time_spent}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["timestamp"].is_string());
    }

    let view = app.view(&alice, attempt_id).await;
    let snapshot = &view["attempt"]["auto_save_data"];
    assert_eq!(snapshot["answers"], json!([{"q": 1}]));
    assert_eq!(snapshot["time_spent"], json!(30));
    assert_eq!(view["attempt"]["time_spent"], json!(40));
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let app = spawn_app();

    let (status, body) = app
        .call("POST", "/api/attempts/start", None, Some(json!({"test_id": uuid::Uuid::new_v4()})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("unauthorized"));

    let (status, _) = app
        .post(
            "/api/attempts/start",
            "not-a-jwt",
            json!({"test_id": uuid::Uuid::new_v4()}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn oversized_delta_is_rejected_and_other_students_carry_on() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let bob = student();
    let (alice_attempt, _) = app.start(&alice, test_id).await;
    let (bob_attempt, _) = app.start(&bob, test_id).await;

    for delta in [86_401_i64, 10_000_000_000_000] {
        let (status, body) = app
            .post(
                "/api/attempts/track-time",
                &alice.token,
                json!({
                    "attempt_id": alice_attempt,
                    "question_index": 0,
                    "action": "view",
                    "time_spent": delta,
                    "timestamp": app.at(10)
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }

    let (status, body) = app
        .post(
            "/api/attempts/heartbeat",
            &bob.token,
            json!({"attempt_id": bob_attempt, "timestamp": app.at(20), "current_question": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let view = app.view(&alice, alice_attempt).await;
    assert_eq!(view["attempt"]["answers"], json!([]));
}

#[tokio::test]
async fn rejected_submit_records_no_answers() {
    let app = spawn_app();
    let test_id = app.create_test().await;
    let alice = student();
    let (attempt_id, _) = app.start(&alice, test_id).await;

    let (status, body) = app
        .post(
            "/api/attempts/submit",
            &alice.token,
            json!({
                "attempt_id": attempt_id,
                "answers": [
                    {"question_index": 0, "selected_answer": 1},
                    {"question_index": 1, "selected_answer": 9}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, _) = app
        .post(
            "/api/attempts/submit",
            &alice.token,
            json!({
                "attempt_id": attempt_id,
                "answers": [
                    {"question_index": 2, "numerical_answer": 3.14},
                    {"question_index": 2, "selected_answer": 0}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let view = app.view(&alice, attempt_id).await;
    assert_eq!(view["attempt"]["status"], json!("in-progress"));
    assert_eq!(view["attempt"]["answers"], json!([]));
}

#[tokio::test]
async fn test_with_unreachable_answer_key_is_rejected() {
    let app = spawn_app();

    let (status, body) = app
        .post(
            "/api/admin/tests",
            &app.admin_token,
            json!({
                "title": "Broken",
                "duration_minutes": 10,
                "questions": [
                    {"id": "q1", "question": "2 + 2?", "options": ["3", "4"], "correct_answer": 5}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["error"], json!("validation_error"));

    let (status, _) = app
        .post(
            "/api/admin/tests",
            &app.admin_token,
            json!({
                "title": "Broken",
                "duration_minutes": 10,
                "questions": [
                    {"id": "pi", "question": "pi", "correct_value": 3.14, "tolerance": -0.5}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
