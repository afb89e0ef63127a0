// tests/api_tests.rs

use std::sync::Arc;

use classroom_quiz::{
    config::Config,
    engine::clock::{ManualTimeSource, OffsetClock},
    routes,
    state::AppState,
    store::MemoryStore,
};
use serde_json::{Value, json};

const ADMIN_PASSWORD: &str = "classroom-admin-password";

/// Spawns the app on a random port over an in-memory store whose clock the
/// test controls. Returns the base URL and the clock.
async fn spawn_app() -> (String, Arc<ManualTimeSource>) {
    let time = Arc::new(ManualTimeSource::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::with_time_source(time.clone()));
    let clock = Arc::new(OffsetClock::new(time.clone()));

    let config = Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        admin_password: ADMIN_PASSWORD.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        sync_tick_ms: 50,
        clock_sync_interval_secs: 30,
        scheduler_tick_ms: 50,
        answer_grace_ms: 2_000,
    };

    let state = AppState::new(config, store, clock).expect("Failed to build state");
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, time)
}

async fn admin_token(client: &reqwest::Client, address: &str) -> String {
    let body: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");
    body["token"].as_str().expect("Token not found").to_string()
}

fn quiz_body(name: &str) -> Value {
    json!({
        "name": name,
        "class": "7B",
        "timePerQuestion": 30,
        "questions": [
            { "question": "2 + 2", "options": ["3", "4"], "correctAnswer": "4" },
            { "question": "Capital of France", "options": ["Paris", "Rome"], "correctAnswer": "Paris" },
            { "question": "H2O is", "options": ["Water", "Salt"], "correctAnswer": "Water" }
        ]
    })
}

async fn create_quiz(client: &reqwest::Client, address: &str, token: &str, name: &str) -> Value {
    let response = client
        .post(format!("{}/api/admin/quizzes", address))
        .bearer_auth(token)
        .json(&quiz_body(name))
        .send()
        .await
        .expect("Create quiz failed");
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

async fn admin_action(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    id: &str,
    action: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/api/admin/quizzes/{}/{}", address, id, action))
        .bearer_auth(token)
        .send()
        .await
        .expect("Admin action failed")
}

#[tokio::test]
async fn unknown_path_is_404() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn login_checks_the_shared_password() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["notice"]["kind"], "error");

    let token = admin_token(&client, &address).await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn admin_routes_require_a_token() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/admin/quizzes", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .get(format!("{}/api/admin/quizzes", address))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn invalid_quizzes_are_rejected() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address).await;

    let mut body = quiz_body("Broken");
    body["questions"][0]["correctAnswer"] = json!("5");
    let response = client
        .post(format!("{}/api/admin/quizzes", address))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let mut body = quiz_body("Too few options");
    body["questions"][1]["options"] = json!(["Paris"]);
    let response = client
        .post(format!("{}/api/admin/quizzes", address))
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let list: Vec<Value> = client
        .get(format!("{}/api/admin/quizzes", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn public_views_hide_correct_answers() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address).await;

    let quiz = create_quiz(&client, &address, &token, "Hidden").await;
    let id = quiz["id"].as_str().unwrap();
    assert_eq!(quiz["status"], "draft");
    assert_eq!(quiz["questions"][0]["correctAnswer"], "4");

    let response = client
        .get(format!("{}/api/quizzes/current", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    admin_action(&client, &address, &token, id, "open").await;

    let current: Value = client
        .get(format!("{}/api/quizzes/current", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["id"], id);
    assert_eq!(current["status"], "waiting");
    assert!(current["questions"][0].get("correctAnswer").is_none());
}

#[tokio::test]
async fn only_one_quiz_runs_at_a_time() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address).await;

    let first = create_quiz(&client, &address, &token, "First").await;
    let second = create_quiz(&client, &address, &token, "Second").await;
    let first_id = first["id"].as_str().unwrap();
    let second_id = second["id"].as_str().unwrap();

    let response = admin_action(&client, &address, &token, first_id, "start").await;
    assert_eq!(response.status().as_u16(), 200);

    let response = admin_action(&client, &address, &token, second_id, "start").await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("First"));

    let response = admin_action(&client, &address, &token, first_id, "cancel").await;
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["quiz"]["status"], "inactive");
    assert!(outcome["classResult"].is_null());

    let response = admin_action(&client, &address, &token, second_id, "start").await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn delete_asks_for_confirmation() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address).await;

    let quiz = create_quiz(&client, &address, &token, "Disposable").await;
    let id = quiz["id"].as_str().unwrap();

    let response = client
        .delete(format!("{}/api/admin/quizzes/{}", address, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["notice"]["kind"], "confirm");
    assert_eq!(body["notice"]["action"], "delete quiz");

    let response = client
        .delete(format!("{}/api/admin/quizzes/{}?confirm=true", address, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["notice"]["kind"], "info");

    let response = client
        .get(format!("{}/api/admin/quizzes/{}", address, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn server_time_follows_the_store_clock() {
    let (address, time) = spawn_app().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/api/time", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["serverTime"], 1_700_000_000_000i64);

    time.advance(1_500);
    let body: Value = client
        .get(format!("{}/api/time", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["serverTime"], 1_700_000_001_500i64);
}

#[tokio::test]
async fn scheduling_in_the_past_is_rejected() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();
    let token = admin_token(&client, &address).await;

    let quiz = create_quiz(&client, &address, &token, "Past").await;
    let id = quiz["id"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/admin/quizzes/{}/schedule", address, id))
        .bearer_auth(&token)
        .json(&json!({ "scheduledTime": 1_600_000_000_000i64 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = client
        .post(format!("{}/api/admin/quizzes/{}/schedule", address, id))
        .bearer_auth(&token)
        .json(&json!({ "scheduledTime": 1_700_000_060_000i64 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "scheduled");

    let response = admin_action(&client, &address, &token, id, "unschedule").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "draft");
    assert!(body["scheduledTime"].is_null());
}
