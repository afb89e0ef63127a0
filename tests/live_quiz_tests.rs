// tests/live_quiz_tests.rs

use std::sync::Arc;
use std::time::Duration;

use classroom_quiz::{
    config::Config,
    engine::clock::{ManualTimeSource, OffsetClock},
    routes,
    state::AppState,
    store::{DocumentStore, MemoryStore, RESULTS},
    sync::spawn_supervisor,
};
use serde_json::{Value, json};

const ADMIN_PASSWORD: &str = "live-test-password";
const T0: i64 = 1_700_000_000_000;

struct TestApp {
    address: String,
    client: reqwest::Client,
    token: String,
    time: Arc<ManualTimeSource>,
    store: Arc<MemoryStore>,
}

/// Spawns the app the way `main` does, background tasks included, over a
/// store and clock the test controls.
async fn spawn_app() -> TestApp {
    let time = Arc::new(ManualTimeSource::new(T0));
    let store = Arc::new(MemoryStore::with_time_source(time.clone()));
    let clock = Arc::new(OffsetClock::new(time.clone()));

    let config = Config {
        database_url: None,
        jwt_secret: "live_quiz_test_secret".to_string(),
        jwt_expiration: 600,
        admin_password: ADMIN_PASSWORD.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        sync_tick_ms: 50,
        clock_sync_interval_secs: 30,
        scheduler_tick_ms: 50,
        answer_grace_ms: 2_000,
    };

    let state = AppState::new(config, store.clone(), clock).expect("Failed to build state");
    state.quizzes.spawn_scheduler(Duration::from_millis(50));
    spawn_supervisor(state.sync_loop(), Duration::from_millis(50));

    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let login: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "password": ADMIN_PASSWORD }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .unwrap();
    let token = login["token"].as_str().expect("Token not found").to_string();

    TestApp {
        address,
        client,
        token,
        time,
        store,
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn create_quiz(&self, name: &str) -> String {
        let quiz: Value = self
            .client
            .post(self.url("/api/admin/quizzes"))
            .bearer_auth(&self.token)
            .json(&json!({
                "name": name,
                "class": "9C",
                "timePerQuestion": 30,
                "questions": [
                    { "question": "Q1", "options": ["A", "B"], "correctAnswer": "A" },
                    { "question": "Q2", "options": ["A", "B"], "correctAnswer": "A" },
                    { "question": "Q3", "options": ["A", "B"], "correctAnswer": "A" }
                ]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        quiz["id"].as_str().unwrap().to_string()
    }

    async fn admin(&self, id: &str, action: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/admin/quizzes/{}/{}", id, action)))
            .bearer_auth(&self.token)
            .send()
            .await
            .unwrap()
    }

    async fn progression(&self, id: &str) -> Value {
        self.client
            .get(self.url(&format!("/api/quizzes/{}/progression", id)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn join(&self, id: &str, name: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/quizzes/{}/join", id)))
            .json(&json!({ "studentName": name }))
            .send()
            .await
            .unwrap()
    }

    async fn answer(&self, id: &str, name: &str, index: usize, answer: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/results"))
            .json(&json!({
                "quizId": id,
                "studentName": name,
                "questionIndex": index,
                "answer": answer
            }))
            .send()
            .await
            .unwrap()
    }

    async fn finalize(&self, id: &str, name: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/results/finalize"))
            .json(&json!({ "quizId": id, "studentName": name, "tabSwitches": 2 }))
            .send()
            .await
            .unwrap()
    }

    /// Polls progression until `status` shows up or two seconds pass.
    async fn wait_for_status(&self, id: &str, status: &str) -> Value {
        for _ in 0..40 {
            let progression = self.progression(id).await;
            if progression["status"] == status {
                return progression;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("quiz {} never reached status {}", id, status);
    }
}

#[tokio::test]
async fn late_joiner_scenario() {
    let app = spawn_app().await;
    let id = app.create_quiz("Scenario").await;
    assert_eq!(app.admin(&id, "start").await.status().as_u16(), 200);

    app.time.advance(45_000);
    let progression = app.progression(&id).await;
    assert_eq!(progression["currentQuestionIndex"], 1);
    assert_eq!(progression["timeRemaining"], 15);
    assert_eq!(progression["hasEnded"], false);

    app.time.advance(20_000);
    let response = app.join(&id, "Ana").await;
    assert_eq!(response.status().as_u16(), 201);
    let joined: Value = response.json().await.unwrap();
    assert_eq!(joined["missedQuestions"], 2);

    let response = app.answer(&id, "Ana", 0, "A").await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app.answer(&id, "Ana", 2, "A").await;
    assert_eq!(response.status().as_u16(), 200);
    let saved: Value = response.json().await.unwrap();
    assert_eq!(saved["score"], 1);
    assert_eq!(saved["percentage"], 33);

    // Reconnecting returns the same attempt.
    let response = app.join(&id, " ana").await;
    assert_eq!(response.status().as_u16(), 200);
    let rejoined: Value = response.json().await.unwrap();
    assert_eq!(rejoined["rejoined"], true);
    assert_eq!(rejoined["joinTime"], joined["joinTime"]);
}

#[tokio::test]
async fn expired_quiz_is_ended_and_archived_once() {
    let app = spawn_app().await;
    let id = app.create_quiz("Auto end").await;
    app.admin(&id, "start").await;

    for name in ["Ana", "Ben", "Cy"] {
        assert_eq!(app.join(&id, name).await.status().as_u16(), 201);
    }
    app.time.advance(1_000);
    app.answer(&id, "Ben", 0, "A").await;
    app.answer(&id, "Cy", 0, "A").await;
    app.time.advance(30_000);
    app.answer(&id, "Cy", 1, "A").await;

    app.time.advance(60_000);
    let progression = app.wait_for_status(&id, "completed").await;
    assert_eq!(progression["timeRemaining"], 0);
    assert_eq!(progression["currentQuestionIndex"], 2);

    // Ending again is a no-op.
    let outcome: Value = app.admin(&id, "end").await.json().await.unwrap();
    assert_eq!(outcome["transitioned"], false);

    let archived: Vec<Value> = app
        .client
        .get(app.url("/api/class-results"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0]["totalParticipants"], 3);
    let top: Vec<&str> = archived[0]["topRankings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["studentName"].as_str().unwrap())
        .collect();
    assert_eq!(top, vec!["Cy", "Ben", "Ana"]);

    // Unfinished attempts were finalized by the end transition.
    let response = app.finalize(&id, "Ana").await;
    assert_eq!(response.status().as_u16(), 200);
    let result: Value = response.json().await.unwrap();
    assert!(result["completedAt"].is_i64());

    // A finalized attempt cannot be restarted.
    assert_eq!(app.join(&id, "ANA").await.status().as_u16(), 409);
}

#[tokio::test]
async fn pause_preserves_remaining_time() {
    let app = spawn_app().await;
    let id = app.create_quiz("Pausable").await;
    app.admin(&id, "start").await;

    app.time.advance(42_000);
    let response = app.admin(&id, "pause").await;
    let paused: Value = response.json().await.unwrap();
    assert_eq!(paused["status"], "paused");
    assert_eq!(paused["currentQuestionIndex"], 1);

    app.time.advance(300_000);
    let progression = app.progression(&id).await;
    assert_eq!(progression["status"], "paused");
    assert_eq!(progression["currentQuestionIndex"], 1);

    let response = app.answer(&id, "Nobody", 1, "A").await;
    assert_eq!(response.status().as_u16(), 409);

    app.admin(&id, "resume").await;
    let progression = app.progression(&id).await;
    assert_eq!(progression["status"], "active");
    assert_eq!(progression["currentQuestionIndex"], 1);
    assert_eq!(progression["timeRemaining"], 18);
}

#[tokio::test]
async fn scheduled_quiz_starts_when_due() {
    let app = spawn_app().await;
    let id = app.create_quiz("Scheduled").await;

    let response = app
        .client
        .post(app.url(&format!("/api/admin/quizzes/{}/schedule", id)))
        .bearer_auth(&app.token)
        .json(&json!({ "scheduledTime": T0 + 5_000 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.progression(&id).await["status"], "scheduled");

    app.time.advance(5_000);
    app.wait_for_status(&id, "active").await;
}

#[tokio::test]
async fn leaderboard_ranks_by_score() {
    let app = spawn_app().await;
    let id = app.create_quiz("Ranking").await;
    app.admin(&id, "start").await;

    for name in ["Ana", "Ben"] {
        app.join(&id, name).await;
    }
    app.time.advance(1_000);
    app.answer(&id, "Ana", 0, "B").await;
    app.answer(&id, "Ben", 0, "A").await;

    app.time.advance(89_000);
    app.finalize(&id, "Ben").await;
    app.finalize(&id, "Ana").await;

    let board: Vec<Value> = app
        .client
        .get(app.url(&format!("/api/quizzes/{}/leaderboard", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["studentName"], "Ben");
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[1]["studentName"], "Ana");
    assert_eq!(board[1]["rank"], 2);
}

#[tokio::test]
async fn stream_sends_progress_events() {
    let app = spawn_app().await;
    let id = app.create_quiz("Streamed").await;
    app.admin(&id, "start").await;

    let mut response = app
        .client
        .get(app.url(&format!("/api/quizzes/{}/stream", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let chunk = tokio::time::timeout(Duration::from_secs(2), response.chunk())
        .await
        .expect("no event in time")
        .unwrap()
        .expect("stream ended early");
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("event: progress"));
    assert!(text.contains(&id));

    let response = app
        .client
        .get(app.url("/api/quizzes/missing/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn archived_rankings_ignore_late_result_writes() {
    let app = spawn_app().await;
    let id = app.create_quiz("Snapshot").await;
    app.admin(&id, "start").await;
    app.join(&id, "Ana").await;
    app.time.advance(1_000);
    app.answer(&id, "Ana", 0, "A").await;

    app.time.advance(89_000);
    app.wait_for_status(&id, "completed").await;
    app.admin(&id, "end").await;

    let before: Vec<Value> = app
        .client
        .get(app.url("/api/class-results"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before.len(), 1);

    // A higher score lands after the archive was taken.
    app.store
        .insert(
            RESULTS,
            &format!("{}:zed", id),
            json!({
                "quizId": id,
                "studentName": "Zed",
                "studentKey": "zed",
                "score": 3,
                "totalQuestions": 3,
                "percentage": 100,
                "joinTime": T0,
                "completedAt": T0 + 10_000
            }),
        )
        .await
        .unwrap();
    app.admin(&id, "end").await;

    let after: Vec<Value> = app
        .client
        .get(app.url("/api/class-results"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after, before);
    assert_eq!(after[0]["topRankings"][0]["studentName"], "Ana");

    let board: Vec<Value> = app
        .client
        .get(app.url(&format!("/api/quizzes/{}/leaderboard", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(board[0]["studentName"], "Zed");
}
