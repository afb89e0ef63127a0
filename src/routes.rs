// src/routes.rs

use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, quizzes, results, stream, time},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public routes serve students: progression, joining, answers, rankings.
/// * Admin routes drive the quiz lifecycle behind JWT auth.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
        "http://localhost:5173".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new().route("/login", post(auth::login));

    let quiz_routes = Router::new()
        .route("/current", get(quizzes::current_quiz))
        .route("/{id}", get(quizzes::get_public_quiz))
        .route("/{id}/progression", get(quizzes::get_progression))
        .route("/{id}/stream", get(stream::quiz_stream))
        .route("/{id}/leaderboard", get(results::get_leaderboard))
        .route("/{id}/join", post(results::join_quiz));

    let result_routes = Router::new()
        .route("/", post(results::submit_answer))
        .route("/finalize", post(results::finalize_result));

    let admin_routes = Router::new()
        .route(
            "/quizzes",
            get(quizzes::list_quizzes).post(quizzes::create_quiz),
        )
        .route(
            "/quizzes/{id}",
            get(quizzes::get_quiz).delete(quizzes::delete_quiz),
        )
        .route("/quizzes/{id}/schedule", post(quizzes::schedule_quiz))
        .route("/quizzes/{id}/unschedule", post(quizzes::unschedule_quiz))
        .route("/quizzes/{id}/open", post(quizzes::open_quiz))
        .route("/quizzes/{id}/start", post(quizzes::start_quiz))
        .route("/quizzes/{id}/pause", post(quizzes::pause_quiz))
        .route("/quizzes/{id}/resume", post(quizzes::resume_quiz))
        .route("/quizzes/{id}/end", post(quizzes::end_quiz))
        .route("/quizzes/{id}/cancel", post(quizzes::cancel_quiz))
        .route("/quizzes/{id}/results", get(quizzes::quiz_results))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/time", get(time::server_time))
        .route("/api/class-results", get(results::list_class_results))
        .nest("/api/auth", auth_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/results", result_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
