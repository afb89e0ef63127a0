// src/handlers/results.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::result::{FinalizeRequest, JoinRequest, SubmitAnswerRequest},
    services::{QuizService, ResultService},
};

/// Joins a running quiz under a display name.
///
/// Returns 201 for a new attempt and 200 when reconnecting to an open one.
pub async fn join_quiz(
    State(results): State<Arc<ResultService>>,
    Path(id): Path<String>,
    Json(payload): Json<JoinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let joined = results.join(&id, payload).await?;
    let status = if joined.rejoined {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(joined)))
}

/// Saves one answer of the caller's attempt.
pub async fn submit_answer(
    State(results): State<Arc<ResultService>>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.submit_answer(payload).await?))
}

/// Final save once the quiz is over. Repeating it returns the stored attempt.
pub async fn finalize_result(
    State(results): State<Arc<ResultService>>,
    Json(payload): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.finalize(payload).await?))
}

pub async fn get_leaderboard(
    State(results): State<Arc<ResultService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.leaderboard(&id).await?))
}

/// Archived top rankings of finished quizzes, most recent first.
pub async fn list_class_results(
    State(quizzes): State<Arc<QuizService>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.class_results().await?))
}
