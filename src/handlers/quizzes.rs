// src/handlers/quizzes.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    engine::progression,
    error::AppError,
    models::{
        notice::Notice,
        quiz::{CreateQuizRequest, PublicQuiz, ScheduleQuizRequest},
    },
    services::{EndReason, QuizService, ResultService},
};

/// The quiz students should see right now, without answers.
pub async fn current_quiz(
    State(quizzes): State<Arc<QuizService>>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes
        .running_quiz()
        .await?
        .ok_or_else(|| AppError::NotFound("No quiz is running".to_string()))?;

    Ok(Json(PublicQuiz::from(&quiz)))
}

pub async fn get_public_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes.get_quiz(&id).await?;
    Ok(Json(PublicQuiz::from(&quiz)))
}

/// Progression computed with the server's clock, so clients need not trust their own.
pub async fn get_progression(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes.get_quiz(&id).await?;
    Ok(Json(progression::snapshot(&quiz, quizzes.now_ms())))
}

/// Lists every quiz, newest first.
/// Admin only.
pub async fn list_quizzes(
    State(quizzes): State<Arc<QuizService>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.list_quizzes().await?))
}

/// Creates a draft quiz.
/// Admin only.
pub async fn create_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes.create_quiz(payload).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Full quiz record including correct answers.
/// Admin only.
pub async fn get_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.get_quiz(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub confirm: bool,
}

/// Deletes a quiz and its attempts. Without `?confirm=true` the response
/// carries a confirmation prompt instead.
/// Admin only.
pub async fn delete_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, AppError> {
    quizzes.delete_quiz(&id, params.confirm).await?;
    Ok(Json(json!({
        "deleted": id,
        "notice": Notice::info("Quiz deleted", "The quiz and its results were removed."),
    })))
}

pub async fn schedule_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
    Json(payload): Json<ScheduleQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.schedule_quiz(&id, payload.scheduled_time).await?))
}

pub async fn unschedule_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.unschedule_quiz(&id).await?))
}

pub async fn open_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.open_quiz(&id).await?))
}

pub async fn start_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.start_quiz(&id).await?))
}

pub async fn pause_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.pause_quiz(&id).await?))
}

pub async fn resume_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.resume_quiz(&id).await?))
}

pub async fn end_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.end_quiz(&id, EndReason::Manual).await?))
}

pub async fn cancel_quiz(
    State(quizzes): State<Arc<QuizService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.end_quiz(&id, EndReason::Cancelled).await?))
}

/// Every attempt for a quiz, best first, with answers and tab switches.
/// Admin only.
pub async fn quiz_results(
    State(results): State<Arc<ResultService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(results.results(&id).await?))
}
