// src/services/mod.rs

pub mod quiz_service;
pub mod result_service;
pub mod scheduler;

pub use quiz_service::{EndOutcome, EndReason, QuizService};
pub use result_service::ResultService;
pub use scheduler::Scheduler;

use crate::{
    error::AppError,
    models::{quiz::Quiz, result::QuizResult},
    store::{DocumentStore, Filter, QUIZZES, RESULTS, StoreError},
};

/// Loads a quiz for a named action. A missing quiz is `NotFound`.
pub(crate) async fn load_quiz(
    store: &dyn DocumentStore,
    id: &str,
    action: &str,
) -> Result<Quiz, AppError> {
    let doc = store
        .get(QUIZZES, id)
        .await
        .map_err(|e| AppError::action_failed(action, e))?
        .ok_or_else(|| AppError::NotFound(format!("Quiz '{}' not found", id)))?;
    Ok(Quiz::from_document(&doc)?)
}

/// Every stored result for a quiz, in storage order.
pub(crate) async fn load_results(
    store: &dyn DocumentStore,
    quiz_id: &str,
) -> Result<Vec<QuizResult>, StoreError> {
    store
        .get_all(RESULTS, &Filter::all().eq("quizId", quiz_id))
        .await?
        .iter()
        .map(QuizResult::from_document)
        .collect()
}
