// src/models/result.rs

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use super::timestamp;
use crate::{engine::aggregation::canonical_student_key, store::{Document, StoreError}};

/// One student's attempt at one quiz, stored in the `results` collection.
///
/// Updated in place after every answer and finalized exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    #[serde(default)]
    pub id: String,

    #[serde(alias = "originalQuizId")]
    pub quiz_id: String,

    /// Name as the student typed it (trimmed).
    pub student_name: String,

    /// Canonical form of the name used for every identity comparison.
    #[serde(default)]
    pub student_key: String,

    /// Correct answers among the questions the student did not forfeit.
    #[serde(default)]
    pub score: u32,

    /// Aligned by index with the quiz questions; `None` means unanswered.
    #[serde(default, deserialize_with = "answers")]
    pub answers: Vec<Option<String>>,

    #[serde(default)]
    pub total_questions: u32,

    #[serde(default)]
    pub percentage: u32,

    /// Leading questions whose window had already closed at join time.
    #[serde(default)]
    pub missed_questions: usize,

    #[serde(default, deserialize_with = "timestamp::required")]
    pub join_time: i64,

    #[serde(default, deserialize_with = "timestamp::optional")]
    pub completed_at: Option<i64>,

    /// Focus-loss events reported by the client. Informational only.
    #[serde(default)]
    pub tab_switches: u32,
}

impl QuizResult {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut result: QuizResult = doc.decode()?;
        if result.student_key.is_empty() {
            result.student_key = canonical_student_key(&result.student_name);
        }
        Ok(result)
    }

    pub fn is_final(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Legacy records mark unanswered questions with an empty string.
fn answers<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Option<String>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|a| a.filter(|s| !s.is_empty()))
        .collect())
}

/// Document id shared by a student's result and attendance records.
pub fn attempt_id(quiz_id: &str, student_key: &str) -> String {
    format!("{}:{}", quiz_id, student_key)
}

/// `round(score / total * 100)`, or 0 for an empty quiz.
pub fn percentage(score: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((f64::from(score) / f64::from(total)) * 100.0).round() as u32
}

/// Join marker in the `attendance` collection; blocks a second attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    #[serde(default)]
    pub id: String,
    pub quiz_id: String,
    pub student_name: String,
    pub student_key: String,
    #[serde(deserialize_with = "timestamp::required")]
    pub join_time: i64,
}

/// A row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub student_name: String,
    pub score: u32,
    pub total_questions: u32,
    pub percentage: u32,
    pub completed_at: Option<i64>,
}

/// Response for a successful join.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub quiz_id: String,
    pub student_name: String,
    pub join_time: i64,
    pub missed_questions: usize,
    pub total_questions: usize,
    /// True when the student reconnected to an attempt already in progress.
    pub rejoined: bool,
}

/// DTO for joining a running quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[validate(length(min = 1, max = 50))]
    pub student_name: String,
}

/// DTO for saving one answer.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1))]
    pub quiz_id: String,
    #[validate(length(min = 1, max = 50))]
    pub student_name: String,
    pub question_index: usize,
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
    pub tab_switches: Option<u32>,
}

/// DTO for the final save at quiz end.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[validate(length(min = 1))]
    pub quiz_id: String,
    #[validate(length(min = 1, max = 50))]
    pub student_name: String,
    pub tab_switches: Option<u32>,
}
