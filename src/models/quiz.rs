// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::{
    question::{CreateQuestionRequest, PublicQuestion, Question},
    timestamp,
};
use crate::store::{Document, StoreError};

/// Lifecycle status of a quiz.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    #[default]
    Draft,
    Scheduled,
    Waiting,
    Active,
    Paused,
    Completed,
    Inactive,
}

impl QuizStatus {
    /// Statuses that occupy the single "current quiz" slot.
    pub const RUNNING: [QuizStatus; 3] = [QuizStatus::Waiting, QuizStatus::Active, QuizStatus::Paused];

    pub fn as_str(self) -> &'static str {
        match self {
            QuizStatus::Draft => "draft",
            QuizStatus::Scheduled => "scheduled",
            QuizStatus::Waiting => "waiting",
            QuizStatus::Active => "active",
            QuizStatus::Paused => "paused",
            QuizStatus::Completed => "completed",
            QuizStatus::Inactive => "inactive",
        }
    }

    pub fn is_running(self) -> bool {
        Self::RUNNING.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QuizStatus::Completed | QuizStatus::Inactive)
    }
}

impl From<QuizStatus> for Value {
    fn from(status: QuizStatus) -> Self {
        Value::String(status.as_str().to_string())
    }
}

/// A quiz definition plus its runtime state, as stored in the `quizzes` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Cohort label, e.g. "7B".
    #[serde(rename = "class", default)]
    pub class_name: String,

    /// Progression order. Never reordered once the quiz has started.
    pub questions: Vec<Question>,

    /// Seconds per question, uniform across the quiz.
    pub time_per_question: u32,

    #[serde(default)]
    pub status: QuizStatus,

    #[serde(default, deserialize_with = "timestamp::optional")]
    pub scheduled_time: Option<i64>,

    /// Origin of all progression arithmetic. Set on start, shifted on resume.
    #[serde(default, alias = "startTime", deserialize_with = "timestamp::optional")]
    pub quiz_start_time: Option<i64>,

    #[serde(default, deserialize_with = "timestamp::optional")]
    pub paused_at: Option<i64>,

    /// Authoritative only while waiting or paused; derived while active.
    #[serde(default)]
    pub current_question_index: usize,

    #[serde(default, deserialize_with = "timestamp::required")]
    pub created_at: i64,

    #[serde(default, deserialize_with = "timestamp::optional")]
    pub ended_at: Option<i64>,
}

impl Quiz {
    /// Reads a quiz document, normalizing legacy shapes first.
    ///
    /// Older quizzes stored the duration on each question instead of on the
    /// quiz; the first question's value is lifted up when the quiz lacks one.
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut normalized = doc.clone();
        if let Value::Object(map) = &mut normalized.data {
            if !map.contains_key("timePerQuestion") {
                let legacy = map
                    .get("questions")
                    .and_then(|qs| qs.get(0))
                    .and_then(|q| q.get("timePerQuestion"))
                    .cloned()
                    .unwrap_or(Value::from(DEFAULT_TIME_PER_QUESTION));
                map.insert("timePerQuestion".to_string(), legacy);
            }
        }
        normalized.decode()
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Question duration in milliseconds.
    pub fn question_ms(&self) -> i64 {
        i64::from(self.time_per_question) * 1000
    }

    /// Full running time of the quiz in milliseconds.
    pub fn total_ms(&self) -> i64 {
        self.question_ms() * self.questions.len() as i64
    }
}

const DEFAULT_TIME_PER_QUESTION: u32 = 30;

/// Quiz as shown to students: no correct answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub questions: Vec<PublicQuestion>,
    pub time_per_question: u32,
    pub status: QuizStatus,
    pub scheduled_time: Option<i64>,
    pub quiz_start_time: Option<i64>,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id.clone(),
            name: quiz.name.clone(),
            class_name: quiz.class_name.clone(),
            questions: quiz.questions.iter().map(PublicQuestion::from).collect(),
            time_per_question: quiz.time_per_question,
            status: quiz.status,
            scheduled_time: quiz.scheduled_time,
            quiz_start_time: quiz.quiz_start_time,
        }
    }
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(rename = "class")]
    #[validate(length(min = 1, max = 100))]
    pub class_name: String,
    #[validate(length(min = 1, max = 200), nested)]
    pub questions: Vec<CreateQuestionRequest>,
    #[validate(range(min = 5, max = 3600))]
    pub time_per_question: u32,
}

/// DTO for scheduling a quiz to start automatically.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuizRequest {
    #[serde(deserialize_with = "timestamp::required")]
    pub scheduled_time: i64,
}
