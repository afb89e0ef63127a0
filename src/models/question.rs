// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::AppError, utils::html::clean_html};

/// One multiple-choice question of a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The text content of the question.
    pub question: String,

    /// Answer options in display order.
    pub options: Vec<String>,

    /// The literal text of the correct option (not its index).
    pub correct_answer: String,
}

/// DTO for sending a question to students (excludes the correct answer).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub question: String,
    pub options: Vec<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            question: q.question.clone(),
            options: q.options.clone(),
        }
    }
}

/// DTO for one question of a new quiz.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub question: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: String,
}

impl CreateQuestionRequest {
    /// Sanitizes the text and checks that the correct answer is one of the options.
    pub fn into_question(self, position: usize) -> Result<Question, AppError> {
        let options: Vec<String> = self.options.iter().map(|o| clean_html(o.trim())).collect();
        let correct_answer = clean_html(self.correct_answer.trim());

        if !options.contains(&correct_answer) {
            return Err(AppError::BadRequest(format!(
                "Question {}: correct answer '{}' is not one of the options",
                position + 1,
                correct_answer
            )));
        }

        Ok(Question {
            question: clean_html(self.question.trim()),
            options,
            correct_answer,
        })
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    for (i, opt) in options.iter().enumerate() {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
        if options[..i].iter().any(|prev| prev.trim() == opt.trim()) {
            return Err(validator::ValidationError::new("duplicate_option"));
        }
    }
    Ok(())
}
