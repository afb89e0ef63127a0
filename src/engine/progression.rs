// src/engine/progression.rs

//! Which question is live and how long it has left, derived from the quiz
//! record and a wall-clock instant alone.
//!
//! Every function here is total: missing or partial quiz data yields 0,
//! `false`, or the full duration instead of an error, and no input produces
//! an out-of-range index.

use serde::Serialize;

use crate::models::quiz::{Quiz, QuizStatus};

/// Milliseconds of quiz time that have elapsed at `t`.
///
/// Never negative. While paused, time stands still at `pausedAt`.
pub fn elapsed_ms(quiz: &Quiz, t: i64) -> i64 {
    let Some(start) = quiz.quiz_start_time else {
        return 0;
    };
    let now = match (quiz.status, quiz.paused_at) {
        (QuizStatus::Paused, Some(paused_at)) => t.min(paused_at),
        _ => t,
    };
    (now - start).max(0)
}

fn last_index(quiz: &Quiz) -> usize {
    quiz.questions.len().saturating_sub(1)
}

/// Index of the question that is live at `t`, always within `[0, n-1]`.
pub fn current_question_index(quiz: &Quiz, t: i64) -> usize {
    match quiz.status {
        QuizStatus::Waiting | QuizStatus::Paused | QuizStatus::Completed => {
            quiz.current_question_index.min(last_index(quiz))
        }
        QuizStatus::Active => {
            let question_ms = quiz.question_ms();
            if quiz.quiz_start_time.is_none() || question_ms <= 0 {
                return 0;
            }
            let index = elapsed_ms(quiz, t) / question_ms;
            (index as usize).min(last_index(quiz))
        }
        QuizStatus::Draft | QuizStatus::Scheduled | QuizStatus::Inactive => 0,
    }
}

/// Whole seconds left on the live question at `t`.
///
/// Waiting and paused quizzes report the full duration rather than a frozen
/// partial countdown.
pub fn time_remaining(quiz: &Quiz, t: i64) -> u32 {
    match quiz.status {
        QuizStatus::Waiting | QuizStatus::Paused | QuizStatus::Draft | QuizStatus::Scheduled => {
            quiz.time_per_question
        }
        QuizStatus::Completed | QuizStatus::Inactive => 0,
        QuizStatus::Active => {
            let Some(start) = quiz.quiz_start_time else {
                return 0;
            };
            let question_ms = quiz.question_ms();
            let index = current_question_index(quiz, t) as i64;
            let question_start = start + index * question_ms;
            let remaining = (question_start + question_ms - t).max(0) / 1000;
            remaining.min(i64::from(quiz.time_per_question)) as u32
        }
    }
}

/// Whether the quiz has run its full length at `t`.
///
/// Shares its boundary with the index clamp: at exactly `n * duration` the
/// index is already clamped to the last question and this returns `true`.
pub fn has_ended(quiz: &Quiz, t: i64) -> bool {
    if quiz.status != QuizStatus::Active {
        return false;
    }
    match quiz.quiz_start_time {
        Some(start) => t - start >= quiz.total_ms(),
        None => false,
    }
}

/// Whether the quiz is over for a participant at `t`, either by time or by status.
pub fn is_over(quiz: &Quiz, t: i64) -> bool {
    quiz.status.is_terminal() || has_ended(quiz, t)
}

/// Epoch millis at which question `index` opens. `None` before the quiz starts.
pub fn question_start(quiz: &Quiz, index: usize) -> Option<i64> {
    quiz.quiz_start_time
        .map(|start| start + index as i64 * quiz.question_ms())
}

/// Whether an answer for question `index` is accepted at `t`.
///
/// A question takes answers from its opening until it closes plus `grace_ms`,
/// so submissions that were in flight at the boundary still land.
pub fn accepts_answer(quiz: &Quiz, index: usize, t: i64, grace_ms: i64) -> bool {
    if quiz.status != QuizStatus::Active || index >= quiz.questions.len() {
        return false;
    }
    let Some(start) = quiz.quiz_start_time else {
        return false;
    };
    let question_ms = quiz.question_ms();
    let opens = index as i64 * question_ms;
    let closes = opens + question_ms + grace_ms.max(0);
    let elapsed = t - start;
    elapsed >= opens && elapsed < closes
}

/// Everything a screen needs to render the quiz at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionSnapshot {
    pub quiz_id: String,
    pub status: QuizStatus,
    pub current_question_index: usize,
    pub time_remaining: u32,
    pub has_ended: bool,
    pub total_questions: usize,
    pub time_per_question: u32,
    pub server_time: i64,
}

pub fn snapshot(quiz: &Quiz, t: i64) -> ProgressionSnapshot {
    ProgressionSnapshot {
        quiz_id: quiz.id.clone(),
        status: quiz.status,
        current_question_index: current_question_index(quiz, t),
        time_remaining: time_remaining(quiz, t),
        has_ended: has_ended(quiz, t),
        total_questions: quiz.questions.len(),
        time_per_question: quiz.time_per_question,
        server_time: t,
    }
}
