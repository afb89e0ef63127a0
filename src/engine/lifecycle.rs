// src/engine/lifecycle.rs

//! Quiz status transitions and the record patches that carry them out.
//!
//! ```text
//! draft ⇄ scheduled ──► waiting ──► active ⇄ paused
//!   │           │                       │
//!   └───────────┴──────► active         └──► completed | inactive
//! ```
//!
//! Pausing persists the live question index and the pause instant. Resuming
//! shifts `quizStartTime` forward by the paused span, so the interrupted
//! question continues with exactly the time it had left.

use serde_json::{Value, json};

use super::progression::current_question_index;
use crate::models::quiz::{Quiz, QuizStatus};

impl QuizStatus {
    pub fn can_transition_to(self, next: QuizStatus) -> bool {
        use QuizStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled | Waiting | Active)
                | (Scheduled, Draft | Scheduled | Waiting | Active)
                | (Waiting, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Waiting | Active | Paused, Completed | Inactive)
        )
    }
}

pub fn schedule_patch(at: i64) -> Value {
    json!({
        "status": QuizStatus::Scheduled,
        "scheduledTime": at,
    })
}

pub fn open_patch() -> Value {
    json!({
        "status": QuizStatus::Waiting,
        "currentQuestionIndex": 0,
        "scheduledTime": Value::Null,
    })
}

pub fn start_patch(t: i64) -> Value {
    json!({
        "status": QuizStatus::Active,
        "quizStartTime": t,
        "currentQuestionIndex": 0,
        "pausedAt": Value::Null,
        "scheduledTime": Value::Null,
    })
}

pub fn pause_patch(quiz: &Quiz, t: i64) -> Value {
    json!({
        "status": QuizStatus::Paused,
        "pausedAt": t,
        "currentQuestionIndex": current_question_index(quiz, t),
    })
}

/// Start time after resuming at `t`: the original start pushed back by the pause.
pub fn resumed_start_time(quiz: &Quiz, t: i64) -> Option<i64> {
    let start = quiz.quiz_start_time?;
    let paused_for = quiz.paused_at.map(|p| (t - p).max(0)).unwrap_or(0);
    Some(start + paused_for)
}

pub fn resume_patch(quiz: &Quiz, t: i64) -> Value {
    json!({
        "status": QuizStatus::Active,
        "quizStartTime": resumed_start_time(quiz, t).unwrap_or(t),
        "pausedAt": Value::Null,
    })
}

/// Freezes the final question index alongside the terminal status.
pub fn end_patch(quiz: &Quiz, status: QuizStatus, t: i64) -> Value {
    json!({
        "status": status,
        "endedAt": t,
        "currentQuestionIndex": current_question_index(quiz, t),
        "pausedAt": Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progression::{
        current_question_index, tests::active_quiz, time_remaining,
    };
    use crate::store::{Document, merge_patch};

    fn apply(quiz: &Quiz, patch: Value) -> Quiz {
        let mut data = serde_json::to_value(quiz).unwrap();
        merge_patch(&mut data, &patch).unwrap();
        Quiz::from_document(&Document {
            id: quiz.id.clone(),
            data,
        })
        .unwrap()
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        use QuizStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Scheduled.can_transition_to(Active));
        assert!(Scheduled.can_transition_to(Scheduled));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Paused.can_transition_to(Completed));
        assert!(Waiting.can_transition_to(Inactive));

        assert!(!Completed.can_transition_to(Active));
        assert!(!Inactive.can_transition_to(Waiting));
        assert!(!Draft.can_transition_to(Paused));
        assert!(!Active.can_transition_to(Waiting));
    }

    #[test]
    fn resume_preserves_remaining_time() {
        let quiz = active_quiz(3, 30, 0);
        // 12s into question 2: 18s left.
        assert_eq!(time_remaining(&quiz, 42_000), 18);

        let paused = apply(&quiz, pause_patch(&quiz, 42_000));
        assert_eq!(paused.status, QuizStatus::Paused);
        assert_eq!(paused.current_question_index, 1);
        assert_eq!(current_question_index(&paused, 300_000), 1);

        // Resume five minutes later.
        let resumed = apply(&paused, resume_patch(&paused, 342_000));
        assert_eq!(resumed.status, QuizStatus::Active);
        assert_eq!(resumed.quiz_start_time, Some(300_000));
        assert_eq!(current_question_index(&resumed, 342_000), 1);
        assert_eq!(time_remaining(&resumed, 342_000), 18);
        assert_eq!(current_question_index(&resumed, 360_000), 2);
    }

    #[test]
    fn end_freezes_the_final_index() {
        let quiz = active_quiz(3, 30, 0);
        let ended = apply(&quiz, end_patch(&quiz, QuizStatus::Completed, 95_000));
        assert_eq!(ended.status, QuizStatus::Completed);
        assert_eq!(ended.current_question_index, 2);
        assert_eq!(ended.ended_at, Some(95_000));
    }
}
