// src/engine/join_policy.rs

//! Late joiners forfeit every question whose window closed before they arrived.

use super::progression::{elapsed_ms, has_ended};
use crate::models::{question::Question, quiz::Quiz};

/// Number of leading questions already closed at `join_time`, in `[0, n]`.
pub fn missed_count(quiz: &Quiz, join_time: i64) -> usize {
    let question_ms = quiz.question_ms();
    if question_ms <= 0 {
        return 0;
    }
    let missed = (elapsed_ms(quiz, join_time) / question_ms) as usize;
    missed.min(quiz.questions.len())
}

/// Whether at least one question is still answerable at `join_time`.
pub fn can_join(quiz: &Quiz, join_time: i64) -> bool {
    !has_ended(quiz, join_time) && missed_count(quiz, join_time) < quiz.questions.len()
}

pub fn is_forfeited(index: usize, missed: usize) -> bool {
    index < missed
}

/// Correct answers at non-forfeited indices.
///
/// Answers sitting at forfeited indices are ignored even if they are correct.
pub fn score_answers(questions: &[Question], answers: &[Option<String>], missed: usize) -> u32 {
    questions
        .iter()
        .zip(answers)
        .enumerate()
        .filter(|(index, _)| !is_forfeited(*index, missed))
        .filter(|(_, (question, answer))| answer.as_deref() == Some(question.correct_answer.as_str()))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progression::tests::active_quiz;
    use crate::models::quiz::QuizStatus;

    #[test]
    fn joining_at_start_misses_nothing() {
        let quiz = active_quiz(3, 30, 10_000);
        assert_eq!(missed_count(&quiz, 10_000), 0);
        assert_eq!(missed_count(&quiz, 0), 0);
        assert!(can_join(&quiz, 10_000));
    }

    #[test]
    fn late_joiner_forfeits_closed_questions() {
        let quiz = active_quiz(3, 30, 0);

        assert_eq!(missed_count(&quiz, 65_000), 2);
        assert!(can_join(&quiz, 65_000));

        let answers = vec![Some("A".to_string()), Some("A".to_string()), Some("A".to_string())];
        assert_eq!(score_answers(&quiz.questions, &answers, 2), 1);
    }

    #[test]
    fn joining_after_the_last_window_is_refused() {
        let quiz = active_quiz(3, 30, 0);
        assert_eq!(missed_count(&quiz, 90_000), 3);
        assert!(!can_join(&quiz, 90_000));
        assert!(!can_join(&quiz, 500_000));
        assert_eq!(missed_count(&quiz, 500_000), 3);
    }

    #[test]
    fn paused_time_does_not_count_against_joiners() {
        let mut quiz = active_quiz(3, 30, 0);
        quiz.status = QuizStatus::Paused;
        quiz.paused_at = Some(20_000);
        assert_eq!(missed_count(&quiz, 400_000), 0);
        assert!(can_join(&quiz, 400_000));
    }

    #[test]
    fn waiting_quiz_has_no_missed_questions() {
        let mut quiz = active_quiz(3, 30, 0);
        quiz.status = QuizStatus::Waiting;
        quiz.quiz_start_time = None;
        assert_eq!(missed_count(&quiz, 1_000_000), 0);
        assert!(can_join(&quiz, 1_000_000));
    }

    #[test]
    fn unanswered_and_wrong_answers_score_nothing() {
        let quiz = active_quiz(3, 30, 0);
        let answers = vec![None, Some("B".to_string()), Some("A".to_string())];
        assert_eq!(score_answers(&quiz.questions, &answers, 0), 1);
        assert_eq!(score_answers(&quiz.questions, &[], 0), 0);
    }
}
