// src/engine/aggregation.rs

//! Leaderboard ordering over stored results.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::{
    models::result::{LeaderboardEntry, QuizResult},
    utils::html::plain_text,
};

/// Display form of a typed name: markup stripped, surrounding space trimmed.
pub fn student_display_name(name: &str) -> String {
    plain_text(name.trim()).trim().to_string()
}

/// Identity of a student within a quiz: the display name, case-folded.
///
/// Used for join dedup, attendance markers, answer lookup, and leaderboard
/// dedup alike, so every path derives the same key from the same input.
pub fn canonical_student_key(name: &str) -> String {
    student_display_name(name).to_lowercase()
}

/// Whether `candidate` should replace `current` as the record kept for a student.
fn supersedes(candidate: &QuizResult, current: &QuizResult) -> bool {
    match (candidate.completed_at, current.completed_at) {
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some(a), Some(b)) => candidate.score > current.score || (candidate.score == current.score && a < b),
        (None, None) => candidate.score > current.score,
    }
}

/// Keeps one record per student key.
pub fn dedupe(results: Vec<QuizResult>) -> Vec<QuizResult> {
    let mut kept: HashMap<String, QuizResult> = HashMap::new();
    for result in results {
        let key = canonical_student_key(&result.student_name);
        match kept.get(&key) {
            Some(current) if !supersedes(&result, current) => {}
            _ => {
                kept.insert(key, result);
            }
        }
    }
    kept.into_values().collect()
}

/// Score descending, then earlier completion; unfinished attempts trail
/// finished ones with the same score.
pub fn compare_standing(a: &QuizResult, b: &QuizResult) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.completed_at, b.completed_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| canonical_student_key(&a.student_name).cmp(&canonical_student_key(&b.student_name)))
}

/// Deduplicates, sorts, and assigns sequential 1-based ranks.
/// Ties never share a rank.
pub fn rank(results: Vec<QuizResult>) -> Vec<LeaderboardEntry> {
    let mut standings = dedupe(results);
    standings.sort_by(compare_standing);
    standings
        .into_iter()
        .enumerate()
        .map(|(i, r)| LeaderboardEntry {
            rank: i + 1,
            student_name: r.student_name,
            score: r.score,
            total_questions: r.total_questions,
            percentage: r.percentage,
            completed_at: r.completed_at,
        })
        .collect()
}

pub fn top_n(entries: &[LeaderboardEntry], n: usize) -> Vec<LeaderboardEntry> {
    entries.iter().take(n).cloned().collect()
}
