// src/models/class_result.rs

use serde::{Deserialize, Serialize};

use super::result::LeaderboardEntry;

/// Rankings archived when a quiz ends. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassResult {
    #[serde(default)]
    pub id: String,
    pub quiz_id: String,
    pub quiz_name: String,
    pub quiz_class: String,
    pub completed_at: i64,
    pub total_participants: usize,
    pub top_rankings: Vec<LeaderboardEntry>,
}
