// src/services/result_service.rs

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use validator::Validate;

use super::{load_quiz, load_results};
use crate::{
    engine::{
        aggregation::{self, canonical_student_key},
        clock::OffsetClock,
        join_policy, progression,
    },
    error::AppError,
    models::{
        quiz::{Quiz, QuizStatus},
        result::{
            Attendance, FinalizeRequest, JoinRequest, JoinResponse, LeaderboardEntry, QuizResult,
            SubmitAnswerRequest, attempt_id, percentage,
        },
    },
    store::{ATTENDANCE, DocumentStore, Filter, RESULTS, StoreError, encode},
    utils::html::clean_html,
};

/// Student-side operations: joining, answering, and the final save.
pub struct ResultService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<OffsetClock>,
    answer_grace_ms: i64,
    /// Serializes read-modify-write cycles on result records.
    writes: Mutex<()>,
}

impl ResultService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<OffsetClock>, answer_grace_ms: i64) -> Self {
        Self {
            store,
            clock,
            answer_grace_ms,
            writes: Mutex::new(()),
        }
    }

    /// Registers a student for a running quiz.
    ///
    /// A student reconnecting to an attempt that is still open gets the
    /// original join record back. An attempt that was already finalized
    /// cannot be restarted.
    pub async fn join(&self, quiz_id: &str, req: JoinRequest) -> Result<JoinResponse, AppError> {
        req.validate()?;
        let student_name = aggregation::student_display_name(&req.student_name);
        let student_key = canonical_student_key(&student_name);
        if student_key.is_empty() {
            return Err(AppError::BadRequest("Student name cannot be empty".to_string()));
        }

        let _guard = self.writes.lock().await;
        let quiz = load_quiz(self.store.as_ref(), quiz_id, "join quiz").await?;
        let id = attempt_id(quiz_id, &student_key);

        if let Some(response) = self.rejoin(&quiz, &id).await? {
            return Ok(response);
        }

        if !quiz.status.is_running() {
            return Err(AppError::Conflict(format!(
                "Quiz '{}' is {} and not accepting participants",
                quiz.name,
                quiz.status.as_str()
            )));
        }

        let join_time = self.clock.now_ms();
        if !join_policy::can_join(&quiz, join_time) {
            return Err(AppError::Conflict(
                "Every question has already closed; it is too late to join".to_string(),
            ));
        }
        let missed = join_policy::missed_count(&quiz, join_time);

        let attendance = Attendance {
            id: id.clone(),
            quiz_id: quiz.id.clone(),
            student_name: student_name.clone(),
            student_key: student_key.clone(),
            join_time,
        };
        match self
            .store
            .insert(ATTENDANCE, &id, encode(&attendance)?)
            .await
        {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                // Joined from another process between the check and the insert.
                return self
                    .rejoin(&quiz, &id)
                    .await?
                    .ok_or_else(|| AppError::Conflict("Already joined this quiz".to_string()));
            }
            Err(e) => return Err(AppError::action_failed("join quiz", e)),
        }

        let total = quiz.total_questions();
        let result = QuizResult {
            id: id.clone(),
            quiz_id: quiz.id.clone(),
            student_name: student_name.clone(),
            student_key,
            score: 0,
            answers: vec![None; total],
            total_questions: total as u32,
            percentage: 0,
            missed_questions: missed,
            join_time,
            completed_at: None,
            tab_switches: 0,
        };
        match self.store.insert(RESULTS, &id, encode(&result)?).await {
            Ok(()) | Err(StoreError::AlreadyExists { .. }) => {}
            Err(e) => return Err(AppError::action_failed("join quiz", e)),
        }

        tracing::info!(
            "Student '{}' joined quiz {} (missed {} of {})",
            student_name,
            quiz.id,
            missed,
            total
        );
        Ok(JoinResponse {
            quiz_id: quiz.id,
            student_name,
            join_time,
            missed_questions: missed,
            total_questions: total,
            rejoined: false,
        })
    }

    async fn rejoin(&self, quiz: &Quiz, id: &str) -> Result<Option<JoinResponse>, AppError> {
        let Some(marker) = self
            .store
            .get(ATTENDANCE, id)
            .await
            .map_err(|e| AppError::action_failed("join quiz", e))?
        else {
            return Ok(None);
        };
        let attendance: Attendance = marker.decode()?;

        let existing = self
            .store
            .get(RESULTS, id)
            .await
            .map_err(|e| AppError::action_failed("join quiz", e))?
            .map(|doc| QuizResult::from_document(&doc))
            .transpose()?;

        match existing {
            Some(result) if result.is_final() => Err(AppError::Conflict(format!(
                "'{}' has already completed this quiz",
                attendance.student_name
            ))),
            _ if quiz.status.is_terminal() => Err(AppError::Conflict(format!(
                "Quiz '{}' has ended",
                quiz.name
            ))),
            existing => {
                tracing::info!("Student '{}' rejoined quiz {}", attendance.student_name, quiz.id);
                Ok(Some(JoinResponse {
                    quiz_id: quiz.id.clone(),
                    student_name: attendance.student_name,
                    join_time: attendance.join_time,
                    missed_questions: existing
                        .map(|r| r.missed_questions)
                        .unwrap_or_else(|| join_policy::missed_count(quiz, attendance.join_time)),
                    total_questions: quiz.total_questions(),
                    rejoined: true,
                }))
            }
        }
    }

    /// Records one answer and recomputes the score.
    ///
    /// Answers are accepted only while the quiz is active and the question's
    /// window (plus grace) is open. A question can be answered once.
    pub async fn submit_answer(&self, req: SubmitAnswerRequest) -> Result<QuizResult, AppError> {
        req.validate()?;
        let student_key = canonical_student_key(&req.student_name);

        let _guard = self.writes.lock().await;
        let quiz = load_quiz(self.store.as_ref(), &req.quiz_id, "save answer").await?;
        match quiz.status {
            QuizStatus::Active => {}
            QuizStatus::Paused => {
                return Err(AppError::Conflict("Quiz is paused".to_string()));
            }
            status => {
                return Err(AppError::Conflict(format!(
                    "Quiz is {} and not accepting answers",
                    status.as_str()
                )));
            }
        }

        let mut result = self.load_attempt(&quiz.id, &student_key, "save answer").await?;
        if result.is_final() {
            return Err(AppError::Conflict("This attempt has already been submitted".to_string()));
        }

        let index = req.question_index;
        let Some(question) = quiz.questions.get(index) else {
            return Err(AppError::BadRequest(format!("Question {} does not exist", index + 1)));
        };
        if join_policy::is_forfeited(index, result.missed_questions) {
            return Err(AppError::BadRequest(format!(
                "Question {} closed before you joined",
                index + 1
            )));
        }
        let now = self.clock.now_ms();
        if !progression::accepts_answer(&quiz, index, now, self.answer_grace_ms) {
            return Err(AppError::BadRequest(format!(
                "Question {} is not open for answers",
                index + 1
            )));
        }

        let answer = clean_html(req.answer.trim());
        if !question.options.contains(&answer) {
            return Err(AppError::BadRequest(format!(
                "'{}' is not an option for question {}",
                answer,
                index + 1
            )));
        }

        result.answers.resize(quiz.total_questions(), None);
        if result.answers[index].is_some() {
            return Err(AppError::Conflict(format!(
                "Question {} has already been answered",
                index + 1
            )));
        }
        result.answers[index] = Some(answer);
        result.score = join_policy::score_answers(&quiz.questions, &result.answers, result.missed_questions);
        result.total_questions = quiz.total_questions() as u32;
        result.percentage = percentage(result.score, result.total_questions);
        if let Some(switches) = req.tab_switches {
            result.tab_switches = result.tab_switches.max(switches);
        }

        let applied = self
            .store
            .update_if(
                RESULTS,
                &result.id,
                &Filter::all().eq("completedAt", Value::Null),
                json!({
                    "answers": result.answers,
                    "score": result.score,
                    "totalQuestions": result.total_questions,
                    "percentage": result.percentage,
                    "tabSwitches": result.tab_switches,
                }),
            )
            .await
            .map_err(|e| AppError::action_failed("save answer", e))?;
        if !applied {
            return Err(AppError::Conflict("This attempt has already been submitted".to_string()));
        }

        tracing::debug!(
            "Answer saved: quiz {} student '{}' question {} (score {})",
            quiz.id,
            result.student_name,
            index,
            result.score
        );
        Ok(result)
    }

    /// The student's final save. Safe to repeat; the first save wins.
    pub async fn finalize(&self, req: FinalizeRequest) -> Result<QuizResult, AppError> {
        req.validate()?;
        let student_key = canonical_student_key(&req.student_name);

        let _guard = self.writes.lock().await;
        let quiz = load_quiz(self.store.as_ref(), &req.quiz_id, "submit results").await?;
        let result = self.load_attempt(&quiz.id, &student_key, "submit results").await?;
        if result.is_final() {
            return Ok(result);
        }

        let now = self.clock.now_ms();
        if !progression::is_over(&quiz, now) {
            return Err(AppError::Conflict("The quiz is still running".to_string()));
        }

        let tab_switches = req
            .tab_switches
            .map_or(result.tab_switches, |t| t.max(result.tab_switches));
        self.store
            .update_if(
                RESULTS,
                &result.id,
                &Filter::all().eq("completedAt", Value::Null),
                json!({ "completedAt": now, "tabSwitches": tab_switches }),
            )
            .await
            .map_err(|e| AppError::action_failed("submit results", e))?;

        tracing::info!("Results submitted: quiz {} student '{}'", quiz.id, result.student_name);
        self.load_attempt(&quiz.id, &student_key, "submit results").await
    }

    /// Ranked, deduplicated standings for a quiz.
    pub async fn leaderboard(&self, quiz_id: &str) -> Result<Vec<LeaderboardEntry>, AppError> {
        load_quiz(self.store.as_ref(), quiz_id, "load leaderboard").await?;
        let results = load_results(self.store.as_ref(), quiz_id)
            .await
            .map_err(|e| AppError::action_failed("load leaderboard", e))?;
        Ok(aggregation::rank(results))
    }

    /// Raw result records for the admin view, best first.
    pub async fn results(&self, quiz_id: &str) -> Result<Vec<QuizResult>, AppError> {
        load_quiz(self.store.as_ref(), quiz_id, "load results").await?;
        let mut results = load_results(self.store.as_ref(), quiz_id)
            .await
            .map_err(|e| AppError::action_failed("load results", e))?;
        results.sort_by(aggregation::compare_standing);
        Ok(results)
    }

    async fn load_attempt(
        &self,
        quiz_id: &str,
        student_key: &str,
        action: &str,
    ) -> Result<QuizResult, AppError> {
        let id = attempt_id(quiz_id, student_key);
        let doc = self
            .store
            .get(RESULTS, &id)
            .await
            .map_err(|e| AppError::action_failed(action, e))?
            .ok_or_else(|| AppError::NotFound("Join the quiz before answering".to_string()))?;
        Ok(QuizResult::from_document(&doc)?)
    }
}
