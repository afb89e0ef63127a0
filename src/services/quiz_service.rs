// src/services/quiz_service.rs

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use validator::Validate;

use super::{Scheduler, load_quiz, load_results};
use crate::{
    config::ARCHIVE_TOP_N,
    engine::{aggregation, clock::OffsetClock, lifecycle, progression},
    error::AppError,
    models::{
        class_result::ClassResult,
        quiz::{CreateQuizRequest, Quiz, QuizStatus},
    },
    store::{
        ATTENDANCE, CLASS_RESULTS, DocumentStore, Filter, QUIZZES, RESULTS, StoreError, encode,
    },
    utils::html::plain_text,
};

/// Why a quiz is being ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The admin pressed "end".
    Manual,
    /// Every question window has closed.
    TimeElapsed,
    /// The admin abandoned the quiz; nothing is archived.
    Cancelled,
}

impl EndReason {
    pub fn target_status(self) -> QuizStatus {
        match self {
            EndReason::Manual | EndReason::TimeElapsed => QuizStatus::Completed,
            EndReason::Cancelled => QuizStatus::Inactive,
        }
    }

    fn action(self) -> &'static str {
        match self {
            EndReason::Manual | EndReason::TimeElapsed => "end quiz",
            EndReason::Cancelled => "cancel quiz",
        }
    }
}

/// Result of an end request. Only the caller that performed the transition
/// sees `transitioned == true`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndOutcome {
    pub quiz: Quiz,
    pub transitioned: bool,
    pub class_result: Option<ClassResult>,
}

/// Admin-side quiz lifecycle.
///
/// Status transitions are serialized through `transitions`, and every write
/// is additionally guarded by a compare-and-set on the status it expects, so
/// other processes sharing the store cannot interleave a conflicting change.
pub struct QuizService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<OffsetClock>,
    scheduler: Scheduler,
    transitions: Mutex<()>,
}

impl QuizService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<OffsetClock>) -> Self {
        Self {
            store,
            clock,
            scheduler: Scheduler::new(),
            transitions: Mutex::new(()),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub async fn create_quiz(&self, req: CreateQuizRequest) -> Result<Quiz, AppError> {
        req.validate()?;

        let questions = req
            .questions
            .into_iter()
            .enumerate()
            .map(|(i, q)| q.into_question(i))
            .collect::<Result<Vec<_>, _>>()?;

        let mut quiz = Quiz {
            id: String::new(),
            name: plain_text(req.name.trim()),
            class_name: plain_text(req.class_name.trim()),
            questions,
            time_per_question: req.time_per_question,
            status: QuizStatus::Draft,
            scheduled_time: None,
            quiz_start_time: None,
            paused_at: None,
            current_question_index: 0,
            created_at: self.now_ms(),
            ended_at: None,
        };

        if quiz.name.is_empty() {
            return Err(AppError::BadRequest("Quiz name cannot be empty".to_string()));
        }

        quiz.id = self
            .store
            .create(QUIZZES, encode(&quiz)?)
            .await
            .map_err(|e| AppError::action_failed("create quiz", e))?;

        tracing::info!(
            "Quiz created: {} ({} questions, {}s each)",
            quiz.id,
            quiz.questions.len(),
            quiz.time_per_question
        );
        Ok(quiz)
    }

    pub async fn get_quiz(&self, id: &str) -> Result<Quiz, AppError> {
        load_quiz(self.store.as_ref(), id, "load quiz").await
    }

    /// All quizzes, newest first.
    pub async fn list_quizzes(&self) -> Result<Vec<Quiz>, AppError> {
        let mut quizzes = self
            .store
            .get_all(QUIZZES, &Filter::all())
            .await
            .map_err(|e| AppError::action_failed("list quizzes", e))?
            .iter()
            .map(Quiz::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(quizzes)
    }

    /// The quiz currently occupying the waiting/active/paused slot, if any.
    pub async fn running_quiz(&self) -> Result<Option<Quiz>, AppError> {
        let running = self
            .store
            .get_all(QUIZZES, &Filter::all().one_of("status", QuizStatus::RUNNING))
            .await
            .map_err(|e| AppError::action_failed("load current quiz", e))?;
        running.first().map(Quiz::from_document).transpose().map_err(Into::into)
    }

    pub async fn delete_quiz(&self, id: &str, confirmed: bool) -> Result<(), AppError> {
        let _guard = self.transitions.lock().await;
        let quiz = load_quiz(self.store.as_ref(), id, "delete quiz").await?;

        if quiz.status.is_running() {
            return Err(AppError::Conflict(format!(
                "Quiz '{}' is {}; end it before deleting",
                quiz.name,
                quiz.status.as_str()
            )));
        }
        if !confirmed {
            return Err(AppError::ConfirmationRequired {
                action: "delete quiz".to_string(),
                message: format!(
                    "Deleting '{}' also removes its answers and attendance.",
                    quiz.name
                ),
            });
        }

        let by_quiz = Filter::all().eq("quizId", id);
        for collection in [RESULTS, ATTENDANCE] {
            let docs = self
                .store
                .get_all(collection, &by_quiz)
                .await
                .map_err(|e| AppError::action_failed("delete quiz", e))?;
            for doc in docs {
                self.store
                    .delete(collection, &doc.id)
                    .await
                    .map_err(|e| AppError::action_failed("delete quiz", e))?;
            }
        }
        self.store
            .delete(QUIZZES, id)
            .await
            .map_err(|e| AppError::action_failed("delete quiz", e))?;
        self.scheduler.cancel(id);

        tracing::info!("Quiz deleted: {}", id);
        Ok(())
    }

    pub async fn schedule_quiz(&self, id: &str, at: i64) -> Result<Quiz, AppError> {
        if at <= self.now_ms() {
            return Err(AppError::BadRequest(
                "Scheduled time must be in the future".to_string(),
            ));
        }
        let quiz = self
            .transition(id, "schedule quiz", QuizStatus::Scheduled, |_, _| {
                lifecycle::schedule_patch(at)
            })
            .await?;
        self.scheduler.schedule(id, at);
        Ok(quiz)
    }

    pub async fn unschedule_quiz(&self, id: &str) -> Result<Quiz, AppError> {
        let quiz = self
            .transition(id, "unschedule quiz", QuizStatus::Draft, |_, _| {
                json!({ "status": QuizStatus::Draft, "scheduledTime": Value::Null })
            })
            .await?;
        self.scheduler.cancel(id);
        Ok(quiz)
    }

    /// Opens the lobby: students may join, the clock has not started.
    pub async fn open_quiz(&self, id: &str) -> Result<Quiz, AppError> {
        let quiz = self
            .transition(id, "open quiz", QuizStatus::Waiting, |_, _| lifecycle::open_patch())
            .await?;
        self.scheduler.cancel(id);
        Ok(quiz)
    }

    pub async fn start_quiz(&self, id: &str) -> Result<Quiz, AppError> {
        let quiz = self
            .transition(id, "start quiz", QuizStatus::Active, |_, now| {
                lifecycle::start_patch(now)
            })
            .await?;
        self.scheduler.cancel(id);
        Ok(quiz)
    }

    pub async fn pause_quiz(&self, id: &str) -> Result<Quiz, AppError> {
        self.transition(id, "pause quiz", QuizStatus::Paused, lifecycle::pause_patch)
            .await
    }

    pub async fn resume_quiz(&self, id: &str) -> Result<Quiz, AppError> {
        self.transition(id, "resume quiz", QuizStatus::Active, lifecycle::resume_patch)
            .await
    }

    /// Ends a running quiz. Safe to call any number of times from any client.
    ///
    /// The caller that wins the status change sees `transitioned == true`.
    /// Finalizing unfinished attempts and archiving the top rankings run on
    /// every call, so a call that failed after the status change is completed
    /// by the next one. `TimeElapsed` is refused while time is left.
    pub async fn end_quiz(&self, id: &str, reason: EndReason) -> Result<EndOutcome, AppError> {
        let action = reason.action();
        let _guard = self.transitions.lock().await;
        let quiz = load_quiz(self.store.as_ref(), id, action).await?;
        let now = self.now_ms();

        if quiz.status.is_terminal() {
            let class_result = self
                .complete_end(&quiz, quiz.ended_at.unwrap_or(now), action)
                .await?;
            return Ok(EndOutcome {
                quiz,
                transitioned: false,
                class_result,
            });
        }
        let status = reason.target_status();
        if !quiz.status.can_transition_to(status) {
            return Err(AppError::Conflict(format!(
                "Cannot {} a quiz that is {}",
                action,
                quiz.status.as_str()
            )));
        }
        if reason == EndReason::TimeElapsed && !progression::has_ended(&quiz, now) {
            return Err(AppError::Conflict(format!(
                "Quiz '{}' still has time left",
                quiz.name
            )));
        }

        let applied = self
            .store
            .update_if(
                QUIZZES,
                id,
                &Filter::all().one_of("status", QuizStatus::RUNNING),
                lifecycle::end_patch(&quiz, status, now),
            )
            .await
            .map_err(|e| AppError::action_failed(action, e))?;

        let ended = load_quiz(self.store.as_ref(), id, action).await?;
        if !applied {
            return Ok(EndOutcome {
                quiz: ended,
                transitioned: false,
                class_result: None,
            });
        }
        tracing::info!("Quiz {} -> {} ({:?})", id, status.as_str(), reason);

        let class_result = self.complete_end(&ended, now, action).await?;
        Ok(EndOutcome {
            quiz: ended,
            transitioned: true,
            class_result,
        })
    }

    /// Work that follows an end: stamp unfinished attempts, then archive the
    /// rankings of a completed quiz. Both steps are idempotent.
    async fn complete_end(
        &self,
        quiz: &Quiz,
        ended_at: i64,
        action: &str,
    ) -> Result<Option<ClassResult>, AppError> {
        let finalized = self
            .finalize_pending(&quiz.id, ended_at)
            .await
            .map_err(|e| AppError::action_failed(action, e))?;
        if finalized > 0 {
            tracing::info!("Finalized {} unfinished attempts for quiz {}", finalized, quiz.id);
        }

        if quiz.status != QuizStatus::Completed {
            return Ok(None);
        }
        self.archive(quiz, ended_at)
            .await
            .map(Some)
            .map_err(|e| AppError::action_failed(action, e))
    }

    /// Archived rankings, most recent first.
    pub async fn class_results(&self) -> Result<Vec<ClassResult>, AppError> {
        let mut archived = self
            .store
            .get_all(CLASS_RESULTS, &Filter::all())
            .await
            .map_err(|e| AppError::action_failed("load class results", e))?
            .iter()
            .map(|doc| doc.decode::<ClassResult>())
            .collect::<Result<Vec<_>, _>>()?;
        archived.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(archived)
    }

    /// Seeds the scheduler from quizzes already marked `scheduled`.
    pub async fn load_schedule(&self) -> Result<usize, AppError> {
        let scheduled = self
            .store
            .get_all(QUIZZES, &Filter::all().eq("status", QuizStatus::Scheduled))
            .await
            .map_err(|e| AppError::action_failed("load schedule", e))?;
        let mut count = 0;
        for doc in &scheduled {
            let quiz = Quiz::from_document(doc)?;
            if let Some(at) = quiz.scheduled_time {
                self.scheduler.schedule(&quiz.id, at);
                count += 1;
            }
        }
        Ok(count)
    }

    /// Starts every scheduled quiz whose time has come.
    ///
    /// A start that fails (another quiz holds the slot, or the store is
    /// down) is put back and retried on the next call.
    pub async fn start_due_quizzes(&self) -> usize {
        let mut started = 0;
        for (id, at) in self.scheduler.due(self.now_ms()) {
            match self.start_scheduled(&id).await {
                Ok(Some(_)) => {
                    tracing::info!("Scheduled quiz {} started", id);
                    started += 1;
                }
                Ok(None) => {}
                Err(AppError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!("Scheduled quiz {} could not start yet: {}", id, e);
                    self.scheduler.schedule(&id, at);
                }
            }
        }
        started
    }

    async fn start_scheduled(&self, id: &str) -> Result<Option<Quiz>, AppError> {
        let quiz = load_quiz(self.store.as_ref(), id, "start quiz").await?;
        if quiz.status != QuizStatus::Scheduled {
            return Ok(None);
        }
        self.start_quiz(id).await.map(Some)
    }

    /// Evaluates the schedule every `tick` until the task is aborted.
    pub fn spawn_scheduler(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !service.scheduler.is_empty() {
                    service.start_due_quizzes().await;
                }
            }
        })
    }

    async fn transition<F>(
        &self,
        id: &str,
        action: &str,
        next: QuizStatus,
        patch: F,
    ) -> Result<Quiz, AppError>
    where
        F: FnOnce(&Quiz, i64) -> Value,
    {
        let _guard = self.transitions.lock().await;
        let quiz = load_quiz(self.store.as_ref(), id, action).await?;

        if !quiz.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Cannot {} a quiz that is {}",
                action,
                quiz.status.as_str()
            )));
        }
        if next.is_running() && !quiz.status.is_running() {
            self.ensure_slot_free(id, action).await?;
        }

        let now = self.now_ms();
        let applied = self
            .store
            .update_if(
                QUIZZES,
                id,
                &Filter::all().eq("status", quiz.status),
                patch(&quiz, now),
            )
            .await
            .map_err(|e| AppError::action_failed(action, e))?;
        if !applied {
            return Err(AppError::Conflict(format!(
                "Quiz changed while trying to {}; reload and try again",
                action
            )));
        }

        tracing::info!("Quiz {} {} -> {}", id, quiz.status.as_str(), next.as_str());
        load_quiz(self.store.as_ref(), id, action).await
    }

    /// At most one quiz may be waiting, active, or paused at a time.
    async fn ensure_slot_free(&self, id: &str, action: &str) -> Result<(), AppError> {
        let running = self
            .store
            .get_all(QUIZZES, &Filter::all().one_of("status", QuizStatus::RUNNING))
            .await
            .map_err(|e| AppError::action_failed(action, e))?;

        if let Some(other) = running.iter().find(|doc| doc.id != id) {
            let other = Quiz::from_document(other)?;
            return Err(AppError::Conflict(format!(
                "Quiz '{}' is already {}; end it before you {}",
                other.name,
                other.status.as_str(),
                action
            )));
        }
        Ok(())
    }

    /// Stamps `completedAt` on every attempt that never made its final save.
    async fn finalize_pending(&self, quiz_id: &str, now: i64) -> Result<usize, StoreError> {
        let unfinished = Filter::all().eq("completedAt", Value::Null);
        let mut finalized = 0;
        for result in load_results(self.store.as_ref(), quiz_id).await? {
            if result.is_final() {
                continue;
            }
            if self
                .store
                .update_if(RESULTS, &result.id, &unfinished, json!({ "completedAt": now }))
                .await?
            {
                finalized += 1;
            }
        }
        Ok(finalized)
    }

    /// Writes the top rankings once. The archive shares the quiz's id, so a
    /// second attempt finds the existing snapshot instead of replacing it.
    async fn archive(&self, quiz: &Quiz, now: i64) -> Result<ClassResult, StoreError> {
        if let Some(existing) = self.store.get(CLASS_RESULTS, &quiz.id).await? {
            return existing.decode();
        }

        let standings = aggregation::rank(load_results(self.store.as_ref(), &quiz.id).await?);
        let class_result = ClassResult {
            id: quiz.id.clone(),
            quiz_id: quiz.id.clone(),
            quiz_name: quiz.name.clone(),
            quiz_class: quiz.class_name.clone(),
            completed_at: now,
            total_participants: standings.len(),
            top_rankings: aggregation::top_n(&standings, ARCHIVE_TOP_N),
        };

        match self
            .store
            .insert(CLASS_RESULTS, &quiz.id, encode(&class_result)?)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "Archived rankings for quiz {} ({} participants)",
                    quiz.id,
                    class_result.total_participants
                );
                Ok(class_result)
            }
            Err(StoreError::AlreadyExists { .. }) => self
                .store
                .get(CLASS_RESULTS, &quiz.id)
                .await?
                .ok_or_else(|| StoreError::not_found(CLASS_RESULTS, &quiz.id))?
                .decode(),
            Err(e) => Err(e),
        }
    }
}
