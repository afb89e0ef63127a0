// src/sync/mod.rs

//! Live progression for one displayed quiz.
//!
//! A [`SyncLoop`] follows a single quiz record: it listens for store changes,
//! ticks on a fixed interval while the quiz can still progress, and publishes
//! a fresh [`SyncUpdate`] to every observer on each tick and each change.
//! When a quiz runs out of time it issues the "end quiz" request itself.

pub mod supervisor;

pub use supervisor::spawn_supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::{
    config::{CLOCK_CALIBRATION_SAMPLES, DEFAULT_SYNC_TICK_MS},
    error::AppError,
    engine::{
        clock::OffsetClock,
        progression::{self, ProgressionSnapshot},
    },
    models::quiz::{Quiz, QuizStatus},
    services::{EndReason, QuizService},
    store::{DocumentStore, Filter, QUIZZES, Subscription},
};

const UPDATE_CAPACITY: usize = 64;
const AUTO_END_ATTEMPTS: u32 = 3;
const AUTO_END_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What observers receive on every tick and every store change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpdate {
    pub quiz_id: String,
    /// `None` while the quiz record is missing from the store.
    pub progression: Option<ProgressionSnapshot>,
}

pub struct SyncLoop {
    store: Arc<dyn DocumentStore>,
    clock: Arc<OffsetClock>,
    quizzes: Arc<QuizService>,
    tick: Duration,
}

impl SyncLoop {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<OffsetClock>, quizzes: Arc<QuizService>) -> Self {
        Self {
            store,
            clock,
            quizzes,
            tick: Duration::from_millis(DEFAULT_SYNC_TICK_MS),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Starts the loop, following `quiz_id` if given.
    pub fn spawn(self, quiz_id: Option<String>) -> SyncHandle {
        let (target, target_rx) = watch::channel(quiz_id);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let gate = Arc::new(Gate::default());

        let task = tokio::spawn(self.run(target_rx, updates.clone(), gate.clone()));

        SyncHandle {
            target,
            updates,
            gate,
            task,
        }
    }

    async fn run(
        self,
        mut target: watch::Receiver<Option<String>>,
        updates: broadcast::Sender<SyncUpdate>,
        gate: Arc<Gate>,
    ) {
        self.clock
            .calibrate_many(self.store.as_ref(), CLOCK_CALIBRATION_SAMPLES)
            .await;

        loop {
            let current = target.borrow_and_update().clone();
            let next = match current {
                Some(quiz_id) => self.follow(&quiz_id, &mut target, &updates, &gate).await,
                None => match target.changed().await {
                    Ok(()) => Next::Retarget,
                    Err(_) => Next::Shutdown,
                },
            };
            if next == Next::Shutdown {
                return;
            }
        }
    }

    /// Follows one quiz until the target changes or the handle goes away.
    async fn follow(
        &self,
        quiz_id: &str,
        target: &mut watch::Receiver<Option<String>>,
        updates: &broadcast::Sender<SyncUpdate>,
        gate: &Gate,
    ) -> Next {
        let mut subscription = match self.subscribe(quiz_id, target).await {
            Some(subscription) => subscription,
            None => return Next::Shutdown,
        };

        let auto_end = Arc::new(AutoEnd::default());
        let mut quiz: Option<Quiz> = None;
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                changed = target.changed() => {
                    return match changed {
                        Ok(()) => Next::Retarget,
                        Err(_) => Next::Shutdown,
                    };
                }
                docs = subscription.changed() => {
                    let Ok(docs) = docs else {
                        tracing::warn!("Quiz subscription closed while following {}", quiz_id);
                        return Next::Shutdown;
                    };
                    quiz = match docs.first().map(Quiz::from_document).transpose() {
                        Ok(quiz) => quiz,
                        Err(e) => {
                            tracing::warn!("Unreadable quiz record {}: {}", quiz_id, e);
                            None
                        }
                    };

                    match &quiz {
                        Some(q) if !q.status.is_terminal() => {
                            if ticker.is_none() {
                                ticker = Some(self.interval());
                            }
                        }
                        _ => ticker = None,
                    }
                    self.publish(quiz_id, quiz.as_ref(), updates, gate);
                }
                _ = next_tick(&mut ticker) => {
                    self.publish(quiz_id, quiz.as_ref(), updates, gate);
                    if let Some(q) = &quiz {
                        self.check_auto_end(q, &auto_end);
                    }
                }
            }
        }
    }

    async fn subscribe(
        &self,
        quiz_id: &str,
        target: &mut watch::Receiver<Option<String>>,
    ) -> Option<Subscription> {
        let mut interval = self.interval();
        loop {
            match self.store.subscribe(QUIZZES, Filter::all().id(quiz_id)).await {
                Ok(subscription) => return Some(subscription),
                Err(e) => tracing::warn!("Could not subscribe to quiz {}: {}", quiz_id, e),
            }
            tokio::select! {
                changed = target.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = interval.tick() => {}
            }
        }
    }

    fn interval(&self) -> Interval {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    fn publish(
        &self,
        quiz_id: &str,
        quiz: Option<&Quiz>,
        updates: &broadcast::Sender<SyncUpdate>,
        gate: &Gate,
    ) {
        let now = self.clock.now_ms();
        gate.send(
            updates,
            SyncUpdate {
                quiz_id: quiz_id.to_string(),
                progression: quiz.map(|q| progression::snapshot(q, now)),
            },
        );
    }

    /// Fires one "end quiz" request once an active quiz has run out of time.
    ///
    /// The request is not awaited. A request that fails after the status
    /// change committed is retried here, since the quiz stops ticking once it
    /// is completed. Any other failure clears the in-flight flag so the next
    /// tick tries again.
    fn check_auto_end(&self, quiz: &Quiz, auto_end: &Arc<AutoEnd>) {
        if quiz.status != QuizStatus::Active || !progression::has_ended(quiz, self.clock.now_ms()) {
            return;
        }
        if auto_end.in_flight.swap(true, Ordering::SeqCst) {
            return;
        }

        let service = Arc::clone(&self.quizzes);
        let auto_end = Arc::clone(auto_end);
        let quiz_id = quiz.id.clone();
        tokio::spawn(async move {
            for attempt in 1..=AUTO_END_ATTEMPTS {
                match service.end_quiz(&quiz_id, EndReason::TimeElapsed).await {
                    Ok(outcome) => {
                        if outcome.transitioned {
                            tracing::info!("Quiz {} ended automatically", quiz_id);
                        }
                        return;
                    }
                    Err(AppError::Conflict(msg)) => {
                        tracing::debug!("Automatic end of quiz {} refused: {}", quiz_id, msg);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Automatic end of quiz {} failed (attempt {}): {}",
                            quiz_id,
                            attempt,
                            e
                        );
                        tokio::time::sleep(AUTO_END_RETRY_DELAY).await;
                    }
                }
            }
            auto_end.in_flight.store(false, Ordering::SeqCst);
        });
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Next {
    Retarget,
    Shutdown,
}

#[derive(Default)]
struct AutoEnd {
    in_flight: AtomicBool,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Publishing happens under this lock, so once `close` returns nothing
/// more reaches observers.
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
}

impl Gate {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.closed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, updates: &broadcast::Sender<SyncUpdate>, update: SyncUpdate) {
        let closed = self.lock();
        if !*closed {
            // No observers is fine.
            let _ = updates.send(update);
        }
    }

    fn close(&self) {
        *self.lock() = true;
    }

    fn is_closed(&self) -> bool {
        *self.lock()
    }
}

/// Owner's side of a running [`SyncLoop`]. Dropping it stops the loop.
pub struct SyncHandle {
    target: watch::Sender<Option<String>>,
    updates: broadcast::Sender<SyncUpdate>,
    gate: Arc<Gate>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn observe(&self) -> broadcast::Receiver<SyncUpdate> {
        self.updates.subscribe()
    }

    /// Switches to another quiz, or to none. Setting the current id again
    /// does nothing.
    pub fn set_quiz(&self, quiz_id: Option<String>) {
        self.target.send_if_modified(|current| {
            if *current == quiz_id {
                return false;
            }
            *current = quiz_id;
            true
        });
    }

    pub fn quiz_id(&self) -> Option<String> {
        self.target.borrow().clone()
    }

    /// Stops ticking and publishing. Safe to call more than once.
    pub fn stop(&self) {
        self.gate.close();
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.gate.is_closed()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
