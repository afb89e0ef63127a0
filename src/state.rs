// src/state.rs

use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use crate::{
    config::Config,
    engine::clock::OffsetClock,
    error::AppError,
    services::{QuizService, ResultService},
    store::DocumentStore,
    sync::SyncLoop,
    utils::hash::AdminSecret,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<OffsetClock>,
    pub quizzes: Arc<QuizService>,
    pub results: Arc<ResultService>,
    pub admin: AdminSecret,
}

impl AppState {
    /// Wires the services around one store and one corrected clock.
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        clock: Arc<OffsetClock>,
    ) -> Result<Self, AppError> {
        let admin = AdminSecret::new(&config.admin_password)?;
        let quizzes = Arc::new(QuizService::new(store.clone(), clock.clone()));
        let results = Arc::new(ResultService::new(
            store.clone(),
            clock.clone(),
            config.answer_grace_ms,
        ));

        Ok(Self {
            config,
            store,
            clock,
            quizzes,
            results,
            admin,
        })
    }

    /// A sync loop over this state's store, ticking at the configured rate.
    pub fn sync_loop(&self) -> SyncLoop {
        SyncLoop::new(self.store.clone(), self.clock.clone(), self.quizzes.clone())
            .with_tick(Duration::from_millis(self.config.sync_tick_ms))
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<QuizService> {
    fn from_ref(state: &AppState) -> Self {
        state.quizzes.clone()
    }
}

impl FromRef<AppState> for Arc<ResultService> {
    fn from_ref(state: &AppState) -> Self {
        state.results.clone()
    }
}

impl FromRef<AppState> for Arc<OffsetClock> {
    fn from_ref(state: &AppState) -> Self {
        state.clock.clone()
    }
}
