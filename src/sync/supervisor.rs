// src/sync/supervisor.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::SyncLoop;
use crate::{
    models::quiz::QuizStatus,
    store::{QUIZZES, Filter},
};

/// Runs one server-side [`SyncLoop`] that follows whichever quiz is running,
/// so an expired quiz is ended even when no client is connected.
pub fn spawn_supervisor(sync: SyncLoop, retry: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let store = Arc::clone(&sync.store);
        let handle = sync.spawn(None);

        loop {
            let mut running = match store
                .subscribe(QUIZZES, Filter::all().one_of("status", QuizStatus::RUNNING))
                .await
            {
                Ok(subscription) => subscription,
                Err(e) => {
                    tracing::warn!("Supervisor could not watch running quizzes: {}", e);
                    tokio::time::sleep(retry).await;
                    continue;
                }
            };

            while let Ok(docs) = running.changed().await {
                let next = docs.first().map(|doc| doc.id.clone());
                if next != handle.quiz_id() {
                    match &next {
                        Some(id) => tracing::info!("Supervisor following quiz {}", id),
                        None => tracing::info!("Supervisor idle: no quiz running"),
                    }
                    handle.set_quiz(next);
                }
            }

            tracing::warn!("Running-quiz subscription closed; resubscribing");
            tokio::time::sleep(retry).await;
        }
    })
}
