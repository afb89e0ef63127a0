// src/handlers/stream.rs

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{Receiver, error::RecvError};

use crate::{
    error::AppError,
    state::AppState,
    sync::{SyncHandle, SyncUpdate},
};

/// SSE endpoint streaming live progression
/// GET /api/quizzes/{id}/stream
///
/// Each connection runs its own sync loop; it stops when the client goes away.
pub async fn quiz_stream(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.quizzes.get_quiz(&quiz_id).await?;
    tracing::info!("Client connected to progression stream: quiz={}", quiz_id);

    let handle = state.sync_loop().spawn(Some(quiz_id));
    let updates = handle.observe();

    Ok(Sse::new(progress_stream(handle, updates)).keep_alive(KeepAlive::default()))
}

/// One `progress` event per update. The stream ends after the update that
/// shows the quiz finished.
fn progress_stream(
    handle: SyncHandle,
    updates: Receiver<SyncUpdate>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(
        (handle, updates, false),
        |(handle, mut updates, finished)| async move {
            if finished {
                handle.stop();
                return None;
            }
            loop {
                let update = match updates.recv().await {
                    Ok(update) => update,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Progression stream skipped {} updates", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                };

                let finished = update
                    .progression
                    .as_ref()
                    .is_some_and(|p| p.status.is_terminal());
                match Event::default().event("progress").json_data(&update) {
                    Ok(event) => return Some((Ok(event), (handle, updates, finished))),
                    Err(e) => tracing::warn!("Failed to encode progression update: {}", e),
                }
            }
        },
    )
}
