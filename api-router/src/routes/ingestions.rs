use std::{pin::Pin, time::Duration};

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use common::{
    scope::Visibility,
    storage::types::{
        document::{DocumentFilters, DocumentStatus},
        progress::{Connected, ProgressEvent},
    },
};
use futures::Stream;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

/// Latest snapshot per document that is still `queued` or `processing`
/// within the caller's visibility. Documents with no snapshot yet (the
/// worker hasn't picked them up) get a synthesized `{stage:"queued",
/// progress:0}` entry instead of being omitted.
pub async fn active_ingestions(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
) -> Result<impl IntoResponse, ApiError> {
    let filters = DocumentFilters {
        status: None,
        limit: 500,
        offset: 0,
        ..Default::default()
    };
    let documents = state.meta.list_documents(&visibility, &filters).await?;

    let mut snapshots = Vec::new();
    for document in documents
        .into_iter()
        .filter(|d| matches!(d.status, DocumentStatus::Queued | DocumentStatus::Processing))
    {
        let snapshot = state.queue.get_progress(&document.id).await?;
        let event = snapshot.unwrap_or_else(|| {
            ProgressEvent::new(
                document.id.clone(),
                document.scope_key.clone(),
                common::storage::types::progress::Stage::Queued,
            )
            .with_filename(document.filename.clone())
        });
        snapshots.push(event);
    }

    Ok(Json(snapshots))
}

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, axum::Error>> + Send>>;

fn connected_event() -> Event {
    Event::default().data(serde_json::to_string(&Connected::default()).unwrap_or_default())
}

fn progress_event(event: &ProgressEvent) -> Event {
    Event::default().data(json!(event).to_string())
}

/// Subscribes the caller to the progress broadcast channel, scoped to their
/// visibility. A client that falls behind the broadcast channel's buffer
/// just misses intermediate events; there is no replay.
pub async fn stream_ingestions(
    State(state): State<ApiState>,
    Extension(visibility): Extension<Visibility>,
) -> Sse<KeepAliveStream<EventStream>> {
    let mut receiver = state.queue.subscribe();

    let stream = async_stream::stream! {
        yield Ok(connected_event());

        loop {
            match receiver.recv().await {
                Ok(event) if visibility.allows(&event.scope_key) => yield Ok(progress_event(&event)),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(Box::pin(stream) as EventStream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
