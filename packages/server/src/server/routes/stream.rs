//! SSE streaming endpoint.
//!
//! GET /streams/:topic
//!
//! Forwards stream hub topics as server-sent events. Best-effort only: a
//! subscriber that lags gets a `lagged` event with the number of missed
//! messages and reconciles by polling the record endpoints.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::server::app::AppState;

/// Topic prefixes clients may subscribe to.
fn is_known_topic(topic: &str) -> bool {
    topic == "all_models"
        || topic
            .strip_prefix("model_version_thumbnail:")
            .map_or(false, |id| id.parse::<i64>().is_ok())
        || topic
            .strip_prefix("model_active_version:")
            .map_or(false, |id| id.parse::<i64>().is_ok())
}

pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Path(topic): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    if !is_known_topic(&topic) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let rx = state.stream_hub.subscribe(&topic).await;

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async {
        match result {
            Ok(value) => {
                let event_name = value
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("message");
                Event::default()
                    .event(event_name)
                    .json_data(&value)
                    .ok()
                    .map(Ok)
            }
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                Event::default()
                    .event("lagged")
                    .json_data(&serde_json::json!({ "missed": n }))
                    .ok()
                    .map(Ok)
            }
        }
    });

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}
