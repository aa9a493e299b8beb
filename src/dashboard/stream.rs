// `GET /api/dashboard/stream` — Server-Sent Events push of
// `dashboard_update` events (§6's "any duplex push transport"),
// backed by a `tokio::sync::broadcast` channel fed by
// `DashboardState::spawn_refresh_task`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};

use super::DashboardState;

pub async fn dashboard_stream(
    State(state): State<DashboardState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.updates.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(value) => Some(Ok(Event::default().event("dashboard_update").json_data(value).unwrap_or_else(|_| Event::default()))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
