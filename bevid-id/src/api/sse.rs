//! Server-Sent Events for wizard status updates

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::{AppState, MODULE_NAME};

/// GET /events - SSE stream of every wizard event
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    bevid_common::sse::create_event_sse_stream(MODULE_NAME, &state.event_bus)
}
