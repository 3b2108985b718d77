//! Server-Sent Events for scan and catalog changes

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /events - SSE stream of scan events
///
/// Streams `ConnectionStatus` first, then every `ScanEvent` under its type
/// name, with a heartbeat every 15 seconds.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    slb_common::sse::create_event_sse_stream("slb-web", &state.events)
}
