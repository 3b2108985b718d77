//! slb-web library - operator interface of the Sample Log Book
//!
//! Serves the sample table and the enrollment form, and runs the web side of
//! the scan handshake against the shared Scan State Store.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use slb_common::config::HandshakeTimings;
use slb_common::events::EventBus;
use slb_common::{ScanStateStore, TagRegistry};
use std::path::PathBuf;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod attachments;
pub mod consumer;
pub mod error;
pub mod watcher;

pub use attachments::Attachments;
pub use consumer::Consumer;
pub use watcher::ScanWatcher;

/// Upload size limit for attachments
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Events buffered per SSE client before it starts skipping
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: ScanStateStore,
    pub registry: TagRegistry,
    pub consumer: Consumer,
    pub attachments: Attachments,
    pub events: EventBus,
}

impl AppState {
    pub fn new(
        store: ScanStateStore,
        registry: TagRegistry,
        events: EventBus,
        attachments_root: PathBuf,
        timings: &HandshakeTimings,
    ) -> Self {
        let consumer = Consumer::new(
            store.clone(),
            registry.clone(),
            events.clone(),
            timings.ack_reset(),
        );
        Self {
            store,
            registry,
            consumer,
            attachments: Attachments::new(attachments_root),
            events,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let pages = Router::new()
        .route("/", get(api::serve_index))
        .route("/add", get(api::add_form).post(api::submit_add_form))
        .route("/archive/:uid", get(api::archive_redirect))
        .route("/samples/:uid", get(api::sample_page))
        .route("/samples/:uid/notes", post(api::add_note))
        .route(
            "/samples/:uid/files",
            post(api::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/samples/:uid/files/:name", get(api::download_file));

    let json = Router::new()
        .route("/api/data", get(api::data))
        .route("/api/scan_status", get(api::scan_status))
        .route("/api/scan_records", get(api::scan_records))
        .route("/api/archived", get(api::archived_samples))
        .route("/api/enroll", post(api::enroll_json))
        .route("/api/archive/:uid", post(api::archive_json))
        .route("/api/samples/:uid", get(api::attachments_json))
        .route("/events", get(api::event_stream))
        .merge(api::health_routes());

    Router::new()
        .merge(pages)
        .merge(json)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
