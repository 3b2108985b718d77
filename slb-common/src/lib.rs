//! # Sample Log Book Common Library
//!
//! Shared code for the two Sample Log Book processes (`slb-host` and `slb-web`):
//! - Tag identifiers and sample metadata
//! - Database initialization
//! - Scan State Store (single-writer coordination table)
//! - Tag Registry (enrolled and archived samples)
//! - Handshake Protocol mutations
//! - Debounced per-tag tasks
//! - Event types and SSE helpers
//! - Configuration loading

pub mod config;
pub mod db;
pub mod debounce;
pub mod error;
pub mod events;
pub mod handshake;
pub mod registry;
pub mod sse;
pub mod store;
pub mod tag;
pub mod time;

pub use error::{Error, Result};
pub use handshake::{HandshakePhase, ScanMutation};
pub use registry::{Sample, SampleMetadata, TagRegistry};
pub use store::{ScanRecord, ScanStateStore};
pub use tag::TagId;
