//! Sample Log Book host (slb-host)
//!
//! Hardware-facing side of the handshake: reads NFC tags, classifies them
//! against the registry and publishes the result in the Scan State Store for
//! the web interface.

pub mod error;
pub mod poller;
pub mod reader;

pub use error::ReaderError;
pub use poller::{Poller, PollerEvent, ReconcileReport};
pub use reader::{LineReader, ScriptedFeed, ScriptedReader, TagReader};
