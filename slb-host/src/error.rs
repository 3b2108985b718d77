//! Reader error type for slb-host
//!
//! Store and registry failures are `slb_common::Error`; the binary wraps
//! everything in `anyhow` at the top level.

use thiserror::Error;

/// Failure of a single reader poll
///
/// The poller logs these and treats the poll as "no tag"; they never stop
/// the loop.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Reader device or input stream failed
    #[error("Reader I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Input stream reached its end; no more reads will arrive
    #[error("Reader input closed")]
    Closed,
}
