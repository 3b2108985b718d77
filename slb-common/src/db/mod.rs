//! Database initialization shared by both processes

pub mod init;

pub use init::*;
