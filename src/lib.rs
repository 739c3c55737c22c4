//! FastPay sync - device record upload pipeline and transaction SMS merging
//!
//! The device side queues contacts, SMS and notifications, persists the
//! queue across restarts, and uploads it to the backend in prioritized
//! batches. The dashboard side coalesces runs of bank transaction alerts
//! through a fixed set of merge processors.

pub mod config;
pub mod contacts;
pub mod error;
pub mod merge;
pub mod messages;
pub mod sync;

pub use error::{Error, Result};
