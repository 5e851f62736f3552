//! IoT Query Probe - a read-only SQL exploration and reporting tool.
//!
//! A submitted query goes through the statement classifier, runs under
//! statement and lock timeouts, and comes back as a row-capped table that
//! can be filtered, printed or exported.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod logging;
pub mod output;
pub mod query;
pub mod safety;

pub use error::{ExecutionError, ProbeError, Result};
