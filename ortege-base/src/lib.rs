//! This crate contains the pieces shared by the agents: settings loading,
//! tracing and metrics setup, the submission ledger and the agent lifecycle.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![forbid(unsafe_code)]

/// Settings and configuration
pub mod settings;

mod agent;
pub use agent::*;

/// Prometheus metrics
pub mod metrics;
pub use metrics::*;

/// Submission record storage
pub mod db;
