//! This crate contains core primitives, traits, and types for the Ortege
//! agents: the interchain security module policy model and the records the
//! relayer keeps about bridged messages.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![forbid(unsafe_code)]

pub use chain::*;
pub use error::*;
pub use traits::*;
pub use types::*;

pub use ethers_core::types::{Bytes, Signature, H160, H256, U256};

/// Helpers for turning raw configuration into validated settings
pub mod config;
/// Interchain security modules
pub mod ism;
/// Hashing and formatting helpers
pub mod utils;

mod chain;
mod error;
mod traits;
mod types;
