//! Common types module for the transaction replayer.
//!
//! This module defines the data model shared by the codec, the chain
//! connections and the replay engine: fetched transactions, their encoded
//! wire form, block references, submission outcomes and the tracked address
//! set. It also carries the configuration validation framework.

/// Tracked account addresses and address parsing.
pub mod address;
/// Chain-facing types: block references, notifications, account state and submission results.
pub mod chain;
/// Transaction types in their fetched and encoded forms.
pub mod transaction;
/// Utility functions for hex string handling.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use address::{parse_address, TrackedAddresses};
pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use chain::*;
pub use transaction::*;
pub use utils::{truncate_id, without_0x_prefix};
pub use validation::*;
