//! Core replay engine for the cross-chain transaction replayer.
//!
//! Locates, for each tracked account, the source block matching the target
//! chain's current nonce, verifies the cut-point, then re-submits every later
//! transaction of those accounts to the target chain in source order and
//! keeps doing so as new source blocks appear.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod locator;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuilderError, ReplayBuilder};
pub use engine::cursor::{Cursor, EnginePhase};
pub use engine::lifecycle::ShutdownHandle;
pub use engine::{EngineError, Plan, ReplayEngine, ReplayOptions, ReplayReport};
pub use locator::{find_block_with_nonce, find_block_with_nonce_up_to, LocateError};
pub use verifier::verify;
