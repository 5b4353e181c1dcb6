//! Chain-facing types for the replayer.
//!
//! This module defines what a chain connection hands back to the engine:
//! block references, header notifications, account state snapshots and the
//! outcome of a raw transaction submission.

use alloy_primitives::B256;
use thiserror::Error;

/// A block identified by its height and hash.
///
/// The height is the search key; the hash pins state queries to exactly
/// that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockRef {
	/// Block number.
	pub height: u64,
	/// Block hash.
	pub hash: B256,
}

/// Notification that a new block header was produced on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockNotification {
	/// Height of the new block.
	pub height: u64,
}

/// Account state as of a specific block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccountState {
	/// Number of transactions the account has sent up to and including the block.
	pub nonce: u64,
}

/// Blockchain transaction hash representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionHash(pub B256);

impl std::fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Errors returned when a raw transaction could not be submitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
	/// The request did not reach the node or the answer got lost.
	#[error("Transport error: {0}")]
	Transport(String),
	/// The node answered and refused the transaction.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
}

impl SubmitError {
	/// Whether re-issuing the same submission can succeed.
	pub fn is_retryable(&self) -> bool {
		matches!(self, SubmitError::Transport(_))
	}
}

/// Outcome of submitting a raw transaction.
pub type SubmissionResult = Result<TransactionHash, SubmitError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_only_transport_errors_are_retryable() {
		assert!(SubmitError::Transport("connection reset".into()).is_retryable());
		assert!(!SubmitError::Rejected("nonce too low".into()).is_retryable());
	}
}
