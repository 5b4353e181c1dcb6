//! Chain connection module for the transaction replayer.
//!
//! This module defines the capability surface the replay engine needs from a
//! chain: head height, block hashes, account state at a block, the full
//! transaction list of a block, raw transaction submission and a header
//! subscription. Chain-specific RPC quirks are absorbed by the
//! implementations so callers only ever see corrected values.

use async_trait::async_trait;
use replay_types::{
	AccountState, Address, BlockNotification, BlockRef, EncodedTx, RawTx, SubmissionResult, B256,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur while reading from a chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
	/// The connection failed or dropped.
	#[error("Connection error: {0}")]
	Connection(String),
	/// The requested data does not exist (yet) or cannot be read at that block.
	#[error("Unavailable: {0}")]
	Unavailable(String),
	/// The node answered with an error response.
	#[error("RPC error: {0}")]
	Rpc(String),
	/// The node answered with data that cannot be interpreted.
	#[error("Malformed response: {0}")]
	Malformed(String),
}

impl ChainError {
	/// Whether the same request may succeed after a retry or reconnect.
	pub fn is_transient(&self) -> bool {
		!matches!(self, ChainError::Malformed(_))
	}
}

/// Trait defining the capabilities of one chain connection.
///
/// Implementations own their connection and its reconnect logic; the engine
/// holds one for the source chain and one for the target chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Short label used in log lines ("source", "target").
	fn name(&self) -> &str;

	/// Returns the height of the current chain head.
	async fn head_height(&self) -> Result<u64, ChainError>;

	/// Returns the hash of the block at `height`, or `None` if no such block exists.
	async fn block_hash(&self, height: u64) -> Result<Option<B256>, ChainError>;

	/// Reads an account's state as of the block with the given hash.
	async fn account_state(
		&self,
		address: &Address,
		block_hash: B256,
	) -> Result<AccountState, ChainError>;

	/// Returns every transaction of the block at `height`, in block order.
	async fn block_transactions(&self, height: u64) -> Result<Vec<RawTx>, ChainError>;

	/// Submits an encoded transaction.
	async fn submit_raw(&self, tx: &EncodedTx) -> SubmissionResult;

	/// Subscribes to new block headers.
	///
	/// Notifications arrive on a bounded channel fed by a background worker.
	/// The channel closes when the upstream subscription is lost; dropping the
	/// receiver stops the worker.
	async fn subscribe_headers(&self) -> Result<mpsc::Receiver<BlockNotification>, ChainError>;

	/// Tears down the connection and establishes a fresh one.
	async fn reconnect(&self) -> Result<(), ChainError>;

	/// Returns the current head as a height and hash pair.
	async fn head(&self) -> Result<BlockRef, ChainError> {
		let height = self.head_height().await?;
		let hash = self.block_hash(height).await?.ok_or_else(|| {
			ChainError::Unavailable(format!("no hash for head block {}", height))
		})?;
		Ok(BlockRef { height, hash })
	}

	/// Returns an account's nonce as of the block at `height`.
	///
	/// A missing block is reported as [`ChainError::Unavailable`].
	async fn nonce_at(&self, address: &Address, height: u64) -> Result<u64, ChainError> {
		let hash = self
			.block_hash(height)
			.await?
			.ok_or_else(|| ChainError::Unavailable(format!("no block at height {}", height)))?;
		Ok(self.account_state(address, hash).await?.nonce)
	}
}
