//! Nonce-indexed block search.
//!
//! An account's nonce never decreases with block height, so the block at
//! which an account had a given nonce can be found by binary search over the
//! chain. The search answers "which source block matches the state the
//! target chain has already caught up to" and is the replay cut-point.

use replay_chain::{ChainError, ChainReader};
use replay_types::Address;
use thiserror::Error;

/// Errors that can occur while locating a block by nonce.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocateError {
	/// The chain head could not be read, so there is no range to search.
	#[error("Failed to read chain head: {0}")]
	Head(ChainError),
	/// No block in the searched range has the requested nonce.
	#[error("No block found where {address} had nonce {nonce}")]
	NonceNotFound { address: Address, nonce: u64 },
}

/// Finds the latest block at which `address` had exactly `target_nonce`.
///
/// Binary search over `[1, head]`; a height whose nonce cannot be read moves
/// the lower bound past it instead of failing. After a hit the result is
/// extended forward while the nonce stays equal, stopping at the first height
/// whose nonce differs or cannot be read.
pub async fn find_block_with_nonce(
	chain: &dyn ChainReader,
	address: &Address,
	target_nonce: u64,
) -> Result<u64, LocateError> {
	let head = chain.head_height().await.map_err(LocateError::Head)?;
	find_block_with_nonce_up_to(chain, address, target_nonce, head).await
}

/// Same search as [`find_block_with_nonce`] over `[1, head]` for a head the
/// caller has already read.
pub async fn find_block_with_nonce_up_to(
	chain: &dyn ChainReader,
	address: &Address,
	target_nonce: u64,
	head: u64,
) -> Result<u64, LocateError> {
	tracing::debug!(
		chain = chain.name(),
		address = %address,
		nonce = target_nonce,
		head,
		"Searching for block with nonce"
	);

	let mut low = 1u64;
	let mut high = head;
	let mut found = None;

	while low <= high {
		let mid = low + (high - low) / 2;
		match chain.nonce_at(address, mid).await {
			Ok(nonce) if nonce == target_nonce => {
				found = Some(mid);
				break;
			},
			Ok(nonce) if nonce < target_nonce => low = mid + 1,
			Ok(_) => high = mid - 1,
			Err(e) => {
				tracing::debug!(height = mid, error = %e, "Nonce unreadable, moving past it");
				low = mid + 1;
			},
		}
	}

	let mut result = found.ok_or(LocateError::NonceNotFound {
		address: *address,
		nonce: target_nonce,
	})?;

	while let Ok(nonce) = chain.nonce_at(address, result + 1).await {
		if nonce != target_nonce {
			break;
		}
		result += 1;
	}

	tracing::info!(
		address = %address,
		nonce = target_nonce,
		height = result,
		"Latest block with nonce"
	);
	Ok(result)
}
