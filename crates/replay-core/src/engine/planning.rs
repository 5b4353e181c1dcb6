//! Start height planning.
//!
//! The target chain's current nonces say how far each tracked account has
//! already been replayed. The matching source blocks give one cut-point per
//! account; the replay starts right after the earliest of them.

use super::{EngineError, ReplayEngine};
use crate::locator::find_block_with_nonce_up_to;
use crate::verifier::verify;
use replay_types::{Address, BlockRef, TrackedAddresses};

/// Outcome of planning: where to start and for which accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
	/// First source height to replay.
	pub start_height: u64,
	/// Tracked accounts that could be located on the source chain.
	pub addresses: TrackedAddresses,
	/// Target nonce per tracked account, including dropped ones.
	pub target_nonces: Vec<(Address, u64)>,
	/// Source cut-point per located account.
	pub cut_points: Vec<(Address, u64)>,
}

impl ReplayEngine {
	/// Computes the start height from the current target state.
	///
	/// Accounts whose nonce cannot be found on the source chain are dropped;
	/// the plan fails only when none remain or the integrity check fails.
	pub async fn plan(&mut self) -> Result<Plan, EngineError> {
		self.cursor.enter(super::EnginePhase::Planning);
		let target = self.target.clone();

		let head: BlockRef = self
			.retrying(&target, "target head", |chain| async move { chain.head().await })
			.await
			.map_err(|e| EngineError::Chain(e.to_string()))?
			.ok_or(EngineError::Interrupted)?;
		tracing::info!(height = head.height, hash = %head.hash, "Target head");

		let mut target_nonces = Vec::with_capacity(self.addresses.len());
		for address in self.addresses.clone().iter().copied() {
			let nonce = self
				.retrying(&target, "target nonce", move |chain| async move {
					chain.account_state(&address, head.hash).await
				})
				.await
				.map_err(|e| EngineError::Chain(e.to_string()))?
				.ok_or(EngineError::Interrupted)?
				.nonce;
			tracing::info!(address = %address, nonce, "Target nonce");
			target_nonces.push((address, nonce));
		}

		let source = self.source.clone();
		let source_head = self
			.retrying(&source, "source head", |chain| async move { chain.head_height().await })
			.await
			.map_err(|e| EngineError::Chain(e.to_string()))?
			.ok_or(EngineError::Interrupted)?;

		let mut located = Vec::with_capacity(target_nonces.len());
		let mut dropped = Vec::new();
		for (address, nonce) in &target_nonces {
			match find_block_with_nonce_up_to(source.as_ref(), address, *nonce, source_head).await {
				Ok(height) => located.push((*address, *nonce, height)),
				Err(e) => {
					tracing::error!(address = %address, nonce, error = %e, "Dropping address");
					dropped.push(*address);
				},
			}
		}

		let start_height = located
			.iter()
			.map(|(_, _, height)| *height)
			.min()
			.ok_or(EngineError::NoAddresses)?
			+ 1;
		tracing::info!(start = start_height, "Replay start height");

		if self.options.integrity_check {
			let addresses: Vec<Address> = located.iter().map(|(a, _, _)| *a).collect();
			let nonces: Vec<u64> = located.iter().map(|(_, n, _)| *n).collect();
			if !verify(self.source.as_ref(), start_height, &addresses, &nonces).await {
				return Err(EngineError::IntegrityViolation {
					height: start_height - 1,
				});
			}
			tracing::info!(height = start_height - 1, "Integrity check passed");
		} else {
			tracing::warn!("Integrity check disabled");
		}

		Ok(Plan {
			start_height,
			addresses: self.addresses.without(&dropped),
			cut_points: located.iter().map(|(a, _, h)| (*a, *h)).collect(),
			target_nonces,
		})
	}
}
