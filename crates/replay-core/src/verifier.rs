//! Integrity check on the replay cut-point.

use replay_chain::ChainReader;
use replay_types::Address;

/// Checks that the source chain, at `candidate_start - 1`, has exactly the
/// nonces the target chain reports for each address.
///
/// `addresses` and `target_nonces` are paired by position. A mismatch, an
/// unreadable source nonce, or lists of different lengths all fail the check.
pub async fn verify(
	source: &dyn ChainReader,
	candidate_start: u64,
	addresses: &[Address],
	target_nonces: &[u64],
) -> bool {
	if addresses.len() != target_nonces.len() {
		tracing::error!(
			addresses = addresses.len(),
			nonces = target_nonces.len(),
			"Address and nonce lists differ in length"
		);
		return false;
	}

	let height = candidate_start.saturating_sub(1);
	let mut consistent = true;

	for (address, &expected) in addresses.iter().zip(target_nonces) {
		match source.nonce_at(address, height).await {
			Ok(actual) if actual == expected => {
				tracing::debug!(address = %address, height, nonce = actual, "Nonce matches");
			},
			Ok(actual) => {
				tracing::error!(
					address = %address,
					height,
					source_nonce = actual,
					target_nonce = expected,
					"Source and target nonces differ"
				);
				consistent = false;
			},
			Err(e) => {
				tracing::error!(
					address = %address,
					height,
					target_nonce = expected,
					error = %e,
					"Source nonce unreadable"
				);
				consistent = false;
			},
		}
	}

	consistent
}
