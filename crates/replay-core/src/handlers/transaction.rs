//! Transaction handler for replaying one source transaction on the target.
//!
//! Encodes the transaction into its legacy wire form, submits it, retries a
//! transport failure once on a fresh connection, and paces accepted
//! submissions.

use replay_chain::ChainReader;
use replay_types::{truncate_id, EncodedTx, RawTx, SubmissionResult, TransactionHash};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// What happened to a single matching transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
	/// Accepted by the target node.
	Submitted(TransactionHash),
	/// Encoded and logged only.
	DryRun(EncodedTx),
	/// Could not be encoded.
	Skipped,
	/// Refused by the target or lost twice in transport.
	Failed,
}

/// Handler for submitting replayed transactions to the target chain.
pub struct TransactionHandler {
	target: Arc<dyn ChainReader>,
	submission_delay: Duration,
	dry_run: bool,
}

impl TransactionHandler {
	pub fn new(target: Arc<dyn ChainReader>, submission_delay: Duration, dry_run: bool) -> Self {
		Self {
			target,
			submission_delay,
			dry_run,
		}
	}

	/// Replays one transaction found in the source block at `height`.
	#[instrument(skip_all, fields(height = height, tx_hash = %truncate_id(tx.display_hash()), nonce = ?tx.display_nonce()))]
	pub async fn handle(&self, height: u64, tx: &RawTx) -> TxOutcome {
		let encoded = match replay_codec::encode(tx) {
			Ok(encoded) => encoded,
			Err(e) => {
				tracing::warn!(error = %e, "Cannot encode transaction, skipping");
				return TxOutcome::Skipped;
			},
		};

		if self.dry_run {
			tracing::info!(raw = %encoded, "Dry run, not submitting");
			return TxOutcome::DryRun(encoded);
		}

		match self.submit_with_retry(&encoded).await {
			Ok(hash) => {
				tracing::info!(submitted = %hash, "Transaction submitted");
				tokio::time::sleep(self.submission_delay).await;
				TxOutcome::Submitted(hash)
			},
			Err(e) => {
				tracing::error!(
					tx_hash = tx.display_hash(),
					raw = %encoded,
					error = %e,
					"Submission failed, skipping transaction"
				);
				TxOutcome::Failed
			},
		}
	}

	async fn submit_with_retry(&self, encoded: &EncodedTx) -> SubmissionResult {
		match self.target.submit_raw(encoded).await {
			Err(e) if e.is_retryable() => {
				tracing::warn!(error = %e, "Submission lost, retrying on a new connection");
				if let Err(e) = self.target.reconnect().await {
					tracing::warn!(chain = self.target.name(), error = %e, "Reconnect failed");
				}
				self.target.submit_raw(encoded).await
			},
			other => other,
		}
	}
}
