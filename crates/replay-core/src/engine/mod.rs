//! Replay engine that drives a run from planning to live-follow.
//!
//! The engine owns the source and target connections, the tracked address
//! set and the cursor. A run plans the start height, backfills historical
//! blocks, then follows new blocks until it is shut down. Everything happens
//! on one task, so submissions are strictly sequential in block order.

pub mod cursor;
mod follow;
pub mod lifecycle;
mod planning;

pub use planning::Plan;

use crate::handlers::{TransactionHandler, TxOutcome};
use cursor::{Cursor, EnginePhase};
use replay_chain::{ChainError, ChainReader};
use replay_types::TrackedAddresses;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that end a replay run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
	/// Every tracked address failed the cut-point search.
	#[error("No tracked address could be located on the source chain")]
	NoAddresses,
	/// Source and target disagree at the block before the start height.
	#[error("Integrity check failed at source height {height}")]
	IntegrityViolation { height: u64 },
	/// A chain returned data that retrying cannot fix.
	#[error("Chain error: {0}")]
	Chain(String),
	/// Shutdown was requested before planning finished.
	#[error("Interrupted during planning")]
	Interrupted,
}

/// Tunables for a replay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
	/// Check the cut-point against source state before submitting anything.
	pub integrity_check: bool,
	/// Encode and log matching transactions without submitting them.
	pub dry_run: bool,
	/// Pause after every accepted submission.
	pub submission_delay: Duration,
	/// Pause before retrying after a reconnect.
	pub reconnect_backoff: Duration,
}

impl Default for ReplayOptions {
	fn default() -> Self {
		Self {
			integrity_check: true,
			dry_run: false,
			submission_delay: Duration::from_secs(12),
			reconnect_backoff: Duration::from_secs(1),
		}
	}
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
	/// First source height replayed; zero when planning did not finish.
	pub start_height: u64,
	pub blocks_scanned: u64,
	/// Blocks whose payload could not be interpreted.
	pub blocks_skipped: u64,
	pub submitted: u64,
	pub dry_run: u64,
	/// Matching transactions that could not be encoded.
	pub skipped: u64,
	pub failed: u64,
}

impl ReplayReport {
	fn record(&mut self, outcome: &TxOutcome) {
		match outcome {
			TxOutcome::Submitted(_) => self.submitted += 1,
			TxOutcome::DryRun(_) => self.dry_run += 1,
			TxOutcome::Skipped => self.skipped += 1,
			TxOutcome::Failed => self.failed += 1,
		}
	}
}

/// Main replay engine.
pub struct ReplayEngine {
	pub(crate) source: Arc<dyn ChainReader>,
	pub(crate) target: Arc<dyn ChainReader>,
	pub(crate) addresses: TrackedAddresses,
	pub(crate) options: ReplayOptions,
	pub(crate) transaction_handler: TransactionHandler,
	pub(crate) cursor: Cursor,
	pub(crate) report: ReplayReport,
	pub(crate) stop_tx: mpsc::Sender<()>,
	pub(crate) stop_rx: mpsc::Receiver<()>,
	pub(crate) stopping: bool,
}

impl ReplayEngine {
	/// Creates an engine replaying `addresses` from `source` onto `target`.
	pub fn new(
		source: Arc<dyn ChainReader>,
		target: Arc<dyn ChainReader>,
		addresses: TrackedAddresses,
		options: ReplayOptions,
	) -> Self {
		let transaction_handler =
			TransactionHandler::new(target.clone(), options.submission_delay, options.dry_run);
		let (stop_tx, stop_rx) = mpsc::channel(1);

		Self {
			source,
			target,
			addresses,
			options,
			transaction_handler,
			cursor: Cursor::new(),
			report: ReplayReport::default(),
			stop_tx,
			stop_rx,
			stopping: false,
		}
	}

	pub fn addresses(&self) -> &TrackedAddresses {
		&self.addresses
	}

	pub fn phase(&self) -> EnginePhase {
		self.cursor.phase()
	}

	/// Runs the replay until shut down.
	///
	/// Returns an error only for conditions that make replaying unsafe or
	/// pointless; transient chain failures are retried.
	pub async fn run(mut self) -> Result<ReplayReport, EngineError> {
		tracing::info!(
			addresses = self.addresses.len(),
			dry_run = self.options.dry_run,
			integrity_check = self.options.integrity_check,
			"Starting replay"
		);

		let plan = match self.plan().await {
			Ok(plan) => plan,
			Err(EngineError::Interrupted) => {
				self.cursor.enter(EnginePhase::Terminated);
				return Ok(self.report);
			},
			Err(e) => {
				tracing::error!(error = %e, "Planning failed");
				self.cursor.enter(EnginePhase::Terminated);
				return Err(e);
			},
		};

		self.addresses = plan.addresses;
		self.report.start_height = plan.start_height;
		self.cursor.start_at(plan.start_height);

		self.cursor.enter(EnginePhase::Backfill);
		if self.backfill().await {
			self.cursor.enter(EnginePhase::LiveFollow);
			self.live_follow().await;
		}

		self.cursor.enter(EnginePhase::Terminated);
		tracing::info!(
			start = self.report.start_height,
			scanned = self.report.blocks_scanned,
			submitted = self.report.submitted,
			failed = self.report.failed,
			skipped = self.report.skipped,
			"Replay finished"
		);
		Ok(self.report)
	}

	/// Runs `op` against `chain` until it succeeds, backing off after each
	/// transient failure.
	///
	/// Only a broken connection is re-established. Data the node has not
	/// produced yet is waited for on the same connection, which keeps any live
	/// header subscription on it alive.
	///
	/// Returns `Ok(None)` when a stop is requested between attempts.
	pub(crate) async fn retrying<T, F, Fut>(
		&mut self,
		chain: &Arc<dyn ChainReader>,
		what: &str,
		op: F,
	) -> Result<Option<T>, ChainError>
	where
		F: Fn(Arc<dyn ChainReader>) -> Fut,
		Fut: Future<Output = Result<T, ChainError>>,
	{
		loop {
			match op(chain.clone()).await {
				Ok(value) => return Ok(Some(value)),
				Err(e @ ChainError::Connection(_)) => {
					tracing::warn!(chain = chain.name(), error = %e, "Failed to read {}, reconnecting", what);
					if let Err(e) = chain.reconnect().await {
						tracing::warn!(chain = chain.name(), error = %e, "Reconnect failed");
					}
					tokio::time::sleep(self.options.reconnect_backoff).await;
					if self.stop_requested() {
						return Ok(None);
					}
				},
				Err(e) if e.is_transient() => {
					tracing::debug!(chain = chain.name(), error = %e, "Failed to read {}, retrying", what);
					tokio::time::sleep(self.options.reconnect_backoff).await;
					if self.stop_requested() {
						return Ok(None);
					}
				},
				Err(e) => return Err(e),
			}
		}
	}

	/// Replays every tracked transaction in the source block at `height`.
	///
	/// Returns `false` if a stop was requested before the block could be read;
	/// the cursor then stays on `height`.
	pub(crate) async fn process_block(&mut self, height: u64, head: u64) -> bool {
		let source = self.source.clone();
		let fetched = self
			.retrying(&source, "block", move |chain| async move {
				chain.block_transactions(height).await
			})
			.await;

		let transactions = match fetched {
			Ok(Some(transactions)) => transactions,
			Ok(None) => return false,
			Err(e) => {
				tracing::error!(height, error = %e, "Unreadable block, skipping");
				self.report.blocks_skipped += 1;
				self.cursor.advance(height);
				return true;
			},
		};

		let mut matched = 0usize;
		for tx in &transactions {
			let tracked = tx
				.sender()
				.is_some_and(|sender| self.addresses.contains(&sender));
			if !tracked {
				continue;
			}
			matched += 1;
			let outcome = self.transaction_handler.handle(height, tx).await;
			self.report.record(&outcome);
		}

		tracing::info!(height, head, matched, "Scanned block {}/{}", height, head);
		self.report.blocks_scanned += 1;
		self.cursor.advance(height);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{address, signed_tx, wait_until, FakeChain};
	use replay_types::U256;
	use std::collections::HashMap;

	const A: u8 = 0xa1;
	const B: u8 = 0xb2;
	const OTHER: u8 = 0x77;

	fn options() -> ReplayOptions {
		ReplayOptions {
			integrity_check: true,
			dry_run: false,
			submission_delay: Duration::ZERO,
			reconnect_backoff: Duration::ZERO,
		}
	}

	fn tracked() -> TrackedAddresses {
		TrackedAddresses::new([address(A), address(B)])
	}

	/// Source history up to height 10; the target has replayed A up to
	/// nonce 1 and B up to nonce 0, which puts the cut-point at 5.
	fn scenario() -> (Arc<FakeChain>, Arc<FakeChain>) {
		let source = Arc::new(FakeChain::new("source", 10));
		source.add_tx(2, address(A), 0);
		source.add_tx(3, address(B), 0);
		source.add_tx(4, address(A), 1);
		source.add_tx(6, address(A), 2);
		source.add_raw_tx(6, signed_tx(address(OTHER), 40));
		source.add_tx(6, address(B), 1);
		source.add_tx(8, address(B), 2);
		source.add_tx(9, address(A), 3);

		let target = Arc::new(FakeChain::new("target", 50));
		target.set_nonce(address(A), 30, 2);
		target.set_nonce(address(B), 30, 1);

		(source, target)
	}

	fn engine(source: &Arc<FakeChain>, target: &Arc<FakeChain>, options: ReplayOptions) -> ReplayEngine {
		ReplayEngine::new(source.clone(), target.clone(), tracked(), options)
	}

	#[tokio::test]
	async fn test_plan_starts_after_cut_point() {
		let (source, target) = scenario();
		let mut engine = engine(&source, &target, options());

		let plan = engine.plan().await.unwrap();

		assert_eq!(plan.start_height, 6);
		assert_eq!(plan.addresses, tracked());
		assert_eq!(plan.cut_points, vec![(address(A), 5), (address(B), 5)]);
		assert_eq!(plan.target_nonces, vec![(address(A), 2), (address(B), 1)]);
	}

	#[tokio::test]
	async fn test_plan_survives_transient_source_head_error() {
		let (source, target) = scenario();
		source.fail_head(1);
		let mut engine = engine(&source, &target, options());

		let plan = engine.plan().await.unwrap();

		assert_eq!(plan.start_height, 6);
		assert_eq!(plan.addresses, tracked());
		assert_eq!(source.reconnects(), 1);
	}

	#[tokio::test]
	async fn test_repeated_planning_yields_same_start() {
		let (source, target) = scenario();
		let mut engine = engine(&source, &target, options());

		let first = engine.plan().await.unwrap();
		let second = engine.plan().await.unwrap();

		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_backfill_submits_in_block_order() {
		let (source, target) = scenario();
		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		// A:2 and B:1 share block 6; the untracked sender in between is ignored.
		assert_eq!(target.submitted_nonces(), vec![2, 1, 2, 3]);
		assert_eq!(source.fetched(), vec![6, 7, 8, 9, 10]);
		assert_eq!(report.start_height, 6);
		assert_eq!(report.blocks_scanned, 5);
		assert_eq!(report.submitted, 4);
		assert_eq!(report.failed, 0);
	}

	#[tokio::test]
	async fn test_per_account_nonces_increase() {
		let (source, target) = scenario();
		source.add_tx(12, address(A), 4);
		source.add_tx(12, address(B), 3);
		source.push_session(&[12]);
		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| target.submissions().len() == 6).await;
		shutdown.shutdown();
		run.await.unwrap().unwrap();

		// signed_tx tags each sender's signature with its first address byte.
		let mut per_account: HashMap<U256, Vec<u64>> = HashMap::new();
		for tx in target.submissions() {
			let decoded = replay_codec::decode(tx.as_bytes()).unwrap();
			per_account
				.entry(decoded.r)
				.or_default()
				.push(decoded.nonce.to::<u64>());
		}
		assert_eq!(per_account[&U256::from(A)], vec![2, 3, 4]);
		assert_eq!(per_account[&U256::from(B)], vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn test_integrity_violation_stops_before_submitting() {
		let (source, target) = scenario();
		// B reaches nonce 2 at height 6, after the checked height 5.
		target.set_nonce(address(B), 40, 2);
		let engine = engine(&source, &target, options());

		let result = engine.run().await;

		assert_eq!(result, Err(EngineError::IntegrityViolation { height: 5 }));
		assert_eq!(target.submit_attempts(), 0);
		assert!(source.fetched().is_empty());
	}

	#[tokio::test]
	async fn test_disabled_integrity_check_proceeds() {
		let (source, target) = scenario();
		target.set_nonce(address(B), 40, 2);
		let engine = engine(
			&source,
			&target,
			ReplayOptions {
				integrity_check: false,
				..options()
			},
		);
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| target.submissions().len() == 4).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(report.start_height, 6);
	}

	#[tokio::test]
	async fn test_unlocatable_address_is_dropped() {
		let (source, target) = scenario();
		let ghost = address(0xc3);
		source.add_tx(7, ghost, 0);
		target.set_nonce(ghost, 30, 9);

		let mut engine = ReplayEngine::new(
			source.clone(),
			target.clone(),
			TrackedAddresses::new([address(A), address(B), ghost]),
			options(),
		);
		let plan = engine.plan().await.unwrap();

		assert_eq!(plan.addresses, tracked());
		assert_eq!(plan.start_height, 6);
	}

	#[tokio::test]
	async fn test_no_locatable_address_is_fatal() {
		let (source, target) = scenario();
		let ghost = address(0xc3);
		target.set_nonce(ghost, 30, 9);

		let engine = ReplayEngine::new(
			source.clone(),
			target.clone(),
			TrackedAddresses::new([ghost]),
			options(),
		);

		assert_eq!(engine.run().await, Err(EngineError::NoAddresses));
		assert_eq!(target.submit_attempts(), 0);
	}

	#[tokio::test]
	async fn test_live_follow_resubscribes_without_gaps_or_duplicates() {
		let (source, target) = scenario();
		source.add_tx(12, address(A), 4);
		source.add_tx(14, address(B), 3);
		// The first stream drops after 12; the second repeats 12 and skips 13.
		source.push_session(&[11, 12]);
		source.push_session(&[12, 14]);

		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| target.submissions().len() == 6).await;
		wait_until(|| source.subscriptions() == 3).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(source.fetched(), (6..=14).collect::<Vec<_>>());
		assert_eq!(target.submitted_nonces(), vec![2, 1, 2, 3, 4, 3]);
		assert_eq!(source.reconnects(), 2);
		assert_eq!(report.blocks_scanned, 9);
	}

	#[tokio::test]
	async fn test_backfill_catches_up_with_new_head() {
		let (source, target) = scenario();
		source.add_tx(12, address(A), 4);
		source.bump_head_after(9, 12);

		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(source.fetched(), (6..=12).collect::<Vec<_>>());
		assert_eq!(target.submitted_nonces(), vec![2, 1, 2, 3, 4]);
		assert_eq!(report.blocks_scanned, 7);
	}

	#[tokio::test]
	async fn test_transient_block_failure_is_retried() {
		let (source, target) = scenario();
		source.fail_block(8, 2);

		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		run.await.unwrap().unwrap();

		assert_eq!(source.reconnects(), 2);
		assert_eq!(source.fetched(), vec![6, 7, 8, 9, 10]);
		assert_eq!(target.submitted_nonces(), vec![2, 1, 2, 3]);
	}

	#[tokio::test]
	async fn test_unindexed_block_is_awaited_without_reconnecting() {
		let (source, target) = scenario();
		source.lag_block(7, 2);

		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(source.reconnects(), 0);
		assert_eq!(source.fetched(), (6..=10).collect::<Vec<_>>());
		assert_eq!(target.submitted_nonces(), vec![2, 1, 2, 3]);
		assert_eq!(report.blocks_scanned, 5);
	}

	#[tokio::test]
	async fn test_malformed_block_is_skipped() {
		let (source, target) = scenario();
		source.make_block_malformed(9);

		let engine = engine(&source, &target, options());
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(target.submitted_nonces(), vec![2, 1, 2]);
		assert_eq!(report.blocks_skipped, 1);
		assert_eq!(report.blocks_scanned, 4);
	}

	#[tokio::test]
	async fn test_dry_run_submits_nothing() {
		let (source, target) = scenario();
		let engine = engine(
			&source,
			&target,
			ReplayOptions {
				dry_run: true,
				..options()
			},
		);
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(report.dry_run, 4);
		assert_eq!(target.submit_attempts(), 0);
	}

	#[tokio::test]
	async fn test_start_past_head_has_empty_backfill() {
		let source = Arc::new(FakeChain::new("source", 10));
		source.add_tx(10, address(A), 0);
		let target = Arc::new(FakeChain::new("target", 50));
		target.set_nonce(address(A), 30, 1);

		let engine = ReplayEngine::new(
			source.clone(),
			target.clone(),
			TrackedAddresses::new([address(A)]),
			options(),
		);
		let shutdown = engine.shutdown_handle();
		let run = tokio::spawn(engine.run());

		wait_until(|| source.subscriptions() == 1).await;
		shutdown.shutdown();
		let report = run.await.unwrap().unwrap();

		assert_eq!(report.start_height, 11);
		assert!(source.fetched().is_empty());
		assert_eq!(report.blocks_scanned, 0);
	}
}
