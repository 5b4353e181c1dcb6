//! Replay progress tracking.

use std::fmt;
use std::ops::RangeInclusive;

/// Phases of a replay run, entered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
	/// Determining the start height from target state.
	Planning,
	/// Scanning historical source blocks up to the head.
	Backfill,
	/// Processing blocks as header notifications arrive.
	LiveFollow,
	Terminated,
}

impl fmt::Display for EnginePhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			EnginePhase::Planning => "planning",
			EnginePhase::Backfill => "backfill",
			EnginePhase::LiveFollow => "live-follow",
			EnginePhase::Terminated => "terminated",
		};
		f.write_str(name)
	}
}

/// Position of the engine on the source chain.
///
/// Every height below `next_height` has been handled exactly once, so
/// anything at or below [`Cursor::last_handled`] is never processed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
	phase: EnginePhase,
	next_height: u64,
}

impl Default for Cursor {
	fn default() -> Self {
		Self::new()
	}
}

impl Cursor {
	pub fn new() -> Self {
		Self {
			phase: EnginePhase::Planning,
			next_height: 0,
		}
	}

	pub fn phase(&self) -> EnginePhase {
		self.phase
	}

	pub fn enter(&mut self, phase: EnginePhase) {
		if self.phase != phase {
			tracing::info!(from = %self.phase, to = %phase, "Phase transition");
			self.phase = phase;
		}
	}

	/// Places the cursor so that `height` is the next block to handle.
	pub fn start_at(&mut self, height: u64) {
		self.next_height = height;
	}

	pub fn next_height(&self) -> u64 {
		self.next_height
	}

	pub fn last_handled(&self) -> u64 {
		self.next_height.saturating_sub(1)
	}

	/// Marks `height` as handled. Heights must be handled in order.
	pub fn advance(&mut self, height: u64) {
		debug_assert_eq!(height, self.next_height, "blocks must be handled in order");
		self.next_height = height + 1;
	}

	/// Heights still to handle up to and including `notified`.
	///
	/// Empty when `notified` was already handled.
	pub fn pending_through(&self, notified: u64) -> RangeInclusive<u64> {
		self.next_height..=notified
	}
}
