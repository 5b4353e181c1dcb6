//! Lifecycle management for the replay engine.
//!
//! Handles the stop signal: a [`ShutdownHandle`] requests it from outside,
//! and the engine polls or awaits it between blocks and notifications.

use super::ReplayEngine;
use tokio::sync::mpsc;

/// Requests a running engine to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
	tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
	/// Asks the engine to stop after the block it is working on.
	pub fn shutdown(&self) {
		// A full channel means a stop is already pending.
		let _ = self.tx.try_send(());
	}
}

impl ReplayEngine {
	/// Returns a handle that stops this engine's run.
	pub fn shutdown_handle(&self) -> ShutdownHandle {
		ShutdownHandle {
			tx: self.stop_tx.clone(),
		}
	}

	/// Whether a stop was requested; latches once observed.
	pub(crate) fn stop_requested(&mut self) -> bool {
		if !self.stopping && self.stop_rx.try_recv().is_ok() {
			tracing::info!("Shutdown requested");
			self.stopping = true;
		}
		self.stopping
	}

	/// Waits for a stop request.
	pub(crate) async fn stopped(&mut self) {
		if self.stopping {
			return;
		}
		if self.stop_rx.recv().await.is_some() {
			tracing::info!("Shutdown requested");
		}
		self.stopping = true;
	}
}
