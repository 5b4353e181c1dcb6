//! Backfill and live-follow loops.

use super::ReplayEngine;
use replay_chain::ChainReader;
use std::sync::Arc;

impl ReplayEngine {
	/// Scans from the cursor up to the source head, repeating until the head
	/// stops moving.
	///
	/// Returns `false` if the run was stopped.
	pub(crate) async fn backfill(&mut self) -> bool {
		let source = self.source.clone();
		let mut head = match self.read_source_head(&source).await {
			Some(head) => head,
			None => return false,
		};

		loop {
			tracing::info!(from = self.cursor.next_height(), head, "Backfilling");
			while self.cursor.next_height() <= head {
				if self.stop_requested() {
					return false;
				}
				let height = self.cursor.next_height();
				if !self.process_block(height, head).await {
					return false;
				}
			}

			let latest = match self.read_source_head(&source).await {
				Some(latest) => latest,
				None => return false,
			};
			if latest <= head {
				tracing::info!(head, "Backfill complete");
				return true;
			}
			head = latest;
		}
	}

	/// Processes blocks as header notifications arrive, resubscribing when the
	/// subscription drops, until a stop is requested.
	pub(crate) async fn live_follow(&mut self) {
		let source = self.source.clone();

		loop {
			if self.stop_requested() {
				return;
			}

			let mut headers = match source.subscribe_headers().await {
				Ok(headers) => headers,
				Err(e) => {
					tracing::warn!(error = %e, "Failed to subscribe to new heads");
					self.recover_source().await;
					continue;
				},
			};
			tracing::info!(last_handled = self.cursor.last_handled(), "Following new blocks");

			loop {
				let notification = tokio::select! {
					notification = headers.recv() => notification,
					_ = self.stopped() => return,
				};
				let Some(notification) = notification else {
					break;
				};

				if notification.height <= self.cursor.last_handled() {
					tracing::debug!(height = notification.height, "Already handled, ignoring");
					continue;
				}
				for height in self.cursor.pending_through(notification.height) {
					if !self.process_block(height, notification.height).await {
						return;
					}
				}
			}

			tracing::warn!(
				last_handled = self.cursor.last_handled(),
				"Header subscription lost, resubscribing"
			);
			self.recover_source().await;
		}
	}

	async fn recover_source(&mut self) {
		if let Err(e) = self.source.reconnect().await {
			tracing::warn!(chain = self.source.name(), error = %e, "Reconnect failed");
		}
		tokio::time::sleep(self.options.reconnect_backoff).await;
	}

	async fn read_source_head(&mut self, source: &Arc<dyn ChainReader>) -> Option<u64> {
		match self
			.retrying(source, "source head", |chain| async move { chain.head_height().await })
			.await
		{
			Ok(head) => head,
			Err(e) => {
				// Head reads only fail permanently on a malformed answer.
				tracing::error!(error = %e, "Unreadable source head, stopping");
				None
			},
		}
	}
}
