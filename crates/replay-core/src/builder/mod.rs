//! Builder for constructing replay engines.
//!
//! Turns a loaded [`Config`] plus command-line choices into a
//! [`ReplayEngine`], opening one connection per chain. Connections can also
//! be injected, which is how non-network callers drive the engine.

use crate::engine::{ReplayEngine, ReplayOptions};
use replay_chain::implementations::evm::alloy::AlloyChain;
use replay_chain::ChainReader;
use replay_config::Config;
use replay_types::TrackedAddresses;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Connection error: {0}")]
	Connection(String),
}

/// Builder for a [`ReplayEngine`].
pub struct ReplayBuilder {
	config: Config,
	addresses: Option<TrackedAddresses>,
	integrity_check: bool,
	dry_run: bool,
}

impl ReplayBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			addresses: None,
			integrity_check: true,
			dry_run: false,
		}
	}

	/// Replays these addresses instead of the configured defaults.
	///
	/// An empty set keeps the defaults.
	pub fn with_addresses(mut self, addresses: TrackedAddresses) -> Self {
		self.addresses = (!addresses.is_empty()).then_some(addresses);
		self
	}

	pub fn with_integrity_check(mut self, enabled: bool) -> Self {
		self.integrity_check = enabled;
		self
	}

	pub fn with_dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	/// Options the engine will run with.
	pub fn options(&self) -> ReplayOptions {
		ReplayOptions {
			integrity_check: self.integrity_check,
			dry_run: self.dry_run,
			submission_delay: self.config.replay.submission_delay(),
			reconnect_backoff: self.config.replay.reconnect_backoff(),
		}
	}

	/// Addresses the engine will replay.
	pub fn tracked(&self) -> Result<TrackedAddresses, BuilderError> {
		match &self.addresses {
			Some(addresses) => Ok(addresses.clone()),
			None => self
				.config
				.replay
				.default_tracked()
				.map_err(|e| BuilderError::Config(e.to_string())),
		}
	}

	/// Connects to both configured endpoints and builds the engine.
	pub async fn build(self) -> Result<ReplayEngine, BuilderError> {
		let buffer = self.config.replay.header_buffer;

		let source = AlloyChain::connect("source", &self.config.source.rpc_url, buffer)
			.await
			.map_err(|e| BuilderError::Connection(e.to_string()))?;
		tracing::info!(component = "chain", side = "source", url = %self.config.source.rpc_url, "Loaded");

		let target = AlloyChain::connect("target", &self.config.target.rpc_url, buffer)
			.await
			.map_err(|e| BuilderError::Connection(e.to_string()))?;
		tracing::info!(component = "chain", side = "target", url = %self.config.target.rpc_url, "Loaded");

		self.build_with(Arc::new(source), Arc::new(target))
	}

	/// Builds the engine over already-open connections.
	pub fn build_with(
		self,
		source: Arc<dyn ChainReader>,
		target: Arc<dyn ChainReader>,
	) -> Result<ReplayEngine, BuilderError> {
		let addresses = self.tracked()?;
		let options = self.options();
		for address in &addresses {
			tracing::info!(address = %address, "Tracking address");
		}
		Ok(ReplayEngine::new(source, target, addresses, options))
	}
}
