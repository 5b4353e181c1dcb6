//! Configuration module for the transaction replayer.
//!
//! Every setting has a built-in default, so the replayer runs without a
//! configuration file against the production endpoint pair. A TOML file can
//! override any of them:
//!
//! ```toml
//! [source]
//! rpc_url = "wss://rpc.hydradx.cloud"
//!
//! [target]
//! rpc_url = "${TARGET_RPC:-wss://1.lark.hydration.cloud}"
//!
//! [replay]
//! submission_delay_secs = 12
//! reconnect_backoff_ms = 1000
//! header_buffer = 64
//! default_addresses = ["0x33a5e905fB83FcFB62B0Dd1595DfBc06792E054e"]
//! ```
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use replay_types::{
	ConfigSchema, Field, FieldType, Schema, TrackedAddresses, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Source chain endpoint used when no configuration overrides it.
pub const DEFAULT_SOURCE_URL: &str = "wss://rpc.hydradx.cloud";
/// Target chain endpoint used when no configuration overrides it.
pub const DEFAULT_TARGET_URL: &str = "wss://1.lark.hydration.cloud";
/// Accounts replayed when none are given on the command line.
pub const DEFAULT_ADDRESSES: [&str; 2] = [
	"0x33a5e905fB83FcFB62B0Dd1595DfBc06792E054e",
	"0xFf0c624016c873d359DdE711B42A2F475a5a07d3",
];

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

impl From<ValidationError> for ConfigError {
	fn from(err: ValidationError) -> Self {
		ConfigError::Validation(err.to_string())
	}
}

/// Main configuration structure for the replayer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
	/// Chain the transactions are read from.
	#[serde(default = "default_source")]
	pub source: EndpointConfig,
	/// Chain the transactions are resubmitted to.
	#[serde(default = "default_target")]
	pub target: EndpointConfig,
	/// Replay engine tuning.
	#[serde(default)]
	pub replay: ReplayConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			source: default_source(),
			target: default_target(),
			replay: ReplayConfig::default(),
		}
	}
}

/// Connection settings for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
	/// WebSocket RPC endpoint.
	pub rpc_url: String,
}

fn default_source() -> EndpointConfig {
	EndpointConfig {
		rpc_url: DEFAULT_SOURCE_URL.to_string(),
	}
}

fn default_target() -> EndpointConfig {
	EndpointConfig {
		rpc_url: DEFAULT_TARGET_URL.to_string(),
	}
}

/// Replay engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReplayConfig {
	/// Pause after each accepted submission, matched to the target block time
	/// so the target sees every account's nonces in order.
	/// Defaults to 12 seconds.
	#[serde(default = "default_submission_delay_secs")]
	pub submission_delay_secs: u64,
	/// Pause before resubscribing or refetching after a connection loss.
	#[serde(default = "default_reconnect_backoff_ms")]
	pub reconnect_backoff_ms: u64,
	/// Capacity of the header notification channel.
	#[serde(default = "default_header_buffer")]
	pub header_buffer: usize,
	/// Accounts replayed when none are given on the command line.
	#[serde(default = "default_addresses")]
	pub default_addresses: Vec<String>,
}

impl Default for ReplayConfig {
	fn default() -> Self {
		Self {
			submission_delay_secs: default_submission_delay_secs(),
			reconnect_backoff_ms: default_reconnect_backoff_ms(),
			header_buffer: default_header_buffer(),
			default_addresses: default_addresses(),
		}
	}
}

fn default_submission_delay_secs() -> u64 {
	12
}

fn default_reconnect_backoff_ms() -> u64 {
	1000
}

fn default_header_buffer() -> usize {
	64
}

fn default_addresses() -> Vec<String> {
	DEFAULT_ADDRESSES.iter().map(|a| a.to_string()).collect()
}

impl ReplayConfig {
	pub fn submission_delay(&self) -> Duration {
		Duration::from_secs(self.submission_delay_secs)
	}

	pub fn reconnect_backoff(&self) -> Duration {
		Duration::from_millis(self.reconnect_backoff_ms)
	}

	/// Parses [`ReplayConfig::default_addresses`] into a tracked set.
	pub fn default_tracked(&self) -> Result<TrackedAddresses, ConfigError> {
		TrackedAddresses::parse(&self.default_addresses).map_err(ConfigError::Validation)
	}
}

/// Schema for the raw TOML form of [`Config`].
pub struct ConfigFileSchema;

impl ConfigSchema for ConfigFileSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let endpoint = || {
			Schema::new(
				vec![Field::new("rpc_url", FieldType::Url(&["ws", "wss"]))],
				vec![],
			)
		};

		let replay = Schema::new(
			vec![],
			vec![
				Field::new(
					"submission_delay_secs",
					FieldType::Integer {
						min: Some(0),
						max: Some(600),
					},
				),
				Field::new(
					"reconnect_backoff_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(600_000),
					},
				),
				Field::new(
					"header_buffer",
					FieldType::Integer {
						min: Some(1),
						max: Some(65_536),
					},
				),
				Field::new(
					"default_addresses",
					FieldType::Array(Box::new(FieldType::String)),
				)
				.with_validator(|value| {
					let addresses: Vec<&str> = value
						.as_array()
						.map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
						.unwrap_or_default();
					if addresses.is_empty() {
						return Err("default_addresses cannot be empty".to_string());
					}
					TrackedAddresses::parse(&addresses).map(|_| ())
				}),
			],
		);

		let schema = Schema::new(
			vec![],
			vec![
				Field::new("source", FieldType::Table(endpoint())),
				Field::new("target", FieldType::Table(endpoint())),
				Field::new("replay", FieldType::Table(replay)),
			],
		);

		schema.validate(config)
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;

		let mut loader = ConfigLoader::new(base_dir);
		loader.load_config(file_name).await
	}

	/// Parses TOML whose environment variables were already substituted.
	pub(crate) fn from_resolved(resolved: &str) -> Result<Self, ConfigError> {
		let raw: toml::Value = toml::from_str(resolved)?;
		ConfigFileSchema.validate(&raw)?;
		let config: Config = toml::from_str(resolved)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks cross-field constraints the schema cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.source.rpc_url == self.target.rpc_url {
			return Err(ConfigError::Validation(
				"Source and target must be different endpoints".into(),
			));
		}
		if self.replay.header_buffer == 0 {
			return Err(ConfigError::Validation(
				"header_buffer must be at least 1".into(),
			));
		}
		self.replay.default_tracked()?;
		Ok(())
	}
}

/// Parses a TOML string: environment variables are resolved, the raw table
/// is checked against [`ConfigFileSchema`], then the typed config is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Config::from_resolved(&resolve_env_vars(s)?)
	}
}
