//! Main entry point for the transaction replayer.
//!
//! Replays every transaction the given accounts sent on the source chain
//! onto the target chain, starting where the target left off, then keeps
//! following the source chain until interrupted.

use clap::Parser;
use replay_config::Config;
use replay_core::{EngineError, ReplayBuilder};
use replay_types::TrackedAddresses;
use std::path::PathBuf;

/// Command-line arguments for the replayer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Accounts whose transactions are replayed (defaults to the configured pair)
	addresses: Vec<String>,

	/// Skip checking source and target nonces at the start height
	#[arg(long)]
	no_integrity_check: bool,

	/// Encode and log matching transactions without submitting them
	#[arg(long)]
	dry_run: bool,

	/// Path to configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the replayer.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration, falling back to built-in defaults
/// 4. Connects to both chains and runs the replay until Ctrl-C
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started replayer");

	let config = match &args.config {
		Some(path) => Config::from_file(path).await?,
		None => Config::default(),
	};
	tracing::info!(
		source = %config.source.rpc_url,
		target = %config.target.rpc_url,
		"Loaded configuration"
	);

	let addresses = TrackedAddresses::parse(&args.addresses)
		.map_err(|e| format!("Invalid address argument: {}", e))?;

	let engine = ReplayBuilder::new(config)
		.with_addresses(addresses)
		.with_integrity_check(!args.no_integrity_check)
		.with_dry_run(args.dry_run)
		.build()
		.await?;

	let shutdown = engine.shutdown_handle();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => shutdown.shutdown(),
			Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
		}
	});

	match engine.run().await {
		Ok(report) => {
			tracing::info!(?report, "Stopped replayer");
			Ok(())
		},
		Err(e @ EngineError::IntegrityViolation { .. }) => {
			tracing::error!(error = %e, "Refusing to replay onto an inconsistent target");
			Err(e.into())
		},
		Err(e) => Err(e.into()),
	}
}
