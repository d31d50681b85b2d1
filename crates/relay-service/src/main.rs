//! Operator tool for the meta-transaction relayer.
//!
//! Loads a relayer configuration, builds the configured storage backend,
//! forwarders and signing account, and runs one operator command against them:
//! computing request digests, signing requests as the relayee, verifying and
//! executing signed requests and reading nonces.

use clap::Parser;
use relay_config::Config;
use std::path::PathBuf;

mod commands;
mod factory_registry;

use commands::Command;

/// Command-line arguments for the relayer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/relayer.toml", env = "RELAYER_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "warn")]
	log_level: String,

	/// Print results as JSON
	#[arg(long)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	// Logs go to stderr so that stdout carries only the command output.
	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Invalid config path: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.relayer.id);

	let relayer = factory_registry::build_relayer(config)?;
	let output = relayer.run(&args.command, args.json).await?;
	println!("{}", output);

	Ok(())
}
