//! Configuration module for the relayer.
//!
//! Configuration is TOML. A file may pull in other files with
//! `include = ["storage.toml", "forwarders.toml"]`; every top-level section must
//! be defined exactly once across all files. String values may reference
//! environment variables as `${NAME}` or `${NAME:-default}`.
//!
//! Each pluggable implementation (storage backend, forwarder variant, account)
//! keeps its settings as a raw TOML table that the implementation validates
//! itself.

mod loader;

use regex::Regex;
use relay_types::GasSchedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The Display form embeds the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub relayer: RelayerConfig,
	pub storage: StorageConfig,
	pub forwarders: ForwardersConfig,
	/// Execution-cost schedule; omitted fields keep their defaults.
	#[serde(default)]
	pub gas: GasSchedule,
	/// Off-chain signer used by the operator tool to sign requests.
	pub account: Option<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	/// Identifies this relayer instance in logs.
	pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardersConfig {
	/// Variant used when a command does not name one.
	pub primary: String,
	/// Chain id bound into EIP-712 domains.
	pub chain_id: u64,
	/// Variant name (`robust`, `simple`, `optimized`) to its settings.
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Replaces `${NAME}` and `${NAME:-default}` with environment values.
///
/// Inputs over 1MB are rejected before matching.
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

	let mut output = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		output.push_str(&input[last..whole.start()]);
		output.push_str(&value);
		last = whole.end();
	}
	output.push_str(&input[last..]);
	Ok(output)
}

fn require_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path = Path::new(path);
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;

		let combined = loader::ConfigLoader::new(base_dir).load(file_name).await?;
		Self::from_value(combined)
	}

	fn from_value(value: toml::Value) -> Result<Self, ConfigError> {
		let config: Config = value.try_into()?;
		config.validate()?;
		Ok(config)
	}

	/// Settings of the configured primary storage backend.
	pub fn primary_storage(&self) -> Option<&toml::Value> {
		self.storage.implementations.get(&self.storage.primary)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.relayer.id.trim().is_empty() {
			return Err(ConfigError::Validation("Relayer ID cannot be empty".into()));
		}

		require_primary("storage", &self.storage.primary, &self.storage.implementations)?;

		require_primary(
			"forwarder",
			&self.forwarders.primary,
			&self.forwarders.implementations,
		)?;
		if self.forwarders.chain_id == 0 {
			return Err(ConfigError::Validation(
				"forwarders.chain_id must be greater than 0".into(),
			));
		}

		if self.gas.memory_quadratic_divisor == 0 {
			return Err(ConfigError::Validation(
				"gas.memory_quadratic_divisor must be greater than 0".into(),
			));
		}
		// The optimized forwarder is cheaper only while memory has a price.
		if self.gas.memory_word == 0 {
			return Err(ConfigError::Validation(
				"gas.memory_word must be greater than 0".into(),
			));
		}

		if let Some(account) = &self.account {
			require_primary("account", &account.primary, &account.implementations)?;
		}

		Ok(())
	}
}

/// Parses a single TOML document, resolving environment variables and
/// validating the result. `include` is only honored by [`Config::from_file`].
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let mut value: toml::Value = toml::from_str(&resolved)?;
		if let Some(table) = value.as_table_mut() {
			if table.remove("include").is_some() {
				return Err(ConfigError::Validation(
					"include is only supported when loading from a file".into(),
				));
			}
		}
		Self::from_value(value)
	}
}
