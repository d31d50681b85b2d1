//! Account backed by a private key held in process memory.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relay_types::{
	Address, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString,
	Signature, ValidationError,
};

pub struct LocalAccount {
	signer: PrivateKeySigner,
}

impl LocalAccount {
	/// Parses a hex private key, with or without `0x`.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key
			.with_exposed(|key| key.trim().parse::<PrivateKeySigner>())
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;
		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		let signature = self
			.signer
			.sign_message_sync(message)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Signature::from_packed(&signature.as_bytes())
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}
}

pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("private_key", FieldType::String).with_validator(|value| {
				let key = value.as_str().unwrap_or_default();
				let hex = key.strip_prefix("0x").unwrap_or(key);
				if hex.len() != 64 {
					return Err("Private key must be 64 hex characters (32 bytes)".to_string());
				}
				if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
					return Err("Private key must be valid hexadecimal".to_string());
				}
				Ok(())
			})],
			vec![],
		);
		schema.validate(config)
	}
}

/// Creates a local account.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded secp256k1 key; usually `${RELAYEE_PRIVATE_KEY}`
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".into()))?;

	Ok(Box::new(LocalAccount::new(&private_key)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}
