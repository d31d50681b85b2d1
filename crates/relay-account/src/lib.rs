//! Account management module for the relayer.
//!
//! Accounts are the off-chain side of a meta-transaction: they hold a relayee's
//! key and sign request digests that a forwarder later verifies. Signatures use
//! the EIP-191 personal-sign envelope, so a digest signed here verifies the same
//! way as one signed by a wallet.

use async_trait::async_trait;
use relay_types::{Address, ImplementationRegistry, Signature, B256};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs `message` under the EIP-191 envelope
	/// (`"\x19Ethereum Signed Message:\n" || len || message`).
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;

	/// Signs a 32-byte request digest. Equivalent to `sign_message` over the
	/// digest bytes.
	async fn sign_digest(&self, digest: &B256) -> Result<Signature, AccountError> {
		self.sign_message(digest.as_slice()).await
	}
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Wraps the configured account implementation.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub async fn sign_digest(&self, digest: &B256) -> Result<Signature, AccountError> {
		let signature = self.implementation.sign_digest(digest).await?;
		tracing::debug!(digest = %digest, "Signed request digest");
		Ok(signature)
	}
}
