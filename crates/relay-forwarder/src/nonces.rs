//! Per-signer nonce counters of the robust forwarder.

use relay_storage::{StorageError, StorageService};
use relay_types::{Address, StorageKey, U256};
use std::sync::Arc;

/// Nonces of one forwarder instance.
///
/// Counters are keyed by `"{forwarder}:{signer}"` under the `nonces` namespace,
/// so forwarders sharing a storage backend never see each other's counters.
/// Unseen signers are at zero.
pub struct NonceStore {
	storage: Arc<StorageService>,
	scope: String,
}

impl NonceStore {
	pub fn new(storage: Arc<StorageService>, forwarder: Address) -> Self {
		Self {
			storage,
			scope: format!("{:#x}", forwarder),
		}
	}

	fn id(&self, signer: Address) -> String {
		format!("{}:{:#x}", self.scope, signer)
	}

	pub async fn get(&self, signer: Address) -> Result<U256, StorageError> {
		let stored = self
			.storage
			.retrieve_optional::<U256>(StorageKey::Nonces, &self.id(signer))
			.await?;
		Ok(stored.unwrap_or(U256::ZERO))
	}

	pub async fn set(&self, signer: Address, nonce: U256) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::Nonces, &self.id(signer), &nonce)
			.await
	}
}
