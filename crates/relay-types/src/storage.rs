//! Storage namespaces used by the relayer.

/// Storage keys for the data collections the relayer persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Per-signer nonce counters of the robust forwarder.
	Nonces,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Nonces => "nonces",
		}
	}
}
