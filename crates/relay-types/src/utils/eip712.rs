//! EIP-712 and EIP-191 hashing helpers.
//!
//! These helpers provide:
//! - Domain separator computation over name, version, chain id and verifying contract
//! - Final typed-data digest computation (0x1901 || domainHash || structHash)
//! - The personal-sign envelope wallets apply before signing a 32-byte digest
//! - A minimal ABI encoder for the static words of a struct hash

use alloy_primitives::{keccak256, Address, B256, U256};

pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
pub const FORWARD_REQUEST_TYPE: &str =
	"ForwardRequest(address from,address to,uint256 value,uint256 gas,uint256 nonce,bytes data)";

/// EIP-191 version 0x45 prefix for a 32-byte message.
pub const PERSONAL_SIGN_PREFIX: &[u8; 28] = b"\x19Ethereum Signed Message:\n32";

/// Compute the EIP-712 domain separator.
pub fn compute_domain_hash(
	name: &str,
	version: &str,
	chain_id: u64,
	verifying_contract: &Address,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
	enc.push_b256(&keccak256(name.as_bytes()));
	enc.push_b256(&keccak256(version.as_bytes()));
	enc.push_u256(U256::from(chain_id));
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = [0u8; 66];
	out[0] = 0x19;
	out[1] = 0x01;
	out[2..34].copy_from_slice(domain_hash.as_slice());
	out[34..].copy_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// The hash a wallet actually signs for a 32-byte message:
/// keccak256("\x19Ethereum Signed Message:\n32" || digest).
pub fn eth_signed_message_hash(digest: &B256) -> B256 {
	let mut out = [0u8; 60];
	out[..28].copy_from_slice(PERSONAL_SIGN_PREFIX);
	out[28..].copy_from_slice(digest.as_slice());
	keccak256(out)
}

/// Minimal ABI encoder for the 32-byte words of an EIP-712 struct hash.
#[derive(Debug, Default)]
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn with_words(words: usize) -> Self {
		Self {
			buf: Vec::with_capacity(words * 32),
		}
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		self.buf.extend_from_slice(&v.to_be_bytes::<32>());
	}

	/// Dynamic `bytes` members are encoded as the hash of their contents.
	pub fn push_bytes(&mut self, data: &[u8]) {
		self.push_b256(&keccak256(data));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}
