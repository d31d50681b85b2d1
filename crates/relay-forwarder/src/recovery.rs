//! Signer recovery from secp256k1 signatures.

use crate::ForwarderError;
use alloy_primitives::{b256, keccak256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use relay_types::{Address, Signature, B256};

/// Half the secp256k1 group order. Signatures with a larger `s` are the
/// malleated twin of a canonical signature and are rejected.
pub const SECP256K1N_HALF: B256 =
	b256!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0");

/// Recovers the address that produced `signature` over the 32-byte `hash`.
///
/// `hash` is the value actually signed; callers apply any envelope (such as
/// the EIP-191 personal-sign prefix) beforehand.
pub fn recover_prehash(hash: &B256, signature: &Signature) -> Result<Address, ForwarderError> {
	let parity = signature
		.y_parity()
		.ok_or_else(|| ForwarderError::InvalidSignature(format!("invalid v value {}", signature.v)))?;

	// Big-endian byte order makes the lexicographic comparison numeric.
	if signature.s > SECP256K1N_HALF {
		return Err(ForwarderError::InvalidSignature(
			"s value is in the upper half of the curve order".into(),
		));
	}

	let mut compact = [0u8; 64];
	compact[..32].copy_from_slice(signature.r.as_slice());
	compact[32..].copy_from_slice(signature.s.as_slice());
	// Rejects r or s that are zero or not below the curve order.
	let ecdsa = EcdsaSignature::from_slice(&compact)
		.map_err(|e| ForwarderError::InvalidSignature(format!("malformed r or s: {}", e)))?;
	let recovery_id = RecoveryId::from_byte(parity)
		.ok_or_else(|| ForwarderError::InvalidSignature("invalid recovery id".into()))?;

	let key = VerifyingKey::recover_from_prehash(hash.as_slice(), &ecdsa, recovery_id)
		.map_err(|e| ForwarderError::InvalidSignature(format!("recovery failed: {}", e)))?;

	let address = address_of(&key);
	if address == Address::ZERO {
		return Err(ForwarderError::InvalidSignature(
			"signature recovers to the zero address".into(),
		));
	}
	Ok(address)
}

/// Ethereum address of a public key: the last 20 bytes of the keccak hash of
/// its uncompressed encoding without the `0x04` tag.
fn address_of(key: &VerifyingKey) -> Address {
	let point = key.to_encoded_point(false);
	let hash = keccak256(&point.as_bytes()[1..]);
	Address::from_slice(&hash[12..])
}
