//! Hashing helpers.

pub mod eip712;

pub use eip712::{
	compute_domain_hash, compute_final_digest, eth_signed_message_hash, Eip712AbiEncoder,
	DOMAIN_TYPE, FORWARD_REQUEST_TYPE, PERSONAL_SIGN_PREFIX,
};
