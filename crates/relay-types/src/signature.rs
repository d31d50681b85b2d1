//! ECDSA signatures over request digests.
//!
//! Signatures travel either split into `(v, r, s)` or packed as the 65-byte
//! `r || s || v` form produced by Ethereum wallets.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when decoding a signature.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
	/// The packed form was not 65 bytes long.
	#[error("Invalid signature length: expected 65 bytes, got {0}")]
	InvalidLength(usize),
	/// The input was not valid hex.
	#[error("Invalid signature hex: {0}")]
	InvalidHex(String),
}

/// An ECDSA signature over a request's canonical digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
	pub v: u8,
	pub r: B256,
	pub s: B256,
}

impl Signature {
	/// Length of the packed `r || s || v` form.
	pub const PACKED_LEN: usize = 65;

	pub fn new(v: u8, r: B256, s: B256) -> Self {
		Self { v, r, s }
	}

	/// Decodes the packed 65-byte form.
	///
	/// A recovery byte of 0 or 1 is normalized to 27 or 28; other values are kept
	/// as-is so that verification can reject them.
	pub fn from_packed(bytes: &[u8]) -> Result<Self, SignatureError> {
		if bytes.len() != Self::PACKED_LEN {
			return Err(SignatureError::InvalidLength(bytes.len()));
		}
		let v = match bytes[64] {
			v @ (0 | 1) => v + 27,
			v => v,
		};
		Ok(Self {
			v,
			r: B256::from_slice(&bytes[..32]),
			s: B256::from_slice(&bytes[32..64]),
		})
	}

	/// Encodes the signature in packed `r || s || v` form.
	pub fn to_packed(&self) -> [u8; 65] {
		let mut out = [0u8; Self::PACKED_LEN];
		out[..32].copy_from_slice(self.r.as_slice());
		out[32..64].copy_from_slice(self.s.as_slice());
		out[64] = self.v;
		out
	}

	/// Returns the y-parity bit when `v` is one of the canonical 27/28 values.
	pub fn y_parity(&self) -> Option<u8> {
		match self.v {
			27 => Some(0),
			28 => Some(1),
			_ => None,
		}
	}
}

impl FromStr for Signature {
	type Err = SignatureError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		let digits = s
			.strip_prefix("0x")
			.or_else(|| s.strip_prefix("0X"))
			.unwrap_or(s);
		let bytes = hex::decode(digits)
			.map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
		Self::from_packed(&bytes)
	}
}

impl fmt::Display for Signature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.to_packed()))
	}
}
