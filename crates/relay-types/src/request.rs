//! Signed request shapes.
//!
//! The robust forwarder authorizes a fully specified [`ForwardRequest`]; the
//! simple and optimized forwarders authorize only the `(signer, target, data)`
//! triple carried by [`SimpleCallRequest`].

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Domain-bound authorization to spend `gas` executing `data` against `to`,
/// attributed to `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
	/// The signer the call is attributed to.
	pub from: Address,
	/// The call target.
	pub to: Address,
	/// Native value forwarded with the call.
	pub value: U256,
	/// Gas allotted to the forwarded call.
	pub gas: U256,
	/// Must equal the signer's stored nonce when the request is executed.
	pub nonce: U256,
	/// Calldata for the target.
	pub data: Bytes,
}

impl ForwardRequest {
	/// Projects the request onto the field set of the simple forwarders.
	pub fn as_call(&self) -> SimpleCallRequest {
		SimpleCallRequest {
			signer: self.from,
			target: self.to,
			data: self.data.clone(),
		}
	}
}

/// Single-shot authorization to execute `data` against `target` on behalf of `signer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleCallRequest {
	pub signer: Address,
	pub target: Address,
	pub data: Bytes,
}

impl SimpleCallRequest {
	pub fn new(signer: Address, target: Address, data: impl Into<Bytes>) -> Self {
		Self {
			signer,
			target,
			data: data.into(),
		}
	}
}

/// Either request shape, for code that drives forwarders polymorphically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRequest {
	Forward(ForwardRequest),
	Call(SimpleCallRequest),
}

impl RelayRequest {
	/// The address the request claims to be signed by.
	pub fn signer(&self) -> Address {
		match self {
			RelayRequest::Forward(req) => req.from,
			RelayRequest::Call(req) => req.signer,
		}
	}

	/// The address the request will be forwarded to.
	pub fn target(&self) -> Address {
		match self {
			RelayRequest::Forward(req) => req.to,
			RelayRequest::Call(req) => req.target,
		}
	}

	/// Short name of the request shape, used in error messages.
	pub fn shape(&self) -> &'static str {
		match self {
			RelayRequest::Forward(_) => "forward",
			RelayRequest::Call(_) => "call",
		}
	}
}

impl From<ForwardRequest> for RelayRequest {
	fn from(req: ForwardRequest) -> Self {
		RelayRequest::Forward(req)
	}
}

impl From<SimpleCallRequest> for RelayRequest {
	fn from(req: SimpleCallRequest) -> Self {
		RelayRequest::Call(req)
	}
}
