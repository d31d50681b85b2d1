//! ABI bindings of the forwarders' external entry points.
//!
//! Forwarders charge intrinsic gas for the calldata an operator would submit,
//! so each variant encodes its own `execute` call with these bindings.

use alloy_sol_types::{sol, SolCall};
use relay_types::{ForwardRequest, Signature, SimpleCallRequest};

pub mod robust {
	use alloy_sol_types::sol;

	sol! {
		#[derive(Debug, PartialEq, Eq)]
		struct ForwardRequest {
			address from;
			address to;
			uint256 value;
			uint256 gas;
			uint256 nonce;
			bytes data;
		}

		function execute(ForwardRequest req, bytes signature)
			external
			payable
			returns (bool success, bytes returndata);
	}
}

sol! {
	function execute(address signer, address target, bytes data, uint8 v, bytes32 r, bytes32 s)
		external
		returns (bool success, bytes returndata);
}

impl From<&ForwardRequest> for robust::ForwardRequest {
	fn from(req: &ForwardRequest) -> Self {
		Self {
			from: req.from,
			to: req.to,
			value: req.value,
			gas: req.gas,
			nonce: req.nonce,
			data: req.data.clone(),
		}
	}
}

/// Calldata of `execute(ForwardRequest,bytes)` with a packed signature.
pub fn robust_execute_calldata(req: &ForwardRequest, signature: &Signature) -> Vec<u8> {
	robust::executeCall {
		req: req.into(),
		signature: signature.to_packed().to_vec().into(),
	}
	.abi_encode()
}

/// Calldata of `execute(address,address,bytes,uint8,bytes32,bytes32)`.
pub fn call_execute_calldata(req: &SimpleCallRequest, signature: &Signature) -> Vec<u8> {
	executeCall {
		signer: req.signer,
		target: req.target,
		data: req.data.clone(),
		v: signature.v,
		r: signature.r,
		s: signature.s,
	}
	.abi_encode()
}
