//! Execution types shared by forwarders and call targets.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// The submission wrapping one `execute` invocation.
///
/// The operator pays for the unit; `gas_limit` is the total budget of the unit
/// and `value` is native value attached to the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
	pub operator: Address,
	pub gas_limit: u64,
	pub value: U256,
}

impl ExecutionContext {
	pub fn new(operator: Address, gas_limit: u64) -> Self {
		Self {
			operator,
			gas_limit,
			value: U256::ZERO,
		}
	}

	pub fn with_value(mut self, value: U256) -> Self {
		self.value = value;
		self
	}
}

/// Outcome of an accepted `execute` invocation.
///
/// `success` is false when the downstream call failed; the authorization was still
/// valid in that case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
	pub success: bool,
	pub return_data: Bytes,
	/// Gas consumed by the whole unit, including the forwarded call.
	pub gas_used: u64,
}

/// What a call target sees of the call being made to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
	/// The immediate caller, i.e. the forwarder address.
	pub caller: Address,
	pub value: U256,
	/// Gas the target may consume before the call fails.
	pub gas_limit: u64,
}

/// Result reported by a call target.
///
/// A failed call must leave no side effects behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
	pub success: bool,
	pub return_data: Bytes,
	pub gas_used: u64,
}

impl CallOutcome {
	pub fn success(return_data: impl Into<Bytes>, gas_used: u64) -> Self {
		Self {
			success: true,
			return_data: return_data.into(),
			gas_used,
		}
	}

	pub fn revert(return_data: impl Into<Bytes>, gas_used: u64) -> Self {
		Self {
			success: false,
			return_data: return_data.into(),
			gas_used,
		}
	}

	/// The whole allotment is consumed and no data is returned.
	pub fn out_of_gas(gas_limit: u64) -> Self {
		Self::revert(Bytes::new(), gas_limit)
	}
}
