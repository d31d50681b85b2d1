//! Call targets and call dispatch.
//!
//! A target is any component reachable at an address that accepts ABI calldata
//! and reports a [`CallOutcome`]. Forwarders never inspect targets beyond this.

use async_trait::async_trait;
use dashmap::DashMap;
use relay_types::{Address, Bytes, CallContext, CallOutcome};
use std::sync::Arc;

/// Code deployed at an address.
///
/// Implementations must not leave side effects behind when they report a
/// failed outcome.
#[async_trait]
pub trait CallTarget: Send + Sync {
	async fn call(&self, ctx: &CallContext, data: &[u8]) -> CallOutcome;
}

/// Address book of call targets.
#[derive(Default)]
pub struct TargetRegistry {
	targets: DashMap<Address, Arc<dyn CallTarget>>,
}

impl TargetRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Deploys `target` at `address`, replacing whatever was there.
	pub fn register(&self, address: Address, target: Arc<dyn CallTarget>) {
		self.targets.insert(address, target);
	}

	/// Calls the target at `address`.
	///
	/// An address without a target behaves like an account without code: the
	/// call succeeds, returns nothing and consumes no gas. A target reporting
	/// more gas than it was given is treated as having run out of gas.
	pub async fn dispatch(&self, address: Address, ctx: &CallContext, data: &[u8]) -> CallOutcome {
		// Do not hold the map guard across the await.
		let target = self.targets.get(&address).map(|entry| Arc::clone(entry.value()));
		let Some(target) = target else {
			return CallOutcome::success(Bytes::new(), 0);
		};

		let outcome = target.call(ctx, data).await;
		if outcome.gas_used > ctx.gas_limit {
			tracing::debug!(
				to = %address,
				gas_limit = ctx.gas_limit,
				gas_used = outcome.gas_used,
				"Call exceeded its gas allotment"
			);
			return CallOutcome::out_of_gas(ctx.gas_limit);
		}
		outcome
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{sum_calldata, Calculator, GasHog, CALCULATOR};
	use relay_types::U256;

	fn ctx(gas_limit: u64) -> CallContext {
		CallContext {
			caller: Address::repeat_byte(0xf0),
			value: U256::ZERO,
			gas_limit,
		}
	}

	#[tokio::test]
	async fn test_unknown_address_behaves_like_empty_account() {
		let registry = TargetRegistry::new();
		let outcome = registry.dispatch(CALCULATOR, &ctx(10_000), &sum_calldata(1, 2)).await;
		assert_eq!(outcome, CallOutcome::success(Bytes::new(), 0));
	}

	#[tokio::test]
	async fn test_dispatch_reaches_registered_target() {
		let registry = TargetRegistry::new();
		registry.register(CALCULATOR, Arc::new(Calculator));

		let outcome = registry.dispatch(CALCULATOR, &ctx(10_000), &sum_calldata(1, 2)).await;
		assert!(outcome.success);
		assert_eq!(U256::from_be_slice(&outcome.return_data), U256::from(3));
	}

	#[tokio::test]
	async fn test_overspending_target_is_out_of_gas() {
		let registry = TargetRegistry::new();
		let hog = Address::repeat_byte(0x0d);
		registry.register(hog, Arc::new(GasHog));

		let outcome = registry.dispatch(hog, &ctx(700), &[]).await;
		assert_eq!(outcome, CallOutcome::out_of_gas(700));
	}
}
