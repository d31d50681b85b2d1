//! Cost-optimized forwarder.
//!
//! Accepts the same requests and signatures as the simple forwarder and
//! produces the same results. The packed preimage is streamed into the hasher
//! straight from calldata instead of being assembled in its own buffer, the
//! personal-sign envelope lives in scratch space and return data is handed
//! back as is, so it consumes less gas per call.

use super::simple::{call_allotment, call_request, check_signer, parse_address, verdict, CallForwarderSchema};
use crate::{
	abi, host::TargetRegistry, ForwarderDeps, ForwarderError, ForwarderFactory,
	ForwarderInterface, ForwarderKind, ForwarderRegistry,
};
use alloy_primitives::Keccak256;
use async_trait::async_trait;
use relay_types::{
	Address, CallContext, ConfigSchema, ExecutionContext, ExecutionResult, GasMeter, GasSchedule,
	ImplementationRegistry, RelayRequest, Signature, SimpleCallRequest, B256, U256,
};
use std::sync::Arc;

/// `keccak256(signer || target || data)` without materializing the preimage.
fn streamed_digest(req: &SimpleCallRequest) -> B256 {
	let mut hasher = Keccak256::new();
	hasher.update(req.signer.as_slice());
	hasher.update(req.target.as_slice());
	hasher.update(&req.data);
	hasher.finalize()
}

pub struct OptimizedForwarder {
	address: Address,
	targets: Arc<TargetRegistry>,
	schedule: GasSchedule,
}

impl OptimizedForwarder {
	pub fn new(address: Address, deps: &ForwarderDeps) -> Self {
		Self {
			address,
			targets: deps.targets.clone(),
			schedule: deps.schedule,
		}
	}

	pub fn hash_call(&self, req: &SimpleCallRequest) -> B256 {
		streamed_digest(req)
	}

	pub async fn execute_call(
		&self,
		req: &SimpleCallRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		let schedule = self.schedule;
		let mut meter = GasMeter::new(schedule, ctx.gas_limit);
		let preimage_len = 40 + req.data.len();

		meter.intrinsic(&abi::call_execute_calldata(req, signature))?;
		meter.charge(schedule.dispatch)?;

		// One buffer: the preimage is copied in from calldata and hashed in place.
		let buffer = meter.allocate(preimage_len)?;
		meter.copy(preimage_len)?;
		meter.keccak(preimage_len)?;
		let digest = streamed_digest(req);

		// Envelope and ecrecover input in scratch space below the buffer.
		meter.touch_memory(60)?;
		meter.keccak(60)?;
		meter.touch_memory(128)?;
		meter.charge(schedule.ecrecover)?;
		check_signer(req, &digest, signature)?;

		meter.charge(schedule.call_cold)?;
		let call = CallContext {
			caller: self.address,
			value: U256::ZERO,
			gas_limit: call_allotment(&meter),
		};
		let outcome = self.targets.dispatch(req.target, &call, &req.data).await;
		meter.charge(outcome.gas_used)?;

		// Return data overwrites the preimage and is returned from there.
		let returned = outcome.return_data.len();
		meter.touch_memory(buffer + returned)?;
		meter.copy(returned)?;

		tracing::info!(
			forwarder = %self.address,
			signer = %req.signer,
			to = %req.target,
			success = outcome.success,
			gas_used = meter.used(),
			"Forwarded call"
		);

		Ok(ExecutionResult {
			success: outcome.success,
			return_data: outcome.return_data,
			gas_used: meter.used(),
		})
	}
}

#[async_trait]
impl ForwarderInterface for OptimizedForwarder {
	fn kind(&self) -> ForwarderKind {
		ForwarderKind::Optimized
	}

	fn address(&self) -> Address {
		self.address
	}

	fn hash_of_request(&self, request: &RelayRequest) -> Result<B256, ForwarderError> {
		Ok(self.hash_call(call_request(ForwarderKind::Optimized, request)?))
	}

	async fn verify(
		&self,
		request: &RelayRequest,
		signature: &Signature,
	) -> Result<bool, ForwarderError> {
		let req = call_request(ForwarderKind::Optimized, request)?;
		verdict(check_signer(req, &streamed_digest(req), signature))
	}

	async fn execute(
		&self,
		request: &RelayRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		self.execute_call(call_request(ForwarderKind::Optimized, request)?, signature, ctx)
			.await
	}

	async fn nonce_of(&self, _signer: Address) -> Result<Option<U256>, ForwarderError> {
		Ok(None)
	}
}

/// Creates an optimized forwarder.
///
/// Configuration parameters:
/// - `address`: address the forwarder is deployed at
pub fn create_forwarder(
	config: &toml::Value,
	deps: &ForwarderDeps,
) -> Result<Box<dyn ForwarderInterface>, ForwarderError> {
	CallForwarderSchema
		.validate(config)
		.map_err(|e| ForwarderError::Configuration(e.to_string()))?;
	Ok(Box::new(OptimizedForwarder::new(parse_address(config)?, deps)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "optimized";
	type Factory = ForwarderFactory;

	fn factory() -> Self::Factory {
		create_forwarder
	}
}

impl ForwarderRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::robust::{RobustForwarder, DEFAULT_NAME, DEFAULT_VERSION};
	use crate::implementations::simple::{call_digest, SimpleForwarder};
	use crate::test_support::{
		decode_greet, decode_sum, deps, greet_calldata, relayee, sign, sign_as_other,
		sum_calldata, Blob, CALCULATOR, HELLO, OPERATOR, REVERTER,
	};
	use alloy_primitives::{address, Bytes};
	use relay_types::ForwardRequest;

	const SIMPLE: Address = address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512");
	const OPTIMIZED: Address = address!("9fe46736679d2d9a65f0992f2272de9f3c7fa6e0");
	const ROBUST: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");

	fn ctx() -> ExecutionContext {
		ExecutionContext::new(OPERATOR, 1_000_000)
	}

	async fn call(target: Address, data: Bytes) -> SimpleCallRequest {
		SimpleCallRequest::new(relayee().await, target, data)
	}

	#[tokio::test]
	async fn test_signatures_are_interchangeable_with_simple() {
		let deps = deps();
		let simple = SimpleForwarder::new(SIMPLE, &deps);
		let optimized = OptimizedForwarder::new(OPTIMIZED, &deps);
		let req = call(CALCULATOR, sum_calldata(1, 2)).await;

		assert_eq!(simple.hash_call(&req), optimized.hash_call(&req));

		let signature = sign(&simple.hash_call(&req)).await;
		let request: RelayRequest = req.clone().into();
		assert!(optimized.verify(&request, &signature).await.unwrap());
		assert!(simple.verify(&request, &signature).await.unwrap());
	}

	#[tokio::test]
	async fn test_same_results_for_less_gas() {
		let deps = deps();
		deps.targets.register(Address::repeat_byte(0x79), Arc::new(Blob(4096)));
		let simple = SimpleForwarder::new(SIMPLE, &deps);
		let optimized = OptimizedForwarder::new(OPTIMIZED, &deps);

		for req in [
			call(CALCULATOR, sum_calldata(1, 2)).await,
			call(HELLO, greet_calldata()).await,
			call(REVERTER, Bytes::new()).await,
			call(Address::repeat_byte(0x79), Bytes::new()).await,
			call(Address::repeat_byte(0x7a), Bytes::from(vec![0xff; 100])).await,
		] {
			let signature = sign(&simple.hash_call(&req)).await;
			let a = simple.execute_call(&req, &signature, &ctx()).await.unwrap();
			let b = optimized.execute_call(&req, &signature, &ctx()).await.unwrap();

			assert_eq!(a.success, b.success);
			assert_eq!(a.return_data, b.return_data);
			assert!(a.gas_used > b.gas_used, "{} <= {}", a.gas_used, b.gas_used);
		}
	}

	#[test]
	fn test_streamed_digest_matches_packed_preimage() {
		for data in [vec![], vec![0xab], vec![0x5a; 31], vec![0x5a; 32], vec![0x01; 1000]] {
			let req = SimpleCallRequest::new(Address::repeat_byte(0x11), Address::repeat_byte(0x22), data);
			assert_eq!(streamed_digest(&req), call_digest(&req));
		}
	}

	#[tokio::test]
	async fn test_cheaper_with_free_copies() {
		let mut deps = deps();
		deps.schedule = GasSchedule {
			copy_word: 0,
			..GasSchedule::default()
		};
		let simple = SimpleForwarder::new(SIMPLE, &deps);
		let optimized = OptimizedForwarder::new(OPTIMIZED, &deps);

		// Nothing to copy in or out: only memory use differs.
		let req = call(Address::repeat_byte(0x7a), Bytes::new()).await;
		let signature = sign(&simple.hash_call(&req)).await;
		let a = simple.execute_call(&req, &signature, &ctx()).await.unwrap();
		let b = optimized.execute_call(&req, &signature, &ctx()).await.unwrap();
		assert!(a.success && b.success);
		assert!(a.gas_used > b.gas_used, "{} <= {}", a.gas_used, b.gas_used);
	}

	#[tokio::test]
	async fn test_robust_costs_more_than_both() {
		let deps = deps();
		let robust = RobustForwarder::new(ROBUST, DEFAULT_NAME, DEFAULT_VERSION, &deps);
		let simple = SimpleForwarder::new(SIMPLE, &deps);
		let optimized = OptimizedForwarder::new(OPTIMIZED, &deps);
		let from = relayee().await;

		let forward = ForwardRequest {
			from,
			to: CALCULATOR,
			value: U256::ZERO,
			gas: U256::from(5000),
			nonce: U256::ZERO,
			data: sum_calldata(1, 2),
		};
		let robust_result = robust
			.execute_request(&forward, &sign(&robust.hash_request(&forward)).await, &ctx())
			.await
			.unwrap();

		let req = forward.as_call();
		let signature = sign(&simple.hash_call(&req)).await;
		let simple_result = simple.execute_call(&req, &signature, &ctx()).await.unwrap();
		let optimized_result = optimized.execute_call(&req, &signature, &ctx()).await.unwrap();

		assert_eq!(decode_sum(&robust_result.return_data), U256::from(3));
		assert_eq!(robust_result.return_data, simple_result.return_data);
		assert!(robust_result.gas_used > simple_result.gas_used);
		assert!(simple_result.gas_used > optimized_result.gas_used);
	}

	#[tokio::test]
	async fn test_execute_greet_and_reject_foreign_signature() {
		let optimized = OptimizedForwarder::new(OPTIMIZED, &deps());
		let req = call(HELLO, greet_calldata()).await;

		let result = optimized
			.execute_call(&req, &sign(&optimized.hash_call(&req)).await, &ctx())
			.await
			.unwrap();
		assert_eq!(decode_greet(&result.return_data), "Hello, world!");

		let foreign = sign_as_other(&optimized.hash_call(&req)).await;
		assert!(matches!(
			optimized.execute_call(&req, &foreign, &ctx()).await,
			Err(ForwarderError::SignatureMismatch { .. })
		));
	}

	#[tokio::test]
	async fn test_out_of_gas_is_an_error() {
		let optimized = OptimizedForwarder::new(OPTIMIZED, &deps());
		let req = call(CALCULATOR, sum_calldata(1, 2)).await;
		let signature = sign(&optimized.hash_call(&req)).await;

		assert!(matches!(
			optimized
				.execute_call(&req, &signature, &ExecutionContext::new(OPERATOR, 21_500))
				.await,
			Err(ForwarderError::OutOfGas { limit: 21_500, .. })
		));
	}

	#[tokio::test]
	async fn test_interface_routing() {
		let optimized = create_forwarder(
			&toml::from_str("address = \"0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0\"").unwrap(),
			&deps(),
		)
		.unwrap();
		assert_eq!(optimized.kind(), ForwarderKind::Optimized);
		assert_eq!(optimized.address(), OPTIMIZED);

		let req = call(CALCULATOR, sum_calldata(2, 5)).await;
		let request: RelayRequest = req.clone().into();
		let signature = sign(&optimized.hash_of_request(&request).unwrap()).await;
		let result = optimized.execute(&request, &signature, &ctx()).await.unwrap();
		assert_eq!(decode_sum(&result.return_data), U256::from(7));
		assert_eq!(optimized.nonce_of(req.signer).await.unwrap(), None);
	}
}
