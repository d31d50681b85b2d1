//! Straightforward forwarder over `(signer, target, data)`.
//!
//! The digest is `keccak256(signer || target || data)` with no domain and no
//! nonce, so a signature stays valid forever and on every forwarder. The call
//! reaches the target with the forwarder as caller, the unmodified `data`, no
//! value and all but 1/64 of the remaining gas.

use crate::{
	abi, host::TargetRegistry, recovery::recover_prehash, ForwarderDeps, ForwarderError,
	ForwarderFactory, ForwarderInterface, ForwarderKind, ForwarderRegistry,
};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use relay_types::utils::eth_signed_message_hash;
use relay_types::{
	Address, CallContext, ConfigSchema, ExecutionContext, ExecutionResult, Field, FieldType,
	GasMeter, GasSchedule, ImplementationRegistry, RelayRequest, Schema, Signature,
	SimpleCallRequest, ValidationError, B256, U256,
};
use std::sync::Arc;

/// `keccak256(abi.encodePacked(signer, target, data))`
pub(crate) fn call_digest(req: &SimpleCallRequest) -> B256 {
	let mut packed = Vec::with_capacity(40 + req.data.len());
	packed.extend_from_slice(req.signer.as_slice());
	packed.extend_from_slice(req.target.as_slice());
	packed.extend_from_slice(&req.data);
	keccak256(packed)
}

/// Recovers the signer of `digest` and checks it is the one `req` claims.
pub(crate) fn check_signer(
	req: &SimpleCallRequest,
	digest: &B256,
	signature: &Signature,
) -> Result<(), ForwarderError> {
	let recovered = recover_prehash(&eth_signed_message_hash(digest), signature)?;
	if recovered != req.signer {
		tracing::warn!(
			expected = %req.signer,
			recovered = %recovered,
			"Rejected call with foreign signature"
		);
		return Err(ForwarderError::SignatureMismatch {
			expected: req.signer,
			recovered,
		});
	}
	Ok(())
}

/// Maps a foreign signer to `false`; malformed signatures stay errors.
pub(crate) fn verdict(checked: Result<(), ForwarderError>) -> Result<bool, ForwarderError> {
	match checked {
		Ok(()) => Ok(true),
		Err(ForwarderError::SignatureMismatch { .. }) => Ok(false),
		Err(e) => Err(e),
	}
}

pub(crate) fn call_request<'a>(
	kind: ForwarderKind,
	request: &'a RelayRequest,
) -> Result<&'a SimpleCallRequest, ForwarderError> {
	match request {
		RelayRequest::Call(req) => Ok(req),
		other => Err(ForwarderError::UnsupportedRequest(format!(
			"{} forwarder expects a call request, got a {} request",
			kind,
			other.shape()
		))),
	}
}

/// Gas handed to the target: everything left except 1/64.
pub(crate) fn call_allotment(meter: &GasMeter) -> u64 {
	let remaining = meter.remaining();
	remaining - remaining / 64
}

pub(crate) fn parse_address(config: &toml::Value) -> Result<Address, ForwarderError> {
	config
		.get("address")
		.and_then(|v| v.as_str())
		.and_then(|s| s.parse::<Address>().ok())
		.ok_or_else(|| ForwarderError::Configuration("address is required".into()))
}

pub struct SimpleForwarder {
	address: Address,
	targets: Arc<TargetRegistry>,
	schedule: GasSchedule,
}

impl SimpleForwarder {
	pub fn new(address: Address, deps: &ForwarderDeps) -> Self {
		Self {
			address,
			targets: deps.targets.clone(),
			schedule: deps.schedule,
		}
	}

	pub fn hash_call(&self, req: &SimpleCallRequest) -> B256 {
		call_digest(req)
	}

	pub async fn execute_call(
		&self,
		req: &SimpleCallRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		let schedule = self.schedule;
		let mut meter = GasMeter::new(schedule, ctx.gas_limit);
		let len = req.data.len();

		meter.intrinsic(&abi::call_execute_calldata(req, signature))?;
		meter.charge(schedule.dispatch)?;
		// `data` copied from calldata into memory.
		meter.allocate(32 + len)?;
		meter.copy(len)?;
		// abi.encodePacked(signer, target, data) in a fresh buffer, then hashed.
		meter.allocate(32 + 40 + len)?;
		meter.copy(40 + len)?;
		meter.keccak(40 + len)?;
		let digest = call_digest(req);
		// Personal-sign envelope built in another fresh buffer.
		meter.allocate(32 + 60)?;
		meter.keccak(60)?;
		meter.allocate(128)?;
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

		// Return data copied out, then re-encoded as (bool, bytes).
		let returned = outcome.return_data.len();
		meter.allocate(32 + returned)?;
		meter.copy(returned)?;
		meter.allocate(96 + returned)?;
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
impl ForwarderInterface for SimpleForwarder {
	fn kind(&self) -> ForwarderKind {
		ForwarderKind::Simple
	}

	fn address(&self) -> Address {
		self.address
	}

	fn hash_of_request(&self, request: &RelayRequest) -> Result<B256, ForwarderError> {
		Ok(self.hash_call(call_request(ForwarderKind::Simple, request)?))
	}

	async fn verify(
		&self,
		request: &RelayRequest,
		signature: &Signature,
	) -> Result<bool, ForwarderError> {
		let req = call_request(ForwarderKind::Simple, request)?;
		verdict(check_signer(req, &call_digest(req), signature))
	}

	async fn execute(
		&self,
		request: &RelayRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		self.execute_call(call_request(ForwarderKind::Simple, request)?, signature, ctx)
			.await
	}

	async fn nonce_of(&self, _signer: Address) -> Result<Option<U256>, ForwarderError> {
		Ok(None)
	}
}

/// Configuration of the simple and optimized forwarders.
pub struct CallForwarderSchema;

impl ConfigSchema for CallForwarderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![Field::new("address", FieldType::Address)], vec![]).validate(config)
	}
}

/// Creates a simple forwarder.
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
	Ok(Box::new(SimpleForwarder::new(parse_address(config)?, deps)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simple";
	type Factory = ForwarderFactory;

	fn factory() -> Self::Factory {
		create_forwarder
	}
}

impl ForwarderRegistry for Registry {}
