//! Standards-compliant forwarder.
//!
//! Requests are signed as EIP-712 typed data under the domain
//! `(name, version, chainId, verifyingContract)`, which binds a signature to one
//! forwarder on one chain. Every signer has a nonce that an accepted request
//! must carry and that is consumed before the call is forwarded. The target
//! receives `data || from`, so it can recover the original sender ERC-2771
//! style, together with the request's value and exactly `gas` gas.

use alloy_primitives::keccak256;
use crate::{
	abi, host::TargetRegistry, nonces::NonceStore, recovery::recover_prehash, ForwarderDeps,
	ForwarderError, ForwarderFactory, ForwarderInterface, ForwarderKind, ForwarderRegistry,
};
use async_trait::async_trait;
use relay_types::utils::{
	compute_domain_hash, compute_final_digest, eth_signed_message_hash, Eip712AbiEncoder,
	FORWARD_REQUEST_TYPE,
};
use relay_types::{
	Address, Bytes, CallContext, CallOutcome, ConfigSchema, ExecutionContext, ExecutionResult,
	Field, FieldType, ForwardRequest, GasMeter, GasSchedule, ImplementationRegistry, OutOfGas,
	RelayRequest, Schema, Signature, ValidationError, B256, U256,
};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_NAME: &str = "MinimalForwarder";
pub const DEFAULT_VERSION: &str = "0.0.1";

/// Native value held by the forwarder.
#[derive(Debug, Default)]
struct Treasury {
	balance: U256,
}

/// State an execution changed before its call.
struct Journal {
	current: U256,
	next: U256,
	credited: U256,
}

pub struct RobustForwarder {
	address: Address,
	domain_separator: B256,
	nonces: NonceStore,
	targets: Arc<TargetRegistry>,
	schedule: GasSchedule,
	/// Serializes nonce consumption and balance updates. Never held across a
	/// call into a target.
	treasury: Mutex<Treasury>,
}

impl RobustForwarder {
	pub fn new(address: Address, name: &str, version: &str, deps: &ForwarderDeps) -> Self {
		Self {
			address,
			domain_separator: compute_domain_hash(name, version, deps.chain_id, &address),
			nonces: NonceStore::new(deps.storage.clone(), address),
			targets: deps.targets.clone(),
			schedule: deps.schedule,
			treasury: Mutex::new(Treasury::default()),
		}
	}

	pub fn domain_separator(&self) -> B256 {
		self.domain_separator
	}

	/// EIP-712 digest of `req`: `keccak256(0x1901 || domainSeparator || structHash)`.
	pub fn hash_request(&self, req: &ForwardRequest) -> B256 {
		compute_final_digest(&self.domain_separator, &struct_hash(req))
	}

	pub async fn get_nonce(&self, signer: Address) -> Result<U256, ForwarderError> {
		Ok(self.nonces.get(signer).await?)
	}

	/// Native value currently held by the forwarder.
	pub async fn balance(&self) -> U256 {
		self.treasury.lock().await.balance
	}

	fn recover(&self, req: &ForwardRequest, signature: &Signature) -> Result<Address, ForwarderError> {
		let digest = self.hash_request(req);
		recover_prehash(&eth_signed_message_hash(&digest), signature)
	}

	/// True when `signature` is the signer's over `req` and `req.nonce` is the
	/// signer's current nonce.
	pub async fn verify_request(
		&self,
		req: &ForwardRequest,
		signature: &Signature,
	) -> Result<bool, ForwarderError> {
		let recovered = self.recover(req, signature)?;
		Ok(recovered == req.from && self.nonces.get(req.from).await? == req.nonce)
	}

	pub async fn execute_request(
		&self,
		req: &ForwardRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		let mut meter = GasMeter::new(self.schedule, ctx.gas_limit);
		let schedule = self.schedule;

		meter.intrinsic(&abi::robust_execute_calldata(req, signature))?;
		meter.charge(schedule.dispatch)?;
		// Request struct and signature decoded from calldata.
		meter.allocate(7 * 32 + req.data.len())?;
		meter.copy(7 * 32 + req.data.len())?;
		meter.allocate(32 + Signature::PACKED_LEN)?;
		meter.copy(Signature::PACKED_LEN)?;

		// Struct hash, typed-data digest, personal-sign envelope, ecrecover.
		meter.keccak(req.data.len())?;
		meter.allocate(7 * 32)?;
		meter.keccak(7 * 32)?;
		meter.allocate(66)?;
		meter.keccak(66)?;
		meter.allocate(32 + 60)?;
		meter.keccak(60)?;
		meter.allocate(128)?;
		meter.charge(schedule.ecrecover)?;

		let recovered = self.recover(req, signature)?;
		if recovered != req.from {
			tracing::warn!(
				forwarder = %self.address,
				expected = %req.from,
				recovered = %recovered,
				"Rejected request with foreign signature"
			);
			return Err(ForwarderError::SignatureMismatch {
				expected: req.from,
				recovered,
			});
		}

		meter.charge(schedule.sload_cold)?;
		let mut treasury = self.treasury.lock().await;
		let current = self.nonces.get(req.from).await?;
		if req.nonce != current {
			tracing::warn!(
				forwarder = %self.address,
				from = %req.from,
				expected = %current,
				actual = %req.nonce,
				"Rejected request with stale or future nonce"
			);
			return Err(ForwarderError::NonceMismatch {
				expected: current,
				actual: req.nonce,
			});
		}

		// The nonce is consumed before the call, so a reentrant replay fails.
		let next = current
			.checked_add(U256::from(1))
			.ok_or_else(|| ForwarderError::NonceMismatch {
				expected: current,
				actual: req.nonce,
			})?;
		meter.charge(schedule.sstore_cost(current.is_zero()))?;
		self.nonces.set(req.from, next).await?;

		treasury.balance = treasury.balance.saturating_add(ctx.value);
		let journal = Journal {
			current,
			next,
			credited: ctx.value,
		};

		let call = match self.prepare_call(req, &mut treasury, &mut meter) {
			Ok(call) => call,
			Err(out_of_gas) => {
				return Err(self.abort(&mut treasury, req, &journal, U256::ZERO, out_of_gas).await)
			},
		};
		// Unlocked while the target runs; it may call back into this forwarder.
		drop(treasury);

		let outcome = match &call {
			Some((call, args)) => self.targets.dispatch(req.to, call, args).await,
			None => CallOutcome::revert(Bytes::new(), 0),
		};

		let mut treasury = self.treasury.lock().await;
		let mut outstanding = U256::ZERO;
		if call.is_some() {
			if outcome.success {
				outstanding = req.value;
			} else {
				treasury.balance = treasury.balance.saturating_add(req.value);
			}
		}
		if let Err(out_of_gas) = settle(&outcome, &mut meter) {
			return Err(self.abort(&mut treasury, req, &journal, outstanding, out_of_gas).await);
		}
		drop(treasury);

		tracing::info!(
			forwarder = %self.address,
			from = %req.from,
			to = %req.to,
			nonce = %current,
			success = outcome.success,
			gas_used = meter.used(),
			"Forwarded request"
		);

		Ok(ExecutionResult {
			success: outcome.success,
			return_data: outcome.return_data,
			gas_used: meter.used(),
		})
	}

	/// Charges for the call of an accepted request and takes its value out of
	/// the treasury.
	///
	/// Returns `None` when the treasury cannot cover the value; the call then
	/// fails without reaching the target.
	fn prepare_call(
		&self,
		req: &ForwardRequest,
		treasury: &mut Treasury,
		meter: &mut GasMeter,
	) -> Result<Option<(CallContext, Vec<u8>)>, OutOfGas> {
		let schedule = *meter.schedule();
		let gas = u64::try_from(req.gas).map_err(|_| OutOfGas {
			limit: meter.limit(),
			required: u64::MAX,
		})?;

		// abi.encodePacked(data, from)
		let args_len = req.data.len() + 20;
		meter.allocate(32 + args_len)?;
		meter.copy(args_len)?;

		let mut call_cost = schedule.call_cold;
		if !req.value.is_zero() {
			call_cost = call_cost.saturating_add(schedule.call_value);
		}
		meter.charge(call_cost)?;

		// The caller keeps 1/63 of the allotment for the work after the call.
		let required = gas.saturating_add(gas / 63);
		if meter.remaining() < required {
			return Err(OutOfGas {
				limit: meter.limit(),
				required: meter.used().saturating_add(required),
			});
		}

		if req.value > treasury.balance {
			tracing::debug!(value = %req.value, balance = %treasury.balance, "Insufficient balance for call value");
			return Ok(None);
		}
		treasury.balance -= req.value;

		let mut args = Vec::with_capacity(args_len);
		args.extend_from_slice(&req.data);
		args.extend_from_slice(req.from.as_slice());
		let call = CallContext {
			caller: self.address,
			value: req.value,
			gas_limit: gas,
		};
		Ok(Some((call, args)))
	}

	/// Voids a unit that ran out of gas after its nonce was consumed.
	///
	/// `outstanding` is value that left the treasury with a successful call.
	async fn abort(
		&self,
		treasury: &mut Treasury,
		req: &ForwardRequest,
		journal: &Journal,
		outstanding: U256,
		out_of_gas: OutOfGas,
	) -> ForwarderError {
		// Balance first: the nonce write below can fail.
		treasury.balance = treasury
			.balance
			.saturating_sub(journal.credited)
			.saturating_add(outstanding);

		if let Err(err) = self.restore_nonce(req.from, journal).await {
			tracing::error!(
				forwarder = %self.address,
				from = %req.from,
				error = %err,
				"Failed to restore nonce of a void execution"
			);
			return err;
		}

		tracing::warn!(
			forwarder = %self.address,
			from = %req.from,
			nonce = %journal.current,
			limit = out_of_gas.limit,
			required = out_of_gas.required,
			"Execution ran out of gas, nonce restored"
		);
		out_of_gas.into()
	}

	async fn restore_nonce(&self, signer: Address, journal: &Journal) -> Result<(), ForwarderError> {
		// A reentrant request may have consumed the following nonce meanwhile.
		if self.nonces.get(signer).await? == journal.next {
			self.nonces.set(signer, journal.current).await?;
		}
		Ok(())
	}

	fn forward_request<'a>(&self, request: &'a RelayRequest) -> Result<&'a ForwardRequest, ForwarderError> {
		match request {
			RelayRequest::Forward(req) => Ok(req),
			other => Err(ForwarderError::UnsupportedRequest(format!(
				"robust forwarder expects a forward request, got a {} request",
				other.shape()
			))),
		}
	}
}

/// Return data copied out, then re-encoded as `(bool, bytes)`.
fn settle(outcome: &CallOutcome, meter: &mut GasMeter) -> Result<(), OutOfGas> {
	meter.charge(outcome.gas_used)?;
	let returned = outcome.return_data.len();
	meter.allocate(32 + returned)?;
	meter.copy(returned)?;
	meter.allocate(96 + returned)?;
	meter.copy(returned)
}

/// `keccak256(abi.encode(TYPEHASH, from, to, value, gas, nonce, keccak256(data)))`
fn struct_hash(req: &ForwardRequest) -> B256 {
	let mut enc = Eip712AbiEncoder::with_words(7);
	enc.push_b256(&keccak256(FORWARD_REQUEST_TYPE.as_bytes()));
	enc.push_address(&req.from);
	enc.push_address(&req.to);
	enc.push_u256(req.value);
	enc.push_u256(req.gas);
	enc.push_u256(req.nonce);
	enc.push_bytes(&req.data);
	keccak256(enc.finish())
}

#[async_trait]
impl ForwarderInterface for RobustForwarder {
	fn kind(&self) -> ForwarderKind {
		ForwarderKind::Robust
	}

	fn address(&self) -> Address {
		self.address
	}

	fn hash_of_request(&self, request: &RelayRequest) -> Result<B256, ForwarderError> {
		Ok(self.hash_request(self.forward_request(request)?))
	}

	async fn verify(
		&self,
		request: &RelayRequest,
		signature: &Signature,
	) -> Result<bool, ForwarderError> {
		self.verify_request(self.forward_request(request)?, signature)
			.await
	}

	async fn execute(
		&self,
		request: &RelayRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		self.execute_request(self.forward_request(request)?, signature, ctx)
			.await
	}

	async fn nonce_of(&self, signer: Address) -> Result<Option<U256>, ForwarderError> {
		self.get_nonce(signer).await.map(Some)
	}
}

pub struct RobustForwarderSchema;

impl ConfigSchema for RobustForwarderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let non_empty = |v: &toml::Value| match v.as_str() {
			Some(s) if s.is_empty() => Err("must not be empty".to_string()),
			_ => Ok(()),
		};
		let schema = Schema::new(
			vec![Field::new("address", FieldType::Address)],
			vec![
				Field::new("name", FieldType::String).with_validator(non_empty),
				Field::new("version", FieldType::String).with_validator(non_empty),
			],
		);
		schema.validate(config)
	}
}

/// Creates a robust forwarder.
///
/// Configuration parameters:
/// - `address`: verifying-contract address bound into the domain
/// - `name`: domain name (default: "MinimalForwarder")
/// - `version`: domain version (default: "0.0.1")
pub fn create_forwarder(
	config: &toml::Value,
	deps: &ForwarderDeps,
) -> Result<Box<dyn ForwarderInterface>, ForwarderError> {
	RobustForwarderSchema
		.validate(config)
		.map_err(|e| ForwarderError::Configuration(e.to_string()))?;

	let address = config
		.get("address")
		.and_then(|v| v.as_str())
		.and_then(|s| s.parse::<Address>().ok())
		.ok_or_else(|| ForwarderError::Configuration("address is required".into()))?;
	let name = config
		.get("name")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_NAME);
	let version = config
		.get("version")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_VERSION);

	tracing::debug!(%address, name, version, chain_id = deps.chain_id, "Created robust forwarder");
	Ok(Box::new(RobustForwarder::new(address, name, version, deps)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "robust";
	type Factory = ForwarderFactory;

	fn factory() -> Self::Factory {
		create_forwarder
	}
}

impl ForwarderRegistry for Registry {}
