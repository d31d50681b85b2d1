//! Meta-transaction forwarders.
//!
//! A forwarder verifies that a request was authorized off-chain by its signer and
//! then executes the request's call against the target on the signer's behalf,
//! while an operator pays for the execution. Three variants implement the same
//! [`ForwarderInterface`]:
//!
//! - `robust`: EIP-712 typed-data digests bound to chain and forwarder address,
//!   per-signer nonces, ERC-2771 trailing-sender forwarding with value and an
//!   explicit gas allotment.
//! - `simple`: digest over `(signer, target, data)` only.
//! - `optimized`: observably identical to `simple`, with a cheaper execution path.
//!
//! The variants share signature recovery ([`recovery`]), call dispatch
//! ([`host`]) and the execution-cost model from `relay_types::gas`.

use async_trait::async_trait;
use relay_storage::{StorageError, StorageService};
use relay_types::{
	Address, ExecutionContext, ExecutionResult, GasSchedule,
	ImplementationRegistry, OutOfGas, RelayRequest, Signature, B256, U256,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub mod abi;
pub mod host;
pub mod nonces;
pub mod recovery;

pub mod implementations {
	pub mod optimized;
	pub mod robust;
	pub mod simple;
}

#[cfg(test)]
mod test_support;

pub use host::{CallTarget, TargetRegistry};

/// Errors that reject an execution before or instead of forwarding.
///
/// A downstream call that fails is not an error; it is reported as
/// `ExecutionResult { success: false, .. }`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwarderError {
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Signature mismatch: expected signer {expected}, recovered {recovered}")]
	SignatureMismatch { expected: Address, recovered: Address },
	#[error("Nonce mismatch: expected {expected}, got {actual}")]
	NonceMismatch { expected: U256, actual: U256 },
	#[error("Out of gas: limit {limit}, required {required}")]
	OutOfGas { limit: u64, required: u64 },
	#[error("Unsupported request: {0}")]
	UnsupportedRequest(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<OutOfGas> for ForwarderError {
	fn from(err: OutOfGas) -> Self {
		ForwarderError::OutOfGas {
			limit: err.limit,
			required: err.required,
		}
	}
}

impl From<StorageError> for ForwarderError {
	fn from(err: StorageError) -> Self {
		ForwarderError::Storage(err.to_string())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForwarderKind {
	Robust,
	Simple,
	Optimized,
}

impl ForwarderKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ForwarderKind::Robust => "robust",
			ForwarderKind::Simple => "simple",
			ForwarderKind::Optimized => "optimized",
		}
	}
}

impl fmt::Display for ForwarderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ForwarderKind {
	type Err = ForwarderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"robust" => Ok(ForwarderKind::Robust),
			"simple" => Ok(ForwarderKind::Simple),
			"optimized" => Ok(ForwarderKind::Optimized),
			other => Err(ForwarderError::Configuration(format!(
				"Unknown forwarder '{}'",
				other
			))),
		}
	}
}

/// The capability every forwarder variant provides.
#[async_trait]
pub trait ForwarderInterface: Send + Sync {
	fn kind(&self) -> ForwarderKind;

	/// Address the forwarder is deployed at. Targets see it as their caller.
	fn address(&self) -> Address;

	/// Computes the digest a signer must sign for `request`.
	///
	/// Pure and deterministic; fails only with `UnsupportedRequest` when the
	/// request has the other variant's shape.
	fn hash_of_request(&self, request: &RelayRequest) -> Result<B256, ForwarderError>;

	/// Checks the signature (and, for variants with replay protection, the
	/// nonce) without executing anything.
	async fn verify(
		&self,
		request: &RelayRequest,
		signature: &Signature,
	) -> Result<bool, ForwarderError>;

	/// Verifies `request` and forwards its call as one indivisible unit.
	async fn execute(
		&self,
		request: &RelayRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError>;

	/// Current nonce of `signer`, or `None` for variants without nonces.
	async fn nonce_of(&self, signer: Address) -> Result<Option<U256>, ForwarderError>;
}

/// Shared collaborators handed to every forwarder factory.
#[derive(Clone)]
pub struct ForwarderDeps {
	pub chain_id: u64,
	pub storage: Arc<StorageService>,
	pub targets: Arc<TargetRegistry>,
	pub schedule: GasSchedule,
}

pub type ForwarderFactory =
	fn(&toml::Value, &ForwarderDeps) -> Result<Box<dyn ForwarderInterface>, ForwarderError>;

pub trait ForwarderRegistry: ImplementationRegistry<Factory = ForwarderFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, ForwarderFactory)> {
	use implementations::{optimized, robust, simple};

	vec![
		(robust::Registry::NAME, robust::Registry::factory()),
		(simple::Registry::NAME, simple::Registry::factory()),
		(optimized::Registry::NAME, optimized::Registry::factory()),
	]
}

/// Routes requests to the configured forwarder variants.
pub struct ForwarderService {
	forwarders: HashMap<ForwarderKind, Arc<dyn ForwarderInterface>>,
	primary: ForwarderKind,
}

impl ForwarderService {
	pub fn new(
		forwarders: HashMap<ForwarderKind, Arc<dyn ForwarderInterface>>,
		primary: ForwarderKind,
	) -> Result<Self, ForwarderError> {
		if !forwarders.contains_key(&primary) {
			return Err(ForwarderError::Configuration(format!(
				"Primary forwarder '{}' is not configured",
				primary
			)));
		}
		Ok(Self {
			forwarders,
			primary,
		})
	}

	pub fn primary(&self) -> ForwarderKind {
		self.primary
	}

	/// Configured variants in a stable order.
	pub fn kinds(&self) -> Vec<ForwarderKind> {
		let mut kinds: Vec<_> = self.forwarders.keys().copied().collect();
		kinds.sort();
		kinds
	}

	/// Looks up a variant, falling back to the primary one.
	pub fn forwarder(
		&self,
		kind: Option<ForwarderKind>,
	) -> Result<&Arc<dyn ForwarderInterface>, ForwarderError> {
		let kind = kind.unwrap_or(self.primary);
		self.forwarders.get(&kind).ok_or_else(|| {
			ForwarderError::Configuration(format!("Forwarder '{}' is not configured", kind))
		})
	}

	pub fn hash_of_request(
		&self,
		kind: Option<ForwarderKind>,
		request: &RelayRequest,
	) -> Result<B256, ForwarderError> {
		self.forwarder(kind)?.hash_of_request(request)
	}

	pub async fn verify(
		&self,
		kind: Option<ForwarderKind>,
		request: &RelayRequest,
		signature: &Signature,
	) -> Result<bool, ForwarderError> {
		self.forwarder(kind)?.verify(request, signature).await
	}

	pub async fn execute(
		&self,
		kind: Option<ForwarderKind>,
		request: &RelayRequest,
		signature: &Signature,
		ctx: &ExecutionContext,
	) -> Result<ExecutionResult, ForwarderError> {
		let forwarder = self.forwarder(kind)?;
		tracing::debug!(
			kind = %forwarder.kind(),
			signer = %request.signer(),
			to = %request.target(),
			operator = %ctx.operator,
			"Executing request"
		);
		forwarder.execute(request, signature, ctx).await
	}

	pub async fn nonce_of(
		&self,
		kind: Option<ForwarderKind>,
		signer: Address,
	) -> Result<Option<U256>, ForwarderError> {
		self.forwarder(kind)?.nonce_of(signer).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{decode_sum, deps, relayee, sign, sum_calldata, CALCULATOR, OPERATOR};
	use relay_types::SimpleCallRequest;

	fn build(kind: ForwarderKind, deps: &ForwarderDeps, address: &str) -> Arc<dyn ForwarderInterface> {
		let config: toml::Value = toml::from_str(&format!("address = \"{}\"", address)).unwrap();
		let factory = get_all_implementations()
			.into_iter()
			.find(|(name, _)| *name == kind.as_str())
			.map(|(_, factory)| factory)
			.unwrap();
		Arc::from(factory(&config, deps).unwrap())
	}

	#[test]
	fn test_kind_round_trip() {
		for kind in [ForwarderKind::Robust, ForwarderKind::Simple, ForwarderKind::Optimized] {
			assert_eq!(kind.as_str().parse::<ForwarderKind>().unwrap(), kind);
		}
		assert!(matches!(
			"minimal".parse::<ForwarderKind>(),
			Err(ForwarderError::Configuration(_))
		));
	}

	#[test]
	fn test_every_variant_registered() {
		let names: Vec<_> = get_all_implementations().into_iter().map(|(n, _)| n).collect();
		assert_eq!(names, vec!["robust", "simple", "optimized"]);
	}

	#[tokio::test]
	async fn test_service_routes_to_primary_and_named_variant() {
		let deps = deps();
		let mut forwarders = HashMap::new();
		for (kind, address) in [
			(ForwarderKind::Simple, "0x00000000000000000000000000000000000000a1"),
			(ForwarderKind::Optimized, "0x00000000000000000000000000000000000000a2"),
		] {
			forwarders.insert(kind, build(kind, &deps, address));
		}
		let service = ForwarderService::new(forwarders, ForwarderKind::Simple).unwrap();
		assert_eq!(service.kinds(), vec![ForwarderKind::Simple, ForwarderKind::Optimized]);

		let request: RelayRequest =
			SimpleCallRequest::new(relayee().await, CALCULATOR, sum_calldata(1, 2)).into();
		let simple = service.hash_of_request(None, &request).unwrap();
		let optimized = service
			.hash_of_request(Some(ForwarderKind::Optimized), &request)
			.unwrap();
		assert_eq!(simple, optimized);

		let signature = sign(&simple).await;
		assert!(service.verify(None, &request, &signature).await.unwrap());
		let ctx = ExecutionContext::new(OPERATOR, 1_000_000);
		let result = service
			.execute(Some(ForwarderKind::Optimized), &request, &signature, &ctx)
			.await
			.unwrap();
		assert_eq!(decode_sum(&result.return_data), U256::from(3));
		assert_eq!(service.nonce_of(None, relayee().await).await.unwrap(), None);

		assert!(matches!(
			service.hash_of_request(Some(ForwarderKind::Robust), &request),
			Err(ForwarderError::Configuration(_))
		));
	}

	#[test]
	fn test_service_requires_primary() {
		assert!(matches!(
			ForwarderService::new(HashMap::new(), ForwarderKind::Robust),
			Err(ForwarderError::Configuration(_))
		));
	}
}
