//! Fixtures shared by the forwarder tests: example call targets, a relayee key
//! and helpers to build dependencies.

use crate::host::{CallTarget, TargetRegistry};
use crate::{ForwarderDeps, ForwarderError, ForwarderInterface};
use alloy_primitives::{address, uint};
use alloy_sol_types::{sol, SolCall, SolError};
use async_trait::async_trait;
use relay_account::{implementations::local::LocalAccount, AccountInterface};
use relay_storage::{
	implementations::memory::MemoryStorage, StorageError, StorageInterface, StorageService,
};
use relay_types::{
	Address, Bytes, CallContext, CallOutcome, ExecutionContext, ExecutionResult, GasSchedule,
	RelayRequest, SecretString, Signature, B256, U256,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

sol! {
	function sum(uint256 a, uint256 b) external pure returns (uint256);
	function greet() external pure returns (string);
}

/// Relayee key of the benchmark scenario; its address is
/// 0x26fa9f1a6568b42e29b1787c403B3628dFC0C6FE.
pub const RELAYEE_KEY: &str = "8179ce3d00ac1d1d1d38e4f038de00ccd0e0375517164ac5448e3acc847acb34";
/// A second, unrelated key.
pub const OTHER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const CHAIN_ID: u64 = 1337;
pub const OPERATOR: Address = address!("00000000000000000000000000000000000000f0");
pub const CALCULATOR: Address = address!("00000000000000000000000000000000000000c1");
pub const HELLO: Address = address!("00000000000000000000000000000000000000c2");
pub const REVERTER: Address = address!("00000000000000000000000000000000000000c3");

pub const SECP256K1N: U256 =
	uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

/// Gas charged by the example targets.
pub const CALCULATOR_GAS: u64 = 450;
pub const REVERTER_GAS: u64 = 300;

pub struct Calculator;

#[async_trait]
impl CallTarget for Calculator {
	async fn call(&self, _ctx: &CallContext, data: &[u8]) -> CallOutcome {
		// Trailing bytes (an appended sender) are ignored like in Solidity.
		let Ok(call) = sumCall::abi_decode(data, false) else {
			return CallOutcome::revert(Bytes::new(), CALCULATOR_GAS);
		};
		match call.a.checked_add(call.b) {
			Some(total) => CallOutcome::success(sumCall::abi_encode_returns(&(total,)), CALCULATOR_GAS),
			None => CallOutcome::revert(Bytes::new(), CALCULATOR_GAS),
		}
	}
}

pub struct Hello;

#[async_trait]
impl CallTarget for Hello {
	async fn call(&self, _ctx: &CallContext, _data: &[u8]) -> CallOutcome {
		CallOutcome::success(
			greetCall::abi_encode_returns(&("Hello, world!".to_string(),)),
			700,
		)
	}
}

pub struct Reverter;

pub const REVERT_REASON: &str = "always reverts";

#[async_trait]
impl CallTarget for Reverter {
	async fn call(&self, _ctx: &CallContext, _data: &[u8]) -> CallOutcome {
		let payload = alloy_sol_types::Revert {
			reason: REVERT_REASON.to_string(),
		}
		.abi_encode();
		CallOutcome::revert(payload, REVERTER_GAS)
	}
}

/// Reports more gas than any allotment.
pub struct GasHog;

#[async_trait]
impl CallTarget for GasHog {
	async fn call(&self, ctx: &CallContext, _data: &[u8]) -> CallOutcome {
		CallOutcome::success(Bytes::new(), ctx.gas_limit.saturating_add(1))
	}
}

/// Records every call it receives.
#[derive(Default)]
pub struct Recorder {
	pub calls: Mutex<Vec<(CallContext, Vec<u8>)>>,
}

#[async_trait]
impl CallTarget for Recorder {
	async fn call(&self, ctx: &CallContext, data: &[u8]) -> CallOutcome {
		self.calls.lock().unwrap().push((ctx.clone(), data.to_vec()));
		CallOutcome::success(Bytes::new(), 100)
	}
}

/// Returns a large blob, for exhausting the budget after the call.
pub struct Blob(pub usize);

#[async_trait]
impl CallTarget for Blob {
	async fn call(&self, _ctx: &CallContext, _data: &[u8]) -> CallOutcome {
		CallOutcome::success(vec![0xab; self.0], 100)
	}
}

/// Calls back into a forwarder once, with the request it was armed with, and
/// keeps what that inner execution returned.
#[derive(Default)]
pub struct Reentrant {
	armed: OnceLock<(Arc<dyn ForwarderInterface>, RelayRequest, Signature)>,
	entered: AtomicBool,
	inner: Mutex<Option<Result<ExecutionResult, ForwarderError>>>,
}

impl Reentrant {
	pub fn arm(&self, forwarder: Arc<dyn ForwarderInterface>, request: RelayRequest, signature: Signature) {
		let _ = self.armed.set((forwarder, request, signature));
	}

	pub fn inner(&self) -> Option<Result<ExecutionResult, ForwarderError>> {
		self.inner.lock().unwrap().clone()
	}
}

#[async_trait]
impl CallTarget for Reentrant {
	async fn call(&self, ctx: &CallContext, _data: &[u8]) -> CallOutcome {
		let Some((forwarder, request, signature)) = self.armed.get() else {
			return CallOutcome::success(Bytes::new(), 100);
		};
		if self.entered.swap(true, Ordering::SeqCst) {
			return CallOutcome::success(Bytes::new(), 100);
		}
		let inner_ctx = ExecutionContext::new(ctx.caller, ctx.gas_limit);
		let result = forwarder.execute(request, signature, &inner_ctx).await;
		*self.inner.lock().unwrap() = Some(result);
		CallOutcome::success(Bytes::new(), 1_000)
	}
}

/// Memory storage whose writes fail once `writes` of them have succeeded.
pub struct FailingWrites {
	inner: MemoryStorage,
	writes: AtomicUsize,
}

impl FailingWrites {
	pub fn after(writes: usize) -> Self {
		Self {
			inner: MemoryStorage::new(),
			writes: AtomicUsize::new(writes),
		}
	}
}

#[async_trait]
impl StorageInterface for FailingWrites {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let left = self.writes.load(Ordering::SeqCst);
		if left == 0 {
			return Err(StorageError::Backend("disk full".into()));
		}
		self.writes.store(left - 1, Ordering::SeqCst);
		self.inner.set_bytes(key, value).await
	}
}

pub fn sum_calldata(a: u64, b: u64) -> Bytes {
	sumCall {
		a: U256::from(a),
		b: U256::from(b),
	}
	.abi_encode()
	.into()
}

pub fn greet_calldata() -> Bytes {
	greetCall {}.abi_encode().into()
}

pub fn decode_sum(return_data: &[u8]) -> U256 {
	sumCall::abi_decode_returns(return_data, true).unwrap()._0
}

pub fn decode_greet(return_data: &[u8]) -> String {
	greetCall::abi_decode_returns(return_data, true).unwrap()._0
}

pub fn account(key: &str) -> LocalAccount {
	LocalAccount::new(&SecretString::from(key)).unwrap()
}

pub async fn relayee() -> Address {
	account(RELAYEE_KEY).address().await.unwrap()
}

/// Signs `digest` as the relayee, the way `web3.eth.accounts.sign` does.
pub async fn sign(digest: &B256) -> Signature {
	sign_with(RELAYEE_KEY, digest).await
}

pub async fn sign_as_other(digest: &B256) -> Signature {
	sign_with(OTHER_KEY, digest).await
}

async fn sign_with(key: &str, digest: &B256) -> Signature {
	account(key).sign_digest(digest).await.unwrap()
}

pub fn targets() -> Arc<TargetRegistry> {
	let targets = TargetRegistry::new();
	targets.register(CALCULATOR, Arc::new(Calculator));
	targets.register(HELLO, Arc::new(Hello));
	targets.register(REVERTER, Arc::new(Reverter));
	Arc::new(targets)
}

pub fn deps_with_storage(storage: Arc<StorageService>) -> ForwarderDeps {
	ForwarderDeps {
		chain_id: CHAIN_ID,
		storage,
		targets: targets(),
		schedule: GasSchedule::default(),
	}
}

pub fn deps() -> ForwarderDeps {
	deps_with_storage(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
}
