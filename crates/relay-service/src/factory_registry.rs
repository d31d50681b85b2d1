//! Registry of implementation factories and relayer assembly.
//!
//! Every crate exposes its implementations through `get_all_implementations`;
//! this module collects them once and builds the configured ones.

use relay_account::{AccountFactory, AccountService};
use relay_config::Config;
use relay_forwarder::{
	ForwarderDeps, ForwarderFactory, ForwarderInterface, ForwarderKind, ForwarderService,
	TargetRegistry,
};
use relay_storage::{StorageFactory, StorageService};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub account: HashMap<String, AccountFactory>,
	pub forwarder: HashMap<String, ForwarderFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			account: HashMap::new(),
			forwarder: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}

	pub fn register_forwarder(&mut self, name: impl Into<String>, factory: ForwarderFactory) {
		self.forwarder.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Get the global factory registry, initializing it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in relay_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in relay_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		for (name, factory) in relay_forwarder::get_all_implementations() {
			tracing::debug!("Registering forwarder implementation: {}", name);
			registry.register_forwarder(name, factory);
		}

		registry
	})
}

fn lookup<F: Copy>(
	factories: &HashMap<String, F>,
	name: &str,
	type_name: &str,
) -> Result<F, Box<dyn std::error::Error>> {
	factories.get(name).copied().ok_or_else(|| {
		let mut available: Vec<_> = factories.keys().cloned().collect();
		available.sort();
		format!(
			"Unknown {} implementation '{}'. Available: [{}]",
			type_name,
			name,
			available.join(", ")
		)
		.into()
	})
}

/// The configured services of one relayer instance.
pub struct Relayer {
	pub config: Config,
	pub forwarders: ForwarderService,
	pub account: Option<AccountService>,
}

/// Builds storage, forwarders and the optional signing account from `config`.
pub fn build_relayer(config: Config) -> Result<Relayer, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_config = config
		.primary_storage()
		.ok_or_else(|| format!("Primary storage '{}' is not configured", config.storage.primary))?;
	let storage_factory = lookup(&registry.storage, &config.storage.primary, "storage")?;
	let storage = Arc::new(StorageService::new(storage_factory(storage_config)?));

	// The operator tool deploys no call targets.
	let deps = ForwarderDeps {
		chain_id: config.forwarders.chain_id,
		storage,
		targets: Arc::new(TargetRegistry::new()),
		schedule: config.gas,
	};

	let mut forwarders: HashMap<ForwarderKind, Arc<dyn ForwarderInterface>> = HashMap::new();
	for (name, forwarder_config) in &config.forwarders.implementations {
		let factory = lookup(&registry.forwarder, name, "forwarder")?;
		let kind: ForwarderKind = name.parse()?;
		let forwarder = factory(forwarder_config, &deps)?;
		tracing::info!(kind = %kind, address = %forwarder.address(), "Configured forwarder");
		forwarders.insert(kind, Arc::from(forwarder));
	}
	let forwarders = ForwarderService::new(forwarders, config.forwarders.primary.parse()?)?;
	tracing::debug!(
		primary = %forwarders.primary(),
		kinds = ?forwarders.kinds(),
		"Forwarders ready"
	);

	let account = match &config.account {
		Some(account) => {
			let account_config = account
				.implementations
				.get(&account.primary)
				.ok_or_else(|| format!("Primary account '{}' is not configured", account.primary))?;
			let factory = lookup(&registry.account, &account.primary, "account")?;
			Some(AccountService::new(factory(account_config)?))
		},
		None => None,
	};

	Ok(Relayer {
		config,
		forwarders,
		account,
	})
}

#[cfg(test)]
pub(crate) const TEST_CONFIG: &str = r#"
[relayer]
id = "relayer-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[forwarders]
primary = "robust"
chain_id = 1337
[forwarders.implementations.robust]
address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
[forwarders.implementations.simple]
address = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
[forwarders.implementations.optimized]
address = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"

[account]
primary = "local"
[account.implementations.local]
private_key = "0x8179ce3d00ac1d1d1d38e4f038de00ccd0e0375517164ac5448e3acc847acb34"
"#;
