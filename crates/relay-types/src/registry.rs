//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable module (storage backends, accounts, forwarders) provides a
/// `Registry` struct implementing this trait, declaring the name used for it in
/// configuration and the factory that builds it.
pub trait ImplementationRegistry {
	/// The key of this implementation in configuration, for example `"memory"`
	/// under `[storage.implementations]` or `"robust"` under
	/// `[forwarders.implementations]`.
	const NAME: &'static str;

	/// The factory function type of the owning module.
	type Factory;

	fn factory() -> Self::Factory;
}
