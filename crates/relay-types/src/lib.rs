//! Common types module for the meta-transaction relayer.
//!
//! This module defines the request, signature and execution types shared by
//! every forwarder implementation, together with the execution-cost model and
//! the configuration validation framework used by pluggable implementations.

/// Execution context, call outcomes and results.
pub mod execution;
/// Execution-cost schedule and metering.
pub mod gas;
/// Signed request shapes accepted by the forwarders.
pub mod request;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Redacting wrapper for private keys and other secrets.
pub mod secret_string;
/// ECDSA signature in split and packed form.
pub mod signature;
/// Storage namespaces.
pub mod storage;
/// EIP-712 encoding helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, Bytes, B256, U256};
pub use execution::*;
pub use gas::{GasMeter, GasSchedule, OutOfGas};
pub use registry::ImplementationRegistry;
pub use request::{ForwardRequest, RelayRequest, SimpleCallRequest};
pub use secret_string::SecretString;
pub use signature::{Signature, SignatureError};
pub use storage::StorageKey;
pub use validation::*;
