//! Execution-cost model.
//!
//! Costs follow the shape of the EVM fee schedule so that forwarder variants can
//! be compared by the work they do: calldata bytes, hashing, memory expansion,
//! word copies, storage access, the ecrecover precompile and outgoing calls.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Solidity reserves the first four memory words (scratch space, free memory
/// pointer and zero slot); allocations start after them.
pub const FREE_MEMORY_START: usize = 0x80;

/// Raised when a unit of execution exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out of gas: limit {limit}, required {required}")]
pub struct OutOfGas {
	pub limit: u64,
	pub required: u64,
}

/// Per-operation costs.
///
/// Every field can be overridden from configuration; missing fields keep the
/// defaults below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSchedule {
	pub tx_base: u64,
	pub calldata_zero_byte: u64,
	pub calldata_nonzero_byte: u64,
	/// Selector matching and argument validation at function entry.
	pub dispatch: u64,
	pub keccak_base: u64,
	pub keccak_word: u64,
	pub memory_word: u64,
	pub memory_quadratic_divisor: u64,
	pub copy_word: u64,
	pub sload_cold: u64,
	/// Writing a non-zero value into a zero slot.
	pub sstore_set: u64,
	/// Overwriting a non-zero slot.
	pub sstore_reset: u64,
	pub ecrecover: u64,
	pub call_cold: u64,
	pub call_value: u64,
}

impl Default for GasSchedule {
	fn default() -> Self {
		Self {
			tx_base: 21_000,
			calldata_zero_byte: 4,
			calldata_nonzero_byte: 16,
			dispatch: 250,
			keccak_base: 30,
			keccak_word: 6,
			memory_word: 3,
			memory_quadratic_divisor: 512,
			copy_word: 3,
			sload_cold: 2_100,
			sstore_set: 20_000,
			sstore_reset: 2_900,
			ecrecover: 3_000,
			call_cold: 2_600,
			call_value: 9_000,
		}
	}
}

/// Number of 32-byte words needed to hold `len` bytes.
pub fn words(len: usize) -> u64 {
	len.div_ceil(32) as u64
}

impl GasSchedule {
	/// Total cost of `words` words of memory (linear plus quadratic term).
	pub fn memory_cost(&self, words: u64) -> u64 {
		let quadratic = match self.memory_quadratic_divisor {
			0 => 0,
			divisor => words.saturating_mul(words) / divisor,
		};
		self.memory_word.saturating_mul(words).saturating_add(quadratic)
	}

	pub fn calldata_cost(&self, calldata: &[u8]) -> u64 {
		calldata.iter().fold(0u64, |acc, byte| {
			acc.saturating_add(if *byte == 0 {
				self.calldata_zero_byte
			} else {
				self.calldata_nonzero_byte
			})
		})
	}

	pub fn keccak_cost(&self, len: usize) -> u64 {
		self.keccak_base
			.saturating_add(self.keccak_word.saturating_mul(words(len)))
	}

	pub fn copy_cost(&self, len: usize) -> u64 {
		self.copy_word.saturating_mul(words(len))
	}

	/// Storage write cost depending on whether the slot held zero before.
	pub fn sstore_cost(&self, slot_was_zero: bool) -> u64 {
		if slot_was_zero {
			self.sstore_set
		} else {
			self.sstore_reset
		}
	}
}

/// Tracks gas consumption and memory growth of one unit of execution.
#[derive(Debug, Clone)]
pub struct GasMeter {
	schedule: GasSchedule,
	limit: u64,
	used: u64,
	memory_words: u64,
	free_pointer: usize,
}

impl GasMeter {
	pub fn new(schedule: GasSchedule, limit: u64) -> Self {
		Self {
			schedule,
			limit,
			used: 0,
			memory_words: 0,
			free_pointer: FREE_MEMORY_START,
		}
	}

	pub fn schedule(&self) -> &GasSchedule {
		&self.schedule
	}

	pub fn limit(&self) -> u64 {
		self.limit
	}

	pub fn used(&self) -> u64 {
		self.used
	}

	pub fn remaining(&self) -> u64 {
		self.limit - self.used
	}

	pub fn charge(&mut self, amount: u64) -> Result<(), OutOfGas> {
		let required = self.used.saturating_add(amount);
		if required > self.limit {
			return Err(OutOfGas {
				limit: self.limit,
				required,
			});
		}
		self.used = required;
		Ok(())
	}

	/// Charges the transaction base cost and the submitted calldata.
	pub fn intrinsic(&mut self, calldata: &[u8]) -> Result<(), OutOfGas> {
		let cost = self
			.schedule
			.tx_base
			.saturating_add(self.schedule.calldata_cost(calldata));
		self.charge(cost)
	}

	pub fn keccak(&mut self, len: usize) -> Result<(), OutOfGas> {
		let cost = self.schedule.keccak_cost(len);
		self.charge(cost)
	}

	pub fn copy(&mut self, len: usize) -> Result<(), OutOfGas> {
		let cost = self.schedule.copy_cost(len);
		self.charge(cost)
	}

	/// Expands memory so that `[0, end)` is addressable, charging only the growth.
	pub fn touch_memory(&mut self, end: usize) -> Result<(), OutOfGas> {
		let target = words(end);
		if target <= self.memory_words {
			return Ok(());
		}
		let growth = self.schedule.memory_cost(target) - self.schedule.memory_cost(self.memory_words);
		self.charge(growth)?;
		self.memory_words = target;
		Ok(())
	}

	/// Bumps the free memory pointer by `len` bytes (word aligned) and returns
	/// the offset of the new region.
	pub fn allocate(&mut self, len: usize) -> Result<usize, OutOfGas> {
		let offset = self.free_pointer;
		let end = offset + (words(len) as usize) * 32;
		self.touch_memory(end)?;
		self.free_pointer = end;
		Ok(offset)
	}
}
