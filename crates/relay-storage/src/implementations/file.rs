//! File-based storage backend.
//!
//! Each key is one file under the configured directory. Writes go to a
//! temporary file first and are renamed into place, so a crash never leaves a
//! half-written value behind.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use relay_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

const DEFAULT_STORAGE_PATH: &str = "./data/storage";

/// Fixed-size prefix identifying files written by this backend.
///
/// Layout (8 bytes): magic "RLYS", format version (u16, little-endian), two
/// reserved zero bytes.
struct FileHeader;

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"RLYS";
	const VERSION: u16 = 1;
	const SIZE: usize = 8;

	fn encode() -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes
	}

	/// Returns the payload that follows a valid header.
	fn strip<'a>(path: &Path, data: &'a [u8]) -> Result<&'a [u8], StorageError> {
		if data.len() < Self::SIZE || &data[..4] != Self::MAGIC {
			return Err(StorageError::Backend(format!(
				"{} is not a relayer storage file",
				path.display()
			)));
		}
		let version = u16::from_le_bytes([data[4], data[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version {} in {}",
				version,
				path.display()
			)));
		}
		Ok(&data[Self::SIZE..])
	}
}

pub struct FileStorage {
	base_path: PathBuf,
	/// Distinguishes temporary files of concurrent writes to the same key.
	write_seq: AtomicU64,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_seq: AtomicU64::new(0),
		}
	}

	/// Maps a key to a filesystem-safe path with a `.bin` extension.
	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', '\\', ':'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.file_path(key);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		FileHeader::strip(&path, &data).map(<[u8]>::to_vec)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.file_path(key);
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&FileHeader::encode());
		file_data.extend_from_slice(&value);

		let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
		let temp_path = path.with_extension(format!("{}.tmp", seq));
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		if let Err(e) = fs::rename(&temp_path, &path).await {
			let _ = fs::remove_file(&temp_path).await;
			return Err(StorageError::Backend(e.to_string()));
		}

		tracing::trace!(key, path = %path.display(), "Stored value");
		Ok(())
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(path) if path.trim().is_empty() => {
						Err("storage_path cannot be empty".to_string())
					},
					_ => Ok(()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: directory holding the files (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	tracing::debug!(storage_path, "Using file storage");
	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
