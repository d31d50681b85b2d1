//! Multi-file configuration loading.
//!
//! Included files may include further files. All files are merged into one
//! TOML document; a top-level section defined twice is an error, as is loading
//! the same file twice.

use crate::{resolve_env_vars, ConfigError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

pub struct ConfigLoader {
	/// Directory relative include paths are resolved against.
	base_path: PathBuf,
	loaded_files: HashSet<PathBuf>,
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads `config_path` and everything it includes, transitively, into a
	/// single document.
	pub async fn load(mut self, config_path: impl AsRef<Path>) -> Result<toml::Value, ConfigError> {
		let mut combined = toml::Table::new();
		let mut pending = VecDeque::from([self.resolve_path(config_path.as_ref())?]);

		while let Some(path) = pending.pop_front() {
			let mut document = self.load_file(&path).await?;

			for include in extract_includes(&mut document)? {
				pending.push_back(self.resolve_path(&include)?);
			}

			for (section, value) in document {
				if let Some(existing) = self.section_sources.get(&section) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}. \
						Each top-level section must be unique across all configuration files.",
						section,
						existing.display(),
						path.display()
					)));
				}
				self.section_sources.insert(section.clone(), path.clone());
				combined.insert(section, value);
			}
		}

		tracing::debug!(files = self.loaded_files.len(), "Loaded configuration");
		Ok(toml::Value::Table(combined))
	}

	/// Reads, resolves environment variables in and parses one file.
	async fn load_file(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(&canonical).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	fn resolve_path(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Removes the `include` key and returns the paths it listed.
fn extract_includes(document: &mut toml::Table) -> Result<Vec<PathBuf>, ConfigError> {
	match document.remove("include") {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(ConfigError::Validation(
					"Include array must contain only strings".into(),
				)),
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
