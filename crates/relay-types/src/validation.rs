//! Configuration validation for pluggable implementations.
//!
//! Every storage backend, account and forwarder implementation receives its own
//! raw TOML table. It describes the table it expects with a [`Schema`] and checks
//! it through [`ConfigSchema`] before the implementation is built.

use alloy_primitives::Address;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

impl ValidationError {
	/// Prefixes the offending field with the name of its parent table.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => ValidationError::MissingField(format!("{}.{}", parent, f)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
		}
	}
}

/// The expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// A hex-encoded 20-byte account address.
	Address,
	/// A nested table with its own schema.
	Table(Schema),
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Address => "address string",
			FieldType::Table(_) => "table",
		}
	}

	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = || ValidationError::TypeMismatch {
			field: field.to_string(),
			expected: self.name().to_string(),
			actual: value.type_str().to_string(),
		};

		match self {
			FieldType::String => value.as_str().map(|_| ()).ok_or_else(mismatch),
			FieldType::Boolean => value.as_bool().map(|_| ()).ok_or_else(mismatch),
			FieldType::Integer { min, max } => {
				let int = value.as_integer().ok_or_else(mismatch)?;
				if let Some(min) = min.filter(|min| int < *min) {
					return Err(ValidationError::InvalidValue {
						field: field.to_string(),
						message: format!("Value {} is less than minimum {}", int, min),
					});
				}
				if let Some(max) = max.filter(|max| int > *max) {
					return Err(ValidationError::InvalidValue {
						field: field.to_string(),
						message: format!("Value {} is greater than maximum {}", int, max),
					});
				}
				Ok(())
			},
			FieldType::Address => {
				let text = value.as_str().ok_or_else(mismatch)?;
				text.parse::<Address>()
					.map(|_| ())
					.map_err(|e| ValidationError::InvalidValue {
						field: field.to_string(),
						message: format!("'{}' is not an address: {}", text, e),
					})
			},
			FieldType::Table(schema) => schema.validate(value).map_err(|e| e.nested_in(field)),
		}
	}
}

/// Custom check run after the type check succeeded.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;
		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of one configuration table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Checks that required fields are present and that every present field has
	/// the expected type and passes its validator. Unknown keys are ignored.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

/// A configuration schema that can validate an implementation's TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
