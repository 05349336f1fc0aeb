//! Error types
//!
//! One error enum covers the whole taxonomy. Validation failures carry a per-key report so batch
//! operations can name every offending field at once.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::value::{ConfigValue, ValueKind};

pub type CgResult<T> = std::result::Result<T, Error>;

/// Why a single value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	TypeMismatch,
	OutOfBounds,
	ValidatorRejected,
	NoneNotAllowed,
	InvalidKey,
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			FailureKind::TypeMismatch => "type mismatch",
			FailureKind::OutOfBounds => "out of bounds",
			FailureKind::ValidatorRejected => "rejected by validator",
			FailureKind::NoneNotAllowed => "null not allowed",
			FailureKind::InvalidKey => "invalid key",
		})
	}
}

/// Failure report for one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
	pub kind: FailureKind,
	pub message: String,
}

/// Aggregated validation failures, keyed by canonical parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
	errors: BTreeMap<String, FieldError>,
	key: Option<String>,
	value: Option<ConfigValue>,
}

impl ValidationErrors {
	pub fn new() -> Self {
		Self::default()
	}

	/// Report with a single failing key
	pub fn single(key: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
		let mut errors = Self::new();
		errors.add(key, kind, message);
		errors
	}

	pub fn add(&mut self, key: impl Into<String>, kind: FailureKind, message: impl Into<String>) {
		self.errors.insert(key.into(), FieldError { kind, message: message.into() });
	}

	/// Merge another report into this one
	pub fn extend(&mut self, other: ValidationErrors) {
		self.errors.extend(other.errors);
	}

	/// Attach the offending key and value for diagnostics
	pub fn with_subject(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
		self.key = Some(key.into());
		self.value = Some(value);
		self
	}

	/// Prefix every message with the operation that failed, as in `[update] ...`
	pub fn with_context(mut self, context: &str) -> Self {
		for err in self.errors.values_mut() {
			err.message = format!("[{}] {}", context, err.message);
		}
		self
	}

	pub fn errors(&self) -> &BTreeMap<String, FieldError> {
		&self.errors
	}

	pub fn get(&self, key: &str) -> Option<&FieldError> {
		self.errors.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.errors.contains_key(key)
	}

	pub fn key(&self) -> Option<&str> {
		self.key.as_deref()
	}

	pub fn value(&self) -> Option<&ConfigValue> {
		self.value.as_ref()
	}

	pub fn len(&self) -> usize {
		self.errors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.errors.is_empty()
	}

	/// `Err` if anything was collected
	pub fn into_result(self) -> CgResult<()> {
		if self.is_empty() { Ok(()) } else { Err(Error::Validation(self)) }
	}
}

impl fmt::Display for ValidationErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for (key, err) in &self.errors {
			if !first {
				f.write_str("; ")?;
			}
			first = false;
			write!(f, "{}: {}", key, err.message)?;
		}
		if let (Some(key), Some(value)) = (&self.key, &self.value) {
			write!(f, " (key: {}, value: {})", key, value)?;
		}
		Ok(())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unknown configuration parameter: {name}")]
	ParameterNotFound { name: String },

	#[error("parameter already registered: {name}")]
	DuplicateParameter { name: String },

	#[error("validation failed: {0}")]
	Validation(ValidationErrors),

	#[error("setting '{name}' requires a reason")]
	ReasonRequired { name: String },

	#[error("cannot change type of '{name}' from {from} to {to}")]
	TypeDrift { name: String, from: ValueKind, to: ValueKind },

	#[error("configuration is locked")]
	Locked,

	#[error("{operation} bypass requires ALLOW_CONFIG_BYPASS=1")]
	BypassDenied { operation: &'static str },

	#[error("configuration has been torn down")]
	TornDown,

	#[error("persistence adapter contract violated: {0}")]
	AdapterContract(String),

	#[error("invalid parameter spec '{name}': {reason}")]
	InvalidParamSpec { name: String, reason: String },

	#[error("invalid setting {name}: {reason}")]
	InvalidSetting { name: String, reason: String },

	#[error("post-update hook #{index} failed: {message}")]
	Hook { index: usize, message: String },

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(String),
}

impl Error {
	/// Per-key report of a validation failure
	pub fn validation_errors(&self) -> Option<&ValidationErrors> {
		match self {
			Error::Validation(errors) => Some(errors),
			_ => None,
		}
	}
}

impl From<ValidationErrors> for Error {
	fn from(errors: ValidationErrors) -> Self {
		Error::Validation(errors)
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}


// vim: ts=4
