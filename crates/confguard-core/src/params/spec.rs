//! Parameter spec: the immutable contract of one configuration parameter

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::canonical_name;
use crate::prelude::*;

/// Custom validator: `Ok(false)` rejects, `Err(message)` rejects with the message preserved
pub type ParamValidator = Arc<dyn Fn(&ConfigValue) -> Result<bool, String> + Send + Sync>;

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Inclusive `[low, high]` range
///
/// Numeric values are compared directly, sized values (string, list, map) by length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
	pub low: f64,
	pub high: f64,
}

impl Bounds {
	pub fn new(low: impl Into<f64>, high: impl Into<f64>) -> Self {
		Self { low: low.into(), high: high.into() }
	}

	pub fn contains(&self, x: f64) -> bool {
		self.low <= x && x <= self.high
	}

	/// Exact check for integers, without rounding them through f64
	pub fn contains_int(&self, n: i64) -> bool {
		let above_low = if self.low.is_nan() || self.low >= TWO_POW_63 {
			false
		} else if self.low <= -TWO_POW_63 {
			true
		} else {
			n >= self.low.ceil() as i64
		};
		let below_high = if self.high.is_nan() || self.high < -TWO_POW_63 {
			false
		} else if self.high >= TWO_POW_63 {
			true
		} else {
			n <= self.high.floor() as i64
		};
		above_low && below_high
	}
}

impl fmt::Display for Bounds {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}, {}]", self.low, self.high)
	}
}

#[derive(Clone)]
pub struct ParamSpec {
	name: Box<str>,
	default: ConfigValue,
	value_types: Box<[ValueKind]>,
	bounds: Option<Bounds>,
	validator: Option<ParamValidator>,
	description: Option<Box<str>>,
	allow_none: bool,
	require_reason: bool,
}

impl fmt::Debug for ParamSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ParamSpec")
			.field("name", &self.name)
			.field("default", &self.default)
			.field("value_types", &self.value_types)
			.field("bounds", &self.bounds)
			.field("validator", &self.validator.is_some())
			.field("description", &self.description)
			.field("allow_none", &self.allow_none)
			.field("require_reason", &self.require_reason)
			.finish()
	}
}

impl ParamSpec {
	/// Create a builder for constructing a ParamSpec
	pub fn builder(name: impl Into<String>) -> ParamSpecBuilder {
		ParamSpecBuilder::new(name)
	}

	/// Canonical (trimmed, uppercase) name
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn default_value(&self) -> &ConfigValue {
		&self.default
	}

	pub fn value_types(&self) -> &[ValueKind] {
		&self.value_types
	}

	pub fn accepts_kind(&self, kind: ValueKind) -> bool {
		self.value_types.contains(&kind)
	}

	pub fn bounds(&self) -> Option<Bounds> {
		self.bounds
	}

	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	pub fn allow_none(&self) -> bool {
		self.allow_none
	}

	pub fn require_reason(&self) -> bool {
		self.require_reason
	}

	/// Check a value against the full contract
	///
	/// Rules run in order (null, type, bounds, custom validator) and the first failing rule
	/// decides the report.
	pub fn validate(&self, value: &ConfigValue) -> CgResult<()> {
		if value.is_null() {
			if self.allow_none {
				return Ok(());
			}
			return Err(self.reject(FailureKind::NoneNotAllowed, "None value not allowed."));
		}

		if !self.accepts_kind(value.kind()) {
			return Err(self.reject(
				FailureKind::TypeMismatch,
				format!(
					"Expected value_type {}, got {}.",
					kinds_to_string(&self.value_types),
					value.type_name()
				),
			));
		}

		if !value.is_finite() {
			return Err(self.reject(
				FailureKind::TypeMismatch,
				format!("Expected a finite number, got {:?}.", value),
			));
		}

		if let Some(bounds) = self.bounds {
			if !bounds_hold(bounds, value) {
				return Err(self.reject(
					FailureKind::OutOfBounds,
					format!("Value {} out of bounds {}.", value, bounds),
				));
			}
		}

		if let Some(validator) = &self.validator {
			match validator(value) {
				Ok(true) => {}
				Ok(false) => {
					return Err(self.reject(
						FailureKind::ValidatorRejected,
						"Custom validator returned False.",
					));
				}
				Err(msg) => {
					return Err(self.reject(
						FailureKind::ValidatorRejected,
						format!("Custom validator raised exception: {}", msg),
					));
				}
			}
		}

		Ok(())
	}

	/// Serializable summary for diagnostics
	pub fn describe(&self) -> ParamDescriptor {
		ParamDescriptor {
			name: self.name.to_string(),
			default: self.default.clone(),
			value_types: self.value_types.to_vec(),
			bounds: self.bounds,
			description: self.description.as_deref().map(ToString::to_string),
			allow_none: self.allow_none,
			require_reason: self.require_reason,
			has_validator: self.validator.is_some(),
		}
	}

	fn reject(&self, kind: FailureKind, message: impl Into<String>) -> Error {
		Error::Validation(ValidationErrors::single(&*self.name, kind, message))
	}
}

/// Numeric values are range-checked, sized values length-checked, anything else passes
pub(crate) fn bounds_hold(bounds: Bounds, value: &ConfigValue) -> bool {
	if let Some(n) = value.as_int() {
		return bounds.contains_int(n);
	}
	if let Some(x) = value.as_f64() {
		return bounds.contains(x);
	}
	if let Some(len) = value.len() {
		return i64::try_from(len).is_ok_and(|n| bounds.contains_int(n));
	}
	true
}

fn kinds_to_string(kinds: &[ValueKind]) -> String {
	let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
	if names.len() == 1 { names[0].to_string() } else { format!("({})", names.join(", ")) }
}

/// Diagnostic view of a spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDescriptor {
	pub name: String,
	pub default: ConfigValue,
	pub value_types: Vec<ValueKind>,
	pub bounds: Option<Bounds>,
	pub description: Option<String>,
	pub allow_none: bool,
	pub require_reason: bool,
	pub has_validator: bool,
}

/// Builder for ParamSpec with fluent API
pub struct ParamSpecBuilder {
	name: String,
	default: ConfigValue,
	value_types: Option<Vec<ValueKind>>,
	bounds: Option<Bounds>,
	range: Option<Bounds>,
	length: Option<(usize, usize)>,
	validator: Option<ParamValidator>,
	description: Option<String>,
	allow_none: bool,
	require_reason: bool,
}

impl ParamSpecBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			default: ConfigValue::Null,
			value_types: None,
			bounds: None,
			range: None,
			length: None,
			validator: None,
			description: None,
			allow_none: true,
			require_reason: false,
		}
	}

	/// Set the default value (null if not set)
	pub fn default(mut self, value: impl Into<ConfigValue>) -> Self {
		self.default = value.into();
		self
	}

	/// Accept a single kind
	pub fn value_type(mut self, kind: ValueKind) -> Self {
		self.value_types = Some(vec![kind]);
		self
	}

	/// Accept any of several kinds
	pub fn value_types(mut self, kinds: impl IntoIterator<Item = ValueKind>) -> Self {
		self.value_types = Some(kinds.into_iter().collect());
		self
	}

	/// Generic bounds, interpreted by the kind of each value
	pub fn bounds(mut self, low: impl Into<f64>, high: impl Into<f64>) -> Self {
		self.bounds = Some(Bounds::new(low, high));
		self
	}

	/// Numeric range, only valid for int/float parameters
	pub fn range(mut self, min: impl Into<f64>, max: impl Into<f64>) -> Self {
		self.range = Some(Bounds::new(min, max));
		self
	}

	/// Length range, only valid for string/list/map parameters
	pub fn length(mut self, min: usize, max: usize) -> Self {
		self.length = Some((min, max));
		self
	}

	/// Set a predicate validator
	pub fn validator<F>(mut self, f: F) -> Self
	where
		F: Fn(&ConfigValue) -> bool + Send + Sync + 'static,
	{
		self.validator = Some(Arc::new(move |v| Ok(f(v))));
		self
	}

	/// Set a fallible validator; its error message ends up in the validation report
	pub fn try_validator<F, E>(mut self, f: F) -> Self
	where
		F: Fn(&ConfigValue) -> Result<(), E> + Send + Sync + 'static,
		E: fmt::Display,
	{
		self.validator = Some(Arc::new(move |v| f(v).map(|()| true).map_err(|e| e.to_string())));
		self
	}

	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	/// Whether null is accepted (defaults to true)
	pub fn allow_none(mut self, allow: bool) -> Self {
		self.allow_none = allow;
		self
	}

	/// Require a justification with every write
	pub fn require_reason(mut self, require: bool) -> Self {
		self.require_reason = require;
		self
	}

	/// Build the ParamSpec
	pub fn build(self) -> CgResult<ParamSpec> {
		let name = canonical_name(&self.name);
		let invalid = |reason: &str| Error::InvalidParamSpec {
			name: self.name.clone(),
			reason: reason.to_string(),
		};

		if name.is_empty() {
			return Err(invalid("name must not be empty"));
		}

		let value_types = match self.value_types {
			Some(kinds) if kinds.is_empty() => {
				return Err(invalid("value_types must not be empty"));
			}
			Some(kinds) => kinds,
			None if self.default.is_null() => ValueKind::NON_NULL.to_vec(),
			None => vec![self.default.kind()],
		};

		let bounds = match (self.bounds, self.range, self.length) {
			(Some(_), Some(_), _) => return Err(invalid("cannot specify both bounds and min/max")),
			(Some(_), _, Some(_)) => {
				return Err(invalid("cannot specify both bounds and min_length/max_length"));
			}
			(_, Some(_), Some(_)) => {
				return Err(invalid("cannot specify both min/max and min_length/max_length"));
			}
			(_, Some(range), None) => {
				if !value_types.iter().all(|k| k.is_numeric()) {
					return Err(invalid("min/max can only be used with int or float types"));
				}
				Some(range)
			}
			(_, None, Some((min, max))) => {
				if !value_types.iter().all(|k| k.is_sized()) {
					return Err(invalid(
						"min_length/max_length can only be used with string, list or map types",
					));
				}
				Some(Bounds::new(min as f64, max as f64))
			}
			(bounds, None, None) => bounds,
		};

		if let Some(b) = bounds {
			if b.low.is_nan() || b.high.is_nan() {
				return Err(invalid("bounds must be numbers"));
			}
			if b.low > b.high {
				return Err(invalid("lower bound exceeds upper bound"));
			}
		}

		Ok(ParamSpec {
			name: name.into(),
			default: self.default,
			value_types: value_types.into(),
			bounds,
			validator: self.validator,
			description: self.description.map(Into::into),
			allow_none: self.allow_none,
			require_reason: self.require_reason,
		})
	}
}


// vim: ts=4
