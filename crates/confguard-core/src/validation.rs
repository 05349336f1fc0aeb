//! Registry-backed validation of single values and whole mappings

use std::sync::Arc;

use crate::params::ParamRegistry;
use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct ConfigValidator {
	registry: Arc<ParamRegistry>,
}

impl ConfigValidator {
	pub fn new(registry: Arc<ParamRegistry>) -> Self {
		Self { registry }
	}

	pub fn registry(&self) -> &Arc<ParamRegistry> {
		&self.registry
	}

	/// Validate one value against the ParamSpec its key resolves to
	///
	/// Unknown keys fail with `ParameterNotFound`. Rule failures are reported under the canonical
	/// name with the offending key and value attached.
	pub fn validate_value<K: ParamKey + ?Sized>(&self, key: &K, value: &ConfigValue) -> CgResult<()> {
		let (name, spec) = self.registry.resolve_and_get(key)?;
		spec.validate(value).map_err(|err| match err {
			Error::Validation(errors) => {
				Error::Validation(errors.with_subject(&*name, value.clone()))
			}
			other => other,
		})
	}

	/// Validate every entry, collecting all failures into one report
	///
	/// Unknown names are collected too (as `InvalidKey` entries), so a single call names every
	/// offending field.
	pub fn validate_mapping<'a, K, I>(&self, entries: I) -> CgResult<()>
	where
		K: ParamKey + ?Sized + 'a,
		I: IntoIterator<Item = (&'a K, &'a ConfigValue)>,
	{
		let mut report = ValidationErrors::new();
		for (key, value) in entries {
			match self.validate_value(key, value) {
				Ok(()) => {}
				Err(Error::Validation(errors)) => report.extend(errors),
				Err(Error::ParameterNotFound { name }) => {
					report.add(name, FailureKind::InvalidKey, "Unknown configuration parameter.");
				}
				Err(other) => return Err(other),
			}
		}
		report.into_result()
	}
}


// vim: ts=4
