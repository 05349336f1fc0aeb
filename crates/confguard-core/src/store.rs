//! Two-layer value store
//!
//! The permanent layer holds the configuration proper. The one-time layer holds overrides that
//! are served by exactly one read and then discarded.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use confguard_types::persistence_adapter::{PersistenceAdapter, expect_mapping};
use confguard_types::value::ValueMap;

use crate::history::{AuditSink, HistoryEntry};
use crate::params::{ParamRegistry, spec::bounds_hold};
use crate::prelude::*;
use crate::validation::ConfigValidator;

const SYSTEM_ACTOR: &str = "system";

/// Read-only view of the permanent layer
///
/// Cheap to clone; holds its own copy, so later store changes are not visible through it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
	values: Arc<ValueMap>,
}

impl ConfigSnapshot {
	pub fn new(values: ValueMap) -> Self {
		Self { values: Arc::new(values) }
	}

	pub fn get(&self, name: &str) -> Option<&ConfigValue> {
		self.values.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.values.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.values.keys().map(|k| &**k)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
		self.values.iter().map(|(k, v)| (&**k, v))
	}

	/// Owned copy of the entries
	pub fn to_map(&self) -> ValueMap {
		(*self.values).clone()
	}
}

/// A write that passed every store-level check and only needs committing
#[derive(Debug, Clone)]
pub struct PreparedWrite {
	name: Box<str>,
	value: ConfigValue,
	permanent: bool,
}

impl PreparedWrite {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn value(&self) -> &ConfigValue {
		&self.value
	}
}

pub struct ConfigStore {
	registry: Arc<ParamRegistry>,
	permanent: ValueMap,
	ephemeral: HashMap<Box<str>, ConfigValue>,
	adapter: Option<Box<dyn PersistenceAdapter>>,
	audit: Vec<Arc<dyn AuditSink>>,
	allow_type_drift: bool,
}

impl std::fmt::Debug for ConfigStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConfigStore")
			.field("permanent", &self.permanent.len())
			.field("ephemeral", &self.ephemeral.len())
			.field("adapter", &self.adapter)
			.field("allow_type_drift", &self.allow_type_drift)
			.finish()
	}
}

impl ConfigStore {
	pub fn new(registry: Arc<ParamRegistry>) -> Self {
		Self {
			registry,
			permanent: ValueMap::new(),
			ephemeral: HashMap::new(),
			adapter: None,
			audit: Vec::new(),
			allow_type_drift: false,
		}
	}

	pub fn with_adapter(mut self, adapter: Box<dyn PersistenceAdapter>) -> Self {
		self.adapter = Some(adapter);
		self
	}

	/// Add an audit sink; every sink sees every change
	pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
		self.audit.push(audit);
		self
	}

	pub fn allow_type_drift(mut self, allow: bool) -> Self {
		self.allow_type_drift = allow;
		self
	}

	pub fn has_adapter(&self) -> bool {
		self.adapter.is_some()
	}

	/// Run every store-level check for one write without touching either layer
	///
	/// Checks in order: name resolution, required reason, type stability, numeric bounds and the
	/// full spec contract.
	pub fn prepare<K: ParamKey + ?Sized>(
		&self,
		key: &K,
		value: ConfigValue,
		permanent: bool,
		reason: Option<&str>,
	) -> CgResult<PreparedWrite> {
		let (name, spec) = self.registry.resolve_and_get(key)?;

		if spec.require_reason() && reason.map(str::trim).is_none_or(str::is_empty) {
			return Err(Error::ReasonRequired { name: name.to_string() });
		}

		if !self.allow_type_drift && !value.is_null() {
			if let Some(current) = self.permanent.get(&name).filter(|c| !c.is_null()) {
				let kind = value.kind();
				if kind != current.kind() && !spec.accepts_kind(kind) {
					return Err(Error::TypeDrift {
						name: name.to_string(),
						from: current.kind(),
						to: kind,
					});
				}
			}
		}

		if let Some(bounds) = spec.bounds() {
			if value.as_f64().is_some() && !bounds_hold(bounds, &value) {
				return Err(ValidationErrors::single(
					&*name,
					FailureKind::OutOfBounds,
					format!("Value {} out of bounds {}.", value, bounds),
				)
				.with_subject(&*name, value)
				.into());
			}
		}

		spec.validate(&value).map_err(|err| match err {
			Error::Validation(errors) => {
				Error::Validation(errors.with_subject(&*name, value.clone()))
			}
			other => other,
		})?;

		Ok(PreparedWrite { name, value, permanent })
	}

	/// Apply prepared writes and record them as one audit entry per layer
	pub fn commit(&mut self, writes: Vec<PreparedWrite>, reason: Option<&str>, modified_by: &str) {
		let (permanent, ephemeral): (Vec<_>, Vec<_>) = writes.into_iter().partition(|w| w.permanent);

		if !permanent.is_empty() {
			let keys: Vec<Box<str>> = permanent.iter().map(|w| w.name.clone()).collect();
			let before = self.capture(&keys, false);
			for write in permanent {
				self.permanent.insert(write.name, write.value);
			}
			self.record(keys, before, reason, modified_by, false);
		}

		if !ephemeral.is_empty() {
			let keys: Vec<Box<str>> = ephemeral.iter().map(|w| w.name.clone()).collect();
			let before = self.capture(&keys, true);
			for write in ephemeral {
				self.ephemeral.insert(write.name, write.value);
			}
			self.record(keys, before, reason, modified_by, true);
		}
	}

	/// Validate and commit a single write
	pub fn set<K: ParamKey + ?Sized>(
		&mut self,
		key: &K,
		value: impl Into<ConfigValue>,
		permanent: bool,
		reason: Option<&str>,
		modified_by: &str,
	) -> CgResult<()> {
		let write = self.prepare(key, value.into(), permanent, reason)?;
		debug!("Setting {} (permanent: {})", write.name, permanent);
		self.commit(vec![write], reason, modified_by);
		Ok(())
	}

	/// Read a value, consuming a pending one-time override if there is one
	pub fn get<K: ParamKey + ?Sized>(&mut self, key: &K) -> CgResult<Option<ConfigValue>> {
		let name = self.registry.resolve(key)?;
		if let Some(value) = self.ephemeral.remove(&name) {
			debug!("Served one-time value for {}", name);
			return Ok(Some(value));
		}
		Ok(self.permanent.get(&name).cloned())
	}

	/// Whether the permanent layer holds the key
	pub fn contains<K: ParamKey + ?Sized>(&self, key: &K) -> bool {
		self.registry.resolve(key).is_ok_and(|name| self.permanent.contains_key(&name))
	}

	/// Whether a one-time override is pending for the key
	pub fn has_pending<K: ParamKey + ?Sized>(&self, key: &K) -> bool {
		self.registry.resolve(key).is_ok_and(|name| self.ephemeral.contains_key(&name))
	}

	pub fn len(&self) -> usize {
		self.permanent.len()
	}

	pub fn is_empty(&self) -> bool {
		self.permanent.is_empty()
	}

	/// Sorted names in the permanent layer
	pub fn keys(&self) -> Vec<String> {
		self.permanent.keys().map(ToString::to_string).collect()
	}

	/// Full copy of the permanent layer
	pub fn snapshot_internal(&self) -> ValueMap {
		self.permanent.clone()
	}

	pub fn snapshot_public(&self) -> ConfigSnapshot {
		ConfigSnapshot::new(self.permanent.clone())
	}

	/// Registered defaults for every known parameter
	pub fn defaults(&self) -> ValueMap {
		self.registry.specs().into_iter().map(|d| (d.name.into_boxed_str(), d.default)).collect()
	}

	/// Replace the permanent layer wholesale and drop pending one-time values
	pub fn restore(&mut self, values: ValueMap, reason: Option<&str>, modified_by: &str) {
		let mut keys: Vec<Box<str>> = self.permanent.keys().cloned().collect();
		keys.extend(values.keys().filter(|k| !self.permanent.contains_key(*k)).cloned());
		let before = self.capture(&keys, false);
		self.permanent = values;
		self.ephemeral.clear();
		self.record(keys, before, reason, modified_by, false);
	}

	/// Empty both layers
	pub fn clear(&mut self) {
		let keys: Vec<Box<str>> = self.permanent.keys().cloned().collect();
		let before = self.capture(&keys, false);
		self.permanent.clear();
		self.ephemeral.clear();
		self.record(keys, before, None, SYSTEM_ACTOR, false);
	}

	/// Persist the permanent layer through the adapter
	pub fn save(&self) -> CgResult<()> {
		let adapter = self.adapter.as_ref().ok_or_else(no_adapter)?;
		adapter.save(&self.permanent)?;
		info!("Saved {} configuration values", self.permanent.len());
		Ok(())
	}

	/// Fetch the adapter document with names resolved to their canonical form
	///
	/// With `validate` set, every entry must satisfy its spec; failures are aggregated.
	pub fn load_document(&self, validate: bool) -> CgResult<ValueMap> {
		let adapter = self.adapter.as_ref().ok_or_else(no_adapter)?;
		let document = expect_mapping(adapter.load()?)?;

		if validate {
			ConfigValidator::new(Arc::clone(&self.registry))
				.validate_mapping(document.iter().map(|(k, v)| (&**k, v)))?;
		}

		let mut resolved = ValueMap::new();
		for (key, value) in document {
			let name = self.registry.resolve(&*key)?;
			resolved.insert(name, value);
		}
		Ok(resolved)
	}

	/// Replace the permanent layer with the defaults overlaid by the adapter document
	pub fn load(&mut self, validate: bool) -> CgResult<()> {
		let document = self.load_document(validate)?;
		let count = document.len();
		let mut values = self.defaults();
		values.extend(document);
		self.restore(values, Some("load"), SYSTEM_ACTOR);
		info!("Loaded {} configuration values", count);
		Ok(())
	}

	fn capture(&self, keys: &[Box<str>], ephemeral: bool) -> BTreeMap<String, ConfigValue> {
		if self.audit.is_empty() {
			return BTreeMap::new();
		}
		let layer = |name: &str| {
			if ephemeral { self.ephemeral.get(name) } else { self.permanent.get(name) }
		};
		keys.iter()
			.filter_map(|k| layer(&**k).map(|v| (k.to_string(), v.clone())))
			.collect()
	}

	fn record(
		&self,
		keys: Vec<Box<str>>,
		before: BTreeMap<String, ConfigValue>,
		reason: Option<&str>,
		modified_by: &str,
		ephemeral: bool,
	) {
		if self.audit.is_empty() {
			return;
		}
		let after = self.capture(&keys, ephemeral);
		let entry = HistoryEntry {
			timestamp: Utc::now(),
			modified_by: modified_by.to_string(),
			reason: reason.map(ToString::to_string),
			ephemeral,
			keys: keys.iter().map(ToString::to_string).collect(),
			before,
			after,
		};
		for sink in &self.audit {
			if let Err(err) = sink.record(entry.clone()) {
				warn!("Audit sink failed to record change: {}", err);
			}
		}
	}
}

fn no_adapter() -> Error {
	Error::AdapterContract("no persistence adapter configured".into())
}


// vim: ts=4
