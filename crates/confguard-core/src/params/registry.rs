//! Parameter registry: canonical names, aliases and name resolution

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock};

use super::{ParamDescriptor, ParamSpec, canonical_name};
use crate::prelude::*;

const RESOLVE_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(1024) {
	Some(n) => n,
	None => NonZeroUsize::MIN,
};

static GLOBAL: LazyLock<Arc<ParamRegistry>> = LazyLock::new(|| Arc::new(ParamRegistry::new()));

#[derive(Default)]
struct RegistryInner {
	specs: HashMap<Box<str>, Arc<ParamSpec>>,
	aliases: HashMap<Box<str>, Box<str>>,
}

/// Thread-safe map of canonical names to specs plus an alias table
///
/// Resolved names are memoized in an LRU cache. The cache is cleared while the write lock is
/// held, and filled while a read lock is held, so it never outlives the state it was derived from.
pub struct ParamRegistry {
	inner: RwLock<RegistryInner>,
	resolved: Mutex<LruCache<Box<str>, Box<str>>>,
}

impl std::fmt::Debug for ParamRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.read();
		f.debug_struct("ParamRegistry")
			.field("specs", &inner.specs.len())
			.field("aliases", &inner.aliases.len())
			.finish()
	}
}

impl Default for ParamRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Bounded summary of the registry for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryState {
	pub specs_count: usize,
	pub aliases_count: usize,
	pub specs_sample: Vec<String>,
	pub aliases_sample: Vec<(String, String)>,
}

impl ParamRegistry {
	pub fn new() -> Self {
		Self {
			inner: RwLock::new(RegistryInner::default()),
			resolved: Mutex::new(LruCache::new(RESOLVE_CACHE_SIZE)),
		}
	}

	/// Process-wide default registry
	pub fn global() -> Arc<ParamRegistry> {
		Arc::clone(&GLOBAL)
	}

	/// Register a spec under its canonical name plus optional aliases
	///
	/// Fails with `DuplicateParameter` if the name is taken, or with a validation error if an
	/// alias already points elsewhere, unless `override_existing` is set. Nothing is changed on
	/// failure.
	pub fn register<I, A>(
		&self,
		spec: ParamSpec,
		aliases: I,
		override_existing: bool,
	) -> CgResult<()>
	where
		I: IntoIterator<Item = A>,
		A: AsRef<str>,
	{
		let name: Box<str> = spec.name().into();
		let aliases: Vec<Box<str>> = aliases
			.into_iter()
			.map(|a| canonical_name(a.as_ref()))
			.filter(|a| !a.is_empty() && a.as_str() != &*name)
			.map(Into::into)
			.collect();

		let mut inner = self.inner.write();

		if !override_existing {
			if inner.specs.contains_key(&name) {
				return Err(Error::DuplicateParameter { name: name.to_string() });
			}
			for alias in &aliases {
				let owner = inner
					.aliases
					.get(alias)
					.filter(|owner| **owner != name)
					.or_else(|| inner.specs.get_key_value(alias).map(|(k, _)| k));
				if let Some(owner) = owner {
					return Err(ValidationErrors::single(
						&**alias,
						FailureKind::InvalidKey,
						format!("Alias already used for {}.", owner),
					)
					.into());
				}
			}
		}

		debug!("Registering parameter: {}", name);
		inner.specs.insert(name.clone(), Arc::new(spec));
		for alias in aliases {
			inner.aliases.insert(alias, name.clone());
		}
		self.resolved.lock().clear();
		Ok(())
	}

	/// Register several specs in order, stopping at the first failure
	pub fn register_all<'a, I>(&self, entries: I, override_existing: bool) -> CgResult<()>
	where
		I: IntoIterator<Item = (ParamSpec, &'a [&'a str])>,
	{
		for (spec, aliases) in entries {
			self.register(spec, aliases.iter(), override_existing)?;
		}
		Ok(())
	}

	/// Resolve a key or alias to its canonical name
	pub fn resolve<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<Box<str>> {
		let Some(text) = key.key_text() else {
			return Err(ValidationErrors::single(
				key.key_label(),
				FailureKind::InvalidKey,
				"Key must carry a string value.",
			)
			.into());
		};
		let lookup = canonical_name(text);

		if let Some(name) = self.resolved.lock().get(lookup.as_str()) {
			return Ok(name.clone());
		}

		let inner = self.inner.read();
		let name = if inner.specs.contains_key(lookup.as_str()) {
			Some(Box::<str>::from(lookup.as_str()))
		} else {
			inner.aliases.get(lookup.as_str()).cloned()
		};
		match name {
			Some(name) => {
				self.resolved.lock().put(lookup.into(), name.clone());
				Ok(name)
			}
			None => Err(Error::ParameterNotFound { name: lookup }),
		}
	}

	/// Spec for a key or alias
	pub fn get<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<Arc<ParamSpec>> {
		self.resolve_and_get(key).map(|(_, spec)| spec)
	}

	/// Resolve and fetch in one step
	pub fn resolve_and_get<K: ParamKey + ?Sized>(
		&self,
		key: &K,
	) -> CgResult<(Box<str>, Arc<ParamSpec>)> {
		let name = self.resolve(key)?;
		let spec = self.inner.read().specs.get(&name).cloned();
		match spec {
			Some(spec) => Ok((name, spec)),
			None => Err(Error::ParameterNotFound { name: name.to_string() }),
		}
	}

	/// Sorted canonical names
	pub fn all_names(&self) -> Vec<String> {
		let mut names: Vec<String> =
			self.inner.read().specs.keys().map(ToString::to_string).collect();
		names.sort();
		names
	}

	/// Whether a key or alias resolves
	pub fn has<K: ParamKey + ?Sized>(&self, key: &K) -> bool {
		self.resolve(key).is_ok()
	}

	/// Descriptors of all specs, sorted by name
	pub fn specs(&self) -> Vec<ParamDescriptor> {
		let inner = self.inner.read();
		let mut specs: Vec<ParamDescriptor> = inner.specs.values().map(|s| s.describe()).collect();
		specs.sort_by(|a, b| a.name.cmp(&b.name));
		specs
	}

	pub fn len(&self) -> usize {
		self.inner.read().specs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.read().specs.is_empty()
	}

	/// Remove every spec and alias
	pub fn clear(&self) {
		let mut inner = self.inner.write();
		inner.specs.clear();
		inner.aliases.clear();
		self.resolved.lock().clear();
		debug!("Parameter registry cleared");
	}

	pub fn dump_state(&self, max_items: usize) -> RegistryState {
		let inner = self.inner.read();
		let mut specs: Vec<String> = inner.specs.keys().map(ToString::to_string).collect();
		specs.sort();
		specs.truncate(max_items);
		let mut aliases: Vec<(String, String)> =
			inner.aliases.iter().map(|(a, n)| (a.to_string(), n.to_string())).collect();
		aliases.sort();
		aliases.truncate(max_items);

		RegistryState {
			specs_count: inner.specs.len(),
			aliases_count: inner.aliases.len(),
			specs_sample: specs,
			aliases_sample: aliases,
		}
	}
}


// vim: ts=4
