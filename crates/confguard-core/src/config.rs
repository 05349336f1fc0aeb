//! AppConfig: the guarded configuration façade
//!
//! Every mutation runs the same pipeline: lock gate, name resolution, aggregated validation,
//! store commit, integrity reseal, then post-update hooks. All state sits behind one reentrant
//! lock, so a hook may read the configuration from inside `update`.

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use serde::Serialize;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use confguard_types::persistence_adapter::PersistenceAdapter;
use confguard_types::value::ValueMap;

use crate::history::{AuditSink, ConfigHistory, HistoryEntry};
use crate::hooks::{HookBus, HookError};
use crate::integrity::IntegrityGuard;
use crate::lock::LockGuard;
use crate::params::{ParamRegistry, ParamSpec};
use crate::prelude::*;
use crate::settings::{GuardEnvironment, GuardSettings, ProcessEnvironment};
use crate::store::{ConfigSnapshot, ConfigStore};
use crate::validation::ConfigValidator;

const UNKNOWN_ACTOR: &str = "unknown";
const SYSTEM_ACTOR: &str = "system";
const REDACTED: &str = "***REDACTED***";
const SECRET_MARKERS: [&str; 6] = ["secret", "password", "token", "key", "passwd", "api_key"];

/// Render a value for logs, hiding it if the name looks like it holds a secret
pub fn redact_for_log(name: &str, value: &ConfigValue) -> String {
	let lower = name.to_lowercase();
	if SECRET_MARKERS.iter().any(|m| lower.contains(m)) {
		REDACTED.to_string()
	} else {
		value.to_string()
	}
}

/// A batch of key/value changes
#[derive(Debug, Clone, Default)]
pub struct Changes {
	entries: Vec<(OwnedParamKey, ConfigValue)>,
}

impl Changes {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set<K: ParamKey + ?Sized>(mut self, key: &K, value: impl Into<ConfigValue>) -> Self {
		self.entries.push((OwnedParamKey::of(key), value.into()));
		self
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&OwnedParamKey, &ConfigValue)> {
		self.entries.iter().map(|(k, v)| (k, v))
	}
}

impl<K, V> FromIterator<(K, V)> for Changes
where
	K: Into<OwnedParamKey>,
	V: Into<ConfigValue>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
	}
}

impl From<ConfigSnapshot> for Changes {
	fn from(snapshot: ConfigSnapshot) -> Self {
		snapshot.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}
}

impl From<ValueMap> for Changes {
	fn from(values: ValueMap) -> Self {
		values.into_iter().map(|(k, v)| (String::from(k), v)).collect()
	}
}

/// How a change is made and who makes it
#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
	pub bypass: bool,
	pub reason: Option<String>,
	pub modified_by: Option<String>,
}

impl ChangeOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Ignore the configuration lock, needs bypass authorization
	pub fn bypass(mut self) -> Self {
		self.bypass = true;
		self
	}

	pub fn reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}

	pub fn modified_by(mut self, actor: impl Into<String>) -> Self {
		self.modified_by = Some(actor.into());
		self
	}

	fn actor(&self) -> &str {
		self.modified_by.as_deref().unwrap_or(UNKNOWN_ACTOR)
	}
}

/// Who changed the configuration last, when and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModificationRecord {
	pub by: String,
	pub at: DateTime<Utc>,
	pub reason: Option<String>,
}

struct State {
	store: ConfigStore,
	lock: LockGuard,
	hooks: HookBus,
	last_modified: Option<ModificationRecord>,
}

type ViolationSink = Box<dyn Fn(&str) + Send + 'static>;

pub struct AppConfigBuilder {
	registry: Arc<ParamRegistry>,
	settings: GuardSettings,
	environment: Option<Arc<dyn GuardEnvironment>>,
	schema: Vec<ParamSpec>,
	initial: Changes,
	adapter: Option<Box<dyn PersistenceAdapter>>,
	audit: Vec<Arc<dyn AuditSink>>,
	history: bool,
	startup_bypass: bool,
	immutable: bool,
	violation_sink: Option<ViolationSink>,
}

impl AppConfigBuilder {
	pub fn new(registry: Arc<ParamRegistry>) -> Self {
		Self {
			registry,
			settings: GuardSettings::default(),
			environment: None,
			schema: Vec::new(),
			initial: Changes::new(),
			adapter: None,
			audit: Vec::new(),
			history: false,
			startup_bypass: false,
			immutable: false,
			violation_sink: None,
		}
	}

	pub fn settings(mut self, settings: GuardSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Source of the bypass signal and sealing key (process environment by default)
	pub fn environment(mut self, environment: Arc<dyn GuardEnvironment>) -> Self {
		self.environment = Some(environment);
		self
	}

	/// Specs to register unless the registry already knows them
	pub fn schema(mut self, specs: impl IntoIterator<Item = ParamSpec>) -> Self {
		self.schema.extend(specs);
		self
	}

	/// Values applied on top of defaults and persisted values
	pub fn initial(mut self, changes: Changes) -> Self {
		self.initial = changes;
		self
	}

	pub fn adapter(mut self, adapter: Box<dyn PersistenceAdapter>) -> Self {
		self.adapter = Some(adapter);
		self
	}

	pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
		self.audit.push(sink);
		self
	}

	/// Keep an in-memory change history, bounded by `GuardSettings::history_capacity`
	pub fn history(mut self, enabled: bool) -> Self {
		self.history = enabled;
		self
	}

	/// Skip validation of the initial values, needs bypass authorization
	pub fn startup_bypass(mut self, bypass: bool) -> Self {
		self.startup_bypass = bypass;
		self
	}

	/// Lock the configuration once built
	pub fn immutable(mut self, immutable: bool) -> Self {
		self.immutable = immutable;
		self
	}

	/// Receiver of integrity violations found by the background checker
	pub fn violation_sink<F>(mut self, sink: F) -> Self
	where
		F: Fn(&str) + Send + 'static,
	{
		self.violation_sink = Some(Box::new(sink));
		self
	}

	pub fn build(self) -> CgResult<AppConfig> {
		let environment: Arc<dyn GuardEnvironment> =
			self.environment.unwrap_or_else(|| Arc::new(ProcessEnvironment));

		for spec in self.schema {
			if !self.registry.has(spec.name()) {
				self.registry.register(spec, [""; 0], false)?;
			}
		}

		if self.startup_bypass && !environment.bypass_authorized() {
			return Err(Error::BypassDenied { operation: "startup" });
		}
		let validate = !self.startup_bypass;

		let capacity = self.settings.history_capacity;
		let history = self.history.then(|| Arc::new(ConfigHistory::new(capacity)));
		let mut store = ConfigStore::new(Arc::clone(&self.registry))
			.allow_type_drift(self.settings.allow_type_drift);
		if let Some(adapter) = self.adapter {
			store = store.with_adapter(adapter);
		}
		for sink in self.audit {
			store = store.with_audit(sink);
		}
		if let Some(history) = &history {
			store = store.with_audit(history.clone());
		}

		let mut values = store.defaults();
		if store.has_adapter() {
			values.extend(store.load_document(validate)?);
		}
		for (key, value) in self.initial.entries {
			let name = self.registry.resolve(&key)?;
			values.insert(name, value);
		}

		let validator = ConfigValidator::new(Arc::clone(&self.registry));
		if validate {
			validator
				.validate_mapping(values.iter().map(|(k, v)| (&**k, v)))
				.map_err(|err| with_context(err, "init"))?;
		} else {
			for (name, value) in &values {
				warn!("Startup bypass: {} = {}", name, redact_for_log(name, value));
			}
		}

		store.restore(values, Some("initialize"), SYSTEM_ACTOR);

		let integrity = IntegrityGuard::new(self.settings.hash_algorithm, Arc::clone(&environment));
		integrity.update_snapshot(&store.snapshot_internal())?;

		let mut lock = LockGuard::new(Arc::clone(&environment));
		if self.immutable {
			lock.lock();
		}

		let size = store.len();
		let policy = self.settings.hook_failure_policy;
		let config = AppConfig {
			registry: self.registry,
			validator,
			settings: self.settings,
			integrity,
			history,
			torn_down: Arc::new(AtomicBool::new(false)),
			state: ReentrantMutex::new(RefCell::new(State {
				store,
				lock,
				hooks: HookBus::new(policy),
				last_modified: None,
			})),
		};

		if config.settings.background_checker {
			let torn_down = Arc::clone(&config.torn_down);
			let sink = self.violation_sink;
			config.integrity.start_checker(
				config.settings.check_interval,
				move || torn_down.load(Ordering::SeqCst),
				move |message| match &sink {
					Some(sink) => sink(message),
					None => error!("{}", message),
				},
			)?;
		}

		info!("AppConfig initialized with {} parameters", size);
		Ok(config)
	}
}

/// Thread-safe, validated, integrity-checked configuration
pub struct AppConfig {
	registry: Arc<ParamRegistry>,
	validator: ConfigValidator,
	settings: GuardSettings,
	integrity: IntegrityGuard,
	history: Option<Arc<ConfigHistory>>,
	torn_down: Arc<AtomicBool>,
	state: ReentrantMutex<RefCell<State>>,
}

impl std::fmt::Debug for AppConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppConfig")
			.field("registry", &self.registry)
			.field("settings", &self.settings)
			.field("torn_down", &self.is_torn_down())
			.finish()
	}
}

impl AppConfig {
	pub fn builder(registry: Arc<ParamRegistry>) -> AppConfigBuilder {
		AppConfigBuilder::new(registry)
	}

	/// Configuration with default settings, populated from registered defaults
	pub fn new(registry: Arc<ParamRegistry>) -> CgResult<Self> {
		Self::builder(registry).build()
	}

	pub fn registry(&self) -> &Arc<ParamRegistry> {
		&self.registry
	}

	pub fn settings(&self) -> &GuardSettings {
		&self.settings
	}

	pub fn is_torn_down(&self) -> bool {
		self.torn_down.load(Ordering::SeqCst)
	}

	fn ensure_active(&self) -> CgResult<()> {
		if self.is_torn_down() { Err(Error::TornDown) } else { Ok(()) }
	}

	/// Validate and commit a batch to the permanent layer
	pub fn update(&self, changes: Changes, options: ChangeOptions) -> CgResult<()> {
		self.apply(changes, &options, true, "update")
	}

	/// Validate and commit a batch of values that are each served by one read only
	pub fn use_once(&self, changes: Changes, options: ChangeOptions) -> CgResult<()> {
		self.apply(changes, &options, false, "use_once")
	}

	/// Single-key update with default options
	pub fn set<K: ParamKey + ?Sized>(&self, key: &K, value: impl Into<ConfigValue>) -> CgResult<()> {
		self.update(Changes::new().set(key, value), ChangeOptions::default())
	}

	/// Put a parameter back to its registered default
	pub fn reset<K: ParamKey + ?Sized>(&self, key: &K, options: ChangeOptions) -> CgResult<()> {
		self.ensure_active()?;
		let (name, spec) = self.registry.resolve_and_get(key)?;
		self.update(Changes::new().set(&*name, spec.default_value().clone()), options)
	}

	fn apply(
		&self,
		changes: Changes,
		options: &ChangeOptions,
		permanent: bool,
		operation: &'static str,
	) -> CgResult<()> {
		let guard = self.state.lock();
		self.ensure_active()?;

		let (hooks, snapshot) = {
			let mut state = guard.borrow_mut();
			state.lock.ensure_unlocked(options.bypass, operation)?;
			if changes.is_empty() {
				return Ok(());
			}

			let mut resolved = Vec::with_capacity(changes.len());
			for (key, value) in changes.entries {
				resolved.push((self.registry.resolve(&key)?, value));
			}
			self.validator
				.validate_mapping(resolved.iter().map(|(name, value)| (&**name, value)))
				.map_err(|err| with_context(err, operation))?;

			let reason = options.reason.as_deref();
			let writes = resolved
				.into_iter()
				.map(|(name, value)| state.store.prepare(&*name, value, permanent, reason))
				.collect::<CgResult<Vec<_>>>()?;
			let count = writes.len();
			state.store.commit(writes, reason, options.actor());
			state.last_modified = Some(ModificationRecord {
				by: options.actor().to_string(),
				at: Utc::now(),
				reason: options.reason.clone(),
			});
			if permanent {
				self.integrity.update_snapshot(&state.store.snapshot_internal())?;
			}
			info!("{}: committed {} value(s) by {}", operation, count, options.actor());

			(state.hooks.hooks(), state.store.snapshot_public())
		};

		HookBus::dispatch(&hooks, self.settings.hook_failure_policy, &snapshot)
	}

	/// Read a value, consuming a pending one-time value first
	///
	/// Falls back to the registered default when the permanent layer has no entry.
	pub fn get<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<ConfigValue> {
		self.ensure_active()?;
		let (name, spec) = self.registry.resolve_and_get(key)?;
		Ok(self.lookup(&name)?.unwrap_or_else(|| spec.default_value().clone()))
	}

	/// Read a value, falling back to `default` when the permanent layer has no entry
	pub fn get_or<K: ParamKey + ?Sized>(
		&self,
		key: &K,
		default: impl Into<ConfigValue>,
	) -> CgResult<ConfigValue> {
		self.ensure_active()?;
		let name = self.registry.resolve(key)?;
		Ok(self.lookup(&name)?.unwrap_or_else(|| default.into()))
	}

	fn lookup(&self, name: &str) -> CgResult<Option<ConfigValue>> {
		let guard = self.state.lock();
		self.ensure_active()?;
		let mut state = guard.borrow_mut();
		state.store.get(name)
	}

	pub fn get_bool<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<bool> {
		self.get_typed(key, ValueKind::Bool, ConfigValue::as_bool)
	}

	pub fn get_int<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<i64> {
		self.get_typed(key, ValueKind::Int, ConfigValue::as_int)
	}

	/// Floats and integers both read as `f64`
	pub fn get_float<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<f64> {
		self.get_typed(key, ValueKind::Float, ConfigValue::as_f64)
	}

	pub fn get_string<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<String> {
		self.get_typed(key, ValueKind::String, |v| v.as_str().map(ToString::to_string))
	}

	fn get_typed<K, T>(
		&self,
		key: &K,
		expected: ValueKind,
		extract: impl Fn(&ConfigValue) -> Option<T>,
	) -> CgResult<T>
	where
		K: ParamKey + ?Sized,
	{
		self.ensure_active()?;
		let name = self.registry.resolve(key)?;
		let value = self.get(&*name)?;
		extract(&value).ok_or_else(|| {
			ValidationErrors::single(
				&*name,
				FailureKind::TypeMismatch,
				format!("Expected {}, got {}.", expected, value.type_name()),
			)
			.with_subject(&*name, value.clone())
			.into()
		})
	}

	/// Whether the key resolves and has a stored value
	pub fn has<K: ParamKey + ?Sized>(&self, key: &K) -> CgResult<bool> {
		let guard = self.state.lock();
		self.ensure_active()?;
		let state = guard.borrow();
		Ok(state.store.contains(key))
	}

	/// Number of stored parameters
	pub fn size(&self) -> CgResult<usize> {
		let guard = self.state.lock();
		self.ensure_active()?;
		let state = guard.borrow();
		Ok(state.store.len())
	}

	/// Sorted canonical names of stored parameters
	pub fn keys(&self) -> CgResult<Vec<String>> {
		let guard = self.state.lock();
		self.ensure_active()?;
		let state = guard.borrow();
		Ok(state.store.keys())
	}

	/// Read-only copy of the permanent layer
	pub fn snapshot(&self) -> CgResult<ConfigSnapshot> {
		let guard = self.state.lock();
		self.ensure_active()?;
		let state = guard.borrow();
		Ok(state.store.snapshot_public())
	}

	/// Replace the permanent layer with `values`; an empty batch changes nothing
	pub fn restore_from_snapshot(&self, values: Changes, options: ChangeOptions) -> CgResult<()> {
		let guard = self.state.lock();
		self.ensure_active()?;
		if values.is_empty() {
			return Ok(());
		}

		let (hooks, snapshot) = {
			let mut state = guard.borrow_mut();
			state.lock.ensure_unlocked(options.bypass, "restore")?;

			let mut resolved = ValueMap::new();
			for (key, value) in values.entries {
				resolved.insert(self.registry.resolve(&key)?, value);
			}
			self.validator
				.validate_mapping(resolved.iter().map(|(name, value)| (&**name, value)))
				.map_err(|err| with_context(err, "restore"))?;

			let count = resolved.len();
			state.store.restore(resolved, options.reason.as_deref(), options.actor());
			state.last_modified = Some(ModificationRecord {
				by: options.actor().to_string(),
				at: Utc::now(),
				reason: options.reason.clone(),
			});
			self.integrity.update_snapshot(&state.store.snapshot_internal())?;
			info!("restore: replaced configuration with {} value(s)", count);

			(state.hooks.hooks(), state.store.snapshot_public())
		};

		HookBus::dispatch(&hooks, self.settings.hook_failure_policy, &snapshot)
	}

	/// Apply `changes` for the duration of `scope`, then put everything back
	///
	/// The prior values and the prior seal are reinstated verbatim when the scope ends, also
	/// when it unwinds from a panic or the update itself fails. Reverting does not run hooks.
	/// Nested calls unwind in LIFO order. Other threads wait until the scope is over.
	///
	/// `options` work as for [`AppConfig::update`], the actor defaults to `temp_update`.
	pub fn temp_update<R, F>(
		&self,
		changes: Changes,
		options: ChangeOptions,
		scope: F,
	) -> CgResult<R>
	where
		F: FnOnce() -> R,
	{
		let guard = self.state.lock();
		self.ensure_active()?;

		let prior = guard.borrow().store.snapshot_internal();
		let _revert = Revert { config: self, values: Some(prior), sealed: self.integrity.sealed() };

		let options = ChangeOptions {
			modified_by: options.modified_by.or_else(|| Some("temp_update".into())),
			..options
		};
		self.apply(changes, &options, true, "temp_update")?;
		Ok(scope())
	}

	/// Stop the integrity checker and discard all state; later calls are no-ops
	pub fn teardown(&self) {
		if self.torn_down.swap(true, Ordering::SeqCst) {
			return;
		}
		// joined outside the state lock, a violation sink may read the configuration
		self.integrity.stop();

		// writers already past the active check finish first, their seal is dropped here
		let guard = self.state.lock();
		self.integrity.clear();
		let mut state = guard.borrow_mut();
		state.store.clear();
		state.hooks.clear();
		state.last_modified = None;
		info!("AppConfig torn down");
	}

	/// Whether the sealed snapshot still matches its checksum; false after teardown
	pub fn verify_integrity(&self) -> bool {
		self.integrity.verify()
	}

	pub fn memory_fingerprint(&self) -> CgResult<String> {
		self.ensure_active()?;
		self.integrity.memory_fingerprint()
	}

	pub fn lock(&self) -> CgResult<()> {
		let guard = self.state.lock();
		self.ensure_active()?;
		guard.borrow_mut().lock.lock();
		Ok(())
	}

	/// See [`LockGuard::unlock`]
	pub fn unlock(&self, bypass: bool) -> CgResult<()> {
		let guard = self.state.lock();
		self.ensure_active()?;
		guard.borrow_mut().lock.unlock(bypass)
	}

	pub fn is_locked(&self) -> CgResult<bool> {
		let guard = self.state.lock();
		self.ensure_active()?;
		Ok(guard.borrow().lock.is_locked())
	}

	pub fn register_post_update_hook<F>(&self, hook: F) -> CgResult<()>
	where
		F: Fn(&ConfigSnapshot) -> Result<(), HookError> + Send + Sync + 'static,
	{
		let guard = self.state.lock();
		self.ensure_active()?;
		guard.borrow_mut().hooks.register(hook);
		Ok(())
	}

	pub fn last_modified(&self) -> CgResult<Option<ModificationRecord>> {
		let guard = self.state.lock();
		self.ensure_active()?;
		Ok(guard.borrow().last_modified.clone())
	}

	/// Entries of the built-in change history, empty unless enabled on the builder
	pub fn history(&self) -> CgResult<Vec<HistoryEntry>> {
		self.ensure_active()?;
		Ok(self.history.as_ref().map(|h| h.entries()).unwrap_or_default())
	}

	/// Persist the permanent layer through the adapter
	pub fn save(&self) -> CgResult<()> {
		let guard = self.state.lock();
		self.ensure_active()?;
		guard.borrow().store.save()
	}

	/// Replace the permanent layer with defaults overlaid by the persisted document
	pub fn load(&self, options: ChangeOptions) -> CgResult<()> {
		let guard = self.state.lock();
		self.ensure_active()?;

		let (hooks, snapshot) = {
			let mut state = guard.borrow_mut();
			state.lock.ensure_unlocked(options.bypass, "load")?;
			state.store.load(true)?;
			state.last_modified = Some(ModificationRecord {
				by: options.actor().to_string(),
				at: Utc::now(),
				reason: options.reason.clone(),
			});
			self.integrity.update_snapshot(&state.store.snapshot_internal())?;
			(state.hooks.hooks(), state.store.snapshot_public())
		};

		HookBus::dispatch(&hooks, self.settings.hook_failure_policy, &snapshot)
	}
}

/// Restores a `temp_update` pre-state when dropped
struct Revert<'a> {
	config: &'a AppConfig,
	values: Option<ValueMap>,
	sealed: Option<crate::integrity::Sealed>,
}

impl Drop for Revert<'_> {
	fn drop(&mut self) {
		if self.config.is_torn_down() {
			return;
		}
		let Some(values) = self.values.take() else {
			return;
		};
		let guard = self.config.state.lock();
		guard.borrow_mut().store.restore(values, Some("temp_update revert"), "temp_update");
		self.config.integrity.reinstate(self.sealed.take());
		debug!("temp_update reverted");
	}
}

fn with_context(err: Error, context: &str) -> Error {
	match err {
		Error::Validation(errors) => {
			let err = Error::Validation(errors.with_context(context));
			error!("{}", err);
			err
		}
		other => other,
	}
}


// vim: ts=4
