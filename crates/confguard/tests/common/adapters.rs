//! Test doubles for the out-of-band collaborators
//!
//! An in-memory persistence adapter and a guard environment whose signals can be flipped while a
//! configuration is live.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use confguard::error::CgResult;
use confguard::persistence_adapter::{PersistenceAdapter, Snapshot};
use confguard::settings::GuardEnvironment;
use confguard::value::ConfigValue;

/// Common test setup helper
pub fn setup_test_logging() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();
}

/// Keeps the saved document in memory; clones share the same document
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
	document: Arc<Mutex<Option<ConfigValue>>>,
	saves: Arc<AtomicUsize>,
}

impl MemoryAdapter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adapter whose `load` returns `document` as is
	pub fn with_document(document: impl Into<ConfigValue>) -> Self {
		let adapter = Self::new();
		*adapter.document.lock() = Some(document.into());
		adapter
	}

	pub fn document(&self) -> Option<ConfigValue> {
		self.document.lock().clone()
	}

	pub fn save_count(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}
}

impl PersistenceAdapter for MemoryAdapter {
	fn save(&self, values: &Snapshot) -> CgResult<()> {
		*self.document.lock() = Some(ConfigValue::map(values.clone()));
		self.saves.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn load(&self) -> CgResult<ConfigValue> {
		Ok(self.document.lock().clone().unwrap_or_else(|| ConfigValue::map(Snapshot::new())))
	}
}

/// Adapter that fails every call with an I/O error
#[derive(Debug, Default)]
pub struct BrokenAdapter;

impl PersistenceAdapter for BrokenAdapter {
	fn save(&self, _values: &Snapshot) -> CgResult<()> {
		Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only medium").into())
	}

	fn load(&self) -> CgResult<ConfigValue> {
		Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such document").into())
	}
}

/// Environment whose bypass signal and seal key can change at runtime
#[derive(Debug, Default)]
pub struct SwitchableEnvironment {
	bypass: AtomicBool,
	seal_key: Mutex<Option<String>>,
}

impl SwitchableEnvironment {
	pub fn new(bypass: bool, seal_key: Option<&str>) -> Arc<Self> {
		Arc::new(Self {
			bypass: AtomicBool::new(bypass),
			seal_key: Mutex::new(seal_key.map(ToString::to_string)),
		})
	}

	pub fn set_bypass(&self, bypass: bool) {
		self.bypass.store(bypass, Ordering::SeqCst);
	}

	pub fn rotate_key(&self, key: Option<&str>) {
		*self.seal_key.lock() = key.map(ToString::to_string);
	}
}

impl GuardEnvironment for SwitchableEnvironment {
	fn bypass_authorized(&self) -> bool {
		self.bypass.load(Ordering::SeqCst)
	}

	fn seal_key(&self) -> Option<String> {
		self.seal_key.lock().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_logging_setup() {
		setup_test_logging();
		setup_test_logging();
	}
}

// vim: ts=4
