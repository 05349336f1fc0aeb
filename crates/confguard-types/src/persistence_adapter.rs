//! Adapter for durable storage of the permanent configuration layer
//!
//! The store treats the adapter as opaque. It hands over a plain name -> value snapshot on
//! `save` and expects a mapping back from `load`.

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::error::{CgResult, Error};
use crate::value::ConfigValue;

/// Plain key-value snapshot exchanged with persistence adapters
pub type Snapshot = BTreeMap<Box<str>, ConfigValue>;

pub trait PersistenceAdapter: Debug + Send + Sync {
	/// Persist a full snapshot of the permanent layer
	fn save(&self, values: &Snapshot) -> CgResult<()>;

	/// Load the persisted document
	///
	/// Must be a `ConfigValue::Map`. Anything else is a contract violation the store reports as
	/// `Error::AdapterContract`.
	fn load(&self) -> CgResult<ConfigValue>;
}

/// Check the adapter contract on a loaded document and unpack its entries
pub fn expect_mapping(loaded: ConfigValue) -> CgResult<Snapshot> {
	match loaded {
		ConfigValue::Map(map) => Ok(map.as_ref().clone()),
		other => Err(Error::AdapterContract(format!(
			"load() must return a mapping, got {}",
			other.type_name()
		))),
	}
}


// vim: ts=4
