//! Audit trail of store changes

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

use crate::prelude::*;

/// One recorded change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
	pub timestamp: DateTime<Utc>,
	pub modified_by: String,
	pub reason: Option<String>,
	/// Written to the one-time layer
	pub ephemeral: bool,
	pub keys: Vec<String>,
	pub before: BTreeMap<String, ConfigValue>,
	pub after: BTreeMap<String, ConfigValue>,
}

/// Receiver of change records
///
/// Recording is best-effort: the store logs a failing sink and carries on.
pub trait AuditSink: Debug + Send + Sync {
	fn record(&self, entry: HistoryEntry) -> CgResult<()>;
}

/// In-memory audit sink, optionally bounded
#[derive(Debug, Default)]
pub struct ConfigHistory {
	entries: Mutex<VecDeque<HistoryEntry>>,
	max_entries: Option<usize>,
}

impl ConfigHistory {
	pub fn new(max_entries: Option<usize>) -> Self {
		Self { entries: Mutex::new(VecDeque::new()), max_entries }
	}

	/// All entries, oldest first
	pub fn entries(&self) -> Vec<HistoryEntry> {
		self.entries.lock().iter().cloned().collect()
	}

	/// Entries touching the given canonical name, oldest first
	pub fn entries_for(&self, name: &str) -> Vec<HistoryEntry> {
		self.entries.lock().iter().filter(|e| e.keys.iter().any(|k| k == name)).cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}
}

impl AuditSink for ConfigHistory {
	fn record(&self, entry: HistoryEntry) -> CgResult<()> {
		let mut entries = self.entries.lock();
		entries.push_back(entry);
		if let Some(max) = self.max_entries {
			while entries.len() > max {
				entries.pop_front();
			}
		}
		Ok(())
	}
}


// vim: ts=4
