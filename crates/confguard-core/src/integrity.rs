//! Integrity sealing of the permanent layer
//!
//! A checksum over the canonical JSON form of the last committed snapshot, HMAC-sealed when the
//! environment supplies a key. A background thread re-verifies it periodically.

use base64::Engine;
use hmac::{Hmac, Mac};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use confguard_types::value::ValueMap;

use crate::prelude::*;
use crate::settings::GuardEnvironment;

pub const VIOLATION_MESSAGE: &str = "AppConfig integrity violation detected";

const CHECKER_THREAD_NAME: &str = "confguard-integrity";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
	#[default]
	Sha256,
	Sha512,
}

impl FromStr for HashAlgorithm {
	type Err = Error;

	fn from_str(s: &str) -> CgResult<Self> {
		match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
			"sha256" => Ok(Self::Sha256),
			"sha512" => Ok(Self::Sha512),
			other => Err(Error::InvalidSetting {
				name: "hash_algorithm".into(),
				reason: format!("unsupported algorithm '{}'", other),
			}),
		}
	}
}

impl fmt::Display for HashAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			HashAlgorithm::Sha256 => "sha256",
			HashAlgorithm::Sha512 => "sha512",
		})
	}
}

fn encode(bytes: &[u8]) -> String {
	base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn digest(algorithm: HashAlgorithm, payload: &[u8]) -> String {
	match algorithm {
		HashAlgorithm::Sha256 => encode(&Sha256::digest(payload)),
		HashAlgorithm::Sha512 => encode(&Sha512::digest(payload)),
	}
}

fn hmac_digest(algorithm: HashAlgorithm, key: &[u8], payload: &[u8]) -> CgResult<String> {
	let invalid_key = |_| Error::InvalidSetting {
		name: "seal_key".into(),
		reason: "key rejected by HMAC".into(),
	};
	Ok(match algorithm {
		HashAlgorithm::Sha256 => {
			let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).map_err(invalid_key)?;
			mac.update(payload);
			encode(&mac.finalize().into_bytes())
		}
		HashAlgorithm::Sha512 => {
			let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key).map_err(invalid_key)?;
			mac.update(payload);
			encode(&mac.finalize().into_bytes())
		}
	})
}

/// Plain checksum of a mapping
///
/// Keys are serialized in sorted order and integers stay distinct from floats, so equal mappings
/// always hash equal regardless of how they were built.
pub fn checksum_of(algorithm: HashAlgorithm, mapping: &ValueMap) -> CgResult<String> {
	seal(algorithm, None, mapping)
}

/// Checksum of a mapping, HMAC-sealed when a key is given
pub fn seal(algorithm: HashAlgorithm, key: Option<&str>, mapping: &ValueMap) -> CgResult<String> {
	let payload = serde_json::to_vec(mapping)?;
	match key {
		Some(key) => hmac_digest(algorithm, key.as_bytes(), &payload),
		None => Ok(digest(algorithm, &payload)),
	}
}

/// A snapshot together with the checksum it was sealed with
#[derive(Debug, Clone, PartialEq)]
pub struct Sealed {
	snapshot: Arc<ValueMap>,
	checksum: Box<str>,
}

impl Sealed {
	/// Rebuild a seal captured elsewhere
	pub fn from_parts(snapshot: ValueMap, checksum: impl Into<Box<str>>) -> Self {
		Self { snapshot: Arc::new(snapshot), checksum: checksum.into() }
	}

	pub fn snapshot(&self) -> &ValueMap {
		&self.snapshot
	}

	pub fn checksum(&self) -> &str {
		&self.checksum
	}
}

/// The state the checker thread shares with the guard
#[derive(Debug, Clone)]
struct Verifier {
	algorithm: HashAlgorithm,
	environment: Arc<dyn GuardEnvironment>,
	sealed: Arc<RwLock<Option<Sealed>>>,
}

impl Verifier {
	fn verify(&self) -> bool {
		let sealed = self.sealed.read();
		let Some(sealed) = sealed.as_ref() else {
			return false;
		};
		let key = self.environment.seal_key();
		match seal(self.algorithm, key.as_deref(), &sealed.snapshot) {
			Ok(checksum) => *checksum == *sealed.checksum,
			Err(err) => {
				warn!("Integrity checksum could not be recomputed: {}", err);
				false
			}
		}
	}

	fn has_snapshot(&self) -> bool {
		self.sealed.read().is_some()
	}
}

#[derive(Debug)]
struct Checker {
	stop_tx: flume::Sender<()>,
	handle: JoinHandle<()>,
}

impl Checker {
	fn thread_id(&self) -> ThreadId {
		self.handle.thread().id()
	}
}

#[derive(Debug)]
pub struct IntegrityGuard {
	verifier: Verifier,
	checker: Mutex<Option<Checker>>,
}

impl IntegrityGuard {
	pub fn new(algorithm: HashAlgorithm, environment: Arc<dyn GuardEnvironment>) -> Self {
		Self {
			verifier: Verifier { algorithm, environment, sealed: Arc::new(RwLock::new(None)) },
			checker: Mutex::new(None),
		}
	}

	pub fn algorithm(&self) -> HashAlgorithm {
		self.verifier.algorithm
	}

	/// Seal a copy of `mapping` as the new reference state
	pub fn update_snapshot(&self, mapping: &ValueMap) -> CgResult<()> {
		let key = self.verifier.environment.seal_key();
		let checksum = seal(self.verifier.algorithm, key.as_deref(), mapping)?;
		debug!("Integrity snapshot sealed ({} values, keyed: {})", mapping.len(), key.is_some());
		*self.verifier.sealed.write() = Some(Sealed::from_parts(mapping.clone(), checksum));
		Ok(())
	}

	/// Whether the sealed snapshot still matches its checksum, false if nothing is sealed
	pub fn verify(&self) -> bool {
		self.verifier.verify()
	}

	pub fn checksum(&self) -> Option<String> {
		self.verifier.sealed.read().as_ref().map(|s| s.checksum.to_string())
	}

	/// Current seal, for verbatim reinstatement later
	pub fn sealed(&self) -> Option<Sealed> {
		self.verifier.sealed.read().clone()
	}

	/// Put back a seal captured with [`IntegrityGuard::sealed`] without recomputing it
	pub fn reinstate(&self, sealed: Option<Sealed>) {
		*self.verifier.sealed.write() = sealed;
	}

	/// Digest of the current checksum and the process id
	pub fn memory_fingerprint(&self) -> CgResult<String> {
		let payload = serde_json::to_vec(&serde_json::json!({
			"checksum": self.checksum(),
			"pid": std::process::id(),
		}))?;
		Ok(digest(HashAlgorithm::Sha256, &payload))
	}

	pub fn is_checking(&self) -> bool {
		self.checker.lock().is_some()
	}

	/// Start the background checker unless it is already running
	///
	/// Every `interval` the sealed state is verified; a mismatch is reported through
	/// `on_violation`. The loop ends on [`IntegrityGuard::stop`] or once `is_torn_down` returns
	/// true. A panicking `on_violation` is contained and the loop keeps polling.
	pub fn start_checker<T, V>(
		&self,
		interval: Duration,
		is_torn_down: T,
		on_violation: V,
	) -> CgResult<()>
	where
		T: Fn() -> bool + Send + 'static,
		V: Fn(&str) + Send + 'static,
	{
		let mut checker = self.checker.lock();
		if checker.is_some() {
			return Ok(());
		}

		let (stop_tx, stop_rx) = flume::bounded::<()>(1);
		let verifier = self.verifier.clone();
		let handle = thread::Builder::new().name(CHECKER_THREAD_NAME.into()).spawn(move || {
			debug!("Integrity checker started ({:?} interval)", interval);
			loop {
				match stop_rx.recv_timeout(interval) {
					Err(flume::RecvTimeoutError::Timeout) => {}
					Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => break,
				}
				if is_torn_down() {
					break;
				}
				if verifier.has_snapshot() && !verifier.verify() {
					let reported =
						panic::catch_unwind(AssertUnwindSafe(|| on_violation(VIOLATION_MESSAGE)));
					if reported.is_err() {
						error!("Integrity violation handler panicked");
					}
				}
			}
			debug!("Integrity checker stopped");
		})?;

		*checker = Some(Checker { stop_tx, handle });
		Ok(())
	}

	/// Signal the checker to exit and wait for it
	///
	/// Called from the checker thread itself (through a violation handler) the thread is only
	/// signalled, never joined.
	pub fn stop(&self) {
		let Some(checker) = self.checker.lock().take() else {
			return;
		};
		let _ = checker.stop_tx.send(());
		if checker.thread_id() == thread::current().id() {
			return;
		}
		if checker.handle.join().is_err() {
			warn!("Integrity checker thread panicked");
		}
	}

	/// Stop the checker and forget the sealed state
	pub fn clear(&self) {
		self.stop();
		*self.verifier.sealed.write() = None;
	}
}

impl Drop for IntegrityGuard {
	fn drop(&mut self) {
		self.stop();
	}
}


// vim: ts=4
