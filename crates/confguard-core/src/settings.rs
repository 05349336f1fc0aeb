//! Guard settings and the out-of-band environment signals

use std::env;
use std::fmt::Debug;
use std::time::Duration;

use crate::hooks::HookFailurePolicy;
use crate::integrity::HashAlgorithm;
use crate::prelude::*;

pub const BYPASS_ENV: &str = "ALLOW_CONFIG_BYPASS";
pub const SEAL_KEY_ENV: &str = "CONFIG_HMAC_KEY";

const CHECK_INTERVAL_ENV: &str = "CONFIG_GUARD_CHECK_INTERVAL_MS";
const BACKGROUND_CHECKER_ENV: &str = "CONFIG_GUARD_BACKGROUND_CHECKER";
const ALLOW_TYPE_DRIFT_ENV: &str = "CONFIG_GUARD_ALLOW_TYPE_DRIFT";
const HOOK_POLICY_ENV: &str = "CONFIG_GUARD_HOOK_POLICY";
const HISTORY_CAPACITY_ENV: &str = "CONFIG_GUARD_HISTORY_CAPACITY";
const HASH_ALGORITHM_ENV: &str = "CONFIG_GUARD_HASH_ALGORITHM";

/// Source of the bypass authorization signal and the sealing secret
pub trait GuardEnvironment: Debug + Send + Sync {
	/// Whether guarded operations may be bypassed
	fn bypass_authorized(&self) -> bool;

	/// Secret for sealing checksums, `None` for plain digests
	fn seal_key(&self) -> Option<String>;
}

/// Reads the process environment on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl GuardEnvironment for ProcessEnvironment {
	fn bypass_authorized(&self) -> bool {
		env::var(BYPASS_ENV).is_ok_and(|v| v == "1")
	}

	fn seal_key(&self) -> Option<String> {
		env::var(SEAL_KEY_ENV).ok().filter(|k| !k.is_empty())
	}
}

/// Constant signals, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct FixedEnvironment {
	pub bypass_authorized: bool,
	pub seal_key: Option<String>,
}

impl FixedEnvironment {
	pub fn new(bypass_authorized: bool, seal_key: Option<&str>) -> Self {
		Self { bypass_authorized, seal_key: seal_key.map(ToString::to_string) }
	}
}

impl GuardEnvironment for FixedEnvironment {
	fn bypass_authorized(&self) -> bool {
		self.bypass_authorized
	}

	fn seal_key(&self) -> Option<String> {
		self.seal_key.clone().filter(|k| !k.is_empty())
	}
}

/// Tuning knobs of one configuration instance
#[derive(Debug, Clone, PartialEq)]
pub struct GuardSettings {
	/// Poll interval of the background integrity checker
	pub check_interval: Duration,
	pub background_checker: bool,
	pub allow_type_drift: bool,
	pub hook_failure_policy: HookFailurePolicy,
	/// Audit history size, `None` for unbounded
	pub history_capacity: Option<usize>,
	pub hash_algorithm: HashAlgorithm,
}

impl Default for GuardSettings {
	fn default() -> Self {
		Self {
			check_interval: Duration::from_millis(100),
			background_checker: true,
			allow_type_drift: false,
			hook_failure_policy: HookFailurePolicy::default(),
			history_capacity: None,
			hash_algorithm: HashAlgorithm::default(),
		}
	}
}

impl GuardSettings {
	/// Defaults overridden by `CONFIG_GUARD_*` environment variables
	pub fn from_env() -> CgResult<Self> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Defaults overridden by whatever `lookup` returns for the `CONFIG_GUARD_*` names
	pub fn from_lookup<F>(lookup: F) -> CgResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut settings = Self::default();
		let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

		if let Some(ms) = get(CHECK_INTERVAL_ENV) {
			let ms: u64 = parse_setting(CHECK_INTERVAL_ENV, &ms)?;
			if ms == 0 {
				return Err(invalid(CHECK_INTERVAL_ENV, "must be greater than zero"));
			}
			settings.check_interval = Duration::from_millis(ms);
		}
		if let Some(v) = get(BACKGROUND_CHECKER_ENV) {
			settings.background_checker = parse_flag(BACKGROUND_CHECKER_ENV, &v)?;
		}
		if let Some(v) = get(ALLOW_TYPE_DRIFT_ENV) {
			settings.allow_type_drift = parse_flag(ALLOW_TYPE_DRIFT_ENV, &v)?;
		}
		if let Some(v) = get(HOOK_POLICY_ENV) {
			settings.hook_failure_policy = v.parse()?;
		}
		if let Some(v) = get(HISTORY_CAPACITY_ENV) {
			settings.history_capacity = Some(parse_setting(HISTORY_CAPACITY_ENV, &v)?);
		}
		if let Some(v) = get(HASH_ALGORITHM_ENV) {
			settings.hash_algorithm = v.parse()?;
		}

		debug!("Guard settings: {:?}", settings);
		Ok(settings)
	}
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
	Error::InvalidSetting { name: name.to_string(), reason: reason.into() }
}

fn parse_setting<T>(name: &str, value: &str) -> CgResult<T>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	value.parse().map_err(|err: T::Err| invalid(name, format!("'{}': {}", value, err)))
}

fn parse_flag(name: &str, value: &str) -> CgResult<bool> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(invalid(name, format!("'{}' is not a boolean", value))),
	}
}


// vim: ts=4
