//! confguard keeps one authoritative, guarded set of named configuration parameters.
//!
//! # Features
//!
//! - Typed parameter specs with bounds, custom validators and aliases
//! - Batch updates validated as a whole, with per-key failure reports
//! - One-time values served by a single read
//! - Scoped temporary overrides that revert on exit, panic included
//! - Integrity sealing (optionally HMAC keyed) with a background checker
//! - Lock gate with an out-of-band bypass signal
//! - Post-update hooks, audit history and pluggable persistence

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

// Re-export shared types and adapter traits from confguard-types
pub use confguard_types::error;
pub use confguard_types::key;
pub use confguard_types::persistence_adapter;
pub use confguard_types::value;

// Core modules
pub use confguard_core::config;
pub use confguard_core::history;
pub use confguard_core::hooks;
pub use confguard_core::integrity;
pub use confguard_core::lock;
pub use confguard_core::params;
pub use confguard_core::settings;
pub use confguard_core::store;
pub use confguard_core::validation;

pub use confguard_core::config::{
	AppConfig, AppConfigBuilder, ChangeOptions, Changes, ModificationRecord,
};
pub use confguard_core::params::{ParamRegistry, ParamSpec};
pub use confguard_core::store::ConfigSnapshot;
pub use confguard_types::error::{CgResult, Error};
pub use confguard_types::value::{ConfigValue, ValueKind};

pub mod prelude {
	pub use confguard_core::prelude::*;
	pub use confguard_core::{
		AppConfig, ChangeOptions, Changes, ConfigSnapshot, ParamRegistry, ParamSpec,
	};
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.try_init();
}

// vim: ts=4
