//! Behavioral guarantees of AppConfig
//!
//! Immutability of stored values, integrity self-consistency, consume-once reads, lock gating,
//! nested temporary overrides, aggregated batch validation, bounds, teardown and aliases.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};

use confguard::error::{Error, FailureKind};
use confguard::key::ParamKey;
use confguard::value::{ConfigValue, ValueKind};
use confguard::{AppConfig, ChangeOptions, Changes, ParamSpec};

use common::fixtures::{authorized_config, config, list, quiet_settings, test_registry};

#[test]
fn test_stored_values_are_frozen() {
	let config = config();
	let mut schemes = vec!["https".to_string(), "http".to_string()];
	config.set("ALLOWED_SCHEMES", schemes.clone()).unwrap();

	schemes.push("gopher".into());
	schemes[0] = "ftp".into();
	assert_eq!(config.get("ALLOWED_SCHEMES").unwrap(), list(&["https", "http"]));

	let before = config.snapshot().unwrap();
	let mut read = config.get("ALLOWED_SCHEMES").unwrap();
	read = ConfigValue::list([read, ConfigValue::from("gopher")]);
	config.set("ALLOWED_SCHEMES", vec!["http"]).unwrap();

	assert_eq!(read.len(), Some(2));
	assert_eq!(before.get("ALLOWED_SCHEMES"), Some(&list(&["https", "http"])));
	assert_eq!(config.get("ALLOWED_SCHEMES").unwrap(), list(&["http"]));
}

#[test]
fn test_integrity_holds_after_changes() {
	let config = config();
	assert!(config.verify_integrity());

	config
		.update(
			Changes::new().set("MAX_CONCURRENCY", 64).set("VERIFY", false),
			ChangeOptions::default(),
		)
		.unwrap();
	assert!(config.verify_integrity());

	config.use_once(Changes::new().set("MAX_CONCURRENCY", 2), ChangeOptions::default()).unwrap();
	assert!(config.verify_integrity());

	let snapshot = config.snapshot().unwrap();
	config.set("MAX_CONCURRENCY", 5).unwrap();
	config.restore_from_snapshot(snapshot.into(), ChangeOptions::default()).unwrap();
	assert!(config.verify_integrity());
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 64);

	config.teardown();
	assert!(!config.verify_integrity());
}

#[test]
fn test_use_once_is_consumed_by_one_read() {
	let config = config();
	config.set("MAX_CONCURRENCY", 50).unwrap();
	config.use_once(Changes::new().set("max_concurrency", 7), ChangeOptions::default()).unwrap();

	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 7);
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 50);
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 50);
}

#[test]
fn test_use_once_falls_back_to_default() {
	let config = config();
	config.use_once(Changes::new().set("VERIFY", false), ChangeOptions::default()).unwrap();
	assert!(!config.get_bool("VERIFY").unwrap());
	assert!(config.get_bool("VERIFY").unwrap());
}

#[test]
fn test_use_once_is_validated() {
	let config = config();
	let err = config
		.use_once(Changes::new().set("MAX_CONCURRENCY", 0), ChangeOptions::default())
		.unwrap_err();
	assert!(matches!(err, Error::Validation(_)));
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 10);
}

#[test]
fn test_lock_rejects_updates_without_bypass() {
	let config = config();
	config.lock().unwrap();

	let err = config.set("MAX_CONCURRENCY", 20).unwrap_err();
	assert!(matches!(err, Error::Locked));

	// bypass without the out-of-band signal is a hard failure
	let err = config
		.update(Changes::new().set("MAX_CONCURRENCY", 20), ChangeOptions::new().bypass())
		.unwrap_err();
	assert!(matches!(err, Error::BypassDenied { operation: "update" }));
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 10);
}

#[test]
fn test_lock_yields_to_authorized_bypass() {
	let config = authorized_config();
	config.lock().unwrap();

	assert!(matches!(config.set("MAX_CONCURRENCY", 20), Err(Error::Locked)));
	config
		.update(Changes::new().set("MAX_CONCURRENCY", 20), ChangeOptions::new().bypass())
		.unwrap();
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 20);
	assert!(config.is_locked().unwrap());
}

#[test]
fn test_temp_update_on_locked_config_needs_authorized_bypass() {
	let denied = config();
	denied.lock().unwrap();
	let err = denied
		.temp_update(Changes::new().set("VERIFY", false), ChangeOptions::new().bypass(), || ())
		.unwrap_err();
	assert!(matches!(err, Error::BypassDenied { operation: "temp_update" }));

	let config = authorized_config();
	config.lock().unwrap();
	assert!(matches!(
		config.temp_update(Changes::new().set("VERIFY", false), ChangeOptions::default(), || ()),
		Err(Error::Locked)
	));

	let options = ChangeOptions::new().bypass().reason("maintenance window");
	let seen = config
		.temp_update(Changes::new().set("VERIFY", false), options, || {
			config.get_bool("VERIFY").unwrap()
		})
		.unwrap();
	assert!(!seen);
	assert!(config.get_bool("VERIFY").unwrap());
	assert!(config.is_locked().unwrap());
	let record = config.last_modified().unwrap().unwrap();
	assert_eq!(record.by, "temp_update");
	assert_eq!(record.reason.as_deref(), Some("maintenance window"));
	assert!(config.verify_integrity());
}

#[test]
fn test_nested_temp_update_unwinds_in_order() {
	let config = config();
	config.set("VERIFY", true).unwrap();

	config
		.temp_update(Changes::new().set("VERIFY", false), ChangeOptions::default(), || {
			assert!(!config.get_bool("VERIFY").unwrap());
			config
				.temp_update(Changes::new().set("VERIFY", true), ChangeOptions::default(), || {
					assert!(config.get_bool("VERIFY").unwrap());
				})
				.unwrap();
			assert!(!config.get_bool("VERIFY").unwrap());
		})
		.unwrap();

	assert!(config.get_bool("VERIFY").unwrap());
	assert!(config.verify_integrity());
}

#[test]
fn test_nested_temp_update_unwinds_on_panic() {
	let config = config();
	config.set("VERIFY", true).unwrap();

	config
		.temp_update(Changes::new().set("VERIFY", false), ChangeOptions::default(), || {
			let inner = catch_unwind(AssertUnwindSafe(|| {
				config
					.temp_update(Changes::new().set("VERIFY", true), ChangeOptions::default(), || {
						panic!("inner scope failed");
					})
					.unwrap();
			}));
			assert!(inner.is_err());
			assert!(!config.get_bool("VERIFY").unwrap());
		})
		.unwrap();

	assert!(config.get_bool("VERIFY").unwrap());
}

#[test]
fn test_temp_update_reverts_on_scope_error() {
	let config = config();
	let fingerprint = config.memory_fingerprint().unwrap();

	let outcome: Result<(), String> = config
		.temp_update(Changes::new().set("MAX_CONCURRENCY", 999), ChangeOptions::default(), || {
			assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 999);
			Err("scope failed".to_string())
		})
		.unwrap();

	assert_eq!(outcome, Err("scope failed".to_string()));
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 10);
	assert_eq!(config.memory_fingerprint().unwrap(), fingerprint);
}

#[test]
fn test_temp_update_rejects_invalid_changes() {
	let config = config();
	let mut ran = false;
	let err = config
		.temp_update(Changes::new().set("MAX_CONCURRENCY", 0), ChangeOptions::default(), || {
			ran = true
		})
		.unwrap_err();
	assert!(matches!(err, Error::Validation(_)));
	assert!(!ran);
	assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 10);
	assert!(config.verify_integrity());
}

#[test]
fn test_non_finite_floats_are_rejected() {
	let registry = test_registry();
	let ratio = ParamSpec::builder("RATIO").value_type(ValueKind::Float).build().unwrap();
	registry.register(ratio, ["ratio"], false).unwrap();
	let config = AppConfig::builder(registry).settings(quiet_settings()).build().unwrap();

	for x in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
		let err = config.set("RATIO", x).unwrap_err();
		let report = err.validation_errors().expect("validation report");
		assert_eq!(report.get("RATIO").unwrap().kind, FailureKind::TypeMismatch);
	}
	assert!(config.get("RATIO").unwrap().is_null());

	config.set("ratio", 0.25).unwrap();
	assert_eq!(config.get_float("RATIO").unwrap(), 0.25);
	assert!(config.verify_integrity());
}

#[test]
fn test_batch_failures_are_aggregated() {
	let config = config();
	let err = config
		.update(
			Changes::new()
				.set("MAX_CONCURRENCY", 0)
				.set("VERIFY", false)
				.set("USER_AGENT", "")
				.set("ALLOWED_SCHEMES", vec!["ftp"]),
			ChangeOptions::default(),
		)
		.unwrap_err();

	let report = err.validation_errors().expect("validation report");
	assert_eq!(report.len(), 3);
	assert_eq!(report.get("MAX_CONCURRENCY").unwrap().kind, FailureKind::OutOfBounds);
	assert_eq!(report.get("USER_AGENT").unwrap().kind, FailureKind::OutOfBounds);
	assert_eq!(report.get("ALLOWED_SCHEMES").unwrap().kind, FailureKind::ValidatorRejected);
	assert!(report.get("MAX_CONCURRENCY").unwrap().message.starts_with("[update] "));

	// nothing from the batch was committed
	assert!(config.get_bool("VERIFY").unwrap());
	assert!(config.last_modified().unwrap().is_none());
}

#[test]
fn test_bounds_enforcement() {
	let config = config();
	for rejected in [0, 1001, -5] {
		let err = config.set("MAX_CONCURRENCY", rejected).unwrap_err();
		assert!(err.to_string().contains("out of bounds"), "{}", err);
	}
	config.set("MAX_CONCURRENCY", 500).unwrap();
	assert_eq!(config.get("MAX_CONCURRENCY").unwrap(), ConfigValue::Int(500));

	config.set("MAX_CONCURRENCY", 1).unwrap();
	config.set("MAX_CONCURRENCY", 1000).unwrap();
	assert_eq!(config.get_int("max_concurrency").unwrap(), 1000);
}

#[test]
fn test_teardown_is_idempotent_and_final() {
	let config = config();
	config.teardown();
	config.teardown();

	assert!(config.is_torn_down());
	assert!(!config.verify_integrity());

	let torn = |result: Result<(), Error>| assert!(matches!(result, Err(Error::TornDown)));
	torn(config.get("VERIFY").map(drop));
	torn(config.get_or("VERIFY", false).map(drop));
	torn(config.get_bool("VERIFY").map(drop));
	torn(config.set("VERIFY", false));
	torn(config.update(Changes::new().set("VERIFY", false), ChangeOptions::default()));
	torn(config.use_once(Changes::new().set("VERIFY", false), ChangeOptions::default()));
	torn(config.reset("VERIFY", ChangeOptions::default()));
	torn(config.restore_from_snapshot(Changes::new(), ChangeOptions::default()));
	torn(config.temp_update(Changes::new(), ChangeOptions::default(), || ()));
	torn(config.snapshot().map(drop));
	torn(config.has("VERIFY").map(drop));
	torn(config.size().map(drop));
	torn(config.keys().map(drop));
	torn(config.lock());
	torn(config.unlock(false));
	torn(config.is_locked().map(drop));
	torn(config.register_post_update_hook(|_| Ok(())));
	torn(config.last_modified().map(drop));
	torn(config.history().map(drop));
	torn(config.memory_fingerprint().map(drop));
	torn(config.save());
	torn(config.load(ChangeOptions::default()));
}

#[test]
fn test_aliases_resolve_to_one_parameter() {
	let config = config();
	config.set("request_timeout", 12.5).unwrap();

	let canonical = config.get("REQUEST_TIMEOUT").unwrap();
	assert_eq!(canonical, ConfigValue::Float(12.5));
	assert_eq!(config.get("request_timeout").unwrap(), canonical);
	assert_eq!(config.get("timeout").unwrap(), canonical);
	assert_eq!(config.get(" Request_Timeout ").unwrap(), canonical);
	assert!(config.has("timeout").unwrap());
}

enum Key {
	Timeout,
	Malformed,
}

impl ParamKey for Key {
	fn key_text(&self) -> Option<&str> {
		match self {
			Key::Timeout => Some("request_timeout"),
			Key::Malformed => None,
		}
	}
}

#[test]
fn test_token_keys() {
	let config = config();
	config.set(&Key::Timeout, 3).unwrap();
	assert_eq!(config.get_float("REQUEST_TIMEOUT").unwrap(), 3.0);

	let err = config.get(&Key::Malformed).unwrap_err();
	let report = err.validation_errors().expect("malformed key is a validation failure");
	assert!(report.errors().values().all(|e| e.kind == FailureKind::InvalidKey));

	assert!(matches!(config.get("NO_SUCH_PARAMETER"), Err(Error::ParameterNotFound { .. })));
}

// vim: ts=4
