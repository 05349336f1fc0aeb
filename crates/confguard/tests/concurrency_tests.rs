//! Cross-thread behavior: concurrent writers, scope exclusion, the background integrity checker
//! and runtime changes of the out-of-band signals

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use confguard::error::Error;
use confguard::integrity::VIOLATION_MESSAGE;
use confguard::settings::GuardSettings;
use confguard::{AppConfig, ChangeOptions, Changes, ParamSpec};

use common::adapters::{SwitchableEnvironment, setup_test_logging};
use common::fixtures::{config, quiet_settings, test_registry};

const CHECK_INTERVAL: Duration = Duration::from_millis(10);
const WAIT: Duration = Duration::from_secs(2);

fn checked_config(env: &Arc<SwitchableEnvironment>) -> AppConfig {
	checked_config_with(env, |message| tracing::error!("{}", message))
}

fn checked_config_with<F>(env: &Arc<SwitchableEnvironment>, sink: F) -> AppConfig
where
	F: Fn(&str) + Send + 'static,
{
	setup_test_logging();
	AppConfig::builder(test_registry())
		.settings(GuardSettings { check_interval: CHECK_INTERVAL, ..GuardSettings::default() })
		.environment(env.clone())
		.violation_sink(sink)
		.build()
		.expect("Failed to build config")
}

#[test]
fn test_concurrent_writers_and_readers() {
	let config = Arc::new(config());
	let handles: Vec<_> = (0..8)
		.map(|worker| {
			let config = Arc::clone(&config);
			thread::spawn(move || {
				for n in 0..50 {
					let value = 1 + worker * 100 + n;
					config.set("MAX_CONCURRENCY", value).unwrap();
					let read = config.get_int("MAX_CONCURRENCY").unwrap();
					assert!((1..=1000).contains(&read));
					config
						.use_once(Changes::new().set("VERIFY", n % 2 == 0), ChangeOptions::default())
						.unwrap();
					config.get_bool("VERIFY").unwrap();
				}
			})
		})
		.collect();
	for handle in handles {
		handle.join().expect("worker panicked");
	}

	assert!(config.verify_integrity());
	let last = config.get_int("MAX_CONCURRENCY").unwrap();
	assert!((1..=750).contains(&last));
	assert_eq!(config.history().unwrap().len(), 1 + 8 * 50 * 2);
}

#[test]
fn test_temp_update_excludes_other_threads() {
	let config = Arc::new(config());
	let (entered_tx, entered_rx) = flume::bounded::<()>(1);

	let reader = {
		let config = Arc::clone(&config);
		thread::spawn(move || {
			entered_rx.recv().unwrap();
			config.get_int("MAX_CONCURRENCY").unwrap()
		})
	};

	config
		.temp_update(Changes::new().set("MAX_CONCURRENCY", 999), ChangeOptions::default(), || {
			entered_tx.send(()).unwrap();
			thread::sleep(Duration::from_millis(50));
			assert_eq!(config.get_int("MAX_CONCURRENCY").unwrap(), 999);
		})
		.unwrap();

	// the reader only gets in once the scope has been reverted
	assert_eq!(reader.join().unwrap(), 10);
}

#[test]
fn test_teardown_waits_for_inflight_update() {
	setup_test_logging();
	let (entered_tx, entered_rx) = flume::unbounded::<()>();
	let registry = test_registry();
	let slow = ParamSpec::builder("SLOW")
		.default(1)
		.validator(move |_| {
			let _ = entered_tx.send(());
			thread::sleep(Duration::from_millis(100));
			true
		})
		.build()
		.unwrap();
	registry.register(slow, ["slow"], false).unwrap();
	let config =
		Arc::new(AppConfig::builder(registry).settings(quiet_settings()).build().unwrap());
	while entered_rx.try_recv().is_ok() {}

	let writer = {
		let config = Arc::clone(&config);
		thread::spawn(move || config.update(Changes::new().set("SLOW", 2), ChangeOptions::default()))
	};
	entered_rx.recv_timeout(WAIT).unwrap();
	config.teardown();

	// the writer was already validating, so it commits before the state is discarded
	writer.join().unwrap().unwrap();
	assert!(config.is_torn_down());
	assert!(!config.verify_integrity());
	assert!(matches!(config.get("SLOW"), Err(Error::TornDown)));
	assert!(matches!(config.memory_fingerprint(), Err(Error::TornDown)));
}

#[test]
fn test_checker_reports_violations() {
	let env = SwitchableEnvironment::new(false, Some("alpha"));
	let (tx, rx) = flume::unbounded::<String>();
	let config = checked_config_with(&env, move |message| {
		let _ = tx.send(message.to_string());
	});
	assert!(config.verify_integrity());
	assert!(rx.recv_timeout(CHECK_INTERVAL * 10).is_err());

	// a rotated sealing key no longer matches the sealed checksum
	env.rotate_key(Some("beta"));
	assert_eq!(rx.recv_timeout(WAIT).unwrap(), VIOLATION_MESSAGE);
	assert!(!config.verify_integrity());

	env.rotate_key(Some("alpha"));
	assert!(config.verify_integrity());

	config.teardown();
	while rx.try_recv().is_ok() {}
	env.rotate_key(None);
	assert!(rx.recv_timeout(CHECK_INTERVAL * 10).is_err());
}

#[test]
fn test_checker_survives_panicking_sink() {
	let env = SwitchableEnvironment::new(false, Some("alpha"));
	let calls = Arc::new(AtomicUsize::new(0));
	let (tx, rx) = flume::unbounded::<usize>();
	let counter = Arc::clone(&calls);
	let config = checked_config_with(&env, move |_| {
		let call = counter.fetch_add(1, Ordering::SeqCst);
		if call == 0 {
			panic!("violation sink failed");
		}
		let _ = tx.send(call);
	});

	env.rotate_key(Some("beta"));
	assert!(rx.recv_timeout(WAIT).unwrap() >= 1);
	config.teardown();
}

#[test]
fn test_updates_reseal_under_current_key() {
	let env = SwitchableEnvironment::new(false, Some("alpha"));
	let config = checked_config(&env);
	env.rotate_key(Some("beta"));
	assert!(!config.verify_integrity());

	config.set("MAX_CONCURRENCY", 15).unwrap();
	assert!(config.verify_integrity());
	config.teardown();
}

#[test]
fn test_bypass_signal_is_read_on_every_call() {
	let env = SwitchableEnvironment::new(false, None);
	let config = AppConfig::builder(test_registry())
		.settings(quiet_settings())
		.environment(env.clone())
		.immutable(true)
		.build()
		.unwrap();

	let bypass = || config.update(Changes::new().set("VERIFY", false), ChangeOptions::new().bypass());
	assert!(matches!(bypass(), Err(Error::BypassDenied { .. })));

	env.set_bypass(true);
	bypass().unwrap();
	assert!(!config.get_bool("VERIFY").unwrap());

	env.set_bypass(false);
	assert!(matches!(bypass(), Err(Error::BypassDenied { .. })));
}

// vim: ts=4
