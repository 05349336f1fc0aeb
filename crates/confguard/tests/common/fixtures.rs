//! Reusable registry, settings and configuration fixtures

use std::sync::Arc;

use confguard::settings::{FixedEnvironment, GuardEnvironment, GuardSettings};
use confguard::value::{ConfigValue, ValueKind};
use confguard::{AppConfig, AppConfigBuilder, ParamRegistry, ParamSpec};

use super::adapters::setup_test_logging;

pub const SCHEMES: [&str; 2] = ["http", "https"];

/// Fresh registry with a small, representative parameter set
pub fn test_registry() -> Arc<ParamRegistry> {
	let registry = Arc::new(ParamRegistry::new());
	for (spec, aliases) in test_specs() {
		registry.register(spec, aliases, false).expect("fixture spec rejected");
	}
	registry
}

fn test_specs() -> Vec<(ParamSpec, &'static [&'static str])> {
	let specs = [
		(
			ParamSpec::builder("MAX_CONCURRENCY")
				.default(10)
				.bounds(1, 1000)
				.description("Maximum concurrent requests"),
			&["max_concurrency"][..],
		),
		(
			ParamSpec::builder("REQUEST_TIMEOUT")
				.default(30.0)
				.value_types([ValueKind::Float, ValueKind::Int])
				.range(0.1, 300),
			&["request_timeout", "timeout"][..],
		),
		(ParamSpec::builder("VERIFY").default(true).allow_none(false), &[][..]),
		(
			ParamSpec::builder("ALLOWED_SCHEMES").default(vec!["https"]).validator(|v| {
				v.as_list().is_some_and(|items| {
					items.iter().all(|s| s.as_str().is_some_and(|s| SCHEMES.contains(&s)))
				})
			}),
			&["allowed_schemes"][..],
		),
		(ParamSpec::builder("USER_AGENT").default("confguard-test/1.0").length(1, 64), &[][..]),
		(ParamSpec::builder("API_TOKEN").default("").require_reason(true), &[][..]),
	];

	specs
		.into_iter()
		.map(|(builder, aliases)| (builder.build().expect("fixture spec invalid"), aliases))
		.collect()
}

/// Settings without the background checker, so tests stay deterministic
pub fn quiet_settings() -> GuardSettings {
	GuardSettings { background_checker: false, ..GuardSettings::default() }
}

pub fn environment(bypass_authorized: bool) -> Arc<dyn GuardEnvironment> {
	Arc::new(FixedEnvironment::new(bypass_authorized, None))
}

/// Builder over a fresh registry, quiet settings and the given bypass signal
pub fn builder(bypass_authorized: bool) -> AppConfigBuilder {
	setup_test_logging();
	AppConfig::builder(test_registry())
		.settings(quiet_settings())
		.environment(environment(bypass_authorized))
		.history(true)
}

pub fn config() -> AppConfig {
	builder(false).build().expect("Failed to build config")
}

pub fn authorized_config() -> AppConfig {
	builder(true).build().expect("Failed to build config")
}

pub fn list(items: &[&str]) -> ConfigValue {
	ConfigValue::list(items.iter().copied())
}

// vim: ts=4
