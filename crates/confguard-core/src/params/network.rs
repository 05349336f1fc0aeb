//! Built-in parameter set for an outbound HTTP client
//!
//! Covers request limits, TLS policy, retry and circuit breaker tuning, and the switches that
//! relax SSRF protections.

use std::net::IpAddr;

use super::{ParamRegistry, ParamSpec};
use crate::prelude::*;

const NETWORK_CONFIG_VERSION: &str = "1.0.0";

const DEFAULT_DENYLIST_CIDRS: [&str; 6] =
	["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "127.0.0.0/8", "::1/128", "fc00::/7"];

const DEFAULT_SENSITIVE_HEADERS: [&str; 6] =
	["authorization", "cookie", "set-cookie", "proxy-authorization", "x-api-key", "x-amz-"];

/// Version of the parameter set below, bumped when defaults change
pub fn network_config_version() -> &'static str {
	NETWORK_CONFIG_VERSION
}

fn is_cidr(text: &str) -> bool {
	let Some((addr, prefix)) = text.split_once('/') else {
		return false;
	};
	let Ok(addr) = addr.parse::<IpAddr>() else {
		return false;
	};
	let max = if addr.is_ipv4() { 32 } else { 128 };
	prefix.parse::<u8>().is_ok_and(|p| p <= max)
}

fn all_items(value: &ConfigValue, pred: impl Fn(&ConfigValue) -> bool) -> bool {
	value.as_list().is_some_and(|items| items.iter().all(pred))
}

fn flag(name: &str, default: bool, description: &str) -> CgResult<ParamSpec> {
	ParamSpec::builder(name)
		.default(default)
		.value_type(ValueKind::Bool)
		.allow_none(false)
		.description(description)
		.build()
}

fn int_in(name: &str, default: i64, low: i64, high: i64, description: &str) -> CgResult<ParamSpec> {
	ParamSpec::builder(name)
		.default(default)
		.value_type(ValueKind::Int)
		.range(low as f64, high as f64)
		.allow_none(false)
		.description(description)
		.build()
}

fn optional_string(name: &str, description: &str) -> CgResult<ParamSpec> {
	ParamSpec::builder(name).value_type(ValueKind::String).description(description).build()
}

/// Specs for the network client parameter set
pub fn network_params() -> CgResult<Vec<ParamSpec>> {
	Ok(vec![
		ParamSpec::builder("ALLOWED_SCHEMES")
			.default(vec!["https", "http"])
			.value_type(ValueKind::List)
			.allow_none(false)
			.validator(|v| all_items(v, |s| matches!(s.as_str(), Some("http" | "https"))))
			.description("URL schemes outbound requests may use")
			.build()?,
		ParamSpec::builder("ALLOWED_HOSTS")
			.value_type(ValueKind::List)
			.validator(|v| all_items(v, |h| h.as_str().is_some_and(|s| !s.is_empty())))
			.description("Host allowlist, null allows any host")
			.build()?,
		ParamSpec::builder("DENYLIST_CIDRS")
			.default(DEFAULT_DENYLIST_CIDRS.to_vec())
			.value_type(ValueKind::List)
			.allow_none(false)
			.try_validator(|v| {
				let items = v.as_list().ok_or("expected a list")?;
				for item in items {
					match item.as_str() {
						Some(s) if is_cidr(s) => {}
						_ => return Err(format!("invalid CIDR: {}", item)),
					}
				}
				Ok::<(), String>(())
			})
			.description("Address ranges outbound requests must never reach")
			.build()?,
		flag("ALLOW_PRIVATE_IPS", false, "Permit requests to private address ranges")?,
		flag("BLOCK_LOCALHOST", true, "Reject requests resolving to loopback")?,
		ParamSpec::builder("ALLOWED_PORTS")
			.default(vec![80, 443])
			.value_type(ValueKind::List)
			.allow_none(false)
			.validator(|v| {
				all_items(v, |p| p.as_int().is_some_and(|p| p > 0 && p < 65536))
			})
			.description("Destination ports outbound requests may use")
			.build()?,
		int_in("MAX_CONCURRENCY", 10, 1, 1000, "Global limit of in-flight requests")?,
		int_in("PER_HOST_CONCURRENCY", 2, 1, 100, "Per-host limit of in-flight requests")?,
		int_in(
			"MAX_RESPONSE_SIZE",
			10_000_000,
			1_000,
			1_000_000_000,
			"Largest accepted response body in bytes",
		)?,
		int_in(
			"MAX_REQUEST_SIZE",
			50_000_000,
			1_000,
			1_000_000_000,
			"Largest request body in bytes",
		)?,
		int_in("MAX_HEADERS", 100, 1, 1000, "Most response headers accepted")?,
		int_in("MAX_HEADER_SIZE", 8192, 256, 65536, "Largest header line in bytes")?,
		ParamSpec::builder("DEFAULT_TIMEOUTS")
			.default(vec![5.0, 10.0])
			.value_type(ValueKind::List)
			.allow_none(false)
			.validator(|v| {
				v.as_list()
					.is_some_and(|t| t.len() == 2 && t.iter().all(|x| x.as_f64().is_some()))
			})
			.description("Connect and read timeouts in seconds")
			.build()?,
		int_in("REDIRECT_LIMIT", 3, 0, 20, "Redirects followed before giving up")?,
		flag("VERIFY", true, "Verify TLS certificates")?,
		ParamSpec::builder("TLS_MIN_VERSION")
			.default("TLSv1.2")
			.value_type(ValueKind::String)
			.allow_none(false)
			.validator(|v| matches!(v.as_str(), Some("TLSv1.2" | "TLSv1.3")))
			.description("Lowest TLS protocol version accepted")
			.build()?,
		ParamSpec::builder("CERTIFICATE_PINS")
			.value_type(ValueKind::Map)
			.description("Pinned certificate fingerprints per host")
			.build()?,
		flag("OCSP_CHECK", false, "Check certificate revocation via OCSP")?,
		int_in("RETRIES", 3, 0, 10, "Retry attempts for idempotent requests")?,
		int_in("CIRCUIT_BREAKER_THRESHOLD", 5, 1, 100, "Failures before a host circuit opens")?,
		int_in(
			"CIRCUIT_BREAKER_BACKOFF_SECONDS",
			60,
			1,
			3600,
			"Seconds an open circuit stays open",
		)?,
		ParamSpec::builder("HOOK_TIMEOUT")
			.default(2.0)
			.value_types([ValueKind::Int, ValueKind::Float])
			.range(0.1, 60.0)
			.allow_none(false)
			.description("Seconds a request hook may run")
			.build()?,
		ParamSpec::builder("SENSITIVE_HEADER_PATTERNS")
			.default(DEFAULT_SENSITIVE_HEADERS.to_vec())
			.value_type(ValueKind::List)
			.allow_none(false)
			.validator(|v| all_items(v, |h| h.as_str().is_some_and(|s| !s.is_empty())))
			.description("Header name prefixes redacted from logs")
			.build()?,
		flag("TELEMETRY_ENABLED", false, "Emit request telemetry")?,
		ParamSpec::builder("AUDIT_LOG_PATH")
			.default("<application-default-path>")
			.value_type(ValueKind::String)
			.description("Where request audit records are written")
			.build()?,
		optional_string("BYPASS_REASON", "Justification recorded for guarded overrides")?,
		optional_string("BYPASS_TOKEN", "Token authorizing guarded overrides")?,
		optional_string("IDEMPOTENCY_KEY", "Idempotency key attached to retried requests")?,
		flag("ALLOW_UNBOUNDED_REDIRECTS", false, "Follow redirects without a limit")?,
		flag("ALLOW_CROSS_HOST_AUTH", false, "Forward credentials across redirect hosts")?,
		flag("ALLOW_DNS_REBIND", false, "Accept DNS answers that change between checks")?,
	])
}

/// Register the network parameter set
pub fn register_network_params(registry: &ParamRegistry, override_existing: bool) -> CgResult<()> {
	let specs = network_params()?;
	let count = specs.len();
	for spec in specs {
		registry.register(spec, [""; 0], override_existing)?;
	}
	info!("Registered {} network parameters (version {})", count, NETWORK_CONFIG_VERSION);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_validate() {
		for spec in network_params().unwrap() {
			assert!(
				spec.validate(spec.default_value()).is_ok(),
				"default of {} must satisfy its own spec",
				spec.name()
			);
		}
	}

	#[test]
	fn test_register_network_params() {
		let registry = ParamRegistry::new();
		register_network_params(&registry, false).unwrap();
		assert!(registry.has("max_concurrency"));
		assert!(registry.has("TLS_MIN_VERSION"));

		let err = register_network_params(&registry, false).unwrap_err();
		assert!(matches!(err, Error::DuplicateParameter { .. }));
		register_network_params(&registry, true).unwrap();
	}

	#[test]
	fn test_cidr_validator() {
		assert!(is_cidr("10.0.0.0/8"));
		assert!(is_cidr("fc00::/7"));
		assert!(!is_cidr("10.0.0.0/33"));
		assert!(!is_cidr("example.com/8"));
		assert!(!is_cidr("10.0.0.0"));

		let registry = ParamRegistry::new();
		register_network_params(&registry, false).unwrap();
		let (_, spec) = registry.resolve_and_get("DENYLIST_CIDRS").unwrap();
		let err = spec.validate(&ConfigValue::from(vec!["10.0.0.0/8", "bogus"])).unwrap_err();
		assert!(err.to_string().contains("invalid CIDR"));
	}

	#[test]
	fn test_ports_and_schemes() {
		let registry = ParamRegistry::new();
		register_network_params(&registry, false).unwrap();
		let (_, ports) = registry.resolve_and_get("ALLOWED_PORTS").unwrap();
		assert!(ports.validate(&ConfigValue::from(vec![8080])).is_ok());
		assert!(ports.validate(&ConfigValue::from(vec![0])).is_err());

		let (_, schemes) = registry.resolve_and_get("ALLOWED_SCHEMES").unwrap();
		assert!(schemes.validate(&ConfigValue::from(vec!["ftp"])).is_err());
	}
}

// vim: ts=4
