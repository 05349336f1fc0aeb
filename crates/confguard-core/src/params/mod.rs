//! Parameter definitions: specs, the registry and built-in parameter sets

pub mod network;
pub mod registry;
pub mod spec;

pub use registry::{ParamRegistry, RegistryState};
pub use spec::{Bounds, ParamDescriptor, ParamSpec, ParamSpecBuilder, ParamValidator};

/// Canonical form of a parameter name or alias
pub fn canonical_name(name: &str) -> String {
	name.trim().to_uppercase()
}

// vim: ts=4
