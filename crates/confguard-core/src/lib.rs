//! Core of the confguard configuration guard.
//!
//! Parameter specs and their registry, validation, the two-layer value store, integrity
//! sealing, the lock gate, post-update hooks and the [`AppConfig`] façade tying them together.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod history;
pub mod hooks;
pub mod integrity;
pub mod lock;
pub mod params;
pub mod prelude;
pub mod settings;
pub mod store;
pub mod validation;

pub use config::{AppConfig, AppConfigBuilder, ChangeOptions, Changes, ModificationRecord};
pub use params::{ParamRegistry, ParamSpec};
pub use store::ConfigSnapshot;

// vim: ts=4
