//! Shared types for the confguard configuration guard.
//!
//! This crate holds the value model, key abstraction, error taxonomy and the persistence adapter
//! trait. Adapter crates depend on it alone, without pulling in the core.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod error;
pub mod key;
pub mod persistence_adapter;
pub mod prelude;
pub mod value;

// vim: ts=4
