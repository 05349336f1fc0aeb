pub use confguard_types::prelude::*;

// vim: ts=4
