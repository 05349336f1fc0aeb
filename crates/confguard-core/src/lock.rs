//! Locked/unlocked gate over every mutating operation

use std::sync::Arc;

use crate::prelude::*;
use crate::settings::GuardEnvironment;

#[derive(Debug)]
pub struct LockGuard {
	locked: bool,
	environment: Arc<dyn GuardEnvironment>,
}

impl LockGuard {
	pub fn new(environment: Arc<dyn GuardEnvironment>) -> Self {
		Self { locked: false, environment }
	}

	pub fn is_locked(&self) -> bool {
		self.locked
	}

	pub fn lock(&mut self) {
		if !self.locked {
			info!("Configuration locked");
		}
		self.locked = true;
	}

	/// Unlock, which needs an authorized bypass while locked
	///
	/// Without `bypass` a locked guard logs a warning and stays locked.
	pub fn unlock(&mut self, bypass: bool) -> CgResult<()> {
		if !self.locked {
			return Ok(());
		}
		if !bypass {
			warn!("Unlock requested without bypass, configuration stays locked");
			return Ok(());
		}
		if !self.environment.bypass_authorized() {
			return Err(Error::BypassDenied { operation: "unlock" });
		}
		warn!("Configuration unlocked via bypass");
		self.locked = false;
		Ok(())
	}

	/// Gate for mutating operations
	pub fn ensure_unlocked(&self, bypass: bool, operation: &'static str) -> CgResult<()> {
		if bypass {
			if !self.environment.bypass_authorized() {
				return Err(Error::BypassDenied { operation });
			}
			if self.locked {
				warn!("{} bypassing configuration lock", operation);
			}
			return Ok(());
		}
		if self.locked {
			return Err(Error::Locked);
		}
		Ok(())
	}
}


// vim: ts=4
