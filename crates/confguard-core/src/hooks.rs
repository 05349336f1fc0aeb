//! Post-update hooks

use std::str::FromStr;
use std::sync::Arc;

use crate::prelude::*;
use crate::store::ConfigSnapshot;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Callback run with the committed snapshot after every change
pub type PostUpdateHook = Arc<dyn Fn(&ConfigSnapshot) -> Result<(), HookError> + Send + Sync>;

/// What happens when a hook fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookFailurePolicy {
	/// Swallow, debug log only
	Ignore,
	/// Swallow, error log
	#[default]
	Log,
	/// Return the first failure and skip the remaining hooks
	Raise,
}

impl FromStr for HookFailurePolicy {
	type Err = Error;

	fn from_str(s: &str) -> CgResult<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"ignore" => Ok(Self::Ignore),
			"log" => Ok(Self::Log),
			"raise" => Ok(Self::Raise),
			other => Err(Error::InvalidSetting {
				name: "hook_failure_policy".into(),
				reason: format!("unknown policy '{}', expected ignore, log or raise", other),
			}),
		}
	}
}

#[derive(Default)]
pub struct HookBus {
	hooks: Vec<PostUpdateHook>,
	policy: HookFailurePolicy,
}

impl std::fmt::Debug for HookBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HookBus")
			.field("hooks", &self.hooks.len())
			.field("policy", &self.policy)
			.finish()
	}
}

impl HookBus {
	pub fn new(policy: HookFailurePolicy) -> Self {
		Self { hooks: Vec::new(), policy }
	}

	pub fn policy(&self) -> HookFailurePolicy {
		self.policy
	}

	pub fn register<F>(&mut self, hook: F)
	where
		F: Fn(&ConfigSnapshot) -> Result<(), HookError> + Send + Sync + 'static,
	{
		self.hooks.push(Arc::new(hook));
	}

	pub fn len(&self) -> usize {
		self.hooks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.hooks.is_empty()
	}

	pub fn clear(&mut self) {
		self.hooks.clear();
	}

	/// Hooks in registration order
	///
	/// Callers run them through [`HookBus::dispatch`] after releasing their own borrows, so a
	/// hook can call back into the configuration.
	pub fn hooks(&self) -> Vec<PostUpdateHook> {
		self.hooks.clone()
	}

	/// Run the registered hooks in order
	pub fn run(&self, snapshot: &ConfigSnapshot) -> CgResult<()> {
		Self::dispatch(&self.hooks, self.policy, snapshot)
	}

	/// Run `hooks` in order under `policy`
	pub fn dispatch(
		hooks: &[PostUpdateHook],
		policy: HookFailurePolicy,
		snapshot: &ConfigSnapshot,
	) -> CgResult<()> {
		for (index, hook) in hooks.iter().enumerate() {
			let Err(err) = hook(snapshot) else {
				continue;
			};
			match policy {
				HookFailurePolicy::Ignore => {
					debug!("Post-update hook #{} failed (ignored): {}", index, err);
				}
				HookFailurePolicy::Log => {
					error!("Post-update hook #{} failed: {}", index, err);
				}
				HookFailurePolicy::Raise => {
					error!("Post-update hook #{} failed, aborting remaining hooks: {}", index, err);
					return Err(Error::Hook { index, message: err.to_string() });
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn counting(
		counter: &Arc<AtomicUsize>,
	) -> impl Fn(&ConfigSnapshot) -> Result<(), HookError> + Send + Sync + 'static {
		let counter = Arc::clone(counter);
		move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn failing(_: &ConfigSnapshot) -> Result<(), HookError> {
		Err("boom".into())
	}

	#[test]
	fn test_hooks_run_in_order_with_snapshot() {
		let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
		let mut bus = HookBus::default();
		for id in 0..3 {
			let seen = Arc::clone(&seen);
			bus.register(move |snap| {
				seen.lock().push((id, snap.len()));
				Ok(())
			});
		}
		let snapshot = ConfigSnapshot::new([("A".into(), ConfigValue::Int(1))].into());
		bus.run(&snapshot).unwrap();
		assert_eq!(*seen.lock(), vec![(0, 1), (1, 1), (2, 1)]);
	}

	#[test]
	fn test_log_policy_continues() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = HookBus::new(HookFailurePolicy::Log);
		bus.register(failing);
		bus.register(counting(&counter));
		bus.run(&ConfigSnapshot::default()).unwrap();
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_raise_policy_aborts() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = HookBus::new(HookFailurePolicy::Raise);
		bus.register(counting(&counter));
		bus.register(failing);
		bus.register(counting(&counter));
		let err = bus.run(&ConfigSnapshot::default()).unwrap_err();
		assert!(matches!(err, Error::Hook { index: 1, ref message } if message == "boom"));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_policy_from_str() {
		assert_eq!("RAISE".parse::<HookFailurePolicy>().unwrap(), HookFailurePolicy::Raise);
		assert_eq!(" ignore ".parse::<HookFailurePolicy>().unwrap(), HookFailurePolicy::Ignore);
		assert!("explode".parse::<HookFailurePolicy>().is_err());
	}
}

// vim: ts=4
