use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique service id. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub u64);

/// Identity of the bundle that owns or uses a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(pub u64);

impl BundleId {
	/// The framework itself.
	pub const SYSTEM: BundleId = BundleId(0);
}

/// Handle of a registered service listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ServiceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl fmt::Display for BundleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl fmt::Display for ListenerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Monotonic id source.
#[derive(Debug)]
pub(crate) struct IdClock(AtomicU64);

impl IdClock {
	pub(crate) const fn starting_at(first: u64) -> Self {
		Self(AtomicU64::new(first))
	}

	pub(crate) fn next(&self) -> u64 {
		self.0.fetch_add(1, Ordering::Relaxed)
	}

	/// The id the next call to [`IdClock::next`] would return.
	pub(crate) fn peek(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}
