use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyId(pub u64);

impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "cmp#{}", self.0)
	}
}

impl fmt::Display for DependencyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "dep#{}", self.0)
	}
}

static COMPONENT_IDS: AtomicU64 = AtomicU64::new(1);
static DEPENDENCY_IDS: AtomicU64 = AtomicU64::new(1);

impl ComponentId {
	pub(crate) fn next() -> Self {
		Self(COMPONENT_IDS.fetch_add(1, Ordering::Relaxed))
	}
}

impl DependencyId {
	pub(crate) fn next() -> Self {
		Self(DEPENDENCY_IDS.fetch_add(1, Ordering::Relaxed))
	}
}
