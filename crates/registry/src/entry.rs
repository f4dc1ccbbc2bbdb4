//! Registered service entries and the references handed to consumers.
//!
//! An entry lives as long as any [`ServiceReference`] to it. Unregistering
//! only flips the `valid` flag and drops the entry from the published
//! snapshot; the implementation handle is released once the last reference
//! (snapshot, tracker or caller) goes away.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use rustc_hash::FxHashMap;
use tether_filter::{Properties, PropertyValue};

use crate::ids::{BundleId, ServiceId};
use crate::service::{SERVICE_RANKING, ServiceObject, ServiceSource};

/// Per-bundle usage of one service.
pub(crate) struct Usage {
	pub(crate) count: usize,
	pub(crate) service: ServiceObject,
}

pub(crate) struct ServiceEntry {
	pub(crate) id: ServiceId,
	pub(crate) name: Arc<str>,
	pub(crate) owner: BundleId,
	pub(crate) properties: ArcSwap<Properties>,
	pub(crate) source: ServiceSource,
	pub(crate) valid: AtomicBool,
	pub(crate) usages: Mutex<FxHashMap<BundleId, Usage>>,
	/// Serializes event delivery for this entry. Reentrant so a listener may
	/// modify or unregister the service it is being notified about.
	pub(crate) gate: ReentrantMutex<()>,
}

impl Drop for ServiceEntry {
	fn drop(&mut self) {
		tracing::trace!(service.id = %self.id, service.name = %self.name, "service entry released");
	}
}

/// Shared handle to a registered (or formerly registered) service.
///
/// Equality and hashing use the service id.
#[derive(Clone)]
pub struct ServiceReference {
	pub(crate) entry: Arc<ServiceEntry>,
}

impl ServiceReference {
	pub(crate) fn new(entry: ServiceEntry) -> Self {
		Self { entry: Arc::new(entry) }
	}

	pub fn id(&self) -> ServiceId {
		self.entry.id
	}

	pub fn name(&self) -> &str {
		&self.entry.name
	}

	pub fn owner(&self) -> BundleId {
		self.entry.owner
	}

	/// Current properties. The returned set is a point-in-time copy.
	pub fn properties(&self) -> Arc<Properties> {
		self.entry.properties.load_full()
	}

	pub fn property(&self, key: &str) -> Option<PropertyValue> {
		self.entry.properties.load().get(key).cloned()
	}

	pub fn ranking(&self) -> i64 {
		self.entry.properties.load().get_as_long(SERVICE_RANKING, 0)
	}

	/// False once the service has been unregistered.
	pub fn is_valid(&self) -> bool {
		self.entry.valid.load(AtomicOrdering::Acquire)
	}

	/// Bundles currently holding the service, in id order.
	pub fn using_bundles(&self) -> Vec<BundleId> {
		let mut bundles: Vec<_> = self.entry.usages.lock().keys().copied().collect();
		bundles.sort_unstable();
		bundles
	}

	pub fn usage_count(&self, bundle: BundleId) -> usize {
		self.entry.usages.lock().get(&bundle).map_or(0, |u| u.count)
	}

	/// Holds this entry's event gate for the lifetime of the guard.
	pub(crate) fn serialize(&self) -> ReentrantMutexGuard<'_, ()> {
		self.entry.gate.lock()
	}

	/// Rank order: higher ranking first, then lower id.
	pub fn rank_cmp(&self, other: &Self) -> Ordering {
		other.ranking().cmp(&self.ranking()).then_with(|| self.id().cmp(&other.id()))
	}
}

impl PartialEq for ServiceReference {
	fn eq(&self, other: &Self) -> bool {
		self.entry.id == other.entry.id
	}
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.entry.id.hash(state);
	}
}

impl fmt::Debug for ServiceReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceReference")
			.field("id", &self.entry.id)
			.field("name", &self.entry.name)
			.field("owner", &self.entry.owner)
			.field("valid", &self.is_valid())
			.finish()
	}
}

/// Sorts `refs` into rank order.
pub(crate) fn sort_by_rank(refs: &mut [ServiceReference]) {
	refs.sort_by(ServiceReference::rank_cmp);
}
