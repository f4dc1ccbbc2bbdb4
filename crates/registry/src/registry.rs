//! The service registry.
//!
//! # Role
//!
//! Maps service names to rank-ordered registrations and dispatches
//! [`ServiceEvent`]s to listeners.
//!
//! # Invariants
//!
//! - Published snapshots keep every per-name list in rank order
//!   (see `invariants::test_rank_order_after_mutation`).
//! - Concurrent registrations are linearizable (see `invariants::test_no_lost_registrations`).
//! - An unregistered entry stays alive while references to it exist
//!   (see `invariants::test_deferred_release`).
//! - Filters are evaluated on a loaded snapshot, never under a registry lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use rustc_hash::FxHashMap;
use tether_filter::Properties;
use tracing::{debug, trace, warn};

use crate::entry::{ServiceEntry, ServiceReference, Usage, sort_by_rank};
use crate::error::RegistryError;
use crate::event::{ListenerEntry, ServiceEvent, ServiceEventKind, ServiceListener};
use crate::ids::{BundleId, IdClock, ListenerId, ServiceId};
use crate::registration::ServiceRegistration;
use crate::service::{OBJECT_CLASS, SERVICE_BUNDLE_ID, SERVICE_ID, ServiceObject, ServiceQuery, ServiceSource};
use crate::snapshot::Snapshot;

struct RegistryInner {
	snap: ArcSwap<Snapshot>,
	/// Listeners in registration order.
	listeners: RwLock<Vec<Arc<ListenerEntry>>>,
	service_ids: IdClock,
	listener_ids: IdClock,
}

/// Thread-safe service registry. Cloning yields another handle to the same
/// registry.
#[derive(Clone)]
pub struct ServiceRegistry {
	inner: Arc<RegistryInner>,
}

impl Default for ServiceRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				snap: ArcSwap::from_pointee(Snapshot::default()),
				listeners: RwLock::new(Vec::new()),
				service_ids: IdClock::starting_at(1),
				listener_ids: IdClock::starting_at(1),
			}),
		}
	}

	/// Registers a service under `name` on behalf of `owner`.
	///
	/// The properties are copied and the standard `objectClass`,
	/// `service.id` and `service.bundleid` entries are set on the copy.
	/// Matching listeners receive [`ServiceEventKind::Registered`] before
	/// this returns.
	///
	/// # Errors
	///
	/// [`RegistryError::IllegalArgument`] when `name` is blank.
	pub fn register(&self, owner: BundleId, name: &str, properties: Properties, source: ServiceSource) -> Result<ServiceRegistration, RegistryError> {
		let name = name.trim();
		if name.is_empty() {
			return Err(RegistryError::IllegalArgument("service name must not be empty".to_string()));
		}

		let id = ServiceId(self.inner.service_ids.next());
		let reference = ServiceReference::new(ServiceEntry {
			id,
			name: Arc::from(name),
			owner,
			properties: ArcSwap::from_pointee(standard_properties(properties, name, id, owner)),
			source,
			valid: AtomicBool::new(true),
			usages: Mutex::new(FxHashMap::default()),
			gate: ReentrantMutex::new(()),
		});

		// Gate before publishing so an unregister racing in from another
		// thread cannot overtake the Registered event.
		let _gate = reference.serialize();
		self.publish(|snap| Some(snap.with_registered(&reference)));
		debug!(service.id = %id, service.name = name, bundle = %owner, "service registered");
		self.fire(ServiceEventKind::Registered, &reference, None);

		Ok(ServiceRegistration::new(self.clone(), reference.clone()))
	}

	/// Unregisters the service with `id`.
	///
	/// # Errors
	///
	/// [`RegistryError::IllegalState`] when the service was already
	/// unregistered, [`RegistryError::NotFound`] for ids never handed out.
	pub fn unregister(&self, id: ServiceId) -> Result<(), RegistryError> {
		match self.find_service(id) {
			Some(reference) => self.unregister_reference(&reference),
			None if id.0 < self.inner.service_ids.peek() => Err(RegistryError::IllegalState(format!("service {id} is already unregistered"))),
			None => Err(RegistryError::NotFound(format!("service {id}"))),
		}
	}

	pub(crate) fn unregister_reference(&self, reference: &ServiceReference) -> Result<(), RegistryError> {
		if !reference.entry.valid.swap(false, Ordering::AcqRel) {
			return Err(RegistryError::IllegalState(format!("service {} is already unregistered", reference.id())));
		}

		let _gate = reference.serialize();
		self.publish(|snap| snap.without(reference.id()));
		debug!(service.id = %reference.id(), service.name = reference.name(), "service unregistered");
		self.fire(ServiceEventKind::Unregistering, reference, None);
		Ok(())
	}

	/// Replaces the properties of the service with `id`.
	///
	/// Standard properties are re-applied, so `objectClass`, `service.id`
	/// and `service.bundleid` cannot be changed. The rank order is updated
	/// before listeners receive the modification.
	pub fn set_properties(&self, id: ServiceId, properties: Properties) -> Result<(), RegistryError> {
		let reference = self.find_service(id).ok_or_else(|| RegistryError::NotFound(format!("service {id}")))?;
		self.modify_reference(&reference, properties)
	}

	pub(crate) fn modify_reference(&self, reference: &ServiceReference, properties: Properties) -> Result<(), RegistryError> {
		let _gate = reference.serialize();
		if !reference.is_valid() {
			return Err(RegistryError::IllegalState(format!("service {} is unregistered", reference.id())));
		}

		let entry = &reference.entry;
		let updated = standard_properties(properties, &entry.name, entry.id, entry.owner);
		let previous = entry.properties.swap(Arc::new(updated));
		self.publish(|snap| snap.resorted(entry.id));
		debug!(service.id = %entry.id, service.name = %entry.name, "service properties modified");
		self.fire(ServiceEventKind::Modified, reference, Some(&*previous));
		Ok(())
	}

	/// Point-in-time list of services matching `name` and `filter`, in rank order.
	///
	/// # Errors
	///
	/// [`RegistryError::Filter`] when `filter` does not parse.
	pub fn get_service_references(&self, name: Option<&str>, filter: Option<&str>) -> Result<Vec<ServiceReference>, RegistryError> {
		let query = ServiceQuery::new(name, filter)?;
		Ok(self.find_references(&query))
	}

	pub fn find_references(&self, query: &ServiceQuery) -> Vec<ServiceReference> {
		let snap = self.inner.snap.load_full();
		match query.name() {
			Some(name) => snap
				.by_name(name)
				.iter()
				.filter(|r| query.matches(&r.properties()))
				.cloned()
				.collect(),
			None => {
				let mut refs: Vec<_> = snap.iter().filter(|r| query.matches(&r.properties())).cloned().collect();
				sort_by_rank(&mut refs);
				refs
			}
		}
	}

	/// Highest ranked service matching `query`.
	pub fn find_reference(&self, query: &ServiceQuery) -> Option<ServiceReference> {
		self.find_references(query).into_iter().next()
	}

	pub fn find_service(&self, id: ServiceId) -> Option<ServiceReference> {
		self.inner.snap.load().get(id).cloned()
	}

	pub fn is_registered(&self, id: ServiceId) -> bool {
		self.inner.snap.load().get(id).is_some()
	}

	pub fn service_count(&self) -> usize {
		self.inner.snap.load().len()
	}

	/// Services registered by `owner`, in id order.
	pub fn registered_services(&self, owner: BundleId) -> Vec<ServiceReference> {
		self.inner.snap.load().owned_by(owner).cloned().collect()
	}

	/// Registered services that `bundle` currently holds.
	pub fn services_in_use(&self, bundle: BundleId) -> Vec<ServiceReference> {
		self.inner
			.snap
			.load()
			.iter()
			.filter(|r| r.usage_count(bundle) > 0)
			.cloned()
			.collect()
	}

	/// Unregisters everything `owner` registered, returning how many
	/// services were removed.
	pub fn unregister_all(&self, owner: BundleId) -> usize {
		self.registered_services(owner)
			.iter()
			.filter(|r| self.unregister_reference(r).is_ok())
			.count()
	}

	/// Obtains the service object for `bundle`.
	///
	/// Plain services hand out the registered object. Factories are asked
	/// once per bundle; later calls from the same bundle reuse the cached
	/// object and bump the usage count. Returns `None` for unregistered
	/// services or when the factory declines.
	pub fn get_service(&self, bundle: BundleId, reference: &ServiceReference) -> Option<ServiceObject> {
		if !reference.is_valid() {
			trace!(service.id = %reference.id(), bundle = %bundle, "get_service on unregistered service");
			return None;
		}

		// The factory runs under the usage lock so it is asked at most once
		// per bundle.
		let mut usages = reference.entry.usages.lock();
		if let Some(usage) = usages.get_mut(&bundle) {
			usage.count += 1;
			return Some(Arc::clone(&usage.service));
		}

		let service = match &reference.entry.source {
			ServiceSource::Plain(service) => Arc::clone(service),
			ServiceSource::Factory(factory) => match factory.get_service(bundle, reference) {
				Some(service) => service,
				None => {
					warn!(service.id = %reference.id(), service.name = reference.name(), bundle = %bundle, "service factory returned no service");
					return None;
				}
			},
		};
		usages.insert(
			bundle,
			Usage {
				count: 1,
				service: Arc::clone(&service),
			},
		);
		Some(service)
	}

	/// Releases one usage of the service by `bundle`.
	///
	/// # Errors
	///
	/// [`RegistryError::IllegalState`] when `bundle` holds no usage.
	pub fn unget_service(&self, bundle: BundleId, reference: &ServiceReference) -> Result<(), RegistryError> {
		let released = {
			let mut usages = reference.entry.usages.lock();
			let Some(usage) = usages.get_mut(&bundle) else {
				return Err(RegistryError::IllegalState(format!(
					"bundle {bundle} does not hold service {}",
					reference.id()
				)));
			};
			usage.count -= 1;
			if usage.count > 0 {
				return Ok(());
			}
			usages.remove(&bundle)
		};

		if let (Some(usage), ServiceSource::Factory(factory)) = (released, &reference.entry.source) {
			factory.unget_service(bundle, reference, &usage.service);
		}
		Ok(())
	}

	/// Adds a listener for services matching `query`.
	///
	/// Listeners are notified in the order they were added.
	pub fn add_service_listener(&self, bundle: BundleId, query: ServiceQuery, listener: Arc<dyn ServiceListener>) -> ListenerId {
		let id = ListenerId(self.inner.listener_ids.next());
		debug!(listener = %id, bundle = %bundle, query = %query, "service listener added");
		self.inner
			.listeners
			.write()
			.push(Arc::new(ListenerEntry::new(id, bundle, query, listener)));
		id
	}

	/// Removes a listener, blocking until deliveries to it on other threads
	/// have finished.
	pub fn remove_service_listener(&self, id: ListenerId) -> Result<(), RegistryError> {
		let entry = {
			let mut listeners = self.inner.listeners.write();
			let pos = listeners
				.iter()
				.position(|l| l.id == id)
				.ok_or_else(|| RegistryError::NotFound(format!("listener {id}")))?;
			listeners.remove(pos)
		};
		entry.retire();
		debug!(listener = %id, bundle = %entry.bundle, "service listener removed");
		Ok(())
	}

	/// Removes every listener added by `bundle`.
	pub fn remove_listeners_of(&self, bundle: BundleId) -> usize {
		let ids: Vec<_> = self
			.inner
			.listeners
			.read()
			.iter()
			.filter(|l| l.bundle == bundle)
			.map(|l| l.id)
			.collect();
		ids.into_iter().filter(|id| self.remove_service_listener(*id).is_ok()).count()
	}

	pub fn listener_count(&self) -> usize {
		self.inner.listeners.read().len()
	}

	/// Installs the snapshot produced by `edit`, retrying on contention.
	/// Returns `false` when `edit` declines.
	fn publish(&self, edit: impl Fn(&Snapshot) -> Option<Snapshot>) -> bool {
		loop {
			let old = self.inner.snap.load_full();
			let Some(next) = edit(&old) else {
				return false;
			};
			let prev = self.inner.snap.compare_and_swap(&old, Arc::new(next));
			if Arc::ptr_eq(&prev, &old) {
				return true;
			}
		}
	}

	fn fire(&self, kind: ServiceEventKind, reference: &ServiceReference, previous: Option<&Properties>) {
		let listeners: Vec<_> = self.inner.listeners.read().clone();
		let current = reference.properties();
		for listener in &listeners {
			let Some(kind) = listener.filter_event(kind, &current, previous) else {
				continue;
			};
			listener.deliver(&ServiceEvent {
				kind,
				reference: reference.clone(),
			});
		}
	}

	#[cfg(any(test, doc))]
	pub(crate) fn snapshot_is_consistent(&self) -> bool {
		self.inner.snap.load().is_consistent()
	}
}

fn standard_properties(mut properties: Properties, name: &str, id: ServiceId, owner: BundleId) -> Properties {
	properties.set(OBJECT_CLASS, name);
	properties.set(SERVICE_ID, id.0);
	properties.set(SERVICE_BUNDLE_ID, owner.0);
	properties
}
