//! Service trackers.
//!
//! A [`ServiceTracker`] keeps a rank-ordered view of the services matching
//! its query and reports changes through callbacks.
//!
//! # Ordering
//!
//! For one service the callbacks run as add, then any number of modify, then
//! remove. Events for a service are serialized by its registry entry, and the
//! initial bind in [`ServiceTracker::open`] takes the same gate, so a
//! registration racing with `open` is added exactly once. `close` waits for
//! listener deliveries and for the initial bind running on other threads.
//!
//! Callbacks run outside the tracker's locks. The tracked set is updated
//! before the add callback and before the remove callback.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, ReentrantMutex, RwLock};
use rustc_hash::FxHashSet;
use tether_filter::Properties;
use tracing::{debug, trace, warn};

use crate::entry::ServiceReference;
use crate::error::RegistryError;
use crate::event::{ServiceEvent, ServiceEventKind};
use crate::ids::{BundleId, ListenerId, ServiceId};
use crate::registry::ServiceRegistry;
use crate::service::{ServiceObject, ServiceQuery};


pub type TrackerCallback = Arc<dyn Fn(&TrackedService) + Send + Sync>;
/// Receives the highest ranked tracked service whenever it changes.
pub type SetCallback = Arc<dyn Fn(Option<&TrackedService>) + Send + Sync>;
/// Decides whether a matching service is tracked.
pub type AddingCallback = Arc<dyn Fn(&ServiceReference, &ServiceObject) -> bool + Send + Sync>;

/// A tracked service together with the object obtained for it.
#[derive(Clone)]
pub struct TrackedService {
	reference: ServiceReference,
	service: ServiceObject,
}

impl TrackedService {
	pub fn id(&self) -> ServiceId {
		self.reference.id()
	}

	pub fn reference(&self) -> &ServiceReference {
		&self.reference
	}

	pub fn service(&self) -> &ServiceObject {
		&self.service
	}

	pub fn properties(&self) -> Arc<Properties> {
		self.reference.properties()
	}

	/// Downcasts the service object.
	pub fn get<S: Any>(&self) -> Option<&S> {
		self.service.downcast_ref::<S>()
	}
}

impl fmt::Debug for TrackedService {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("TrackedService").field(&self.reference).finish()
	}
}

/// Builder for a [`ServiceTracker`].
#[derive(Clone, Default)]
pub struct TrackerOptions {
	service_name: Option<String>,
	filter: Option<String>,
	adding: Option<AddingCallback>,
	on_add: Option<TrackerCallback>,
	on_modify: Option<TrackerCallback>,
	on_remove: Option<TrackerCallback>,
	on_set: Option<SetCallback>,
}

impl TrackerOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn service(mut self, name: impl Into<String>) -> Self {
		self.service_name = Some(name.into());
		self
	}

	pub fn filter(mut self, filter: impl Into<String>) -> Self {
		self.filter = Some(filter.into());
		self
	}

	pub fn adding(mut self, f: impl Fn(&ServiceReference, &ServiceObject) -> bool + Send + Sync + 'static) -> Self {
		self.adding = Some(Arc::new(f));
		self
	}

	pub fn on_add(mut self, f: impl Fn(&TrackedService) + Send + Sync + 'static) -> Self {
		self.on_add = Some(Arc::new(f));
		self
	}

	pub fn on_modify(mut self, f: impl Fn(&TrackedService) + Send + Sync + 'static) -> Self {
		self.on_modify = Some(Arc::new(f));
		self
	}

	pub fn on_remove(mut self, f: impl Fn(&TrackedService) + Send + Sync + 'static) -> Self {
		self.on_remove = Some(Arc::new(f));
		self
	}

	pub fn on_set(mut self, f: impl Fn(Option<&TrackedService>) + Send + Sync + 'static) -> Self {
		self.on_set = Some(Arc::new(f));
		self
	}

	/// The query these options select services with.
	pub fn query(&self) -> Result<ServiceQuery, RegistryError> {
		ServiceQuery::new(self.service_name.as_deref(), self.filter.as_deref())
	}
}

struct TrackerInner {
	registry: ServiceRegistry,
	bundle: BundleId,
	query: ServiceQuery,
	options: TrackerOptions,
	listener: Mutex<Option<ListenerId>>,
	closing: AtomicBool,
	/// Thread running the initial bind of `open`.
	binder: Mutex<Option<ThreadId>>,
	bound: Condvar,
	/// Rank ordered.
	tracked: RwLock<Vec<TrackedService>>,
	/// Services whose add is in progress on some thread.
	pending: Mutex<FxHashSet<ServiceId>>,
	/// Last id reported through `on_set`.
	highest: ReentrantMutex<Cell<Option<ServiceId>>>,
}

/// Tracks services matching a name and/or filter on behalf of a bundle.
///
/// Created closed. Dropping the tracker closes it.
pub struct ServiceTracker {
	inner: Arc<TrackerInner>,
}

impl ServiceTracker {
	/// # Errors
	///
	/// [`RegistryError::Filter`] when the filter in `options` does not parse.
	pub fn new(registry: &ServiceRegistry, bundle: BundleId, options: TrackerOptions) -> Result<Self, RegistryError> {
		let query = options.query()?;
		Ok(Self::for_query(registry, bundle, query, options))
	}

	/// Builds a tracker for an already parsed query. The service name and
	/// filter in `options` are ignored.
	pub fn for_query(registry: &ServiceRegistry, bundle: BundleId, query: ServiceQuery, options: TrackerOptions) -> Self {
		Self {
			inner: Arc::new(TrackerInner {
				registry: registry.clone(),
				bundle,
				query,
				options,
				listener: Mutex::new(None),
				closing: AtomicBool::new(false),
				binder: Mutex::new(None),
				bound: Condvar::new(),
				tracked: RwLock::new(Vec::new()),
				pending: Mutex::new(FxHashSet::default()),
				highest: ReentrantMutex::new(Cell::new(None)),
			}),
		}
	}

	/// Starts listening and binds every currently matching service.
	///
	/// # Errors
	///
	/// [`RegistryError::IllegalState`] when the tracker is already open.
	pub fn open(&self) -> Result<(), RegistryError> {
		let inner = &self.inner;
		{
			let mut listener = inner.listener.lock();
			if listener.is_some() {
				return Err(RegistryError::IllegalState(format!("tracker {} is already open", inner.query)));
			}
			inner.closing.store(false, Ordering::Release);
			*inner.binder.lock() = Some(thread::current().id());

			let weak: Weak<TrackerInner> = Arc::downgrade(inner);
			let id = inner.registry.add_service_listener(
				inner.bundle,
				inner.query.clone(),
				Arc::new(move |event: &ServiceEvent| {
					if let Some(inner) = weak.upgrade() {
						inner.service_changed(event);
					}
				}),
			);
			*listener = Some(id);
		}
		debug!(tracker = %inner.query, bundle = %inner.bundle, "tracker opened");

		let _binding = Binding(inner);
		for reference in inner.registry.find_references(&inner.query) {
			let _gate = reference.serialize();
			inner.track(&reference, false);
		}
		Ok(())
	}

	/// Stops listening, then removes every tracked service. Closing a closed
	/// tracker does nothing, and a callback may close its own tracker.
	pub fn close(&self) {
		let inner = &self.inner;
		let Some(listener) = inner.listener.lock().take() else {
			return;
		};
		inner.closing.store(true, Ordering::Release);
		if let Err(err) = inner.registry.remove_service_listener(listener) {
			warn!(tracker = %inner.query, error = %err, "failed to remove tracker listener");
		}
		inner.wait_bound();

		let drained = std::mem::take(&mut *inner.tracked.write());
		for item in &drained {
			if let Some(on_remove) = &inner.options.on_remove {
				on_remove(item);
			}
			inner.release(&item.reference);
		}
		inner.update_highest();
		debug!(tracker = %inner.query, released = drained.len(), "tracker closed");
	}

	pub fn is_open(&self) -> bool {
		self.inner.listener.lock().is_some()
	}

	pub fn query(&self) -> &ServiceQuery {
		&self.inner.query
	}

	/// Highest ranked tracked service.
	pub fn service(&self) -> Option<TrackedService> {
		self.inner.tracked.read().first().cloned()
	}

	pub fn reference(&self) -> Option<ServiceReference> {
		self.inner.tracked.read().first().map(|t| t.reference.clone())
	}

	/// All tracked services in rank order.
	pub fn services(&self) -> Vec<TrackedService> {
		self.inner.tracked.read().clone()
	}

	pub fn references(&self) -> Vec<ServiceReference> {
		self.inner.tracked.read().iter().map(|t| t.reference.clone()).collect()
	}

	pub fn size(&self) -> usize {
		self.inner.tracked.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.size() == 0
	}

	/// Calls `f` with the highest ranked service, returning whether one was
	/// tracked.
	pub fn use_service(&self, f: impl FnOnce(&TrackedService)) -> bool {
		match self.service() {
			Some(item) => {
				f(&item);
				true
			}
			None => false,
		}
	}

	/// Calls `f` for every tracked service in rank order, returning the count.
	pub fn use_services(&self, mut f: impl FnMut(&TrackedService)) -> usize {
		let items = self.services();
		items.iter().for_each(&mut f);
		items.len()
	}
}

impl Drop for ServiceTracker {
	fn drop(&mut self) {
		self.close();
	}
}

impl fmt::Debug for ServiceTracker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceTracker")
			.field("query", &self.inner.query.to_string())
			.field("open", &self.is_open())
			.field("size", &self.size())
			.finish()
	}
}

/// Removes a pending claim when the add attempt ends.
struct Claim<'a> {
	pending: &'a Mutex<FxHashSet<ServiceId>>,
	id: ServiceId,
}

impl Drop for Claim<'_> {
	fn drop(&mut self) {
		self.pending.lock().remove(&self.id);
	}
}

/// Marks the initial bind as finished.
struct Binding<'a>(&'a TrackerInner);

impl Drop for Binding<'_> {
	fn drop(&mut self) {
		*self.0.binder.lock() = None;
		self.0.bound.notify_all();
	}
}

impl TrackerInner {
	/// Blocks while another thread is still binding the services found by
	/// `open`. The binding thread itself may close from a callback.
	fn wait_bound(&self) {
		let me = thread::current().id();
		let mut binder = self.binder.lock();
		while binder.is_some_and(|t| t != me) {
			self.bound.wait(&mut binder);
		}
	}

	fn service_changed(&self, event: &ServiceEvent) {
		match event.kind {
			ServiceEventKind::Registered => self.track(&event.reference, false),
			ServiceEventKind::Modified => self.track(&event.reference, true),
			ServiceEventKind::ModifiedEndMatch | ServiceEventKind::Unregistering => self.untrack(&event.reference),
		}
	}

	fn track(&self, reference: &ServiceReference, modified: bool) {
		if self.closing.load(Ordering::Acquire) || !reference.is_valid() {
			return;
		}

		if let Some(item) = self.find_tracked(reference, modified) {
			if modified {
				if let Some(on_modify) = &self.options.on_modify {
					on_modify(&item);
				}
				self.update_highest();
			}
			return;
		}

		let id = reference.id();
		if !self.pending.lock().insert(id) {
			return;
		}
		let _claim = Claim { pending: &self.pending, id };

		let Some(service) = self.registry.get_service(self.bundle, reference) else {
			return;
		};
		if let Some(adding) = &self.options.adding
			&& !adding(reference, &service)
		{
			trace!(tracker = %self.query, service.id = %id, "service rejected by adding callback");
			self.release(reference);
			return;
		}

		let item = TrackedService {
			reference: reference.clone(),
			service,
		};
		let inserted = {
			let mut tracked = self.tracked.write();
			let stale = self.closing.load(Ordering::Acquire) || !reference.is_valid() || tracked.iter().any(|t| t.id() == id);
			if !stale {
				let pos = tracked.partition_point(|t| t.reference.rank_cmp(reference).is_lt());
				tracked.insert(pos, item.clone());
			}
			!stale
		};
		if !inserted {
			self.release(reference);
			return;
		}

		trace!(tracker = %self.query, service.id = %id, "service added");
		if let Some(on_add) = &self.options.on_add {
			on_add(&item);
		}
		self.update_highest();
	}

	/// Looks up a tracked service, re-sorting the tracked set when its
	/// properties were modified.
	fn find_tracked(&self, reference: &ServiceReference, modified: bool) -> Option<TrackedService> {
		if !modified {
			return self.tracked.read().iter().find(|t| t.id() == reference.id()).cloned();
		}
		let mut tracked = self.tracked.write();
		let item = tracked.iter().find(|t| t.id() == reference.id()).cloned()?;
		tracked.sort_by(|a, b| a.reference.rank_cmp(&b.reference));
		Some(item)
	}

	fn untrack(&self, reference: &ServiceReference) {
		let removed = {
			let mut tracked = self.tracked.write();
			tracked
				.iter()
				.position(|t| t.id() == reference.id())
				.map(|pos| tracked.remove(pos))
		};
		let Some(item) = removed else {
			return;
		};

		trace!(tracker = %self.query, service.id = %item.id(), "service removed");
		if let Some(on_remove) = &self.options.on_remove {
			on_remove(&item);
		}
		self.release(&item.reference);
		self.update_highest();
	}

	fn release(&self, reference: &ServiceReference) {
		if let Err(err) = self.registry.unget_service(self.bundle, reference) {
			warn!(tracker = %self.query, service.id = %reference.id(), error = %err, "failed to release tracked service");
		}
	}

	/// Reports a change of the highest ranked service through `on_set`.
	/// Held reentrantly across the callback so reports stay in order.
	fn update_highest(&self) {
		let last = self.highest.lock();
		let current = self.tracked.read().first().cloned();
		let current_id = current.as_ref().map(TrackedService::id);
		if last.get() == current_id {
			return;
		}
		last.set(current_id);
		if let Some(on_set) = &self.options.on_set {
			on_set(current.as_ref());
		}
	}
}
