//! Service dependencies of a component.
//!
//! A dependency wraps a [`ServiceTracker`]. Tracker callbacks only post
//! events to the owning component; binding, callbacks and the
//! auto-configured [`ServiceSlot`] are updated when the component processes
//! those events, so they never run in the middle of a state transition.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tether_registry::{
	BundleId, RegistryError, ServiceId, ServiceQuery, ServiceRegistry, ServiceTracker, TrackedService, TrackerOptions,
};
use tracing::{trace, warn};

use crate::component::{ComponentInner, Event};
use crate::error::BoxError;
use crate::ids::DependencyId;

pub type DependencyCallback = Arc<dyn Fn(&TrackedService) -> Result<(), BoxError> + Send + Sync>;
/// Receives the highest ranked bound service whenever it changes.
pub type SetCallback = Arc<dyn Fn(Option<&TrackedService>) -> Result<(), BoxError> + Send + Sync>;
/// Receives the previous and the new highest ranked service.
pub type SwapCallback = Arc<dyn Fn(&TrackedService, &TrackedService) -> Result<(), BoxError> + Send + Sync>;

/// How a change of the bound services reaches an active component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateStrategy {
	/// Callbacks run while the component stays active. A new highest ranked
	/// service replaces the slot in one step and is reported through the
	/// swap callback when one is set.
	#[default]
	Swap,
	/// Callbacks and slot updates run under the slot's write lock. A new
	/// highest ranked service is bound as remove-then-add, reported through
	/// the set callback only.
	///
	/// The lock is not reentrant: callbacks must use the service they are
	/// passed and not read the slot ([`ServiceSlot::get`],
	/// [`ServiceSlot::is_bound`], [`ServiceSlot::read`]), which would
	/// deadlock.
	Locking,
	/// The component is stopped around the callbacks and started again
	/// afterwards.
	Suspend,
}

/// Auto-configured field holding the highest ranked bound service.
///
/// Cloning shares the slot.
#[derive(Clone, Default)]
pub struct ServiceSlot {
	inner: Arc<RwLock<Option<TrackedService>>>,
}

impl ServiceSlot {
	pub fn get(&self) -> Option<TrackedService> {
		self.inner.read().clone()
	}

	/// Downcasts the bound service object.
	pub fn service<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
		let service = self.inner.read().as_ref()?.service().clone();
		service.downcast::<S>().ok()
	}

	pub fn id(&self) -> Option<ServiceId> {
		self.inner.read().as_ref().map(TrackedService::id)
	}

	pub fn is_bound(&self) -> bool {
		self.inner.read().is_some()
	}

	/// Read access for the duration of the guard. A locking dependency
	/// cannot change the slot while a guard is held.
	pub fn read(&self) -> RwLockReadGuard<'_, Option<TrackedService>> {
		self.inner.read()
	}
}

impl fmt::Debug for ServiceSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ServiceSlot").field(&self.id()).finish()
	}
}

/// Declares a service a component needs.
///
/// Dependencies are optional unless marked [`required`](Self::required).
#[derive(Clone, Default)]
pub struct ServiceDependency {
	service_name: Option<String>,
	filter: Option<String>,
	required: bool,
	strategy: UpdateStrategy,
	on_add: Option<DependencyCallback>,
	on_remove: Option<DependencyCallback>,
	on_set: Option<SetCallback>,
	on_swap: Option<SwapCallback>,
	slot: ServiceSlot,
}

impl ServiceDependency {
	pub fn new(service: impl Into<String>) -> Self {
		Self {
			service_name: Some(service.into()),
			..Self::default()
		}
	}

	/// A dependency selected by filter only.
	pub fn matching(filter: impl Into<String>) -> Self {
		Self {
			filter: Some(filter.into()),
			..Self::default()
		}
	}

	pub fn filter(mut self, filter: impl Into<String>) -> Self {
		self.filter = Some(filter.into());
		self
	}

	pub fn required(mut self, required: bool) -> Self {
		self.required = required;
		self
	}

	pub fn strategy(mut self, strategy: UpdateStrategy) -> Self {
		self.strategy = strategy;
		self
	}

	pub fn on_add(mut self, f: impl Fn(&TrackedService) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.on_add = Some(Arc::new(f));
		self
	}

	pub fn on_remove(mut self, f: impl Fn(&TrackedService) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.on_remove = Some(Arc::new(f));
		self
	}

	pub fn on_set(mut self, f: impl Fn(Option<&TrackedService>) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.on_set = Some(Arc::new(f));
		self
	}

	pub fn on_swap(mut self, f: impl Fn(&TrackedService, &TrackedService) -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
		self.on_swap = Some(Arc::new(f));
		self
	}

	/// The slot this dependency auto-configures.
	pub fn slot(&self) -> ServiceSlot {
		self.slot.clone()
	}

	pub fn service_name(&self) -> Option<&str> {
		self.service_name.as_deref()
	}

	pub fn is_required(&self) -> bool {
		self.required
	}

	fn has_callbacks(&self) -> bool {
		self.on_add.is_some() || self.on_remove.is_some() || self.on_set.is_some() || self.on_swap.is_some()
	}
}

impl fmt::Debug for ServiceDependency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceDependency")
			.field("service_name", &self.service_name)
			.field("filter", &self.filter)
			.field("required", &self.required)
			.field("strategy", &self.strategy)
			.finish_non_exhaustive()
	}
}

/// Snapshot of a dependency for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyInfo {
	pub id: DependencyId,
	pub service_name: Option<String>,
	pub filter: Option<String>,
	pub required: bool,
	pub strategy: UpdateStrategy,
	pub available: bool,
	/// Number of bound services.
	pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServiceChange {
	Added,
	Modified,
	Removed,
}

/// A dependency attached to a component.
pub(crate) struct Dependency {
	pub(crate) id: DependencyId,
	config: ServiceDependency,
	query: ServiceQuery,
	tracker: ServiceTracker,
	/// Rank ordered, as of the last processed event.
	bound: Mutex<Vec<TrackedService>>,
}

impl Dependency {
	pub(crate) fn attach(
		config: ServiceDependency,
		registry: &ServiceRegistry,
		bundle: BundleId,
		component: Weak<ComponentInner>,
	) -> Result<Arc<Self>, RegistryError> {
		let query = ServiceQuery::new(config.service_name.as_deref(), config.filter.as_deref())?;
		if query.name().is_none() && query.filter().is_none() {
			return Err(RegistryError::IllegalArgument(
				"a service dependency needs a service name or a filter".into(),
			));
		}

		Ok(Arc::new_cyclic(|this: &Weak<Self>| {
			let forward = |change: ServiceChange| {
				let (this, component) = (this.clone(), component.clone());
				move |service: &TrackedService| {
					if let (Some(dependency), Some(component)) = (this.upgrade(), component.upgrade()) {
						component.post(Event::Service {
							dependency,
							change,
							service: service.clone(),
						});
					}
				}
			};
			let options = TrackerOptions::new()
				.on_add(forward(ServiceChange::Added))
				.on_modify(forward(ServiceChange::Modified))
				.on_remove(forward(ServiceChange::Removed));

			Self {
				id: DependencyId::next(),
				tracker: ServiceTracker::for_query(registry, bundle, query.clone(), options),
				query,
				config,
				bound: Mutex::new(Vec::new()),
			}
		}))
	}

	pub(crate) fn is_required(&self) -> bool {
		self.config.required
	}

	pub(crate) fn strategy(&self) -> UpdateStrategy {
		self.config.strategy
	}

	pub(crate) fn has_callbacks(&self) -> bool {
		self.config.has_callbacks()
	}

	pub(crate) fn is_enabled(&self) -> bool {
		self.tracker.is_open()
	}

	pub(crate) fn is_available(&self) -> bool {
		!self.bound.lock().is_empty()
	}

	/// Whether the slot no longer holds the highest ranked bound service.
	pub(crate) fn slot_is_stale(&self) -> bool {
		let highest = self.bound.lock().first().map(TrackedService::id);
		self.config.slot.id() != highest
	}

	/// Opens the tracker. Matching services arrive as posted events.
	pub(crate) fn enable(&self) {
		match self.tracker.open() {
			Ok(()) | Err(RegistryError::IllegalState(_)) => {}
			Err(err) => warn!(dependency = %self.id, query = %self.query, error = %err, "failed to open dependency tracker"),
		}
	}

	/// Closes the tracker. Bound services are released through posted
	/// remove events.
	pub(crate) fn disable(&self) {
		self.tracker.close();
	}

	pub(crate) fn bind(&self, service: TrackedService) {
		let mut bound = self.bound.lock();
		bound.retain(|s| s.id() != service.id());
		let pos = bound.partition_point(|s| s.reference().rank_cmp(service.reference()).is_lt());
		bound.insert(pos, service);
	}

	pub(crate) fn unbind(&self, id: ServiceId) -> Option<TrackedService> {
		let mut bound = self.bound.lock();
		let pos = bound.iter().position(|s| s.id() == id)?;
		Some(bound.remove(pos))
	}

	/// Runs the add/remove callback for `service`, then moves the slot to
	/// the highest ranked bound service.
	pub(crate) fn notify(&self, owner: &str, change: ServiceChange, service: &TrackedService) {
		match self.config.strategy {
			UpdateStrategy::Locking => {
				let mut slot = self.config.slot.inner.write();
				self.invoke_change(owner, change, service);
				let highest = self.highest();
				if same_service(slot.as_ref(), highest.as_ref()) {
					return;
				}
				slot.take();
				*slot = highest;
				self.report(owner, "set", self.config.on_set.as_ref().map(|f| f(slot.as_ref())));
			}
			UpdateStrategy::Swap | UpdateStrategy::Suspend => {
				self.invoke_change(owner, change, service);
				let highest = self.highest();
				let previous = {
					let mut slot = self.config.slot.inner.write();
					if same_service(slot.as_ref(), highest.as_ref()) {
						return;
					}
					std::mem::replace(&mut *slot, highest.clone())
				};
				trace!(
					component = owner,
					dependency = %self.id,
					from = ?previous.as_ref().map(TrackedService::id),
					to = ?highest.as_ref().map(TrackedService::id),
					"dependency slot updated"
				);
				match (&previous, &highest, &self.config.on_swap) {
					(Some(old), Some(new), Some(on_swap)) => self.report(owner, "swap", Some(on_swap(old, new))),
					_ => self.report(owner, "set", self.config.on_set.as_ref().map(|f| f(highest.as_ref()))),
				}
			}
		}
	}

	fn invoke_change(&self, owner: &str, change: ServiceChange, service: &TrackedService) {
		let (callback, name) = match change {
			ServiceChange::Added => (&self.config.on_add, "add"),
			ServiceChange::Removed => (&self.config.on_remove, "remove"),
			ServiceChange::Modified => return,
		};
		self.report(owner, name, callback.as_ref().map(|f| f(service)));
	}

	fn report(&self, owner: &str, callback: &'static str, result: Option<Result<(), BoxError>>) {
		if let Some(Err(err)) = result {
			warn!(component = owner, dependency = %self.id, query = %self.query, callback, error = %err, "dependency callback failed");
		}
	}

	fn highest(&self) -> Option<TrackedService> {
		self.bound.lock().first().cloned()
	}

	pub(crate) fn info(&self) -> DependencyInfo {
		let count = self.bound.lock().len();
		DependencyInfo {
			id: self.id,
			service_name: self.config.service_name.clone(),
			filter: self.config.filter.clone(),
			required: self.config.required,
			strategy: self.config.strategy,
			available: count > 0,
			count,
		}
	}
}

fn same_service(a: Option<&TrackedService>, b: Option<&TrackedService>) -> bool {
	a.map(TrackedService::id) == b.map(TrackedService::id)
}
