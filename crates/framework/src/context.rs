use std::any::Any;
use std::fmt;

use tether_component::{Component, ComponentBuilder, ComponentError, ComponentId, ComponentInfo, ComponentState, DependencyId, ServiceDependency};
use tether_filter::{Properties, PropertyValue};
use tether_registry::{
	BundleId, RegistryError, ServiceFactory, ServiceId, ServiceObject, ServiceQuery, ServiceReference, ServiceSource, ServiceTracker,
	TrackerOptions,
};
use tracing::debug;

use crate::error::FrameworkError;
use crate::framework::{Framework, OwnedTracker, TrackerId};

/// A bundle's view of the framework. Services, trackers and components
/// created through a context are owned by its bundle.
#[derive(Clone)]
pub struct BundleContext {
	framework: Framework,
	bundle: BundleId,
}

impl BundleContext {
	pub(crate) fn new(framework: Framework, bundle: BundleId) -> Self {
		Self { framework, bundle }
	}

	pub fn bundle(&self) -> BundleId {
		self.bundle
	}

	pub fn framework(&self) -> &Framework {
		&self.framework
	}

	/// Framework property `key`.
	pub fn property(&self, key: &str) -> Option<&PropertyValue> {
		self.framework.property(key)
	}

	pub fn register_service<S: Any + Send + Sync>(&self, name: &str, properties: Properties, service: S) -> Result<ServiceId, FrameworkError> {
		self.register(name, properties, ServiceSource::plain(service))
	}

	/// Registers a factory asked for a service object per consuming bundle.
	pub fn register_service_factory<F: ServiceFactory + 'static>(&self, name: &str, properties: Properties, factory: F) -> Result<ServiceId, FrameworkError> {
		self.register(name, properties, ServiceSource::factory(factory))
	}

	fn register(&self, name: &str, properties: Properties, source: ServiceSource) -> Result<ServiceId, FrameworkError> {
		self.framework.ensure_running()?;
		let registration = self.framework.registry().register(self.bundle, name, properties, source)?;
		Ok(registration.id())
	}

	/// Unregisters a service this bundle registered.
	///
	/// # Errors
	///
	/// [`RegistryError::IllegalArgument`] for services owned by another
	/// bundle; otherwise as [`ServiceRegistry::unregister`](tether_registry::ServiceRegistry::unregister).
	pub fn unregister_service(&self, id: ServiceId) -> Result<(), FrameworkError> {
		let registry = self.framework.registry();
		if let Some(reference) = registry.find_service(id)
			&& reference.owner() != self.bundle
		{
			return Err(RegistryError::IllegalArgument(format!(
				"service {id} is registered by bundle {}, not {}",
				reference.owner(),
				self.bundle
			))
			.into());
		}
		Ok(registry.unregister(id)?)
	}

	/// References to services matching `name` and `filter`, highest ranked
	/// first. Both are optional.
	pub fn get_service_references(&self, name: Option<&str>, filter: Option<&str>) -> Result<Vec<ServiceReference>, FrameworkError> {
		Ok(self.framework.registry().get_service_references(name, filter)?)
	}

	/// Highest ranked service matching `name` and `filter`.
	pub fn get_service_reference(&self, name: Option<&str>, filter: Option<&str>) -> Result<Option<ServiceReference>, FrameworkError> {
		let query = ServiceQuery::new(name, filter)?;
		Ok(self.framework.registry().find_reference(&query))
	}

	/// Obtains the service for this bundle. Every successful call must be
	/// balanced by [`BundleContext::unget_service`].
	pub fn get_service(&self, reference: &ServiceReference) -> Option<ServiceObject> {
		self.framework.registry().get_service(self.bundle, reference)
	}

	pub fn unget_service(&self, reference: &ServiceReference) -> Result<(), FrameworkError> {
		Ok(self.framework.registry().unget_service(self.bundle, reference)?)
	}

	/// Calls `f` with the highest ranked matching service and its
	/// properties, holding the service only for the duration of the call.
	///
	/// Returns `None` when no service matches or it could not be obtained.
	pub fn use_service<R>(&self, name: &str, filter: Option<&str>, f: impl FnOnce(&ServiceObject, &Properties) -> R) -> Result<Option<R>, FrameworkError> {
		let Some(reference) = self.get_service_reference(Some(name), filter)? else {
			return Ok(None);
		};
		let Some(service) = self.get_service(&reference) else {
			return Ok(None);
		};
		let result = f(&service, reference.properties().as_ref());
		self.unget_service(&reference)?;
		Ok(Some(result))
	}

	/// Opens a tracker owned by this bundle until
	/// [`stop_tracker`](Self::stop_tracker) or shutdown.
	pub fn track_services(&self, options: TrackerOptions) -> Result<TrackerId, FrameworkError> {
		self.framework.ensure_running()?;
		let tracker = ServiceTracker::new(self.framework.registry(), self.bundle, options)?;
		tracker.open()?;

		let id = self.framework.next_tracker_id();
		debug!(tracker = %id, bundle = %self.bundle, query = %tracker.query(), "tracker started");
		self.framework.inner.trackers.lock().insert(
			id,
			OwnedTracker {
				bundle: self.bundle,
				tracker,
			},
		);
		Ok(id)
	}

	/// Closes a tracker this bundle started. The remove callback runs for
	/// every service it still tracked.
	pub fn stop_tracker(&self, id: TrackerId) -> Result<(), FrameworkError> {
		let owned = {
			let mut trackers = self.framework.inner.trackers.lock();
			match trackers.get(&id) {
				Some(owned) if owned.bundle == self.bundle => trackers.remove(&id),
				_ => None,
			}
		};
		let owned = owned.ok_or(FrameworkError::UnknownTracker(id))?;
		owned.tracker.close();
		debug!(tracker = %id, bundle = %self.bundle, "tracker stopped");
		Ok(())
	}

	/// Builds a component and hands it to this bundle's dependency manager,
	/// which enables it.
	pub fn create_component(&self, builder: ComponentBuilder) -> Result<ComponentId, FrameworkError> {
		self.framework.ensure_running()?;
		let component = self.framework.manager(self.bundle).create(builder)?;
		Ok(component.id())
	}

	/// Adds a dependency to a running component of this bundle.
	pub fn add_service_dependency(&self, component: ComponentId, dependency: ServiceDependency) -> Result<DependencyId, FrameworkError> {
		Ok(self.component(component)?.add_dependency(dependency)?)
	}

	pub fn remove_service_dependency(&self, component: ComponentId, dependency: DependencyId) -> Result<(), FrameworkError> {
		Ok(self.component(component)?.remove_dependency(dependency)?)
	}

	/// Disables and removes a component of this bundle.
	pub fn remove_component(&self, id: ComponentId) -> Result<(), FrameworkError> {
		let manager = self
			.framework
			.existing_manager(self.bundle)
			.ok_or(ComponentError::UnknownComponent(id))?;
		manager.remove(id)?;
		Ok(())
	}

	pub fn component_state(&self, id: ComponentId) -> Option<ComponentState> {
		self.component(id).ok().map(|c| c.state())
	}

	/// Introspection of every component this bundle manages.
	pub fn components(&self) -> Vec<ComponentInfo> {
		self.framework
			.existing_manager(self.bundle)
			.map(|manager| manager.info())
			.unwrap_or_default()
	}

	fn component(&self, id: ComponentId) -> Result<Component, ComponentError> {
		self.framework
			.existing_manager(self.bundle)
			.and_then(|manager| manager.component(id))
			.ok_or(ComponentError::UnknownComponent(id))
	}
}

impl fmt::Debug for BundleContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BundleContext")
			.field("bundle", &self.bundle)
			.field("framework", &self.framework.uuid())
			.finish()
	}
}
