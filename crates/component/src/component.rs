//! The component state machine.
//!
//! Every change to a component (enable, disable, a dependency gaining or
//! losing a service) is posted to its event queue. Whichever thread finds
//! the queue idle drains it; events posted while a transition is running,
//! including ones the transition itself causes, wait their turn. A stop
//! therefore always completes before the remove event that triggered it is
//! followed by the next one.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex, RwLock};
use tether_filter::Properties;
use tether_registry::{BundleId, ServiceId, ServiceRegistration, ServiceRegistry, ServiceSource, TrackedService};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::dependency::{Dependency, DependencyInfo, ServiceChange, ServiceDependency, UpdateStrategy};
use crate::error::{BoxError, ComponentError};
use crate::ids::{ComponentId, DependencyId};
use crate::lifecycle::Lifecycle;
use crate::state::{ComponentState, Stage};

pub(crate) enum Event {
	Enable,
	Disable,
	DependencyAdded(Arc<Dependency>),
	DependencyRemoved(Arc<Dependency>),
	InterfaceAdded,
	Service {
		dependency: Arc<Dependency>,
		change: ServiceChange,
		service: TrackedService,
	},
}

struct EventQueue {
	events: VecDeque<Event>,
	/// Thread currently draining `events`.
	drainer: Option<ThreadId>,
}

struct Core {
	state: ComponentState,
	enabled: bool,
	times_started: u32,
	times_resumed: u32,
}

struct Interface {
	name: String,
	properties: Properties,
	source: ServiceSource,
	registration: Option<ServiceRegistration>,
}

/// Snapshot of a provided interface.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
	pub name: String,
	pub properties: Properties,
	/// Set while the interface is registered.
	pub service_id: Option<ServiceId>,
}

/// Snapshot of a component for introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInfo {
	pub id: ComponentId,
	pub uuid: Uuid,
	pub name: String,
	pub bundle: BundleId,
	pub state: ComponentState,
	pub times_started: u32,
	pub times_resumed: u32,
	pub interfaces: Vec<InterfaceInfo>,
	pub dependencies: Vec<DependencyInfo>,
}

impl ComponentInfo {
	pub fn is_active(&self) -> bool {
		self.state.is_active()
	}
}

impl fmt::Display for ComponentInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{} {} [{}] (uuid={})", self.id, self.name, self.state, self.uuid)?;
		for interface in &self.interfaces {
			let id = interface.service_id.map_or_else(|| "-".to_string(), |id| id.to_string());
			writeln!(f, "  provides {} (service.id={id})", interface.name)?;
		}
		for dep in &self.dependencies {
			let name = dep.service_name.as_deref().unwrap_or("*");
			let kind = if dep.required { "required" } else { "optional" };
			let filter = dep.filter.as_deref().unwrap_or("");
			writeln!(f, "  requires {name}{filter} {kind} available={} count={}", dep.available, dep.count)?;
		}
		Ok(())
	}
}

pub(crate) struct ComponentInner {
	id: ComponentId,
	uuid: Uuid,
	name: String,
	registry: ServiceRegistry,
	bundle: BundleId,
	lifecycle: Box<dyn Lifecycle>,
	core: Mutex<Core>,
	dependencies: RwLock<Vec<Arc<Dependency>>>,
	interfaces: Mutex<Vec<Interface>>,
	queue: Mutex<EventQueue>,
	idle: Condvar,
}

/// A unit of functionality whose lifecycle is driven by the availability
/// of its service dependencies.
///
/// Built with [`Component::builder`]; starts out disabled in
/// [`ComponentState::Inactive`]. Cloning shares the component.
#[derive(Clone)]
pub struct Component {
	inner: Arc<ComponentInner>,
}

/// Builder for a [`Component`].
pub struct ComponentBuilder {
	name: String,
	uuid: Option<Uuid>,
	lifecycle: Box<dyn Lifecycle>,
	dependencies: Vec<ServiceDependency>,
	interfaces: Vec<(String, Properties, ServiceSource)>,
}

impl ComponentBuilder {
	pub fn uuid(mut self, uuid: Uuid) -> Self {
		self.uuid = Some(uuid);
		self
	}

	pub fn lifecycle(mut self, lifecycle: impl Lifecycle + 'static) -> Self {
		self.lifecycle = Box::new(lifecycle);
		self
	}

	pub fn dependency(mut self, dependency: ServiceDependency) -> Self {
		self.dependencies.push(dependency);
		self
	}

	/// Declares a service registered while the component is active.
	pub fn provide(mut self, name: impl Into<String>, properties: Properties, source: ServiceSource) -> Self {
		self.interfaces.push((name.into(), properties, source));
		self
	}

	/// # Errors
	///
	/// [`ComponentError::Registry`] when a dependency has neither a service
	/// name nor a valid filter.
	pub fn build(self, registry: &ServiceRegistry, bundle: BundleId) -> Result<Component, ComponentError> {
		let inner = Arc::new(ComponentInner {
			id: ComponentId::next(),
			uuid: self.uuid.unwrap_or_else(Uuid::new_v4),
			name: self.name,
			registry: registry.clone(),
			bundle,
			lifecycle: self.lifecycle,
			core: Mutex::new(Core {
				state: ComponentState::Inactive,
				enabled: false,
				times_started: 0,
				times_resumed: 0,
			}),
			dependencies: RwLock::new(Vec::new()),
			interfaces: Mutex::new(
				self.interfaces
					.into_iter()
					.map(|(name, properties, source)| Interface {
						name,
						properties,
						source,
						registration: None,
					})
					.collect(),
			),
			queue: Mutex::new(EventQueue {
				events: VecDeque::new(),
				drainer: None,
			}),
			idle: Condvar::new(),
		});

		let mut attached = Vec::with_capacity(self.dependencies.len());
		for config in self.dependencies {
			attached.push(Dependency::attach(config, registry, bundle, Arc::downgrade(&inner))?);
		}
		*inner.dependencies.write() = attached;
		Ok(Component { inner })
	}
}

impl Component {
	pub fn builder(name: impl Into<String>) -> ComponentBuilder {
		ComponentBuilder {
			name: name.into(),
			uuid: None,
			lifecycle: Box::new(()),
			dependencies: Vec::new(),
			interfaces: Vec::new(),
		}
	}

	pub fn id(&self) -> ComponentId {
		self.inner.id
	}

	pub fn uuid(&self) -> Uuid {
		self.inner.uuid
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn bundle(&self) -> BundleId {
		self.inner.bundle
	}

	pub fn state(&self) -> ComponentState {
		self.inner.core.lock().state
	}

	pub fn is_active(&self) -> bool {
		self.state().is_active()
	}

	pub fn is_enabled(&self) -> bool {
		self.inner.core.lock().enabled
	}

	/// How often the component entered the active state, not counting resumes.
	pub fn times_started(&self) -> u32 {
		self.inner.core.lock().times_started
	}

	/// Starts tracking dependencies and lets the component activate once
	/// they are resolved. Returns after the resulting transitions ran,
	/// unless called from inside one of this component's callbacks.
	pub fn enable(&self) {
		self.inner.post(Event::Enable);
		self.inner.wait_idle();
	}

	/// Stops and deinitializes the component and closes its trackers.
	pub fn disable(&self) {
		self.inner.post(Event::Disable);
		self.inner.wait_idle();
	}

	/// Attaches a dependency. Tracking starts at once unless the component
	/// is inactive.
	///
	/// # Errors
	///
	/// [`ComponentError::Registry`] when the dependency has neither a
	/// service name nor a valid filter.
	pub fn add_dependency(&self, config: ServiceDependency) -> Result<DependencyId, ComponentError> {
		let inner = &self.inner;
		let dependency = Dependency::attach(config, &inner.registry, inner.bundle, Arc::downgrade(inner))?;
		let id = dependency.id;
		inner.dependencies.write().push(Arc::clone(&dependency));
		inner.post(Event::DependencyAdded(dependency));
		inner.wait_idle();
		Ok(id)
	}

	/// Detaches a dependency, closing its tracker.
	///
	/// # Errors
	///
	/// [`ComponentError::UnknownDependency`] when `id` is not attached.
	pub fn remove_dependency(&self, id: DependencyId) -> Result<(), ComponentError> {
		let inner = &self.inner;
		let dependency = {
			let mut dependencies = inner.dependencies.write();
			let pos = dependencies
				.iter()
				.position(|d| d.id == id)
				.ok_or(ComponentError::UnknownDependency(id))?;
			dependencies.remove(pos)
		};
		inner.post(Event::DependencyRemoved(dependency));
		inner.wait_idle();
		Ok(())
	}

	pub fn dependency_ids(&self) -> Vec<DependencyId> {
		self.inner.dependencies.read().iter().map(|d| d.id).collect()
	}

	/// Adds a provided interface, registering it at once when the
	/// component is active.
	pub fn add_interface(&self, name: impl Into<String>, properties: Properties, source: ServiceSource) {
		self.inner.interfaces.lock().push(Interface {
			name: name.into(),
			properties,
			source,
			registration: None,
		});
		self.inner.post(Event::InterfaceAdded);
		self.inner.wait_idle();
	}

	pub fn info(&self) -> ComponentInfo {
		let inner = &self.inner;
		let (state, times_started, times_resumed) = {
			let core = inner.core.lock();
			(core.state, core.times_started, core.times_resumed)
		};
		ComponentInfo {
			id: inner.id,
			uuid: inner.uuid,
			name: inner.name.clone(),
			bundle: inner.bundle,
			state,
			times_started,
			times_resumed,
			interfaces: inner
				.interfaces
				.lock()
				.iter()
				.map(|i| InterfaceInfo {
					name: i.name.clone(),
					properties: i.properties.clone(),
					service_id: i.registration.as_ref().map(ServiceRegistration::id),
				})
				.collect(),
			dependencies: inner.dependencies.read().iter().map(|d| d.info()).collect(),
		}
	}
}

impl fmt::Debug for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component")
			.field("id", &self.inner.id)
			.field("name", &self.inner.name)
			.field("state", &self.state())
			.finish()
	}
}

/// Releases the drainer role if event processing unwinds.
struct Draining<'a>(&'a ComponentInner);

impl Drop for Draining<'_> {
	fn drop(&mut self) {
		if thread::panicking() {
			self.0.queue.lock().drainer = None;
			self.0.idle.notify_all();
		}
	}
}

impl ComponentInner {
	pub(crate) fn post(&self, event: Event) {
		{
			let mut queue = self.queue.lock();
			queue.events.push_back(event);
			if queue.drainer.is_some() {
				return;
			}
			queue.drainer = Some(thread::current().id());
		}
		self.drain();
	}

	fn drain(&self) {
		let _draining = Draining(self);
		loop {
			let event = {
				let mut queue = self.queue.lock();
				match queue.events.pop_front() {
					Some(event) => event,
					None => {
						queue.drainer = None;
						self.idle.notify_all();
						return;
					}
				}
			};
			self.process(event);
		}
	}

	/// Blocks until no other thread is draining the queue.
	fn wait_idle(&self) {
		let me = thread::current().id();
		let mut queue = self.queue.lock();
		while queue.drainer.is_some_and(|t| t != me) {
			self.idle.wait(&mut queue);
		}
	}

	fn process(&self, event: Event) {
		match event {
			Event::Enable => {
				self.core.lock().enabled = true;
				self.handle_change();
			}
			Event::Disable => {
				self.core.lock().enabled = false;
				self.handle_change();
			}
			Event::DependencyAdded(dependency) => {
				if self.state() != ComponentState::Inactive {
					dependency.enable();
				}
				self.handle_change();
			}
			Event::DependencyRemoved(dependency) => {
				dependency.disable();
				self.handle_change();
			}
			Event::InterfaceAdded => {
				if self.state().is_active() {
					self.register_interfaces();
				}
			}
			Event::Service {
				dependency,
				change,
				service,
			} => self.on_service(&dependency, change, service),
		}
	}

	/// Added and modified services are bound before the state is
	/// re-evaluated, removed ones are released after, so the component is
	/// stopped while its slot still holds the departing service.
	fn on_service(&self, dependency: &Arc<Dependency>, change: ServiceChange, service: TrackedService) {
		trace!(component = %self.name, dependency = %dependency.id, service.id = %service.id(), ?change, "service event");
		match change {
			ServiceChange::Added | ServiceChange::Modified => {
				dependency.bind(service.clone());
				let suspend = self.needs_suspend(dependency, change);
				if suspend {
					self.suspend();
				}
				dependency.notify(&self.name, change, &service);
				if suspend {
					self.resume();
				}
				self.handle_change();
			}
			ServiceChange::Removed => {
				if dependency.unbind(service.id()).is_none() {
					return;
				}
				self.handle_change();
				let suspend = self.needs_suspend(dependency, change);
				if suspend {
					self.suspend();
				}
				dependency.notify(&self.name, change, &service);
				if suspend {
					self.resume();
				}
			}
		}
	}

	fn needs_suspend(&self, dependency: &Dependency, change: ServiceChange) -> bool {
		let relevant = match change {
			ServiceChange::Modified => dependency.slot_is_stale(),
			ServiceChange::Added | ServiceChange::Removed => true,
		};
		relevant
			&& dependency.strategy() == UpdateStrategy::Suspend
			&& dependency.has_callbacks()
			&& self.state().is_active()
	}

	fn state(&self) -> ComponentState {
		self.core.lock().state
	}

	fn all_resolved(&self) -> bool {
		self.dependencies
			.read()
			.iter()
			.all(|d| d.is_enabled() && (!d.is_required() || d.is_available()))
	}

	/// Applies transitions until the state settles.
	fn handle_change(&self) {
		loop {
			let (current, enabled) = {
				let core = self.core.lock();
				(core.state, core.enabled)
			};
			let next = current.next(enabled, self.all_resolved());
			if next == current || !self.transition(current, next) {
				return;
			}
			self.core.lock().state = next;
		}
	}

	/// Runs the work of one transition. A failing callback is logged and the
	/// transition still happens. Returns false only for a pair of states
	/// [`ComponentState::next`] never produces.
	fn transition(&self, from: ComponentState, to: ComponentState) -> bool {
		use ComponentState::*;

		debug!(component = %self.name, component.id = %self.id, %from, %to, "component transition");
		let failed = match (from, to) {
			(Inactive, WaitingForRequired) => {
				self.enable_dependencies();
				None
			}
			(WaitingForRequired, Initializing)
			| (InstantiatedAndWaitingForRequired, Deinitializing)
			| (InstantiatedAndWaitingForRequired, Injecting)
			| (TrackingOptional, Stopping) => None,
			(Initializing, InstantiatedAndWaitingForRequired) => self.lifecycle.init().err().map(|e| (Stage::Init, e)),
			(Injecting, TrackingOptional) => {
				let result = self.lifecycle.start();
				self.register_interfaces();
				self.core.lock().times_started += 1;
				result.err().map(|e| (Stage::Start, e))
			}
			(Stopping, InstantiatedAndWaitingForRequired) => {
				self.unregister_interfaces();
				self.lifecycle.stop().err().map(|e| (Stage::Stop, e))
			}
			(Deinitializing, Inactive) => {
				let result = self.lifecycle.deinit();
				self.disable_dependencies();
				result.err().map(|e| (Stage::Deinit, e))
			}
			(WaitingForRequired, Inactive) => {
				self.disable_dependencies();
				None
			}
			_ => {
				error!(component = %self.name, %from, %to, "unexpected component transition");
				return false;
			}
		};

		if let Some((stage, source)) = failed {
			self.log_failure(stage, source);
		}
		true
	}

	fn log_failure(&self, stage: Stage, source: BoxError) {
		let err = ComponentError::Lifecycle {
			component: self.name.clone(),
			stage,
			source,
		};
		error!(component = %self.name, component.id = %self.id, %stage, error = %err, "component callback failed");
	}

	fn suspend(&self) {
		debug!(component = %self.name, from = %ComponentState::TrackingOptional, to = %ComponentState::Suspended, "component transition");
		self.core.lock().state = ComponentState::Suspended;
		self.unregister_interfaces();
		if let Err(source) = self.lifecycle.stop() {
			self.log_failure(Stage::Stop, source);
		}
	}

	fn resume(&self) {
		if self.state() != ComponentState::Suspended {
			return;
		}
		debug!(component = %self.name, from = %ComponentState::Suspended, to = %ComponentState::TrackingOptional, "component transition");
		if let Err(source) = self.lifecycle.start() {
			self.log_failure(Stage::Start, source);
		}
		self.register_interfaces();
		let mut core = self.core.lock();
		core.times_resumed += 1;
		core.state = ComponentState::TrackingOptional;
	}

	fn enable_dependencies(&self) {
		let dependencies = self.dependencies.read().clone();
		for dependency in dependencies {
			dependency.enable();
		}
	}

	fn disable_dependencies(&self) {
		let dependencies = self.dependencies.read().clone();
		for dependency in dependencies {
			dependency.disable();
		}
	}

	/// Registers every provided interface that is not registered yet.
	/// Registration happens outside the interface lock since it delivers
	/// events synchronously.
	fn register_interfaces(&self) {
		let pending: Vec<(usize, String, Properties, ServiceSource)> = self
			.interfaces
			.lock()
			.iter()
			.enumerate()
			.filter(|(_, i)| i.registration.is_none())
			.map(|(idx, i)| (idx, i.name.clone(), i.properties.clone(), i.source.clone()))
			.collect();

		for (idx, name, properties, source) in pending {
			match self.registry.register(self.bundle, &name, properties, source) {
				Ok(registration) => {
					trace!(component = %self.name, service.name = %name, service.id = %registration.id(), "provided interface registered");
					if let Some(interface) = self.interfaces.lock().get_mut(idx) {
						interface.registration = Some(registration);
					}
				}
				Err(err) => error!(component = %self.name, service.name = %name, error = %err, "failed to register provided interface"),
			}
		}
	}

	fn unregister_interfaces(&self) {
		let registrations: Vec<ServiceRegistration> = self
			.interfaces
			.lock()
			.iter_mut()
			.filter_map(|i| i.registration.take())
			.collect();
		for registration in registrations {
			trace!(component = %self.name, service.id = %registration.id(), "unregistering provided interface");
			if let Err(err) = registration.unregister() {
				warn!(component = %self.name, service.id = %registration.id(), error = %err, "failed to unregister provided interface");
			}
		}
	}
}

impl Drop for ComponentInner {
	fn drop(&mut self) {
		trace!(component = %self.name, component.id = %self.id, "component dropped");
	}
}
