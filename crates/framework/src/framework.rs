use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tether_component::DependencyManager;
use tether_filter::{Properties, PropertyValue};
use tether_registry::{BundleId, ServiceQuery, ServiceRegistry, ServiceTracker};
use tether_resolver::{Module, ModuleId, ResolverContext};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::FrameworkConfig;
use crate::context::BundleContext;
use crate::error::FrameworkError;

/// Framework property holding the instance uuid.
pub const FRAMEWORK_UUID: &str = "framework.uuid";

/// Handle returned by [`BundleContext::track_services`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackerId(pub u64);

impl fmt::Display for TrackerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

pub(crate) struct OwnedTracker {
	pub(crate) bundle: BundleId,
	pub(crate) tracker: ServiceTracker,
}

pub(crate) struct FrameworkInner {
	pub(crate) uuid: Uuid,
	pub(crate) properties: Properties,
	pub(crate) registry: ServiceRegistry,
	pub(crate) resolver: Mutex<ResolverContext>,
	pub(crate) managers: RwLock<FxHashMap<BundleId, Arc<DependencyManager>>>,
	pub(crate) trackers: Mutex<FxHashMap<TrackerId, OwnedTracker>>,
	pub(crate) tracker_ids: AtomicU64,
	pub(crate) stopped: AtomicBool,
}

/// One framework instance: a service registry, a dependency manager per
/// bundle and a resolver context.
///
/// Cloning yields another handle to the same instance. The instance shuts
/// down when [`Framework::shutdown`] is called or the last handle, including
/// those held by bundle contexts, is dropped.
#[derive(Clone)]
pub struct Framework {
	pub(crate) inner: Arc<FrameworkInner>,
}

impl Framework {
	/// # Errors
	///
	/// [`FrameworkError::Config`] when the configured uuid does not parse.
	pub fn new(config: FrameworkConfig) -> Result<Self, FrameworkError> {
		let uuid = config.resolve_uuid()?;
		let mut properties = config.properties;
		properties.set(FRAMEWORK_UUID, uuid.to_string());
		info!(framework = %uuid, properties = properties.len(), "framework created");

		Ok(Self {
			inner: Arc::new(FrameworkInner {
				uuid,
				properties,
				registry: ServiceRegistry::new(),
				resolver: Mutex::new(ResolverContext::new()),
				managers: RwLock::new(FxHashMap::default()),
				trackers: Mutex::new(FxHashMap::default()),
				tracker_ids: AtomicU64::new(1),
				stopped: AtomicBool::new(false),
			}),
		})
	}

	pub fn uuid(&self) -> Uuid {
		self.inner.uuid
	}

	pub fn registry(&self) -> &ServiceRegistry {
		&self.inner.registry
	}

	pub fn property(&self, key: &str) -> Option<&PropertyValue> {
		self.inner.properties.get(key)
	}

	pub fn properties(&self) -> &Properties {
		&self.inner.properties
	}

	/// Context acting on behalf of `bundle`.
	pub fn bundle_context(&self, bundle: BundleId) -> BundleContext {
		BundleContext::new(self.clone(), bundle)
	}

	/// Context of the framework itself.
	pub fn system_context(&self) -> BundleContext {
		self.bundle_context(BundleId::SYSTEM)
	}

	pub fn is_stopped(&self) -> bool {
		self.inner.stopped.load(Ordering::Acquire)
	}

	/// Closes every tracker, removes every component and unregisters every
	/// service. Later calls do nothing.
	pub fn shutdown(&self) {
		self.inner.shutdown();
	}

	pub(crate) fn ensure_running(&self) -> Result<(), FrameworkError> {
		if self.is_stopped() {
			return Err(FrameworkError::Stopped);
		}
		Ok(())
	}

	pub(crate) fn manager(&self, bundle: BundleId) -> Arc<DependencyManager> {
		if let Some(manager) = self.inner.managers.read().get(&bundle) {
			return Arc::clone(manager);
		}
		let mut managers = self.inner.managers.write();
		Arc::clone(
			managers
				.entry(bundle)
				.or_insert_with(|| Arc::new(DependencyManager::new(&self.inner.registry, bundle))),
		)
	}

	pub(crate) fn existing_manager(&self, bundle: BundleId) -> Option<Arc<DependencyManager>> {
		self.inner.managers.read().get(&bundle).cloned()
	}

	pub(crate) fn next_tracker_id(&self) -> TrackerId {
		TrackerId(self.inner.tracker_ids.fetch_add(1, Ordering::Relaxed))
	}

	/// Adds a module to the resolver context.
	pub fn install_module(&self, module: Module) -> ModuleId {
		self.inner.resolver.lock().add_module(module)
	}

	/// # Errors
	///
	/// [`FrameworkError::Resolve`] when `id` is unknown.
	pub fn uninstall_module(&self, id: ModuleId) -> Result<Module, FrameworkError> {
		Ok(self.inner.resolver.lock().remove_module(id)?)
	}

	/// Resolves `root` and applies the outcome, returning every module that
	/// became resolved.
	///
	/// # Errors
	///
	/// [`FrameworkError::Resolve`], carrying the requirements left without
	/// candidates when resolution fails.
	pub fn resolve_module(&self, root: ModuleId) -> Result<Vec<ModuleId>, FrameworkError> {
		let mut resolver = self.inner.resolver.lock();
		let resolution = resolver.resolve(root)?;
		let resolved = resolution.apply(&mut resolver)?;
		debug!(module = %root, resolved = resolved.len(), "modules resolved");
		Ok(resolved)
	}

	/// Runs `f` with the resolver context locked.
	pub fn with_resolver<R>(&self, f: impl FnOnce(&ResolverContext) -> R) -> R {
		f(&self.inner.resolver.lock())
	}
}

impl fmt::Debug for Framework {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Framework")
			.field("uuid", &self.inner.uuid)
			.field("stopped", &self.is_stopped())
			.finish_non_exhaustive()
	}
}

impl FrameworkInner {
	fn shutdown(&self) {
		if self.stopped.swap(true, Ordering::AcqRel) {
			return;
		}

		let trackers: Vec<_> = self.trackers.lock().drain().map(|(_, owned)| owned).collect();
		for owned in &trackers {
			owned.tracker.close();
		}

		let managers: Vec<_> = self.managers.write().drain().collect();
		let mut components = 0;
		for (_, manager) in &managers {
			components += manager.remove_all();
		}

		let owners: BTreeSet<BundleId> = self
			.registry
			.find_references(&ServiceQuery::default())
			.iter()
			.map(|r| r.owner())
			.collect();
		let services: usize = owners.into_iter().map(|owner| self.registry.unregister_all(owner)).sum();

		info!(
			framework = %self.uuid,
			trackers = trackers.len(),
			components,
			services,
			"framework stopped"
		);
	}
}

impl Drop for FrameworkInner {
	fn drop(&mut self) {
		self.shutdown();
	}
}
