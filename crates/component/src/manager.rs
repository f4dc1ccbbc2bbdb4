use parking_lot::RwLock;
use tether_registry::{BundleId, ServiceRegistry};
use tracing::debug;

use crate::component::{Component, ComponentBuilder, ComponentInfo};
use crate::error::ComponentError;
use crate::ids::ComponentId;

/// Owns the components of one bundle.
///
/// Adding a component enables it; removing it disables it first. Dropping
/// the manager removes every component, newest first.
pub struct DependencyManager {
	registry: ServiceRegistry,
	bundle: BundleId,
	components: RwLock<Vec<Component>>,
}

impl DependencyManager {
	pub fn new(registry: &ServiceRegistry, bundle: BundleId) -> Self {
		Self {
			registry: registry.clone(),
			bundle,
			components: RwLock::new(Vec::new()),
		}
	}

	pub fn bundle(&self) -> BundleId {
		self.bundle
	}

	/// Builds a component for this manager's bundle and adds it.
	///
	/// # Errors
	///
	/// See [`ComponentBuilder::build`].
	pub fn create(&self, builder: ComponentBuilder) -> Result<Component, ComponentError> {
		let component = builder.build(&self.registry, self.bundle)?;
		self.add(component.clone())?;
		Ok(component)
	}

	/// # Errors
	///
	/// [`ComponentError::AlreadyManaged`] when the component was added before.
	pub fn add(&self, component: Component) -> Result<ComponentId, ComponentError> {
		let id = component.id();
		{
			let mut components = self.components.write();
			if components.iter().any(|c| c.id() == id) {
				return Err(ComponentError::AlreadyManaged(id));
			}
			components.push(component.clone());
		}
		debug!(component = component.name(), component.id = %id, bundle = %self.bundle, "component added");
		component.enable();
		Ok(id)
	}

	/// Disables and drops a component.
	///
	/// # Errors
	///
	/// [`ComponentError::UnknownComponent`] when `id` is not managed here.
	pub fn remove(&self, id: ComponentId) -> Result<Component, ComponentError> {
		let component = {
			let mut components = self.components.write();
			let pos = components
				.iter()
				.position(|c| c.id() == id)
				.ok_or(ComponentError::UnknownComponent(id))?;
			components.remove(pos)
		};
		component.disable();
		debug!(component = component.name(), component.id = %id, "component removed");
		Ok(component)
	}

	/// Removes every component, newest first.
	pub fn remove_all(&self) -> usize {
		let components = std::mem::take(&mut *self.components.write());
		for component in components.iter().rev() {
			component.disable();
		}
		components.len()
	}

	pub fn component(&self, id: ComponentId) -> Option<Component> {
		self.components.read().iter().find(|c| c.id() == id).cloned()
	}

	pub fn components(&self) -> Vec<Component> {
		self.components.read().clone()
	}

	pub fn len(&self) -> usize {
		self.components.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn info(&self) -> Vec<ComponentInfo> {
		self.components().iter().map(Component::info).collect()
	}

	pub fn all_components_active(&self) -> bool {
		self.components.read().iter().all(Component::is_active)
	}
}

impl Drop for DependencyManager {
	fn drop(&mut self) {
		self.remove_all();
	}
}
