use std::fmt;
use std::sync::Arc;

use tether_filter::Properties;

use crate::entry::ServiceReference;
use crate::error::RegistryError;
use crate::ids::ServiceId;
use crate::registry::ServiceRegistry;

/// Provider-side handle of a registered service.
///
/// Dropping the handle does not unregister the service; call
/// [`ServiceRegistration::unregister`] or stop the owning bundle.
pub struct ServiceRegistration {
	registry: ServiceRegistry,
	reference: ServiceReference,
}

impl ServiceRegistration {
	pub(crate) fn new(registry: ServiceRegistry, reference: ServiceReference) -> Self {
		Self { registry, reference }
	}

	pub fn id(&self) -> ServiceId {
		self.reference.id()
	}

	pub fn reference(&self) -> &ServiceReference {
		&self.reference
	}

	pub fn properties(&self) -> Arc<Properties> {
		self.reference.properties()
	}

	pub fn is_registered(&self) -> bool {
		self.reference.is_valid()
	}

	pub fn set_properties(&self, properties: Properties) -> Result<(), RegistryError> {
		self.registry.modify_reference(&self.reference, properties)
	}

	/// # Errors
	///
	/// [`RegistryError::IllegalState`] on a second call.
	pub fn unregister(&self) -> Result<(), RegistryError> {
		self.registry.unregister_reference(&self.reference)
	}
}

impl fmt::Debug for ServiceRegistration {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ServiceRegistration").field(&self.reference).finish()
	}
}
