//! Service handles, factories and lookup queries.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tether_filter::{Filter, Properties};

use crate::entry::ServiceReference;
use crate::error::RegistryError;
use crate::ids::BundleId;

/// Service name, injected into every registration's properties.
pub const OBJECT_CLASS: &str = "objectClass";
pub const SERVICE_ID: &str = "service.id";
/// Id of the bundle that registered the service.
pub const SERVICE_BUNDLE_ID: &str = "service.bundleid";
/// Ranking used to order services of the same name. Defaults to 0.
pub const SERVICE_RANKING: &str = "service.ranking";

/// Type-erased service implementation.
pub type ServiceObject = Arc<dyn Any + Send + Sync>;

/// Produces a service object per consuming bundle.
///
/// `get_service` runs at most once per (bundle, registration) while the
/// bundle holds the service; `unget_service` runs when its usage count
/// drops back to zero.
///
/// `get_service` runs while the registry holds the registration's usage
/// lock. It must not call [`ServiceReference::usage_count`] or
/// [`ServiceReference::using_bundles`] on the same registration, nor get or
/// unget it; those would deadlock. Reading the reference's id, name, owner
/// and properties is fine. `unget_service` runs without the lock.
pub trait ServiceFactory: Send + Sync {
	fn get_service(&self, bundle: BundleId, reference: &ServiceReference) -> Option<ServiceObject>;

	fn unget_service(&self, _bundle: BundleId, _reference: &ServiceReference, _service: &ServiceObject) {}
}

/// What a registration hands out to consumers.
#[derive(Clone)]
pub enum ServiceSource {
	Plain(ServiceObject),
	Factory(Arc<dyn ServiceFactory>),
}

impl ServiceSource {
	pub fn plain<S: Any + Send + Sync>(service: S) -> Self {
		Self::Plain(Arc::new(service))
	}

	pub fn factory<F: ServiceFactory + 'static>(factory: F) -> Self {
		Self::Factory(Arc::new(factory))
	}

	pub fn is_factory(&self) -> bool {
		matches!(self, Self::Factory(_))
	}
}

impl fmt::Debug for ServiceSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(if self.is_factory() { "Factory" } else { "Plain" })
	}
}

/// Service name and/or filter, as used by lookups, listeners and trackers.
///
/// An empty query matches every service.
#[derive(Debug, Clone, Default)]
pub struct ServiceQuery {
	name: Option<Arc<str>>,
	filter: Option<Filter>,
}

impl ServiceQuery {
	/// Builds a query from an optional name and filter string. Blank values
	/// are treated as absent.
	pub fn new(name: Option<&str>, filter: Option<&str>) -> Result<Self, RegistryError> {
		let name = name.map(str::trim).filter(|n| !n.is_empty()).map(Arc::from);
		let filter = Filter::parse_optional(filter)?;
		Ok(Self { name, filter })
	}

	pub fn for_name(name: &str) -> Self {
		Self {
			name: Some(Arc::from(name)),
			filter: None,
		}
	}

	pub fn with_filter(mut self, filter: Filter) -> Self {
		self.filter = Some(filter);
		self
	}

	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn filter(&self) -> Option<&Filter> {
		self.filter.as_ref()
	}

	pub fn matches(&self, props: &Properties) -> bool {
		if let Some(name) = &self.name
			&& props.get_str(OBJECT_CLASS) != Some(name.as_ref())
		{
			return false;
		}
		self.filter.as_ref().is_none_or(|f| f.matches(props))
	}
}

impl fmt::Display for ServiceQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (&self.name, &self.filter) {
			(None, None) => f.write_str("*"),
			(Some(name), None) => write!(f, "({OBJECT_CLASS}={name})"),
			(None, Some(filter)) => write!(f, "{filter}"),
			(Some(name), Some(filter)) => write!(f, "(&({OBJECT_CLASS}={name}){filter})"),
		}
	}
}
