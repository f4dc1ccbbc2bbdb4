//! Dynamic service registry.
//!
//! Providers register services under a name with a property set; consumers
//! look them up by name and/or [`Filter`](tether_filter::Filter), or keep a
//! live view through a [`ServiceTracker`].
//!
//! ```
//! use tether_filter::Properties;
//! use tether_registry::{BundleId, ServiceRegistry, ServiceSource, SERVICE_RANKING};
//!
//! let registry = ServiceRegistry::new();
//! let low = registry
//! 	.register(BundleId(1), "Foo", Properties::new().with(SERVICE_RANKING, 5i64), ServiceSource::plain(5u32))
//! 	.unwrap();
//! let high = registry
//! 	.register(BundleId(1), "Foo", Properties::new().with(SERVICE_RANKING, 10i64), ServiceSource::plain(10u32))
//! 	.unwrap();
//!
//! let refs = registry.get_service_references(Some("Foo"), None).unwrap();
//! assert_eq!(refs[0].id(), high.id());
//! assert_eq!(refs[1].id(), low.id());
//! ```
//!
//! # Lifetimes
//!
//! Unregistering invalidates a service immediately: it disappears from
//! lookups and [`ServiceRegistry::get_service`] returns `None`. The entry
//! itself, including the implementation object, is freed once the last
//! [`ServiceReference`] is dropped.

mod entry;
mod error;
mod event;
mod ids;
mod registration;
mod registry;
mod service;
mod snapshot;
mod tracker;

#[cfg(any(test, doc))]
pub(crate) mod invariants;


pub use entry::ServiceReference;
pub use error::RegistryError;
pub use event::{ServiceEvent, ServiceEventKind, ServiceListener};
pub use ids::{BundleId, ListenerId, ServiceId};
pub use registration::ServiceRegistration;
pub use registry::ServiceRegistry;
pub use service::{
	OBJECT_CLASS, SERVICE_BUNDLE_ID, SERVICE_ID, SERVICE_RANKING, ServiceFactory, ServiceObject, ServiceQuery, ServiceSource,
};
pub use tracker::{AddingCallback, ServiceTracker, SetCallback, TrackedService, TrackerCallback, TrackerOptions};
