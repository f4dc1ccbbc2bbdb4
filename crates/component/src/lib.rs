//! Dependency manager.
//!
//! A [`Component`] declares the services it needs ([`ServiceDependency`])
//! and the services it provides. It is initialized and started once every
//! required dependency is bound, and stopped again before a required
//! service it relies on is released.
//!
//! ```
//! use tether_component::{Callbacks, Component, ComponentState, DependencyManager, ServiceDependency};
//! use tether_filter::Properties;
//! use tether_registry::{BundleId, ServiceRegistry, ServiceSource};
//!
//! let registry = ServiceRegistry::new();
//! let manager = DependencyManager::new(&registry, BundleId(1));
//!
//! let foo = ServiceDependency::new("Foo").required(true);
//! let slot = foo.slot();
//! let component = manager
//! 	.create(Component::builder("consumer").dependency(foo).lifecycle(Callbacks::new()))
//! 	.unwrap();
//! assert_eq!(component.state(), ComponentState::WaitingForRequired);
//!
//! let registration = registry
//! 	.register(BundleId(2), "Foo", Properties::new(), ServiceSource::plain(42u32))
//! 	.unwrap();
//! assert!(component.is_active());
//! assert_eq!(slot.service::<u32>().as_deref(), Some(&42));
//!
//! registration.unregister().unwrap();
//! assert_eq!(component.state(), ComponentState::InstantiatedAndWaitingForRequired);
//! ```

mod component;
mod dependency;
mod error;
mod ids;
mod lifecycle;
mod manager;
mod state;

#[cfg(test)]
mod tests;

pub use component::{Component, ComponentBuilder, ComponentInfo, InterfaceInfo};
pub use dependency::{DependencyCallback, DependencyInfo, ServiceDependency, ServiceSlot, SetCallback, SwapCallback, UpdateStrategy};
pub use error::{BoxError, ComponentError};
pub use ids::{ComponentId, DependencyId};
pub use lifecycle::{Callbacks, Lifecycle};
pub use manager::DependencyManager;
pub use state::{ComponentState, Stage};
