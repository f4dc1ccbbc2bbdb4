//! Framework facade.
//!
//! A [`Framework`] owns one service registry, a dependency manager per
//! bundle and a resolver context. Bundles act on it through a
//! [`BundleContext`], which scopes ownership of services, trackers and
//! components to the bundle.
//!
//! ```
//! use tether_filter::Properties;
//! use tether_framework::{Framework, FrameworkConfig};
//! use tether_registry::BundleId;
//!
//! let framework = Framework::new(FrameworkConfig::default()).unwrap();
//! let provider = framework.bundle_context(BundleId(1));
//! let consumer = framework.bundle_context(BundleId(2));
//!
//! provider.register_service("greeter", Properties::new(), String::from("hello")).unwrap();
//! let greeting = consumer
//! 	.use_service("greeter", None, |svc, _| svc.downcast_ref::<String>().cloned())
//! 	.unwrap()
//! 	.flatten();
//! assert_eq!(greeting.as_deref(), Some("hello"));
//!
//! framework.shutdown();
//! assert_eq!(framework.registry().service_count(), 0);
//! ```

mod config;
mod context;
mod error;
mod framework;
mod logging;


pub use config::{ConfigError, FrameworkConfig, LoggingConfig};
pub use context::BundleContext;
pub use error::FrameworkError;
pub use framework::{FRAMEWORK_UUID, Framework, TrackerId};
pub use logging::init_tracing;
