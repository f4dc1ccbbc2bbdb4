//! Requirement/capability resolver.
//!
//! Modules declare named [`Capability`]s and [`Requirement`]s. Resolving a
//! module finds, for every requirement, a capability that satisfies it, and
//! pulls in the unresolved modules providing those capabilities. The
//! outcome is a [`Resolution`]: one [`Wire`] per bound requirement, applied
//! to the context in one step.
//!
//! ```
//! use tether_filter::Properties;
//! use tether_resolver::{Capability, Module, Requirement, ResolverContext};
//!
//! let mut ctx = ResolverContext::new();
//! let log = ctx.add_module(
//! 	Module::new("log").with_capability(Capability::new("logging", Properties::from([("version", "2")]))),
//! );
//! let app = ctx.add_module(
//! 	Module::new("app").with_requirement(Requirement::with_filter("logging", "(version=2)").unwrap()),
//! );
//!
//! let resolution = ctx.resolve(app).unwrap();
//! assert_eq!(resolution.modules().collect::<Vec<_>>(), vec![app, log]);
//! resolution.apply(&mut ctx).unwrap();
//! assert!(ctx.module(app).unwrap().is_resolved());
//! assert_eq!(ctx.module(app).unwrap().wires()[0].exporter, log);
//! ```

mod context;
mod error;
mod module;
mod resolve;

#[cfg(test)]
mod tests;

pub use context::ResolverContext;
pub use error::{MissingRequirement, ResolveError};
pub use module::{Capability, CapabilityRef, Module, ModuleId, Requirement, Wire};
pub use resolve::Resolution;
