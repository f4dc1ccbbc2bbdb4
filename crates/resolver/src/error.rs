use thiserror::Error;

use crate::module::{ModuleId, Requirement};

/// A requirement that ended up without candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingRequirement {
	pub module: ModuleId,
	pub module_name: String,
	pub requirement: Requirement,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
	#[error("{0} is already resolved")]
	AlreadyResolved(ModuleId),
	#[error("{0} is not resolved")]
	NotResolved(ModuleId),
	#[error("unknown {0}")]
	UnknownModule(ModuleId),
	#[error("unable to resolve {module}: {} requirement(s) without candidates", .missing.len())]
	Unresolvable {
		module: ModuleId,
		missing: Vec<MissingRequirement>,
	},
}
