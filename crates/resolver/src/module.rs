use std::fmt;

use tether_filter::{Filter, FilterError, Properties};

/// Handle of a module inside a [`ResolverContext`](crate::ResolverContext).
///
/// Handles are reused after a module is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub usize);

impl fmt::Display for ModuleId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "module#{}", self.0)
	}
}

/// Something a module offers, identified by name and described by
/// properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
	pub name: String,
	pub properties: Properties,
}

impl Capability {
	pub fn new(name: impl Into<String>, properties: Properties) -> Self {
		Self {
			name: name.into(),
			properties,
		}
	}
}

/// Something a module needs: a capability name and an optional filter over
/// the capability's properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
	pub name: String,
	pub filter: Option<Filter>,
}

impl Requirement {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			filter: None,
		}
	}

	/// # Errors
	///
	/// [`FilterError`] when `filter` does not parse.
	pub fn with_filter(name: impl Into<String>, filter: &str) -> Result<Self, FilterError> {
		Ok(Self {
			name: name.into(),
			filter: Filter::parse_optional(Some(filter))?,
		})
	}

	pub fn is_satisfied_by(&self, capability: &Capability) -> bool {
		self.name == capability.name && self.filter.as_ref().is_none_or(|f| f.matches(&capability.properties))
	}
}

impl fmt::Display for Requirement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.filter {
			Some(filter) => write!(f, "{} {filter}", self.name),
			None => f.write_str(&self.name),
		}
	}
}

/// Capability `capability` of module `module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityRef {
	pub module: ModuleId,
	pub capability: usize,
}

/// A requirement of `importer` bound to a capability of `exporter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Wire {
	pub importer: ModuleId,
	/// Index into the importer's requirements.
	pub requirement: usize,
	pub exporter: ModuleId,
	/// Index into the exporter's capabilities.
	pub capability: usize,
}

/// A unit of capabilities and requirements, resolved as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
	name: String,
	capabilities: Vec<Capability>,
	requirements: Vec<Requirement>,
	resolved: bool,
	wires: Vec<Wire>,
}

impl Module {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			capabilities: Vec::new(),
			requirements: Vec::new(),
			resolved: false,
			wires: Vec::new(),
		}
	}

	pub fn with_capability(mut self, capability: Capability) -> Self {
		self.capabilities.push(capability);
		self
	}

	pub fn with_requirement(mut self, requirement: Requirement) -> Self {
		self.requirements.push(requirement);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn capabilities(&self) -> &[Capability] {
		&self.capabilities
	}

	pub fn requirements(&self) -> &[Requirement] {
		&self.requirements
	}

	pub fn is_resolved(&self) -> bool {
		self.resolved
	}

	/// Wires stored when the module was resolved.
	pub fn wires(&self) -> &[Wire] {
		&self.wires
	}

	pub(crate) fn mark_resolved(&mut self, wires: Vec<Wire>) {
		self.resolved = true;
		self.wires = wires;
	}
}
