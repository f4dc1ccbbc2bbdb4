use rustc_hash::FxHashMap;
use slab::Slab;
use tracing::{debug, trace};

use crate::error::ResolveError;
use crate::module::{CapabilityRef, Module, ModuleId};
use crate::resolve::{Planner, Resolution};

/// Capabilities by name, in the order they were indexed.
#[derive(Debug, Default)]
pub(crate) struct CapabilityIndex {
	by_name: FxHashMap<String, Vec<CapabilityRef>>,
}

impl CapabilityIndex {
	pub(crate) fn get(&self, name: &str) -> &[CapabilityRef] {
		self.by_name.get(name).map_or(&[][..], |refs| &refs[..])
	}

	fn insert(&mut self, name: &str, cap: CapabilityRef) {
		self.by_name.entry(name.to_string()).or_default().push(cap);
	}

	fn remove(&mut self, name: &str, cap: CapabilityRef) {
		if let Some(refs) = self.by_name.get_mut(name) {
			refs.retain(|r| *r != cap);
			if refs.is_empty() {
				self.by_name.remove(name);
			}
		}
	}

	fn len(&self) -> usize {
		self.by_name.values().map(Vec::len).sum()
	}
}

/// Modules known to one framework instance, with their capabilities split
/// into a resolved and an unresolved index.
///
/// [`resolve`](Self::resolve) only plans; [`Resolution::apply`] marks the
/// planned modules resolved.
#[derive(Debug, Default)]
pub struct ResolverContext {
	modules: Slab<Module>,
	resolved: CapabilityIndex,
	unresolved: CapabilityIndex,
}

impl ResolverContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a module; its capabilities become candidates at once.
	pub fn add_module(&mut self, module: Module) -> ModuleId {
		let entry = self.modules.vacant_entry();
		let id = ModuleId(entry.key());
		for (idx, cap) in module.capabilities().iter().enumerate() {
			self.unresolved.insert(&cap.name, CapabilityRef { module: id, capability: idx });
		}
		trace!(module = %id, name = module.name(), "module added");
		entry.insert(module);
		id
	}

	/// # Errors
	///
	/// [`ResolveError::UnknownModule`] when `id` is not in the context.
	pub fn remove_module(&mut self, id: ModuleId) -> Result<Module, ResolveError> {
		let module = self.modules.try_remove(id.0).ok_or(ResolveError::UnknownModule(id))?;
		for (idx, cap) in module.capabilities().iter().enumerate() {
			let cap_ref = CapabilityRef { module: id, capability: idx };
			self.unresolved.remove(&cap.name, cap_ref);
			self.resolved.remove(&cap.name, cap_ref);
		}
		trace!(module = %id, name = module.name(), "module removed");
		Ok(module)
	}

	/// Moves a resolved module's capabilities to the resolved index, except
	/// those its own wires already import an equivalent of.
	///
	/// # Errors
	///
	/// [`ResolveError::UnknownModule`] or [`ResolveError::NotResolved`].
	pub fn module_resolved(&mut self, id: ModuleId) -> Result<(), ResolveError> {
		let module = self.modules.get(id.0).ok_or(ResolveError::UnknownModule(id))?;
		if !module.is_resolved() {
			return Err(ResolveError::NotResolved(id));
		}

		let mut exported = 0;
		for (idx, cap) in module.capabilities().iter().enumerate() {
			let cap_ref = CapabilityRef { module: id, capability: idx };
			self.unresolved.remove(&cap.name, cap_ref);
			let substituted = module.wires().iter().any(|wire| {
				module
					.requirements()
					.get(wire.requirement)
					.is_some_and(|req| req.is_satisfied_by(cap))
			});
			if !substituted && !self.resolved.get(&cap.name).contains(&cap_ref) {
				self.resolved.insert(&cap.name, cap_ref);
				exported += 1;
			}
		}
		debug!(module = %id, name = module.name(), exported, "module resolved");
		Ok(())
	}

	/// Plans wires for `root` and every unresolved module it needs.
	///
	/// # Errors
	///
	/// [`ResolveError::AlreadyResolved`], [`ResolveError::UnknownModule`], or
	/// [`ResolveError::Unresolvable`] listing the requirements left without
	/// candidates.
	pub fn resolve(&self, root: ModuleId) -> Result<Resolution, ResolveError> {
		let module = self.module(root).ok_or(ResolveError::UnknownModule(root))?;
		if module.is_resolved() {
			return Err(ResolveError::AlreadyResolved(root));
		}
		Planner::new(self).plan(root)
	}

	pub fn module(&self, id: ModuleId) -> Option<&Module> {
		self.modules.get(id.0)
	}

	pub(crate) fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
		self.modules.get_mut(id.0)
	}

	pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
		self.modules.iter().map(|(key, module)| (ModuleId(key), module))
	}

	pub fn len(&self) -> usize {
		self.modules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.modules.is_empty()
	}

	pub(crate) fn resolved_index(&self) -> &CapabilityIndex {
		&self.resolved
	}

	pub(crate) fn unresolved_index(&self) -> &CapabilityIndex {
		&self.unresolved
	}

	/// Number of indexed capabilities as (resolved, unresolved).
	pub fn candidate_count(&self) -> (usize, usize) {
		(self.resolved.len(), self.unresolved.len())
	}
}
