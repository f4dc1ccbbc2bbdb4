//! Resolution planning.
//!
//! Candidates are collected depth-first: before a module's candidate list
//! is final, every unresolved module offering one of its candidates is
//! populated too. Modules already on the stack count as satisfiable, which
//! is what lets cycles resolve. A module left with a requirement without
//! candidates is invalid, and invalidity spreads through a worklist to
//! every module whose last candidate for some requirement it provided.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::context::ResolverContext;
use crate::error::{MissingRequirement, ResolveError};
use crate::module::{CapabilityRef, ModuleId, Wire};

#[derive(Debug, Clone)]
struct CandidateSet {
	requirement: usize,
	candidates: Vec<CapabilityRef>,
}

enum Visit {
	/// On the stack; assumed satisfiable.
	InProgress,
	Done(Vec<CandidateSet>),
}

pub(crate) struct Planner<'a> {
	ctx: &'a ResolverContext,
	visits: FxHashMap<ModuleId, Visit>,
	invalid: FxHashSet<ModuleId>,
	missing: Vec<MissingRequirement>,
}

impl<'a> Planner<'a> {
	pub(crate) fn new(ctx: &'a ResolverContext) -> Self {
		Self {
			ctx,
			visits: FxHashMap::default(),
			invalid: FxHashSet::default(),
			missing: Vec::new(),
		}
	}

	pub(crate) fn plan(mut self, root: ModuleId) -> Result<Resolution, ResolveError> {
		if !self.populate(root) {
			info!(module = %root, missing = self.missing.len(), "unable to resolve");
			return Err(ResolveError::Unresolvable {
				module: root,
				missing: self.missing,
			});
		}

		let mut wires = Vec::new();
		self.populate_wires(root, &mut wires);
		debug!(module = %root, modules = wires.len(), "resolution planned");
		Ok(Resolution { root, wires })
	}

	/// Returns whether `module` can still be resolved.
	fn populate(&mut self, module: ModuleId) -> bool {
		if self.invalid.contains(&module) {
			return false;
		}
		if self.visits.contains_key(&module) {
			return true;
		}
		let ctx = self.ctx;
		let Some(target) = ctx.module(module) else {
			return false;
		};
		self.visits.insert(module, Visit::InProgress);

		let mut sets = Vec::with_capacity(target.requirements().len());
		for (idx, req) in target.requirements().iter().enumerate() {
			let mut candidates: Vec<CapabilityRef> = ctx
				.resolved_index()
				.get(&req.name)
				.iter()
				.chain(ctx.unresolved_index().get(&req.name))
				.copied()
				.filter(|cap| {
					ctx.module(cap.module)
						.and_then(|m| m.capabilities().get(cap.capability))
						.is_some_and(|c| req.is_satisfied_by(c))
				})
				.collect();

			candidates.retain(|cap| ctx.module(cap.module).is_some_and(|m| m.is_resolved()) || self.populate(cap.module));
			if candidates.is_empty() {
				self.record_missing(module, idx);
				self.invalidate(module);
				return false;
			}
			sets.push(CandidateSet {
				requirement: idx,
				candidates,
			});
		}

		// Populating later requirements may have invalidated providers
		// chosen for earlier ones, or this module itself through a cycle.
		for set in &mut sets {
			set.candidates.retain(|cap| !self.invalid.contains(&cap.module));
		}
		if let Some(set) = sets.iter().find(|s| s.candidates.is_empty()) {
			self.record_missing(module, set.requirement);
			self.invalidate(module);
			return false;
		}
		if self.invalid.contains(&module) {
			return false;
		}

		self.visits.insert(module, Visit::Done(sets));
		true
	}

	/// Marks `start` invalid and strips its capabilities from every
	/// populated candidate set. A module whose set runs dry is invalid in
	/// turn.
	fn invalidate(&mut self, start: ModuleId) {
		let mut worklist = vec![start];
		while let Some(invalid) = worklist.pop() {
			if !self.invalid.insert(invalid) {
				continue;
			}
			self.visits.remove(&invalid);

			let mut emptied = Vec::new();
			for (&module, visit) in &mut self.visits {
				let Visit::Done(sets) = visit else {
					continue;
				};
				for set in sets.iter_mut() {
					let before = set.candidates.len();
					set.candidates.retain(|cap| cap.module != invalid);
					if before > 0 && set.candidates.is_empty() {
						emptied.push((module, set.requirement));
					}
				}
			}
			for (module, requirement) in emptied {
				if module != invalid && !self.invalid.contains(&module) {
					self.record_missing(module, requirement);
					worklist.push(module);
				}
			}
		}
	}

	fn record_missing(&mut self, module: ModuleId, requirement: usize) {
		let ctx = self.ctx;
		let Some(target) = ctx.module(module) else {
			return;
		};
		if let Some(req) = target.requirements().get(requirement) {
			info!(module = %module, name = target.name(), requirement = %req, "requirement has no candidates");
			self.missing.push(MissingRequirement {
				module,
				module_name: target.name().to_string(),
				requirement: req.clone(),
			});
		}
	}

	/// Wires every requirement of `importer` to its first candidate, then
	/// recurses into the chosen exporters.
	fn populate_wires(&self, importer: ModuleId, out: &mut Vec<(ModuleId, Vec<Wire>)>) {
		if self.ctx.module(importer).is_none_or(|m| m.is_resolved()) || out.iter().any(|(m, _)| *m == importer) {
			return;
		}
		let Some(Visit::Done(sets)) = self.visits.get(&importer) else {
			return;
		};

		let slot = out.len();
		out.push((importer, Vec::new()));
		let mut wires = Vec::with_capacity(sets.len());
		for set in sets {
			let Some(first) = set.candidates.first() else {
				continue;
			};
			if first.module != importer {
				wires.push(Wire {
					importer,
					requirement: set.requirement,
					exporter: first.module,
					capability: first.capability,
				});
			}
			self.populate_wires(first.module, out);
		}
		out[slot].1 = wires;
	}
}

/// Planned wires for a root module and the unresolved modules it pulls in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
	root: ModuleId,
	wires: Vec<(ModuleId, Vec<Wire>)>,
}

impl Resolution {
	pub fn root(&self) -> ModuleId {
		self.root
	}

	/// Modules to be marked resolved, root first.
	pub fn modules(&self) -> impl Iterator<Item = ModuleId> + '_ {
		self.wires.iter().map(|(m, _)| *m)
	}

	pub fn wires_of(&self, module: ModuleId) -> Option<&[Wire]> {
		self.wires.iter().find(|(m, _)| *m == module).map(|(_, w)| &w[..])
	}

	pub fn wires(&self) -> impl Iterator<Item = &Wire> {
		self.wires.iter().flat_map(|(_, w)| w)
	}

	pub fn len(&self) -> usize {
		self.wires.len()
	}

	pub fn is_empty(&self) -> bool {
		self.wires.is_empty()
	}

	/// Stores the wires, marks every planned module resolved and moves its
	/// capabilities to the resolved index.
	///
	/// # Errors
	///
	/// [`ResolveError::UnknownModule`] or [`ResolveError::AlreadyResolved`]
	/// when the context changed since planning; nothing is applied then.
	pub fn apply(self, ctx: &mut ResolverContext) -> Result<Vec<ModuleId>, ResolveError> {
		for (module, wires) in &self.wires {
			let target = ctx.module(*module).ok_or(ResolveError::UnknownModule(*module))?;
			if target.is_resolved() {
				return Err(ResolveError::AlreadyResolved(*module));
			}
			if let Some(wire) = wires.iter().find(|w| ctx.module(w.exporter).is_none()) {
				return Err(ResolveError::UnknownModule(wire.exporter));
			}
		}

		let mut applied = Vec::with_capacity(self.wires.len());
		for (module, wires) in self.wires {
			if let Some(target) = ctx.module_mut(module) {
				target.mark_resolved(wires);
			}
			applied.push(module);
		}
		for module in &applied {
			ctx.module_resolved(*module)?;
		}
		Ok(applied)
	}
}
