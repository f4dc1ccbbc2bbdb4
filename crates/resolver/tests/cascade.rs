//! Resolution outcome against a brute-force fixpoint over random graphs.

use std::collections::BTreeSet;

use proptest::prelude::*;
use tether_filter::Properties;
use tether_resolver::{Capability, Module, ModuleId, Requirement, ResolveError, ResolverContext};

const PROVIDED: usize = 5;
const REQUIRED: usize = 7;

type Shape = Vec<(BTreeSet<usize>, BTreeSet<usize>)>;

fn graph() -> impl Strategy<Value = Shape> {
	prop::collection::vec(
		(
			prop::collection::btree_set(0..PROVIDED, 0..3),
			prop::collection::btree_set(0..REQUIRED, 0..3),
		),
		1..7,
	)
}

fn build(shape: &Shape) -> (ResolverContext, Vec<ModuleId>) {
	let mut ctx = ResolverContext::new();
	let ids = shape
		.iter()
		.enumerate()
		.map(|(i, (provides, requires))| {
			let mut module = Module::new(format!("m{i}"));
			for p in provides {
				module = module.with_capability(Capability::new(format!("c{p}"), Properties::new()));
			}
			for r in requires {
				module = module.with_requirement(Requirement::new(format!("c{r}")));
			}
			ctx.add_module(module)
		})
		.collect();
	(ctx, ids)
}

/// Modules that survive repeatedly dropping any module with a requirement
/// no surviving module provides.
fn viable(shape: &Shape) -> BTreeSet<usize> {
	let mut alive: BTreeSet<usize> = (0..shape.len()).collect();
	loop {
		let dead: Vec<usize> = alive
			.iter()
			.copied()
			.filter(|&m| {
				shape[m]
					.1
					.iter()
					.any(|r| !alive.iter().any(|&p| shape[p].0.contains(r)))
			})
			.collect();
		if dead.is_empty() {
			return alive;
		}
		for m in dead {
			alive.remove(&m);
		}
	}
}

proptest! {
	#[test]
	fn resolves_exactly_the_viable_modules(shape in graph(), root in 0usize..7) {
		let root = root % shape.len();
		let (ctx, ids) = build(&shape);
		let viable = viable(&shape);

		match ctx.resolve(ids[root]) {
			Ok(resolution) => {
				prop_assert!(viable.contains(&root));
				let planned: BTreeSet<ModuleId> = resolution.modules().collect();
				for module in &planned {
					prop_assert!(viable.contains(&module.0));
				}
				for wire in resolution.wires() {
					prop_assert!(planned.contains(&wire.exporter));
					prop_assert_ne!(wire.importer, wire.exporter);
				}
			}
			Err(ResolveError::Unresolvable { module, missing }) => {
				prop_assert!(!viable.contains(&root));
				prop_assert_eq!(module, ids[root]);
				prop_assert!(!missing.is_empty());
			}
			Err(other) => prop_assert!(false, "unexpected error {other}"),
		}
	}

	#[test]
	fn applying_resolves_every_planned_module(shape in graph(), root in 0usize..7) {
		let root = root % shape.len();
		let (mut ctx, ids) = build(&shape);
		prop_assume!(viable(&shape).contains(&root));

		let resolution = ctx.resolve(ids[root]).unwrap();
		let planned: Vec<ModuleId> = resolution.modules().collect();
		let applied = resolution.apply(&mut ctx).unwrap();
		prop_assert_eq!(&applied, &planned);
		for id in planned {
			let module = ctx.module(id).unwrap();
			prop_assert!(module.is_resolved());
			let wired: BTreeSet<usize> = module.wires().iter().map(|w| w.requirement).collect();
			for (idx, req) in module.requirements().iter().enumerate() {
				let self_served = module.capabilities().iter().any(|c| req.is_satisfied_by(c));
				prop_assert!(wired.contains(&idx) || self_served);
			}
		}
	}
}

