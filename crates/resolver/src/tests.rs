use pretty_assertions::assert_eq;
use tether_filter::Properties;

use crate::*;

fn provider(name: &str, capability: &str) -> Module {
	Module::new(name).with_capability(Capability::new(capability, Properties::new()))
}

fn missing(err: ResolveError) -> Vec<(ModuleId, String)> {
	match err {
		ResolveError::Unresolvable { missing, .. } => missing
			.into_iter()
			.map(|m| (m.module, m.requirement.name))
			.collect(),
		other => panic!("expected Unresolvable, got {other:?}"),
	}
}

#[test]
fn test_chain_pulls_in_providers() {
	let mut ctx = ResolverContext::new();
	let log = ctx.add_module(provider("log", "logging"));
	let http = ctx.add_module(provider("http", "http").with_requirement(Requirement::new("logging")));
	let app = ctx.add_module(Module::new("app").with_requirement(Requirement::new("http")));

	let resolution = ctx.resolve(app).unwrap();
	assert_eq!(resolution.root(), app);
	assert_eq!(resolution.modules().collect::<Vec<_>>(), vec![app, http, log]);
	assert_eq!(
		resolution.wires_of(app).unwrap(),
		&[Wire {
			importer: app,
			requirement: 0,
			exporter: http,
			capability: 0,
		}]
	);
	assert!(resolution.wires_of(log).unwrap().is_empty());

	let applied = resolution.apply(&mut ctx).unwrap();
	assert_eq!(applied, vec![app, http, log]);
	assert!(ctx.modules().all(|(_, m)| m.is_resolved()));
	assert_eq!(ctx.module(http).unwrap().wires()[0].exporter, log);
	assert_eq!(ctx.candidate_count(), (2, 0));
}

#[test]
fn test_resolve_only_plans() {
	let mut ctx = ResolverContext::new();
	ctx.add_module(provider("log", "logging"));
	let app = ctx.add_module(Module::new("app").with_requirement(Requirement::new("logging")));

	let resolution = ctx.resolve(app).unwrap();
	assert_eq!(resolution.len(), 2);
	assert!(ctx.modules().all(|(_, m)| !m.is_resolved()));
	assert_eq!(ctx.candidate_count(), (0, 1));
	assert_eq!(ctx.resolve(app).unwrap(), resolution);
}

#[test]
fn test_cycle_resolves() {
	let mut ctx = ResolverContext::new();
	let a = ctx.add_module(provider("a", "A").with_requirement(Requirement::new("B")));
	let b = ctx.add_module(provider("b", "B").with_requirement(Requirement::new("A")));

	let resolution = ctx.resolve(a).unwrap();
	assert_eq!(resolution.modules().collect::<Vec<_>>(), vec![a, b]);
	assert_eq!(resolution.wires_of(a).unwrap()[0].exporter, b);
	assert_eq!(resolution.wires_of(b).unwrap()[0].exporter, a);

	resolution.apply(&mut ctx).unwrap();
	assert!(ctx.module(a).unwrap().is_resolved());
	assert!(ctx.module(b).unwrap().is_resolved());
}

#[test]
fn test_missing_requirement_is_reported() {
	let mut ctx = ResolverContext::new();
	let app = ctx.add_module(
		Module::new("app")
			.with_requirement(Requirement::new("nothing"))
			.with_requirement(Requirement::new("unused")),
	);

	let err = ctx.resolve(app).unwrap_err();
	assert_eq!(err.to_string(), "unable to resolve module#0: 1 requirement(s) without candidates");
	assert_eq!(missing(err), vec![(app, "nothing".to_string())]);
	assert!(!ctx.module(app).unwrap().is_resolved());
}

#[test]
fn test_filter_selects_candidates() {
	let mut ctx = ResolverContext::new();
	ctx.add_module(Module::new("v1").with_capability(Capability::new("api", Properties::from([("version", 1i64)]))));
	let app = ctx.add_module(Module::new("app").with_requirement(Requirement::with_filter("api", "(version>=2)").unwrap()));
	assert_eq!(missing(ctx.resolve(app).unwrap_err()), vec![(app, "api".to_string())]);

	let v3 = ctx.add_module(Module::new("v3").with_capability(Capability::new("api", Properties::from([("version", 3i64)]))));
	let resolution = ctx.resolve(app).unwrap();
	assert_eq!(resolution.wires_of(app).unwrap()[0].exporter, v3);
}

#[test]
fn test_unsatisfiable_provider_is_skipped() {
	let mut ctx = ResolverContext::new();
	let broken = ctx.add_module(provider("broken", "A").with_requirement(Requirement::new("nothing")));
	let good = ctx.add_module(provider("good", "A"));
	let app = ctx.add_module(Module::new("app").with_requirement(Requirement::new("A")));

	let resolution = ctx.resolve(app).unwrap();
	assert_eq!(resolution.wires_of(app).unwrap()[0].exporter, good);
	assert!(resolution.wires_of(broken).is_none());

	ctx.remove_module(good).unwrap();
	assert_eq!(
		missing(ctx.resolve(app).unwrap_err()),
		vec![(broken, "nothing".to_string()), (app, "A".to_string())]
	);
}

/// `p` only resolves through the root, so when the root fails on its own
/// requirement `p` fails with it even though it was fully populated.
#[test]
fn test_invalidity_cascades_to_populated_modules() {
	let mut ctx = ResolverContext::new();
	let root = ctx.add_module(
		provider("root", "R")
			.with_requirement(Requirement::new("P"))
			.with_requirement(Requirement::new("Q")),
	);
	let p = ctx.add_module(provider("p", "P").with_requirement(Requirement::new("R")));

	assert_eq!(
		missing(ctx.resolve(root).unwrap_err()),
		vec![(root, "Q".to_string()), (p, "R".to_string())]
	);
}

#[test]
fn test_resolved_providers_are_not_replanned() {
	let mut ctx = ResolverContext::new();
	let log = ctx.add_module(provider("log", "logging"));
	ctx.resolve(log).unwrap().apply(&mut ctx).unwrap();
	assert_eq!(ctx.candidate_count(), (1, 0));

	let app = ctx.add_module(Module::new("app").with_requirement(Requirement::new("logging")));
	let resolution = ctx.resolve(app).unwrap();
	assert_eq!(resolution.modules().collect::<Vec<_>>(), vec![app]);
	assert_eq!(resolution.wires_of(app).unwrap()[0].exporter, log);
}

#[test]
fn test_imported_capability_is_not_reexported() {
	let mut ctx = ResolverContext::new();
	let upstream = ctx.add_module(provider("upstream", "api"));
	let shim = ctx.add_module(provider("shim", "api").with_requirement(Requirement::new("api")));

	let resolution = ctx.resolve(shim).unwrap();
	assert_eq!(resolution.wires_of(shim).unwrap()[0].exporter, upstream);
	resolution.apply(&mut ctx).unwrap();

	// Only upstream's copy is offered; shim imports rather than exports.
	assert_eq!(ctx.candidate_count(), (1, 0));
}

#[test]
fn test_self_satisfied_requirement_has_no_wire() {
	let mut ctx = ResolverContext::new();
	let solo = ctx.add_module(provider("solo", "api").with_requirement(Requirement::new("api")));

	let resolution = ctx.resolve(solo).unwrap();
	assert!(resolution.wires_of(solo).unwrap().is_empty());
	resolution.apply(&mut ctx).unwrap();
	assert_eq!(ctx.candidate_count(), (1, 0));
}

#[test]
fn test_context_errors() {
	let mut ctx = ResolverContext::new();
	let log = ctx.add_module(provider("log", "logging"));

	assert_eq!(ctx.resolve(ModuleId(7)).unwrap_err(), ResolveError::UnknownModule(ModuleId(7)));
	assert_eq!(ctx.module_resolved(log).unwrap_err(), ResolveError::NotResolved(log));

	ctx.resolve(log).unwrap().apply(&mut ctx).unwrap();
	assert_eq!(ctx.resolve(log).unwrap_err(), ResolveError::AlreadyResolved(log));

	ctx.remove_module(log).unwrap();
	assert_eq!(ctx.remove_module(log).unwrap_err(), ResolveError::UnknownModule(log));
	assert_eq!(ctx.candidate_count(), (0, 0));
	assert!(ctx.is_empty());
}

#[test]
fn test_stale_resolution_is_not_applied() {
	let mut ctx = ResolverContext::new();
	let log = ctx.add_module(provider("log", "logging"));
	let app = ctx.add_module(Module::new("app").with_requirement(Requirement::new("logging")));

	let resolution = ctx.resolve(app).unwrap();
	ctx.remove_module(log).unwrap();
	assert_eq!(resolution.apply(&mut ctx).unwrap_err(), ResolveError::UnknownModule(log));
	assert!(!ctx.module(app).unwrap().is_resolved());
}

#[test]
fn test_module_ids_are_reused() {
	let mut ctx = ResolverContext::new();
	let first = ctx.add_module(Module::new("first"));
	ctx.add_module(Module::new("second"));
	ctx.remove_module(first).unwrap();

	let third = ctx.add_module(Module::new("third"));
	assert_eq!(third, first);
	assert_eq!(ctx.module(third).unwrap().name(), "third");
	assert_eq!(ctx.len(), 2);
}
