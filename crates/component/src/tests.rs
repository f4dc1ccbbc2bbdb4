use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tether_filter::Properties;
use tether_registry::{BundleId, SERVICE_RANKING, ServiceId, ServiceRegistration, ServiceRegistry, ServiceSource};

use super::*;

const PROVIDER: BundleId = BundleId(1);
const CONSUMER: BundleId = BundleId(2);

/// Records lifecycle calls and, when watching a slot, whether it was bound
/// at the time of the call.
#[derive(Default)]
struct Recorder {
	stages: Mutex<Vec<Stage>>,
	bound: Mutex<Vec<(Stage, bool)>>,
	fail_on: Mutex<Option<Stage>>,
	watch: Option<ServiceSlot>,
}

impl Recorder {
	fn watching(slot: ServiceSlot) -> Arc<Self> {
		Arc::new(Self {
			watch: Some(slot),
			..Self::default()
		})
	}

	fn record(&self, stage: Stage) -> Result<(), BoxError> {
		self.stages.lock().push(stage);
		if let Some(slot) = &self.watch {
			self.bound.lock().push((stage, slot.is_bound()));
		}
		if *self.fail_on.lock() == Some(stage) {
			return Err(format!("{stage} refused").into());
		}
		Ok(())
	}

	fn count(&self, stage: Stage) -> usize {
		self.stages.lock().iter().filter(|s| **s == stage).count()
	}

	fn stages(&self) -> Vec<Stage> {
		self.stages.lock().clone()
	}
}

impl Lifecycle for Recorder {
	fn init(&self) -> Result<(), BoxError> {
		self.record(Stage::Init)
	}

	fn start(&self) -> Result<(), BoxError> {
		self.record(Stage::Start)
	}

	fn stop(&self) -> Result<(), BoxError> {
		self.record(Stage::Stop)
	}

	fn deinit(&self) -> Result<(), BoxError> {
		self.record(Stage::Deinit)
	}
}

fn register(registry: &ServiceRegistry, name: &str, ranking: i64) -> ServiceRegistration {
	registry
		.register(PROVIDER, name, Properties::new().with(SERVICE_RANKING, ranking), ServiceSource::plain(ranking))
		.unwrap()
}

fn ids(calls: &Mutex<Vec<ServiceId>>) -> Vec<ServiceId> {
	calls.lock().clone()
}

#[test]
fn test_start_and_stop_see_the_slot_bound() {
	let registry = ServiceRegistry::new();
	let foo = ServiceDependency::new("Foo").required(true);
	let recorder = Recorder::watching(foo.slot());
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(Component::builder("consumer").dependency(foo).lifecycle(Arc::clone(&recorder)))
		.unwrap();

	let registration = register(&registry, "Foo", 0);
	assert!(component.is_active());
	registration.unregister().unwrap();
	assert_eq!(component.state(), ComponentState::InstantiatedAndWaitingForRequired);

	assert_eq!(
		*recorder.bound.lock(),
		vec![(Stage::Init, true), (Stage::Start, true), (Stage::Stop, true)]
	);
	assert_eq!(component.info().dependencies[0].count, 0);
}

#[test]
fn test_optional_dependency_does_not_gate() {
	let registry = ServiceRegistry::new();
	let added = Arc::new(Mutex::new(Vec::new()));
	let removed = Arc::new(Mutex::new(Vec::new()));
	let bar = {
		let (added, removed) = (Arc::clone(&added), Arc::clone(&removed));
		ServiceDependency::new("Bar")
			.on_add(move |s| {
				added.lock().push(s.id());
				Ok(())
			})
			.on_remove(move |s| {
				removed.lock().push(s.id());
				Ok(())
			})
	};
	let slot = bar.slot();
	let recorder = Arc::new(Recorder::default());
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(Component::builder("optional").dependency(bar).lifecycle(Arc::clone(&recorder)))
		.unwrap();

	assert!(component.is_active());
	assert!(!slot.is_bound());

	let registration = register(&registry, "Bar", 0);
	assert_eq!(slot.id(), Some(registration.id()));
	registration.unregister().unwrap();
	assert!(!slot.is_bound());

	assert!(component.is_active());
	assert_eq!(recorder.count(Stage::Start), 1);
	assert_eq!(ids(&added), vec![registration.id()]);
	assert_eq!(ids(&removed), vec![registration.id()]);
}

#[test]
fn test_swap_keeps_component_active() {
	let registry = ServiceRegistry::new();
	let swaps = Arc::new(Mutex::new(Vec::new()));
	let foo = {
		let swaps = Arc::clone(&swaps);
		ServiceDependency::new("Foo").required(true).on_swap(move |old, new| {
			swaps.lock().push((old.id(), new.id()));
			Ok(())
		})
	};
	let slot = foo.slot();
	let recorder = Arc::new(Recorder::default());
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(Component::builder("swapper").dependency(foo).lifecycle(Arc::clone(&recorder)))
		.unwrap();

	let low = register(&registry, "Foo", 1);
	let high = register(&registry, "Foo", 5);
	assert_eq!(slot.service::<i64>().as_deref(), Some(&5));
	assert_eq!(*swaps.lock(), vec![(low.id(), high.id())]);

	high.unregister().unwrap();
	assert_eq!(slot.id(), Some(low.id()));
	assert_eq!(*swaps.lock(), vec![(low.id(), high.id()), (high.id(), low.id())]);

	assert!(component.is_active());
	assert_eq!(recorder.stages(), vec![Stage::Init, Stage::Start]);
}

#[test]
fn test_locking_reports_through_set() {
	let registry = ServiceRegistry::new();
	let sets = Arc::new(Mutex::new(Vec::new()));
	let swaps = Arc::new(AtomicUsize::new(0));
	let foo = {
		let (sets, swaps) = (Arc::clone(&sets), Arc::clone(&swaps));
		ServiceDependency::new("Foo")
			.required(true)
			.strategy(UpdateStrategy::Locking)
			.on_set(move |s| {
				sets.lock().push(s.map(|s| s.id()));
				Ok(())
			})
			.on_swap(move |_, _| {
				swaps.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
	};
	let slot = foo.slot();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager.create(Component::builder("locker").dependency(foo)).unwrap();

	let low = register(&registry, "Foo", 1);
	let high = register(&registry, "Foo", 5);
	{
		let guard = slot.read();
		assert_eq!(guard.as_ref().map(|s| s.id()), Some(high.id()));
	}
	high.unregister().unwrap();
	low.unregister().unwrap();

	assert_eq!(*sets.lock(), vec![Some(low.id()), Some(high.id()), Some(low.id()), None]);
	assert_eq!(swaps.load(Ordering::SeqCst), 0);
	assert!(!component.is_active());
}

#[test]
fn test_suspend_restarts_around_callbacks() {
	let registry = ServiceRegistry::new();
	let foo = ServiceDependency::new("Foo")
		.required(true)
		.strategy(UpdateStrategy::Suspend)
		.on_add(|_| Ok(()));
	let recorder = Arc::new(Recorder::default());
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(Component::builder("suspender").dependency(foo).lifecycle(Arc::clone(&recorder)))
		.unwrap();

	let _first = register(&registry, "Foo", 0);
	let _second = register(&registry, "Foo", 0);

	assert!(component.is_active());
	assert_eq!(recorder.stages(), vec![Stage::Init, Stage::Start, Stage::Stop, Stage::Start]);
	assert_eq!(component.info().times_resumed, 1);
	assert_eq!(component.times_started(), 1);
}

#[test]
fn test_failing_start_still_activates() {
	let registry = ServiceRegistry::new();
	let recorder = Arc::new(Recorder::default());
	*recorder.fail_on.lock() = Some(Stage::Start);
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(
			Component::builder("broken-start")
				.dependency(ServiceDependency::new("Foo").required(true))
				.lifecycle(Arc::clone(&recorder))
				.provide("Baz", Properties::new(), ServiceSource::plain(())),
		)
		.unwrap();

	let foo = register(&registry, "Foo", 0);
	assert_eq!(component.state(), ComponentState::TrackingOptional);
	assert!(component.is_enabled());
	assert_eq!(component.times_started(), 1);
	assert_eq!(registry.get_service_references(Some("Baz"), None).unwrap().len(), 1);
	assert!(manager.all_components_active());

	foo.unregister().unwrap();
	assert_eq!(component.state(), ComponentState::InstantiatedAndWaitingForRequired);
	assert!(registry.get_service_references(Some("Baz"), None).unwrap().is_empty());

	register(&registry, "Foo", 0);
	assert!(component.is_active());
	assert_eq!(component.times_started(), 2);
	assert_eq!(recorder.stages(), vec![Stage::Init, Stage::Start, Stage::Stop, Stage::Start]);
}

#[test]
fn test_failing_init_still_activates() {
	let registry = ServiceRegistry::new();
	let recorder = Arc::new(Recorder::default());
	*recorder.fail_on.lock() = Some(Stage::Init);
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(
			Component::builder("broken-init")
				.dependency(ServiceDependency::new("Foo").required(true))
				.lifecycle(Arc::clone(&recorder)),
		)
		.unwrap();

	let foo = register(&registry, "Foo", 0);
	assert!(component.is_active());
	assert!(component.is_enabled());
	assert_eq!(recorder.stages(), vec![Stage::Init, Stage::Start]);

	foo.unregister().unwrap();
	register(&registry, "Foo", 0);
	assert!(component.is_active());
	assert_eq!(recorder.count(Stage::Init), 1, "init is not retried");
	assert_eq!(recorder.count(Stage::Start), 2);

	manager.remove(component.id()).unwrap();
	assert_eq!(recorder.count(Stage::Deinit), 1);
}

#[test]
fn test_failing_stop_still_transitions() {
	let registry = ServiceRegistry::new();
	let recorder = Arc::new(Recorder::default());
	*recorder.fail_on.lock() = Some(Stage::Stop);
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(
			Component::builder("sticky")
				.dependency(ServiceDependency::new("Foo").required(true))
				.lifecycle(Arc::clone(&recorder)),
		)
		.unwrap();

	let foo = register(&registry, "Foo", 0);
	foo.unregister().unwrap();
	assert_eq!(component.state(), ComponentState::InstantiatedAndWaitingForRequired);
	assert!(component.is_enabled());

	register(&registry, "Foo", 0);
	assert!(component.is_active());
	assert_eq!(component.times_started(), 2);
}

#[test]
fn test_provided_interfaces_follow_activity() {
	let registry = ServiceRegistry::new();
	let seen_at_stop = Arc::new(Mutex::new(None));
	let lifecycle = {
		let (registry, seen) = (registry.clone(), Arc::clone(&seen_at_stop));
		Callbacks::new().on_stop(move || {
			*seen.lock() = Some(registry.get_service_references(Some("Bar"), None)?.len());
			Ok(())
		})
	};
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(
			Component::builder("provider")
				.dependency(ServiceDependency::new("Foo").required(true))
				.provide("Bar", Properties::from([("lang", "en")]), ServiceSource::plain(7u8))
				.lifecycle(lifecycle),
		)
		.unwrap();
	assert!(registry.get_service_references(Some("Bar"), None).unwrap().is_empty());

	let foo = register(&registry, "Foo", 0);
	let bars = registry.get_service_references(Some("Bar"), Some("(lang=en)")).unwrap();
	assert_eq!(bars.len(), 1);
	assert_eq!(bars[0].owner(), CONSUMER);
	assert_eq!(component.info().interfaces[0].service_id, Some(bars[0].id()));

	foo.unregister().unwrap();
	assert_eq!(*seen_at_stop.lock(), Some(0));
	assert_eq!(component.info().interfaces[0].service_id, None);
}

#[test]
fn test_interface_added_while_active_is_registered() {
	let registry = ServiceRegistry::new();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager.create(Component::builder("late")).unwrap();
	assert!(component.is_active());

	component.add_interface("Late", Properties::new(), ServiceSource::plain(()));
	assert_eq!(registry.get_service_references(Some("Late"), None).unwrap().len(), 1);
}

#[test]
fn test_disable_runs_the_full_teardown() {
	let registry = ServiceRegistry::new();
	let recorder = Arc::new(Recorder::default());
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(
			Component::builder("teardown")
				.dependency(ServiceDependency::new("Foo").required(true))
				.lifecycle(Arc::clone(&recorder)),
		)
		.unwrap();
	let foo = register(&registry, "Foo", 0);
	assert_eq!(registry.listener_count(), 1);

	let removed = manager.remove(component.id()).unwrap();
	assert_eq!(removed.state(), ComponentState::Inactive);
	assert_eq!(recorder.stages(), vec![Stage::Init, Stage::Start, Stage::Stop, Stage::Deinit]);
	assert_eq!(registry.listener_count(), 0);
	assert_eq!(foo.reference().usage_count(CONSUMER), 0);
	assert!(manager.is_empty());
}

#[test]
fn test_dependencies_added_and_removed_at_runtime() {
	let registry = ServiceRegistry::new();
	let recorder = Arc::new(Recorder::default());
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(Component::builder("dynamic").lifecycle(Arc::clone(&recorder)))
		.unwrap();
	assert!(component.is_active());

	let dep = component
		.add_dependency(ServiceDependency::new("Foo").required(true))
		.unwrap();
	assert_eq!(component.state(), ComponentState::InstantiatedAndWaitingForRequired);

	component.remove_dependency(dep).unwrap();
	assert!(component.is_active());
	assert_eq!(recorder.stages(), vec![Stage::Init, Stage::Start, Stage::Stop, Stage::Start]);
	assert!(matches!(
		component.remove_dependency(dep),
		Err(ComponentError::UnknownDependency(id)) if id == dep
	));
}

#[test]
fn test_invalid_dependency_is_rejected() {
	let registry = ServiceRegistry::new();
	let result = Component::builder("bad")
		.dependency(ServiceDependency::matching("(a=1"))
		.build(&registry, CONSUMER);
	assert!(matches!(result, Err(ComponentError::Registry(_))));

	let component = Component::builder("empty").build(&registry, CONSUMER).unwrap();
	assert!(matches!(
		component.add_dependency(ServiceDependency::default()),
		Err(ComponentError::Registry(_))
	));
}

#[test]
fn test_depending_on_own_interface() {
	let registry = ServiceRegistry::new();
	let own = ServiceDependency::new("Self");
	let slot = own.slot();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager
		.create(
			Component::builder("narcissus")
				.dependency(own)
				.provide("Self", Properties::new(), ServiceSource::plain(1u16)),
		)
		.unwrap();

	assert!(component.is_active());
	assert_eq!(slot.service::<u16>().as_deref(), Some(&1));

	manager.remove(component.id()).unwrap();
	assert!(!slot.is_bound());
	assert_eq!(registry.service_count(), 0);
}

#[test]
fn test_manager_bookkeeping() {
	let registry = ServiceRegistry::new();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let a = manager.create(Component::builder("a")).unwrap();
	let b = manager
		.create(Component::builder("b").dependency(ServiceDependency::new("Foo").required(true)))
		.unwrap();

	assert!(matches!(manager.add(a.clone()), Err(ComponentError::AlreadyManaged(id)) if id == a.id()));
	assert_eq!(manager.len(), 2);
	assert!(!manager.all_components_active());
	assert_eq!(manager.component(b.id()).map(|c| c.name().to_string()), Some("b".to_string()));

	let info = manager.info();
	assert_eq!(info.iter().map(|i| i.state).collect::<Vec<_>>(), vec![
		ComponentState::TrackingOptional,
		ComponentState::WaitingForRequired,
	]);
	assert_eq!(info[1].dependencies[0].service_name.as_deref(), Some("Foo"));
	assert!(info[1].dependencies[0].required);
	assert!(!info[1].dependencies[0].available);
	assert!(info[1].to_string().contains("requires Foo required available=false"));

	register(&registry, "Foo", 0);
	assert!(manager.all_components_active());

	assert!(matches!(manager.remove(ComponentId(u64::MAX)), Err(ComponentError::UnknownComponent(_))));
	assert_eq!(manager.remove_all(), 2);
	assert_eq!(a.state(), ComponentState::Inactive);
	assert_eq!(b.state(), ComponentState::Inactive);
}

#[test]
fn test_callback_errors_are_contained() {
	let registry = ServiceRegistry::new();
	let foo = ServiceDependency::new("Foo")
		.required(true)
		.on_add(|_| Err("add refused".into()))
		.on_set(|_| Err("set refused".into()));
	let slot = foo.slot();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let component = manager.create(Component::builder("tolerant").dependency(foo)).unwrap();

	register(&registry, "Foo", 0);
	assert!(component.is_active());
	assert!(slot.is_bound());
}
