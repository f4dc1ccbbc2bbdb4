use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tether_component::{Callbacks, Component, ComponentState, DependencyManager, ServiceDependency};
use tether_filter::Properties;
use tether_registry::{BundleId, ServiceRegistry, ServiceSource};

const PROVIDER: BundleId = BundleId(1);
const CONSUMER: BundleId = BundleId(2);

fn counting() -> (Callbacks, Arc<AtomicUsize>, Arc<AtomicUsize>) {
	let starts = Arc::new(AtomicUsize::new(0));
	let stops = Arc::new(AtomicUsize::new(0));
	let callbacks = {
		let (starts, stops) = (Arc::clone(&starts), Arc::clone(&stops));
		Callbacks::new()
			.on_start(move || {
				starts.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.on_stop(move || {
				stops.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
	};
	(callbacks, starts, stops)
}

#[test]
fn required_dependency_gates_start_and_stop() {
	let registry = ServiceRegistry::new();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let (callbacks, starts, stops) = counting();
	let component = manager
		.create(
			Component::builder("consumer")
				.dependency(ServiceDependency::new("Foo").required(true))
				.lifecycle(callbacks),
		)
		.unwrap();

	assert_eq!(component.state(), ComponentState::WaitingForRequired);
	assert_eq!(starts.load(Ordering::SeqCst), 0);

	let foo = registry
		.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(()))
		.unwrap();
	assert!(component.is_active());
	assert_eq!(starts.load(Ordering::SeqCst), 1);

	foo.unregister().unwrap();
	assert_eq!(stops.load(Ordering::SeqCst), 1);
	assert!(component.state().is_waiting());
}

/// `a` provides Bar once Foo is there; `b` requires Bar. Losing Foo stops
/// `b` before `a`, since `a` withdraws Bar before its own stop runs.
#[test]
fn stop_cascades_down_a_chain() {
	let registry = ServiceRegistry::new();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let order = Arc::new(Mutex::new(Vec::new()));
	let stopping = |name: &'static str| {
		let order = Arc::clone(&order);
		Callbacks::new().on_stop(move || {
			order.lock().push(name);
			Ok(())
		})
	};

	let a = manager
		.create(
			Component::builder("a")
				.dependency(ServiceDependency::new("Foo").required(true))
				.provide("Bar", Properties::new(), ServiceSource::plain(()))
				.lifecycle(stopping("a")),
		)
		.unwrap();
	let b = manager
		.create(
			Component::builder("b")
				.dependency(ServiceDependency::new("Bar").required(true))
				.lifecycle(stopping("b")),
		)
		.unwrap();
	assert!(!manager.all_components_active());

	let foo = registry
		.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(()))
		.unwrap();
	assert!(a.is_active());
	assert!(b.is_active());

	foo.unregister().unwrap();
	assert_eq!(*order.lock(), vec!["b", "a"]);
	assert!(a.state().is_waiting());
	assert!(b.state().is_waiting());
}

/// Registrations racing on several threads never start the component with
/// an empty slot, and it settles according to what is left registered.
#[test]
fn concurrent_churn_settles() {
	const THREADS: usize = 4;
	const ROUNDS: usize = 50;

	let registry = ServiceRegistry::new();
	let manager = DependencyManager::new(&registry, CONSUMER);
	let foo = ServiceDependency::new("Foo").required(true);
	let slot = foo.slot();
	let started_empty = Arc::new(AtomicBool::new(false));
	let callbacks = {
		let (slot, started_empty) = (slot.clone(), Arc::clone(&started_empty));
		Callbacks::new().on_start(move || {
			if !slot.is_bound() {
				started_empty.store(true, Ordering::SeqCst);
			}
			Ok(())
		})
	};
	let component = manager
		.create(Component::builder("churn").dependency(foo).lifecycle(callbacks))
		.unwrap();

	let workers: Vec<_> = (0..THREADS)
		.map(|t| {
			let registry = registry.clone();
			thread::spawn(move || {
				for _ in 0..ROUNDS {
					let registration = registry
						.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(t))
						.unwrap();
					registration.unregister().unwrap();
				}
			})
		})
		.collect();
	for worker in workers {
		worker.join().unwrap();
	}

	assert!(!started_empty.load(Ordering::SeqCst));
	assert!(component.state().is_waiting());
	assert!(!slot.is_bound());

	let _keep = registry
		.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(usize::MAX))
		.unwrap();
	assert!(component.is_active());
	assert_eq!(slot.service::<usize>().as_deref(), Some(&usize::MAX));
}
