#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tether_filter::Properties;

use crate::{BundleId, RegistryError, SERVICE_RANKING, ServiceEvent, ServiceEventKind, ServiceQuery, ServiceRegistry, ServiceSource};

const PROVIDER: BundleId = BundleId(1);
const CONSUMER: BundleId = BundleId(2);

struct Counted(Arc<AtomicUsize>);

impl Drop for Counted {
	fn drop(&mut self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

fn ranked(ranking: i64) -> Properties {
	Properties::new().with(SERVICE_RANKING, ranking)
}

/// Invariant: per-name lists stay in rank order across register, modify and
/// unregister.
///
/// Ranking descends; equal rankings keep registration (id) order.
pub(crate) fn inv_rank_order_after_mutation() {
	let registry = ServiceRegistry::new();
	let a = registry.register(PROVIDER, "Foo", ranked(5), ServiceSource::plain(())).unwrap();
	let b = registry.register(PROVIDER, "Foo", ranked(10), ServiceSource::plain(())).unwrap();
	let c = registry.register(PROVIDER, "Foo", ranked(5), ServiceSource::plain(())).unwrap();
	assert!(registry.snapshot_is_consistent());

	let order = |registry: &ServiceRegistry| {
		registry
			.get_service_references(Some("Foo"), None)
			.unwrap()
			.iter()
			.map(|r| r.id())
			.collect::<Vec<_>>()
	};
	assert_eq!(order(&registry), vec![b.id(), a.id(), c.id()]);

	c.set_properties(ranked(20)).unwrap();
	assert!(registry.snapshot_is_consistent());
	assert_eq!(order(&registry), vec![c.id(), b.id(), a.id()]);

	b.unregister().unwrap();
	assert!(registry.snapshot_is_consistent());
	assert_eq!(order(&registry), vec![c.id(), a.id()]);
}

#[cfg_attr(test, test)]
pub(crate) fn test_rank_order_after_mutation() {
	inv_rank_order_after_mutation()
}

/// Invariant: concurrent registrations are never lost and never share ids.
pub(crate) fn inv_no_lost_registrations() {
	const THREADS: usize = 8;
	const PER_THREAD: usize = 50;

	let registry = ServiceRegistry::new();
	let handles: Vec<_> = (0..THREADS)
		.map(|t| {
			let registry = registry.clone();
			thread::spawn(move || {
				(0..PER_THREAD)
					.map(|i| {
						registry
							.register(BundleId(t as u64 + 1), "Foo", ranked((i % 7) as i64), ServiceSource::plain(i))
							.unwrap()
							.id()
					})
					.collect::<Vec<_>>()
			})
		})
		.collect();

	let mut ids: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
	ids.sort_unstable();
	ids.dedup();
	assert_eq!(ids.len(), THREADS * PER_THREAD);
	assert_eq!(registry.service_count(), THREADS * PER_THREAD);
	assert!(registry.snapshot_is_consistent());
}

#[cfg_attr(test, test)]
pub(crate) fn test_no_lost_registrations() {
	inv_no_lost_registrations()
}

/// Invariant: an unregistered entry is invalid at once but released only
/// after the last reference and usage are gone, exactly once.
pub(crate) fn inv_deferred_release() {
	let drops = Arc::new(AtomicUsize::new(0));
	let registry = ServiceRegistry::new();
	let registration = registry
		.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(Counted(Arc::clone(&drops))))
		.unwrap();
	let reference = registration.reference().clone();

	let service = registry.get_service(CONSUMER, &reference).unwrap();
	registration.unregister().unwrap();

	assert!(!reference.is_valid());
	assert!(registry.get_service(CONSUMER, &reference).is_none());
	assert!(registry.find_service(reference.id()).is_none());
	assert_eq!(drops.load(Ordering::SeqCst), 0, "still held by a consumer");

	registry.unget_service(CONSUMER, &reference).unwrap();
	drop(service);
	assert_eq!(drops.load(Ordering::SeqCst), 0, "still referenced");

	drop(reference);
	drop(registration);
	assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[cfg_attr(test, test)]
pub(crate) fn test_deferred_release() {
	inv_deferred_release()
}

/// Invariant: releasing more usages than were obtained is an error, not a
/// panic, and leaves the count untouched.
pub(crate) fn inv_unget_is_balanced() {
	let registry = ServiceRegistry::new();
	let registration = registry.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(1u8)).unwrap();
	let reference = registration.reference();

	registry.get_service(CONSUMER, reference).unwrap();
	registry.get_service(CONSUMER, reference).unwrap();
	assert_eq!(reference.usage_count(CONSUMER), 2);

	registry.unget_service(CONSUMER, reference).unwrap();
	registry.unget_service(CONSUMER, reference).unwrap();
	assert!(matches!(
		registry.unget_service(CONSUMER, reference),
		Err(RegistryError::IllegalState(_))
	));
	assert_eq!(reference.usage_count(CONSUMER), 0);
}

#[cfg_attr(test, test)]
pub(crate) fn test_unget_is_balanced() {
	inv_unget_is_balanced()
}

/// Invariant: a listener sees the events of one service in order:
/// registered, modified, unregistering.
pub(crate) fn inv_event_order_per_entry() {
	let registry = ServiceRegistry::new();
	let events = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&events);
	registry.add_service_listener(
		CONSUMER,
		ServiceQuery::for_name("Foo"),
		Arc::new(move |event: &ServiceEvent| sink.lock().push(event.kind)),
	);

	let registration = registry.register(PROVIDER, "Foo", Properties::new(), ServiceSource::plain(())).unwrap();
	registration.set_properties(ranked(3)).unwrap();
	registration.unregister().unwrap();
	registry.register(PROVIDER, "Bar", Properties::new(), ServiceSource::plain(())).unwrap();

	assert_eq!(
		*events.lock(),
		vec![
			ServiceEventKind::Registered,
			ServiceEventKind::Modified,
			ServiceEventKind::Unregistering
		]
	);
}

#[cfg_attr(test, test)]
pub(crate) fn test_event_order_per_entry() {
	inv_event_order_per_entry()
}
