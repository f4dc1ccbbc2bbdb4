//! Service events and listener bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tether_filter::Properties;

use crate::entry::ServiceReference;
use crate::ids::{BundleId, ListenerId};
use crate::service::ServiceQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
	Registered,
	/// Properties changed and the service still matches the listener.
	Modified,
	/// Properties changed and the service no longer matches the listener.
	ModifiedEndMatch,
	/// Delivered before the service handle is released.
	Unregistering,
}

#[derive(Debug, Clone)]
pub struct ServiceEvent {
	pub kind: ServiceEventKind,
	pub reference: ServiceReference,
}

/// Receives service events synchronously on the thread that caused them.
pub trait ServiceListener: Send + Sync {
	fn service_changed(&self, event: &ServiceEvent);
}

impl<F> ServiceListener for F
where
	F: Fn(&ServiceEvent) + Send + Sync,
{
	fn service_changed(&self, event: &ServiceEvent) {
		self(event)
	}
}

pub(crate) struct ListenerEntry {
	pub(crate) id: ListenerId,
	pub(crate) bundle: BundleId,
	query: ServiceQuery,
	listener: Arc<dyn ServiceListener>,
	removed: AtomicBool,
	/// Threads currently inside `service_changed`.
	in_flight: Mutex<Vec<ThreadId>>,
	idle: Condvar,
}

impl ListenerEntry {
	pub(crate) fn new(id: ListenerId, bundle: BundleId, query: ServiceQuery, listener: Arc<dyn ServiceListener>) -> Self {
		Self {
			id,
			bundle,
			query,
			listener,
			removed: AtomicBool::new(false),
			in_flight: Mutex::new(Vec::new()),
			idle: Condvar::new(),
		}
	}

	/// Which event, if any, this listener sees for a change. `previous` is
	/// only given for property modifications.
	pub(crate) fn filter_event(&self, kind: ServiceEventKind, current: &Properties, previous: Option<&Properties>) -> Option<ServiceEventKind> {
		let now = self.query.matches(current);
		match (kind, previous) {
			(ServiceEventKind::Modified, Some(previous)) => {
				if now {
					Some(ServiceEventKind::Modified)
				} else if self.query.matches(previous) {
					Some(ServiceEventKind::ModifiedEndMatch)
				} else {
					None
				}
			}
			_ => now.then_some(kind),
		}
	}

	/// Calls the listener unless it has been removed.
	pub(crate) fn deliver(&self, event: &ServiceEvent) {
		let me = thread::current().id();
		{
			let mut in_flight = self.in_flight.lock();
			if self.removed.load(Ordering::Acquire) {
				return;
			}
			in_flight.push(me);
		}
		let _exit = InFlight { entry: self, thread: me };
		self.listener.service_changed(event);
	}

	/// Marks the listener removed and waits for deliveries on other threads
	/// to finish. Deliveries running on the calling thread are not waited
	/// for, so a listener may remove itself from inside a callback.
	pub(crate) fn retire(&self) {
		let me = thread::current().id();
		let mut in_flight = self.in_flight.lock();
		self.removed.store(true, Ordering::Release);
		while in_flight.iter().any(|t| *t != me) {
			self.idle.wait(&mut in_flight);
		}
	}
}

struct InFlight<'a> {
	entry: &'a ListenerEntry,
	thread: ThreadId,
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		let mut in_flight = self.entry.in_flight.lock();
		if let Some(pos) = in_flight.iter().position(|t| *t == self.thread) {
			in_flight.swap_remove(pos);
		}
		self.entry.idle.notify_all();
	}
}
