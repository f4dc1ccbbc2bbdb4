//! Immutable registry state published through `ArcSwap`.
//!
//! Writers build a new [`Snapshot`] from the current one and install it with
//! compare-and-swap; readers load the current `Arc` and never block writers.
//! Per-name lists are kept in rank order at publication time.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::entry::{ServiceReference, sort_by_rank};
use crate::ids::{BundleId, ServiceId};

#[derive(Default)]
pub(crate) struct Snapshot {
	by_name: FxHashMap<Arc<str>, Arc<[ServiceReference]>>,
	by_id: BTreeMap<ServiceId, ServiceReference>,
}

impl Snapshot {
	pub(crate) fn get(&self, id: ServiceId) -> Option<&ServiceReference> {
		self.by_id.get(&id)
	}

	/// Services registered under `name`, in rank order.
	pub(crate) fn by_name(&self, name: &str) -> &[ServiceReference] {
		self.by_name.get(name).map_or(&[][..], |refs| &refs[..])
	}

	/// Every service, in id order.
	pub(crate) fn iter(&self) -> impl Iterator<Item = &ServiceReference> {
		self.by_id.values()
	}

	pub(crate) fn len(&self) -> usize {
		self.by_id.len()
	}

	pub(crate) fn with_registered(&self, reference: &ServiceReference) -> Self {
		let mut by_id = self.by_id.clone();
		by_id.insert(reference.id(), reference.clone());

		let mut by_name = self.by_name.clone();
		let mut list = self.by_name(reference.name()).to_vec();
		list.push(reference.clone());
		sort_by_rank(&mut list);
		by_name.insert(Arc::clone(&reference.entry.name), Arc::from(list));

		Self { by_name, by_id }
	}

	/// Removes `id`; `None` when it is not part of this snapshot.
	pub(crate) fn without(&self, id: ServiceId) -> Option<Self> {
		let reference = self.by_id.get(&id)?;
		let mut by_id = self.by_id.clone();
		by_id.remove(&id);

		let mut by_name = self.by_name.clone();
		let list: Vec<_> = self.by_name(reference.name()).iter().filter(|r| r.id() != id).cloned().collect();
		if list.is_empty() {
			by_name.remove(reference.name());
		} else {
			by_name.insert(Arc::clone(&reference.entry.name), Arc::from(list));
		}

		Some(Self { by_name, by_id })
	}

	/// Re-sorts the list holding `id` after its ranking may have changed.
	pub(crate) fn resorted(&self, id: ServiceId) -> Option<Self> {
		let reference = self.by_id.get(&id)?;
		let mut list = self.by_name(reference.name()).to_vec();
		sort_by_rank(&mut list);
		let mut by_name = self.by_name.clone();
		by_name.insert(Arc::clone(&reference.entry.name), Arc::from(list));
		Some(Self {
			by_name,
			by_id: self.by_id.clone(),
		})
	}

	pub(crate) fn owned_by(&self, owner: BundleId) -> impl Iterator<Item = &ServiceReference> {
		self.iter().filter(move |r| r.owner() == owner)
	}

	/// True when every per-name list is in strict rank order and indexed by id.
	#[cfg(any(test, doc))]
	pub(crate) fn is_consistent(&self) -> bool {
		let indexed: usize = self.by_name.values().map(|l| l.len()).sum();
		indexed == self.by_id.len()
			&& self.by_name.iter().all(|(name, list)| {
				list.windows(2).all(|w| w[0].rank_cmp(&w[1]).is_lt())
					&& list.iter().all(|r| r.name() == name.as_ref() && self.by_id.contains_key(&r.id()))
			})
	}
}
