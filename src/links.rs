//! Parent/child link records
//!
//! Every item has at most one record. A record names the item's parent (the
//! item it was broadcast from) and its children (one per container). The
//! record itself is a plain value; `LinkStore` persists it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{ContainerId, ItemId, ItemRef};

/// Link graph node for one (container, item) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkRecord {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	parent: Option<ItemRef>,

	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	children: BTreeMap<ContainerId, ItemId>,

	/// Dirty flag, never persisted
	#[serde(skip)]
	modified: bool,
}

impl LinkRecord {
	/// Fresh, empty and unmodified record
	pub fn new() -> Self {
		Self::default()
	}

	pub fn parent(&self) -> Option<ItemRef> {
		self.parent
	}

	pub fn set_parent(&mut self, parent: ItemRef) {
		if self.parent != Some(parent) {
			self.parent = Some(parent);
			self.modified = true;
		}
	}

	pub fn clear_parent(&mut self) {
		if self.parent.take().is_some() {
			self.modified = true;
		}
	}

	/// Linked children in container order
	pub fn children(&self) -> impl Iterator<Item = ItemRef> + '_ {
		self.children.iter().map(|(c, i)| ItemRef { container: *c, item: *i })
	}

	pub fn child_count(&self) -> usize {
		self.children.len()
	}

	pub fn has_children(&self) -> bool {
		!self.children.is_empty()
	}

	pub fn child_on(&self, container: ContainerId) -> Option<ItemId> {
		self.children.get(&container).copied()
	}

	/// Links a child; replaces any previous child on the same container
	pub fn add_child(&mut self, container: ContainerId, item: ItemId) {
		if self.children.insert(container, item) != Some(item) {
			self.modified = true;
		}
	}

	pub fn remove_child(&mut self, container: ContainerId) -> Option<ItemId> {
		let removed = self.children.remove(&container);
		if removed.is_some() {
			self.modified = true;
		}
		removed
	}

	pub fn remove_children(&mut self) -> Vec<ItemRef> {
		let removed: Vec<ItemRef> = self.children().collect();
		if !removed.is_empty() {
			self.children.clear();
			self.modified = true;
		}
		removed
	}

	/// No parent and no children
	pub fn is_empty(&self) -> bool {
		self.parent.is_none() && self.children.is_empty()
	}

	pub fn is_modified(&self) -> bool {
		self.modified
	}

	/// Force a write on the next `LinkStore::set`
	pub fn touch(&mut self) {
		self.modified = true;
	}

	pub(crate) fn mark_clean(mut self) -> Self {
		self.modified = false;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_record_is_empty_and_clean() {
		let record = LinkRecord::new();
		assert!(record.is_empty());
		assert!(!record.is_modified());
		assert_eq!(record.parent(), None);
		assert_eq!(record.child_count(), 0);
	}

	#[test]
	fn test_add_child_one_per_container() {
		let mut record = LinkRecord::new();
		record.add_child(ContainerId(2), ItemId(10));
		record.add_child(ContainerId(2), ItemId(11));
		record.add_child(ContainerId(3), ItemId(12));
		assert_eq!(record.child_on(ContainerId(2)), Some(ItemId(11)));
		assert_eq!(record.child_count(), 2);
		assert!(record.is_modified());
	}

	#[test]
	fn test_readding_same_child_stays_clean() {
		let mut record = LinkRecord::new();
		record.add_child(ContainerId(2), ItemId(10));
		let mut record = record.mark_clean();
		record.add_child(ContainerId(2), ItemId(10));
		assert!(!record.is_modified());
	}

	#[test]
	fn test_remove_missing_child_is_noop() {
		let mut record = LinkRecord::new();
		assert_eq!(record.remove_child(ContainerId(5)), None);
		assert!(!record.is_modified());
	}

	#[test]
	fn test_remove_children_returns_refs() {
		let mut record = LinkRecord::new();
		record.add_child(ContainerId(3), ItemId(30));
		record.add_child(ContainerId(2), ItemId(20));
		let removed = record.remove_children();
		assert_eq!(removed, vec![ItemRef::new(2, 20), ItemRef::new(3, 30)]);
		assert!(record.is_empty());
	}

	#[test]
	fn test_parent_makes_record_non_empty() {
		let mut record = LinkRecord::new();
		record.set_parent(ItemRef::new(1, 5));
		assert!(!record.is_empty());
		record.clear_parent();
		assert!(record.is_empty());
		assert!(record.is_modified());
	}
}

// vim: ts=4
