//! Propagation of trash, untrash and delete to linked children
//!
//! Also hosts the single-child actions: acting on or unlinking one child of a
//! parent, addressed by the child's container.

use std::fmt;
use std::str::FromStr;

use crate::broadcast::{ensure, Broadcaster};
use crate::context::Operation;
use crate::error::{BroadcastError, BroadcastResult};
use crate::logging::*;
use crate::types::{ContainerId, ItemId, ItemRef};

/// What happened to a parent that its children should follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeOp {
	Trash,
	Untrash,
	Delete,
}

impl FromStr for CascadeOp {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"trash" => Ok(Self::Trash),
			"untrash" | "restore" => Ok(Self::Untrash),
			"delete" => Ok(Self::Delete),
			_ => Err(format!("Unknown cascade operation: {}. Valid options: trash, untrash, delete", s)),
		}
	}
}

impl fmt::Display for CascadeOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Trash => write!(f, "trash"),
			Self::Untrash => write!(f, "untrash"),
			Self::Delete => write!(f, "delete"),
		}
	}
}

/// What to do to a single linked child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
	Delete,
	Trash,
	/// Publish the child again
	Restore,
}

impl Broadcaster {
	/// Apply `action` to every linked child of `item`.
	///
	/// Meant to run after `item` itself was trashed, restored or deleted. On
	/// delete the children and their records are removed, `item` is dropped
	/// from its own parent's record and its record is deleted.
	/// Returns the children that were acted on.
	#[instrument(skip_all, fields(op = %op.id(), item = %item, action = %action))]
	pub async fn cascade(&self, op: &Operation, item: ItemRef, action: CascadeOp) -> BroadcastResult<Vec<ItemRef>> {
		if op.is_broadcasting() {
			debug!("{} of {} happened inside a broadcast, not cascading", action, item);
			return Ok(Vec::new());
		}
		let content = &self.backends.content;
		let nested = op.nested_broadcast();
		let mut record = self.store.get(item)?;
		let children: Vec<ItemRef> = record.children().collect();

		for child in &children {
			let applied: BroadcastResult<()> = match action {
				CascadeOp::Trash => content.trash(&nested, child.container, child.item).await.map_err(Into::into),
				CascadeOp::Untrash => content.untrash(&nested, child.container, child.item).await.map_err(Into::into),
				CascadeOp::Delete => self.delete_child_and_record(&nested, *child).await,
			};
			if let Err(e) = applied {
				if action == CascadeOp::Delete {
					// Children already gone must not stay listed.
					for done in children.iter().take_while(|c| *c != child) {
						record.remove_child(done.container);
					}
					self.store.set(item, &record)?;
				}
				return Err(e);
			}
			debug!("{} child {}", action, child);
		}

		if action == CascadeOp::Delete {
			if let Some(parent) = record.parent() {
				self.detach_from_parent(item, parent)?;
			}
			self.store.delete(item)?;
		}
		if !children.is_empty() {
			info!("{} {} children of {}", action, children.len(), item);
		}
		Ok(children)
	}

	async fn delete_child_and_record(&self, op: &Operation, child: ItemRef) -> BroadcastResult<()> {
		self.backends.content.delete(op, child.container, child.item).await?;
		self.store.delete(child)?;
		Ok(())
	}

	/// Remove `child` from its parent's record, if the parent still lists it
	fn detach_from_parent(&self, child: ItemRef, parent: ItemRef) -> BroadcastResult<()> {
		let mut parent_record = self.store.get(parent)?;
		if parent_record.child_on(child.container) == Some(child.item) {
			parent_record.remove_child(child.container);
			self.store.set(parent, &parent_record)?;
			debug!("removed {} from parent {}", child, parent);
		}
		Ok(())
	}

	fn linked_child(&self, item: ItemRef, container: ContainerId) -> BroadcastResult<ItemId> {
		self.store
			.get(item)?
			.child_on(container)
			.ok_or(BroadcastError::NotLinked { item, container })
	}

	/// Delete, trash or restore the child of `item` on `container`
	#[instrument(skip_all, fields(op = %op.id(), item = %item, container = %container))]
	pub async fn child_action(
		&self,
		op: &Operation,
		item: ItemRef,
		container: ContainerId,
		action: ChildAction,
	) -> BroadcastResult<ItemRef> {
		ensure(op.permissions().link, "act on linked children")?;
		let child = ItemRef { container, item: self.linked_child(item, container)? };
		let content = &self.backends.content;
		let nested = op.nested_broadcast();

		match action {
			ChildAction::Delete => {
				content.delete(&nested, container, child.item).await?;
				let mut record = self.store.get(item)?;
				record.remove_child(container);
				self.store.set(item, &record)?;
				self.store.delete(child)?;
			}
			ChildAction::Trash => content.trash(&nested, container, child.item).await?,
			ChildAction::Restore => content.publish(&nested, container, child.item).await?,
		}
		info!("{:?} child {} of {}", action, child, item);
		Ok(child)
	}

	/// Forget the link to the child on `container`; content is untouched
	pub fn unlink_child(&self, op: &Operation, item: ItemRef, container: ContainerId) -> BroadcastResult<ItemRef> {
		ensure(op.permissions().link, "unlink")?;
		let mut record = self.store.get(item)?;
		let child = record
			.remove_child(container)
			.map(|id| ItemRef { container, item: id })
			.ok_or(BroadcastError::NotLinked { item, container })?;

		self.store.delete(child)?;
		self.store.set(item, &record)?;
		info!("unlinked {} from {}", child, item);
		Ok(child)
	}

	/// Forget every child link of `item`; content is untouched
	pub fn unlink_all(&self, op: &Operation, item: ItemRef) -> BroadcastResult<Vec<ItemRef>> {
		ensure(op.permissions().link, "unlink")?;
		let mut record = self.store.get(item)?;
		let children = record.remove_children();
		for child in &children {
			self.store.delete(*child)?;
		}
		self.store.set(item, &record)?;
		if !children.is_empty() {
			info!("unlinked {} children from {}", children.len(), item);
		}
		Ok(children)
	}

	/// Forget the link to this item's parent; content is untouched
	pub fn unlink_from_parent(&self, op: &Operation, item: ItemRef) -> BroadcastResult<Option<ItemRef>> {
		ensure(op.permissions().link, "unlink")?;
		let mut record = self.store.get(item)?;
		let Some(parent) = record.parent() else {
			return Ok(None);
		};
		self.detach_from_parent(item, parent)?;
		record.clear_parent();
		self.store.set(item, &record)?;
		info!("unlinked {} from parent {}", item, parent);
		Ok(Some(parent))
	}
}


// vim: ts=4
