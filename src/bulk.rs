//! Bulk actions over a batch of parent items

use std::fmt;
use std::str::FromStr;

use crate::broadcast::{ensure, Broadcaster};
use crate::context::Operation;
use crate::error::{BroadcastError, BroadcastResult};
use crate::lifecycle::CascadeOp;
use crate::logging::*;
use crate::types::ItemRef;

/// Action applied to the children of each item in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
	/// Delete every linked child and its record
	Delete,
	/// Link every unique orphan
	LinkUnlinked,
	/// Publish every linked child
	Restore,
	/// Trash every linked child
	Trash,
	/// Forget every child link, content untouched
	Unlink,
}

impl FromStr for BulkAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().replace('-', "_").as_str() {
			"delete" => Ok(Self::Delete),
			"link_unlinked" => Ok(Self::LinkUnlinked),
			"restore" => Ok(Self::Restore),
			"trash" => Ok(Self::Trash),
			"unlink" => Ok(Self::Unlink),
			_ => Err(format!(
				"Unknown bulk action: {}. Valid options: delete, link_unlinked, restore, trash, unlink",
				s
			)),
		}
	}
}

impl fmt::Display for BulkAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Delete => write!(f, "delete"),
			Self::LinkUnlinked => write!(f, "link_unlinked"),
			Self::Restore => write!(f, "restore"),
			Self::Trash => write!(f, "trash"),
			Self::Unlink => write!(f, "unlink"),
		}
	}
}

/// Per-item outcome of a bulk action
#[derive(Debug)]
pub struct BulkItemResult {
	pub item: ItemRef,
	/// Children acted on, or the error that stopped this item
	pub outcome: Result<Vec<ItemRef>, BroadcastError>,
}

impl Broadcaster {
	/// Apply `action` to each item. One failing item does not stop the batch.
	#[instrument(skip_all, fields(op = %op.id(), action = %action, items = items.len()))]
	pub async fn bulk_apply(
		&self,
		op: &Operation,
		action: BulkAction,
		items: &[ItemRef],
	) -> BroadcastResult<Vec<BulkItemResult>> {
		ensure(op.permissions().link, "run bulk actions")?;

		let mut results = Vec::with_capacity(items.len());
		for &item in items {
			let outcome = self.bulk_one(op, action, item).await;
			if let Err(ref e) = outcome {
				warn!("{} of {} failed: {}", action, item, e);
			}
			results.push(BulkItemResult { item, outcome });
		}
		let ok = results.iter().filter(|r| r.outcome.is_ok()).count();
		info!("{} applied to {} of {} items", action, ok, items.len());
		Ok(results)
	}

	async fn bulk_one(&self, op: &Operation, action: BulkAction, item: ItemRef) -> BroadcastResult<Vec<ItemRef>> {
		let content = &self.backends.content;
		let nested = op.nested_broadcast();

		match action {
			BulkAction::Delete => {
				// The item keeps its own link to its parent.
				let mut record = self.store.get(item)?;
				let mut deleted = Vec::new();
				let mut failure: Option<BroadcastError> = None;
				for child in record.children().collect::<Vec<_>>() {
					if let Err(e) = content.delete(&nested, child.container, child.item).await {
						failure = Some(e.into());
						break;
					}
					record.remove_child(child.container);
					if let Err(e) = self.store.delete(child) {
						failure = Some(e.into());
						break;
					}
					deleted.push(child);
				}
				self.store.set(item, &record)?;
				match failure {
					Some(e) => Err(e),
					None => Ok(deleted),
				}
			}
			BulkAction::LinkUnlinked => self.link_unlinked(op, item).await,
			BulkAction::Restore => {
				let children: Vec<ItemRef> = self.store.get(item)?.children().collect();
				for child in &children {
					content.publish(&nested, child.container, child.item).await?;
				}
				Ok(children)
			}
			BulkAction::Trash => self.cascade(op, item, CascadeOp::Trash).await,
			BulkAction::Unlink => self.unlink_all(op, item),
		}
	}
}


// vim: ts=4
