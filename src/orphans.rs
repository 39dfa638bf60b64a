//! Finding and linking pre-existing copies of an item
//!
//! An orphan is an item on another container with the same slug, type and
//! status as the source, not linked to anything. Only unambiguous matches
//! (exactly one hit) are offered.

use crate::broadcast::{ensure, Broadcaster};
use crate::context::Operation;
use crate::error::{BroadcastError, BroadcastResult};
use crate::logging::*;
use crate::types::{ContainerId, ContentItem, ItemFilter, ItemRef};

/// Matches are looked up with this limit so ambiguity shows up as a second hit
const MATCH_PROBE_LIMIT: usize = 2;

/// A unique match for the source on another container
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanCandidate {
	pub container: ContainerId,
	pub item: ContentItem,
}

impl Broadcaster {
	/// Unique unlinked matches for `item` on `candidates`.
	///
	/// Containers already holding a child, the item's own container and
	/// containers the user cannot write to are skipped.
	#[instrument(skip_all, fields(op = %op.id(), item = %item))]
	pub async fn find_orphans(
		&self,
		op: &Operation,
		item: ItemRef,
		candidates: &[ContainerId],
	) -> BroadcastResult<Vec<OrphanCandidate>> {
		ensure(op.permissions().link, "find orphans")?;
		let source = self
			.backends
			.content
			.get(item.container, item.item)
			.await?
			.ok_or(BroadcastError::NotFound { item })?;
		let record = self.store.get(item)?;
		let writable: Vec<ContainerId> = self.writable_containers(op).await?.into_iter().map(|c| c.id).collect();

		let mut found = Vec::new();
		for &container in candidates {
			if container == item.container || record.child_on(container).is_some() || !writable.contains(&container) {
				continue;
			}
			if let Some(candidate) = self.unique_match(&source, container).await? {
				found.push(OrphanCandidate { container, item: candidate });
			}
		}
		debug!("{} orphan candidates for {}", found.len(), item);
		Ok(found)
	}

	async fn unique_match(&self, source: &ContentItem, container: ContainerId) -> BroadcastResult<Option<ContentItem>> {
		let filter = ItemFilter {
			slug: Some(source.slug.clone()),
			item_type: Some(source.item_type.clone()),
			status: Some(source.status),
			limit: Some(MATCH_PROBE_LIMIT),
		};
		let mut matches = self.backends.content.query(container, &filter).await?;
		if matches.len() == 1 {
			Ok(matches.pop())
		} else {
			if matches.len() > 1 {
				debug!("{} has several matches for {} on {}, skipping", source.item_ref(), source.slug, container);
			}
			Ok(None)
		}
	}

	/// Link the chosen candidates to `item` without copying content.
	///
	/// Every choice is checked again: it must still be the unique match and
	/// must not be linked to another parent. Returns the links made.
	#[instrument(skip_all, fields(op = %op.id(), item = %item, chosen = chosen.len()))]
	pub async fn link_orphans(
		&self,
		op: &Operation,
		item: ItemRef,
		chosen: &[ItemRef],
	) -> BroadcastResult<Vec<ItemRef>> {
		let containers: Vec<ContainerId> = chosen.iter().map(|c| c.container).collect();
		let valid = self.find_orphans(op, item, &containers).await?;

		let mut record = self.store.get(item)?;
		let mut linked = Vec::new();
		for choice in chosen {
			let confirmed = valid.iter().any(|c| c.container == choice.container && c.item.id == choice.item);
			if !confirmed || record.child_on(choice.container).is_some() {
				debug!("{} is no longer a unique orphan of {}", choice, item);
				continue;
			}
			let mut child_record = self.store.get(*choice)?;
			if let Some(other) = child_record.parent() {
				debug!("{} already belongs to {}", choice, other);
				continue;
			}
			child_record.set_parent(item);
			self.store.set(*choice, &child_record)?;
			record.add_child(choice.container, choice.item);
			linked.push(*choice);
		}
		self.store.set(item, &record)?;
		if !linked.is_empty() {
			info!("linked {} orphans to {}", linked.len(), item);
		}
		Ok(linked)
	}

	/// Find and link every unique orphan of `item` on the user's writable containers
	pub async fn link_unlinked(&self, op: &Operation, item: ItemRef) -> BroadcastResult<Vec<ItemRef>> {
		let containers: Vec<ContainerId> = self.writable_containers(op).await?.into_iter().map(|c| c.id).collect();
		let candidates = self.find_orphans(op, item, &containers).await?;
		let chosen: Vec<ItemRef> = candidates.iter().map(|c| c.item.item_ref()).collect();
		self.link_orphans(op, item, &chosen).await
	}
}

// vim: ts=4
