//! Permalinks and canonical links of linked children
//!
//! A child can point readers (and search engines) at its parent. Resolved
//! links are cached for the lifetime of the operation.

use crate::broadcast::Broadcaster;
use crate::context::Operation;
use crate::error::{BackendError, BroadcastError, BroadcastResult};
use crate::logging::*;
use crate::types::ItemRef;

impl Broadcaster {
	async fn cached_link(&self, op: &Operation, item: ItemRef) -> BroadcastResult<String> {
		if let Some(link) = op.cached_permalink(item) {
			return Ok(link);
		}
		let link = self.backends.content.permalink(item.container, item.item).await?;
		op.cache_permalink(item, &link);
		Ok(link)
	}

	/// Link of the item's parent when `redirect` is on and a live parent exists
	async fn parent_or_own_link(&self, op: &Operation, item: ItemRef, redirect: bool) -> BroadcastResult<String> {
		if redirect {
			if let Some(parent) = self.store.get(item)?.parent() {
				match self.cached_link(op, parent).await {
					Ok(link) => return Ok(link),
					Err(BroadcastError::Backend(BackendError::NotFound { .. })) => {
						warn!("parent {} of {} is gone, using own link", parent, item);
					}
					Err(e) => return Err(e),
				}
			}
		}
		self.cached_link(op, item).await
	}

	/// Public link of an item; children use their parent's when overriding is configured
	pub async fn permalink(&self, op: &Operation, item: ItemRef) -> BroadcastResult<String> {
		self.parent_or_own_link(op, item, self.config.override_child_permalinks).await
	}

	/// Canonical link of an item; children name their parent when configured
	pub async fn canonical_link(&self, op: &Operation, item: ItemRef) -> BroadcastResult<String> {
		self.parent_or_own_link(op, item, self.config.canonical_url).await
	}
}

// vim: ts=4
