//! Per-operation call context
//!
//! An `Operation` is created for each user request and threaded through every
//! engine call and every collaborator write. It carries who is acting, what
//! they may do, whether a broadcast is already running (so save hooks fired by
//! our own writes do not start another one) and the request-scoped caches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::types::{Container, ItemRef, UserId};

/// What the acting user is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
	/// Use broadcasting at all
	pub broadcast: bool,
	/// Create, follow and remove links
	pub link: bool,
	/// Replicate classifications
	pub taxonomies: bool,
	/// Replicate custom fields
	pub custom_fields: bool,
	/// Broadcast items still in draft
	pub drafts: bool,
	/// Broadcast scheduled items
	pub scheduled: bool,
	/// Manage container groups
	pub groups: bool,
}

impl Permissions {
	/// Network administrator
	pub fn all() -> Self {
		Permissions {
			broadcast: true,
			link: true,
			taxonomies: true,
			custom_fields: true,
			drafts: true,
			scheduled: true,
			groups: true,
		}
	}

	pub fn none() -> Self {
		Self::default()
	}
}

#[derive(Debug, Default)]
struct OperationCache {
	containers: Mutex<Option<Vec<Container>>>,
	permalinks: Mutex<HashMap<ItemRef, String>>,
}

/// Call context of one logical request
#[derive(Debug, Clone)]
pub struct Operation {
	id: Uuid,
	user: UserId,
	permissions: Permissions,
	broadcasting: bool,
	cache: Arc<OperationCache>,
}

impl Operation {
	pub fn new(user: UserId, permissions: Permissions) -> Self {
		Operation {
			id: Uuid::new_v4(),
			user,
			permissions,
			broadcasting: false,
			cache: Arc::new(OperationCache::default()),
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn user(&self) -> UserId {
		self.user
	}

	pub fn permissions(&self) -> &Permissions {
		&self.permissions
	}

	/// True inside a running broadcast
	pub fn is_broadcasting(&self) -> bool {
		self.broadcasting
	}

	/// Token for writes made on behalf of a running broadcast.
	///
	/// Shares id and caches with `self`.
	pub fn nested_broadcast(&self) -> Operation {
		Operation { broadcasting: true, ..self.clone() }
	}

	pub(crate) fn cached_containers(&self) -> Option<Vec<Container>> {
		self.cache.containers.lock().ok().and_then(|c| c.clone())
	}

	pub(crate) fn cache_containers(&self, containers: &[Container]) {
		if let Ok(mut c) = self.cache.containers.lock() {
			*c = Some(containers.to_vec());
		}
	}

	pub(crate) fn cached_permalink(&self, item: ItemRef) -> Option<String> {
		self.cache.permalinks.lock().ok().and_then(|p| p.get(&item).cloned())
	}

	pub(crate) fn cache_permalink(&self, item: ItemRef, link: &str) {
		if let Ok(mut p) = self.cache.permalinks.lock() {
			p.insert(item, link.to_string());
		}
	}
}


// vim: ts=4
