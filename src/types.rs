//! Core data types shared by every broadcast component
//!
//! Identifiers are per-container: an `ItemId` or `TermId` only means something
//! together with the `ContainerId` it was issued by.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
	($(#[$doc:meta])* $name:ident) => {
		$(#[$doc])*
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(pub u64);

		impl $name {
			/// Zero is never issued by a store and marks a failed insert
			pub fn is_valid(self) -> bool {
				self.0 > 0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<u64> for $name {
			fn from(v: u64) -> Self {
				$name(v)
			}
		}

		impl FromStr for $name {
			type Err = std::num::ParseIntError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				s.trim().parse::<u64>().map($name)
			}
		}
	};
}

id_type!(
	/// A container (site, tenant, blog) holding its own items, terms and media
	ContainerId
);
id_type!(
	/// Item id, local to its container
	ItemId
);
id_type!(
	/// Classification term id, local to its container
	TermId
);
id_type!(
	/// Media asset id, local to its container
	AssetId
);
id_type!(
	/// Acting user
	UserId
);

/// Fully qualified reference to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
	pub container: ContainerId,
	pub item: ItemId,
}

impl ItemRef {
	pub fn new(container: impl Into<ContainerId>, item: impl Into<ItemId>) -> Self {
		ItemRef { container: container.into(), item: item.into() }
	}
}

impl fmt::Display for ItemRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.container, self.item)
	}
}

impl FromStr for ItemRef {
	type Err = String;

	/// Parses `container/item`
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (c, i) = s.split_once('/').ok_or_else(|| format!("Expected CONTAINER/ITEM, got {}", s))?;
		let container = c.parse::<ContainerId>().map_err(|e| format!("Bad container id {}: {}", c, e))?;
		let item = i.parse::<ItemId>().map_err(|e| format!("Bad item id {}: {}", i, e))?;
		Ok(ItemRef { container, item })
	}
}

/// Publication state of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
	#[default]
	Publish,
	Pending,
	Private,
	Draft,
	Future,
	Trash,
	Inherit,
}

impl FromStr for ItemStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"publish" | "published" => Ok(Self::Publish),
			"pending" => Ok(Self::Pending),
			"private" => Ok(Self::Private),
			"draft" => Ok(Self::Draft),
			"future" | "scheduled" => Ok(Self::Future),
			"trash" => Ok(Self::Trash),
			"inherit" => Ok(Self::Inherit),
			_ => Err(format!(
				"Unknown item status: {}. Valid options: publish, pending, private, draft, future, trash, inherit",
				s
			)),
		}
	}
}

impl fmt::Display for ItemStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Publish => write!(f, "publish"),
			Self::Pending => write!(f, "pending"),
			Self::Private => write!(f, "private"),
			Self::Draft => write!(f, "draft"),
			Self::Future => write!(f, "future"),
			Self::Trash => write!(f, "trash"),
			Self::Inherit => write!(f, "inherit"),
		}
	}
}

/// Custom fields: key to one or many values, multi-valued keys keep their order
pub type MetaMap = BTreeMap<String, Vec<String>>;

/// A content item as held by its container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContentItem {
	pub container: ContainerId,
	pub id: ItemId,
	/// Globally unique identifier string (usually the canonical URL at creation)
	pub guid: String,
	pub item_type: String,
	pub status: ItemStatus,
	pub slug: String,
	pub title: String,
	pub body: String,
	pub excerpt: String,
	/// Hierarchical parent item, same container
	pub parent: Option<ItemId>,
	pub menu_order: i64,
	pub comment_count: u64,
	pub sticky: bool,
	pub meta: MetaMap,
}

impl ContentItem {
	pub fn item_ref(&self) -> ItemRef {
		ItemRef { container: self.container, item: self.id }
	}

	/// Replicable fields of this item.
	///
	/// Identity-only fields (id, guid, counters, hierarchical parent, ordering index)
	/// are never part of the snapshot; the parent pointer is resolved per target.
	pub fn snapshot(&self) -> ItemFields {
		ItemFields {
			item_type: self.item_type.clone(),
			status: self.status,
			slug: self.slug.clone(),
			title: self.title.clone(),
			body: self.body.clone(),
			excerpt: self.excerpt.clone(),
			parent: None,
		}
	}
}

/// Field set written by create/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ItemFields {
	pub item_type: String,
	pub status: ItemStatus,
	pub slug: String,
	pub title: String,
	pub body: String,
	pub excerpt: String,
	pub parent: Option<ItemId>,
}

/// Capabilities of an item type within a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeSupport {
	pub hierarchical: bool,
	pub thumbnails: bool,
	pub custom_fields: bool,
	pub attachments: bool,
}

/// Filter for `ContentStore::query`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ItemFilter {
	pub slug: Option<String>,
	pub item_type: Option<String>,
	pub status: Option<ItemStatus>,
	pub limit: Option<usize>,
}

/// Classification term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
	pub id: TermId,
	pub name: String,
	/// Cross-container identity of the term
	pub slug: String,
	pub description: String,
	/// None is the vocabulary root
	pub parent: Option<TermId>,
}

/// Term to create on a target container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTerm {
	pub name: String,
	pub slug: String,
	pub description: String,
	pub parent: Option<TermId>,
}

impl NewTerm {
	pub fn from_term(term: &Term, parent: Option<TermId>) -> Self {
		NewTerm {
			name: term.name.clone(),
			slug: term.slug.clone(),
			description: term.description.clone(),
			parent,
		}
	}
}

/// Media asset attached to an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaAsset {
	pub id: AssetId,
	pub owner: Option<ItemId>,
	/// Unique identifier string, referenced from item bodies
	pub guid: String,
	/// Storage path within the container's storage area
	pub path: String,
	pub file_name: String,
	pub mime_type: String,
	pub title: String,
	pub excerpt: String,
	pub order: i64,
	/// Derived renditions can be regenerated from the file
	pub regenerable: bool,
	pub meta: MetaMap,
}

/// Asset record to create on a target container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewAsset {
	pub owner: ItemId,
	pub guid: String,
	pub path: String,
	pub file_name: String,
	pub mime_type: String,
	pub title: String,
	pub excerpt: String,
	pub order: i64,
	pub regenerable: bool,
	pub meta: MetaMap,
}

/// Where a media store put a written file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
	pub path: String,
	pub url: String,
}

/// A container as listed by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
	pub id: ContainerId,
	pub name: String,
	pub url: String,
}

/// Which parts of an item a broadcast replicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct BroadcastOptions {
	/// Keep parent/child links so later broadcasts update instead of insert
	pub link: bool,
	/// Replicate classification terms
	pub classifications: bool,
	/// Replicate custom fields and the thumbnail
	pub metadata: bool,
}

impl BroadcastOptions {
	pub fn all() -> Self {
		BroadcastOptions { link: true, classifications: true, metadata: true }
	}
}


// vim: ts=4
