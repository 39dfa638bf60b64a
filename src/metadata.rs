//! Custom field eligibility and replication

use crate::backend::{BackendResult, Backends};
use crate::config::Config;
use crate::context::Operation;
use crate::logging::*;
use crate::media::MediaDuplicator;
use crate::types::{AssetId, ContentItem, ItemRef, MetaMap};

/// Decides which custom fields travel with a broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
	prefix: String,
	exceptions: Vec<String>,
	thumbnail_field: String,
}

impl FieldFilter {
	/// `exceptions` is a whitespace separated list of substrings
	pub fn new(prefix: &str, exceptions: &str, thumbnail_field: &str) -> Self {
		FieldFilter {
			prefix: prefix.to_string(),
			exceptions: exceptions.split_whitespace().map(str::to_string).collect(),
			thumbnail_field: thumbnail_field.to_string(),
		}
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(&config.internal_field_prefix, &config.custom_field_exceptions, &config.thumbnail_field)
	}

	pub fn thumbnail_field(&self) -> &str {
		&self.thumbnail_field
	}

	/// Internal fields (those starting with the prefix) are excluded unless
	/// they contain one of the exception substrings.
	pub fn is_eligible(&self, key: &str) -> bool {
		if self.prefix.is_empty() || !key.starts_with(&self.prefix) {
			return true;
		}
		self.exceptions.iter().any(|e| key.contains(e.as_str()))
	}

	/// Eligible fields of `meta`, without the thumbnail pointer
	pub fn eligible<'m>(&'m self, meta: &'m MetaMap) -> impl Iterator<Item = (&'m String, &'m Vec<String>)> {
		meta.iter().filter(move |(k, _)| k.as_str() != self.thumbnail_field && self.is_eligible(k))
	}

	/// Thumbnail asset id named by `meta`
	pub fn thumbnail_of(&self, meta: &MetaMap) -> Option<AssetId> {
		meta.get(&self.thumbnail_field)
			.and_then(|values| values.first())
			.and_then(|v| v.parse::<AssetId>().ok())
			.filter(|id| id.is_valid())
	}
}

/// Replaces a target item's custom fields with the source's eligible ones
pub(crate) struct MetadataSync<'a> {
	backends: &'a Backends,
	filter: &'a FieldFilter,
}

impl<'a> MetadataSync<'a> {
	pub(crate) fn new(backends: &'a Backends, filter: &'a FieldFilter) -> Self {
		MetadataSync { backends, filter }
	}

	/// Returns the id of the copied thumbnail, if any
	pub(crate) async fn sync(
		&self,
		op: &Operation,
		source: &ContentItem,
		target: ItemRef,
	) -> BackendResult<Option<AssetId>> {
		let content = &self.backends.content;
		let media = &self.backends.media;

		let existing = content.get_meta(target.container, target.item).await?;
		for (key, values) in &existing {
			if key == self.filter.thumbnail_field() {
				for asset in values.iter().filter_map(|v| v.parse::<AssetId>().ok()) {
					if let Err(e) = media.delete_asset(op, target.container, asset).await {
						warn!("could not delete old thumbnail {}/{}: {}", target.container, asset, e);
					}
				}
			}
			content.delete_meta(op, target.container, target.item, key).await?;
		}

		let mut written = 0;
		for (key, values) in self.filter.eligible(&source.meta) {
			for value in values {
				content.add_meta(op, target.container, target.item, key, value).await?;
				written += 1;
			}
		}
		debug!("replaced {} fields with {} values on {}", existing.len(), written, target);

		let Some(thumbnail) = self.filter.thumbnail_of(&source.meta) else {
			return Ok(None);
		};
		let Some(asset) = media.get_asset(source.container, thumbnail).await? else {
			warn!("thumbnail {}/{} is missing, not copied", source.container, thumbnail);
			return Ok(None);
		};
		match MediaDuplicator::new(self.backends).duplicate(op, source.container, &asset, target).await {
			Ok(copy) => {
				content
					.update_meta(op, target.container, target.item, self.filter.thumbnail_field(), &copy.new_id.to_string())
					.await?;
				Ok(Some(copy.new_id))
			}
			Err(e) => {
				warn!("could not copy thumbnail {}/{} to {}: {}", source.container, thumbnail, target, e);
				Ok(None)
			}
		}
	}
}


// vim: ts=4
