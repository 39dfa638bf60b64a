//! Media duplication and body reference rewriting

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::backend::{BackendResult, Backends};
use crate::context::Operation;
use crate::logging::*;
use crate::types::{AssetId, ContainerId, ContentItem, ItemRef, MediaAsset, NewAsset};

/// Meta key holding an asset's storage path
pub const ATTACHED_FILE_FIELD: &str = "_wp_attached_file";

/// One asset copied to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedAsset {
	pub old_id: AssetId,
	pub old_guid: String,
	pub new_id: AssetId,
	pub new_guid: String,
}

fn attachment_id_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r#"id="attachment_(\d+)""#).expect("attachment id pattern"))
}

fn gallery_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r#"\[gallery\b([^\]]*?)\bids="([0-9,\s]*)""#).expect("gallery pattern")
	})
}

/// Point references to copied assets at the copies.
///
/// Handles asset guids, `id="attachment_N"` attributes and the id lists of
/// `[gallery ids="..."]` directives. Ids without a copy are left alone.
pub fn rewrite_references(body: &str, copies: &[CopiedAsset]) -> String {
	if copies.is_empty() {
		return body.to_string();
	}
	let ids: BTreeMap<u64, u64> = copies.iter().map(|c| (c.old_id.0, c.new_id.0)).collect();
	let map_id = |old: &str| -> String {
		old.trim()
			.parse::<u64>()
			.ok()
			.and_then(|id| ids.get(&id))
			.map_or_else(|| old.to_string(), |new| new.to_string())
	};

	let mut out = body.to_string();
	for copy in copies.iter().filter(|c| !c.old_guid.is_empty()) {
		out = out.replace(&copy.old_guid, &copy.new_guid);
	}

	let out = attachment_id_regex()
		.replace_all(&out, |caps: &Captures| format!(r#"id="attachment_{}""#, map_id(&caps[1])));

	let out = gallery_regex().replace_all(&out, |caps: &Captures| {
		let list: Vec<String> = caps[2].split(',').map(&map_id).collect();
		format!(r#"[gallery{}ids="{}""#, &caps[1], list.join(","))
	});
	out.into_owned()
}

/// Copies assets from a source item to a target item
pub(crate) struct MediaDuplicator<'a> {
	backends: &'a Backends,
}

impl<'a> MediaDuplicator<'a> {
	pub(crate) fn new(backends: &'a Backends) -> Self {
		MediaDuplicator { backends }
	}

	/// Copy one asset's file and record onto `target`
	pub(crate) async fn duplicate(
		&self,
		op: &Operation,
		source: ContainerId,
		asset: &MediaAsset,
		target: ItemRef,
	) -> BackendResult<CopiedAsset> {
		let media = &self.backends.media;
		let bytes = media.read(source, &asset.path).await?;
		let stored = media.write(op, target.container, &asset.file_name, &bytes).await?;

		let mut meta = asset.meta.clone();
		meta.insert(ATTACHED_FILE_FIELD.to_string(), vec![stored.path.clone()]);

		let new_asset = NewAsset {
			owner: target.item,
			guid: stored.url.clone(),
			path: stored.path,
			file_name: asset.file_name.clone(),
			mime_type: asset.mime_type.clone(),
			title: asset.title.clone(),
			excerpt: asset.excerpt.clone(),
			order: asset.order,
			regenerable: asset.regenerable,
			meta,
		};
		let new_id = media.create_asset(op, target.container, &new_asset).await?;
		if asset.regenerable {
			media.regenerate_renditions(op, target.container, new_id).await?;
		}
		debug!("copied asset {}/{} to {}/{}", source, asset.id, target.container, new_id);

		Ok(CopiedAsset { old_id: asset.id, old_guid: asset.guid.clone(), new_id, new_guid: stored.url })
	}

	/// Replace the target's attachments with copies of the source's.
	///
	/// The thumbnail asset is skipped; it travels with the custom fields.
	/// Assets that fail to copy are logged and left out.
	pub(crate) async fn sync_attachments(
		&self,
		op: &Operation,
		source: &ContentItem,
		target: ItemRef,
		thumbnail: Option<AssetId>,
	) -> BackendResult<Vec<CopiedAsset>> {
		let media = &self.backends.media;

		for previous in media.attachments(target.container, target.item).await? {
			media.delete_asset(op, target.container, previous.id).await?;
		}

		let mut copies = Vec::new();
		for asset in media.attachments(source.container, source.id).await? {
			if Some(asset.id) == thumbnail {
				continue;
			}
			match self.duplicate(op, source.container, &asset, target).await {
				Ok(copy) => copies.push(copy),
				Err(e) => warn!("skipping asset {}/{} for {}: {}", source.container, asset.id, target, e),
			}
		}
		Ok(copies)
	}

	/// Rewrite the target body for `copies`; saves only when something changed
	pub(crate) async fn rewrite_body(
		&self,
		op: &Operation,
		target: ItemRef,
		copies: &[CopiedAsset],
	) -> BackendResult<bool> {
		if copies.is_empty() {
			return Ok(false);
		}
		let content = &self.backends.content;
		let Some(item) = content.get(target.container, target.item).await? else {
			return Ok(false);
		};
		let body = rewrite_references(&item.body, copies);
		if body == item.body {
			return Ok(false);
		}
		content.update_body(op, target.container, target.item, &body).await?;
		debug!("rewrote {} asset references in {}", copies.len(), target);
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn copy(old: u64, new: u64) -> CopiedAsset {
		CopiedAsset {
			old_id: AssetId(old),
			old_guid: format!("https://one.example/uploads/{}.jpg", old),
			new_id: AssetId(new),
			new_guid: format!("https://two.example/uploads/{}.jpg", old),
		}
	}

	#[test]
	fn test_rewrite_guid_and_caption_id() {
		let body = r#"[caption id="attachment_5"]<img src="https://one.example/uploads/5.jpg">[/caption]"#;
		let out = rewrite_references(body, &[copy(5, 50)]);
		assert_eq!(out, r#"[caption id="attachment_50"]<img src="https://two.example/uploads/5.jpg">[/caption]"#);
	}

	#[test]
	fn test_gallery_keeps_unmapped_ids() {
		let body = r#"Look: [gallery columns="2" ids="5,6,7"]"#;
		let out = rewrite_references(body, &[copy(5, 50), copy(7, 70)]);
		assert_eq!(out, r#"Look: [gallery columns="2" ids="50,6,70"]"#);
	}

	#[test]
	fn test_swapped_ids_are_not_chained() {
		let body = r#"<p id="attachment_1"></p><p id="attachment_2"></p>"#;
		let out = rewrite_references(body, &[copy(1, 2), copy(2, 3)]);
		assert_eq!(out, r#"<p id="attachment_2"></p><p id="attachment_3"></p>"#);
	}

	#[test]
	fn test_nothing_copied_is_identity() {
		let body = r#"[gallery ids="1,2"]"#;
		assert_eq!(rewrite_references(body, &[]), body);
	}

	#[test]
	fn test_other_shortcodes_untouched() {
		let body = r#"[playlist ids="5"] [gallery ids="5"]"#;
		assert_eq!(rewrite_references(body, &[copy(5, 9)]), r#"[playlist ids="5"] [gallery ids="9"]"#);
	}
}

// vim: ts=4
