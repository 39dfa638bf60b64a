//! In-process network of containers
//!
//! Implements every collaborator trait over plain maps behind one async mutex.
//! Besides the trait surface it has builder methods for seeding a network,
//! inspection helpers and failure injection for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use super::traits::*;
use crate::context::Operation;
use crate::error::BackendError;
use crate::types::*;

/// One content write seen by the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
	pub item: ItemRef,
	/// Whether the write came from inside a broadcast
	pub broadcasting: bool,
}

struct ContainerState {
	info: Container,
	/// Items and assets share one id sequence
	next_id: u64,
	items: BTreeMap<ItemId, ContentItem>,
	trashed_from: BTreeMap<ItemId, ItemStatus>,
	types: BTreeMap<String, TypeSupport>,
	vocabularies: BTreeMap<String, Vec<String>>,
	next_term: u64,
	terms: BTreeMap<String, BTreeMap<TermId, Term>>,
	assignments: BTreeMap<(ItemId, String), Vec<TermId>>,
	assets: BTreeMap<AssetId, MediaAsset>,
	files: BTreeMap<String, Vec<u8>>,
	regenerated: Vec<AssetId>,
	invalidations: usize,
}

impl ContainerState {
	fn new(id: ContainerId, name: &str) -> Self {
		let content = TypeSupport { hierarchical: false, thumbnails: true, custom_fields: true, attachments: true };
		let mut types = BTreeMap::new();
		types.insert("post".to_string(), content);
		types.insert("page".to_string(), TypeSupport { hierarchical: true, ..content });

		let mut vocabularies = BTreeMap::new();
		vocabularies.insert("post".to_string(), vec!["category".to_string(), "post_tag".to_string()]);

		ContainerState {
			info: Container { id, name: name.to_string(), url: format!("https://{}.example", name) },
			next_id: 1,
			items: BTreeMap::new(),
			trashed_from: BTreeMap::new(),
			types,
			vocabularies,
			next_term: 1,
			terms: BTreeMap::new(),
			assignments: BTreeMap::new(),
			assets: BTreeMap::new(),
			files: BTreeMap::new(),
			regenerated: Vec::new(),
			invalidations: 0,
		}
	}

	fn allocate(&mut self) -> u64 {
		let id = self.next_id;
		self.next_id += 1;
		id
	}

	fn item_mut(&mut self, id: ItemId) -> BackendResult<&mut ContentItem> {
		let container = self.info.id;
		self.items
			.get_mut(&id)
			.ok_or_else(|| BackendError::NotFound { what: format!("item {}/{}", container, id) })
	}

	fn vocabulary_mut(&mut self, vocabulary: &str) -> &mut BTreeMap<TermId, Term> {
		self.terms.entry(vocabulary.to_string()).or_default()
	}

	fn free_path(&self, file_name: &str) -> String {
		let (stem, ext) = match file_name.rsplit_once('.') {
			Some((stem, ext)) => (stem, format!(".{}", ext)),
			None => (file_name, String::new()),
		};
		let mut candidate = format!("uploads/{}", file_name);
		let mut n = 1;
		while self.files.contains_key(&candidate) {
			candidate = format!("uploads/{}-{}{}", stem, n, ext);
			n += 1;
		}
		candidate
	}
}

#[derive(Default)]
struct NetworkState {
	containers: BTreeMap<ContainerId, ContainerState>,
	denied: BTreeSet<(UserId, ContainerId)>,
	primary: BTreeMap<UserId, ContainerId>,
	failing_inserts: BTreeSet<ContainerId>,
	failing_deletes: BTreeSet<ContainerId>,
	writes: Vec<WriteRecord>,
}

impl NetworkState {
	fn container(&self, id: ContainerId) -> BackendResult<&ContainerState> {
		self.containers
			.get(&id)
			.ok_or_else(|| BackendError::NotFound { what: format!("container {}", id) })
	}

	fn container_mut(&mut self, id: ContainerId) -> BackendResult<&mut ContainerState> {
		self.containers
			.get_mut(&id)
			.ok_or_else(|| BackendError::NotFound { what: format!("container {}", id) })
	}

	fn log(&mut self, op: &Operation, container: ContainerId, item: ItemId) {
		self.writes.push(WriteRecord {
			item: ItemRef { container, item },
			broadcasting: op.is_broadcasting(),
		});
	}
}

/// In-memory implementation of all collaborator traits
#[derive(Default)]
pub struct MemoryNetwork {
	state: Mutex<NetworkState>,
}

fn mime_for(file_name: &str) -> &'static str {
	match file_name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).as_deref() {
		Some("jpg") | Some("jpeg") => "image/jpeg",
		Some("png") => "image/png",
		Some("gif") => "image/gif",
		Some("pdf") => "application/pdf",
		_ => "application/octet-stream",
	}
}

impl MemoryNetwork {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a container named `name`, reachable at `https://<name>.example`
	pub fn with_container(mut self, id: u64, name: &str) -> Self {
		let id = ContainerId(id);
		self.state.get_mut().containers.insert(id, ContainerState::new(id, name));
		self
	}

	/// Make a container read-only for a user
	pub fn deny_write(mut self, user: u64, container: u64) -> Self {
		self.state.get_mut().denied.insert((UserId(user), ContainerId(container)));
		self
	}

	pub fn with_primary(mut self, user: u64, container: u64) -> Self {
		self.state.get_mut().primary.insert(UserId(user), ContainerId(container));
		self
	}

	/// Every insert on the container yields an invalid id
	pub fn fail_inserts_on(mut self, container: u64) -> Self {
		self.state.get_mut().failing_inserts.insert(ContainerId(container));
		self
	}

	/// Refuse every delete on `container`
	pub fn fail_deletes_on(mut self, container: u64) -> Self {
		self.state.get_mut().failing_deletes.insert(ContainerId(container));
		self
	}

	/// Store an item as is. A zero id is replaced by a fresh one.
	pub async fn insert_item(&self, mut item: ContentItem) -> BackendResult<ItemRef> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(item.container)?;
		if item.id.is_valid() {
			c.next_id = c.next_id.max(item.id.0 + 1);
		} else {
			item.id = ItemId(c.allocate());
		}
		if item.guid.is_empty() {
			item.guid = format!("{}/?p={}", c.info.url, item.id);
		}
		let at = item.item_ref();
		c.items.insert(item.id, item);
		Ok(at)
	}

	pub async fn insert_term(
		&self,
		container: u64,
		vocabulary: &str,
		name: &str,
		slug: &str,
		parent: Option<TermId>,
	) -> BackendResult<TermId> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(ContainerId(container))?;
		let id = TermId(c.next_term);
		c.next_term += 1;
		c.vocabulary_mut(vocabulary).insert(
			id,
			Term { id, name: name.to_string(), slug: slug.to_string(), description: String::new(), parent },
		);
		Ok(id)
	}

	pub async fn set_item_terms(&self, at: ItemRef, vocabulary: &str, terms: &[TermId]) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(at.container)?;
		c.assignments.insert((at.item, vocabulary.to_string()), terms.to_vec());
		Ok(())
	}

	/// Store a file and an asset record owned by `at`
	pub async fn attach_file(&self, at: ItemRef, file_name: &str, bytes: &[u8]) -> BackendResult<MediaAsset> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(at.container)?;
		let path = c.free_path(file_name);
		let id = AssetId(c.allocate());
		let mime_type = mime_for(file_name);
		let asset = MediaAsset {
			id,
			owner: Some(at.item),
			guid: format!("{}/{}", c.info.url, path),
			path: path.clone(),
			file_name: file_name.to_string(),
			mime_type: mime_type.to_string(),
			title: file_name.to_string(),
			excerpt: String::new(),
			order: 0,
			regenerable: mime_type.starts_with("image/"),
			meta: MetaMap::new(),
		};
		c.files.insert(path, bytes.to_vec());
		c.assets.insert(id, asset.clone());
		Ok(asset)
	}

	pub async fn item(&self, at: ItemRef) -> Option<ContentItem> {
		let state = self.state.lock().await;
		state.containers.get(&at.container).and_then(|c| c.items.get(&at.item).cloned())
	}

	pub async fn items(&self, container: u64) -> Vec<ContentItem> {
		let state = self.state.lock().await;
		state
			.containers
			.get(&ContainerId(container))
			.map(|c| c.items.values().cloned().collect())
			.unwrap_or_default()
	}

	pub async fn terms(&self, container: u64, vocabulary: &str) -> Vec<Term> {
		let state = self.state.lock().await;
		state
			.containers
			.get(&ContainerId(container))
			.and_then(|c| c.terms.get(vocabulary))
			.map(|v| v.values().cloned().collect())
			.unwrap_or_default()
	}

	/// Slugs assigned to an item, sorted
	pub async fn item_term_slugs(&self, at: ItemRef, vocabulary: &str) -> Vec<String> {
		let state = self.state.lock().await;
		let Some(c) = state.containers.get(&at.container) else {
			return Vec::new();
		};
		let ids = c.assignments.get(&(at.item, vocabulary.to_string())).cloned().unwrap_or_default();
		let mut slugs: Vec<String> = ids
			.iter()
			.filter_map(|id| c.terms.get(vocabulary).and_then(|v| v.get(id)).map(|t| t.slug.clone()))
			.collect();
		slugs.sort();
		slugs
	}

	pub async fn assets(&self, container: u64) -> Vec<MediaAsset> {
		let state = self.state.lock().await;
		state
			.containers
			.get(&ContainerId(container))
			.map(|c| c.assets.values().cloned().collect())
			.unwrap_or_default()
	}

	pub async fn file(&self, container: u64, path: &str) -> Option<Vec<u8>> {
		let state = self.state.lock().await;
		state.containers.get(&ContainerId(container)).and_then(|c| c.files.get(path).cloned())
	}

	pub async fn regenerated(&self, container: u64) -> Vec<AssetId> {
		let state = self.state.lock().await;
		state.containers.get(&ContainerId(container)).map(|c| c.regenerated.clone()).unwrap_or_default()
	}

	/// How often a container's term hierarchy was invalidated
	pub async fn invalidations(&self, container: u64) -> usize {
		let state = self.state.lock().await;
		state.containers.get(&ContainerId(container)).map_or(0, |c| c.invalidations)
	}

	/// Every content write so far, in order
	pub async fn writes(&self) -> Vec<WriteRecord> {
		self.state.lock().await.writes.clone()
	}
}

#[async_trait]
impl ContentStore for MemoryNetwork {
	async fn get(&self, container: ContainerId, id: ItemId) -> BackendResult<Option<ContentItem>> {
		let state = self.state.lock().await;
		Ok(state.container(container)?.items.get(&id).cloned())
	}

	async fn create(
		&self,
		op: &Operation,
		container: ContainerId,
		fields: &ItemFields,
	) -> BackendResult<ItemId> {
		let mut state = self.state.lock().await;
		if state.failing_inserts.contains(&container) {
			return Ok(ItemId(0));
		}
		let c = state.container_mut(container)?;
		if !c.types.contains_key(&fields.item_type) {
			return Err(BackendError::UnsupportedType { item_type: fields.item_type.clone() });
		}
		let id = ItemId(c.allocate());
		let item = ContentItem {
			container,
			id,
			guid: format!("{}/?p={}", c.info.url, id),
			item_type: fields.item_type.clone(),
			status: fields.status,
			slug: fields.slug.clone(),
			title: fields.title.clone(),
			body: fields.body.clone(),
			excerpt: fields.excerpt.clone(),
			parent: fields.parent,
			..Default::default()
		};
		c.items.insert(id, item);
		state.log(op, container, id);
		Ok(id)
	}

	async fn update(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		fields: &ItemFields,
	) -> BackendResult<ItemId> {
		let mut state = self.state.lock().await;
		let item = state.container_mut(container)?.item_mut(id)?;
		item.item_type = fields.item_type.clone();
		item.status = fields.status;
		item.slug = fields.slug.clone();
		item.title = fields.title.clone();
		item.body = fields.body.clone();
		item.excerpt = fields.excerpt.clone();
		item.parent = fields.parent;
		state.log(op, container, id);
		Ok(id)
	}

	async fn delete(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		if state.failing_deletes.contains(&container) {
			return Err(BackendError::Other { message: format!("container {} refused to delete {}", container, id) });
		}
		let c = state.container_mut(container)?;
		c.items.remove(&id);
		c.trashed_from.remove(&id);
		c.assignments.retain(|(item, _), _| *item != id);
		state.log(op, container, id);
		Ok(())
	}

	async fn trash(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		let item = c.item_mut(id)?;
		if item.status != ItemStatus::Trash {
			let previous = item.status;
			item.status = ItemStatus::Trash;
			c.trashed_from.insert(id, previous);
		}
		state.log(op, container, id);
		Ok(())
	}

	async fn untrash(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		let previous = c.trashed_from.remove(&id).unwrap_or(ItemStatus::Draft);
		let item = c.item_mut(id)?;
		if item.status == ItemStatus::Trash {
			item.status = previous;
		}
		state.log(op, container, id);
		Ok(())
	}

	async fn publish(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		c.item_mut(id)?.status = ItemStatus::Publish;
		c.trashed_from.remove(&id);
		state.log(op, container, id);
		Ok(())
	}

	async fn query(&self, container: ContainerId, filter: &ItemFilter) -> BackendResult<Vec<ContentItem>> {
		let state = self.state.lock().await;
		let matches = state
			.container(container)?
			.items
			.values()
			.filter(|i| filter.slug.as_ref().is_none_or(|s| &i.slug == s))
			.filter(|i| filter.item_type.as_ref().is_none_or(|t| &i.item_type == t))
			.filter(|i| filter.status.is_none_or(|s| i.status == s))
			.take(filter.limit.unwrap_or(usize::MAX))
			.cloned()
			.collect();
		Ok(matches)
	}

	async fn set_sticky(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		sticky: bool,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		state.container_mut(container)?.item_mut(id)?.sticky = sticky;
		state.log(op, container, id);
		Ok(())
	}

	async fn get_meta(&self, container: ContainerId, id: ItemId) -> BackendResult<MetaMap> {
		let mut state = self.state.lock().await;
		Ok(state.container_mut(container)?.item_mut(id)?.meta.clone())
	}

	async fn delete_meta(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		key: &str,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		state.container_mut(container)?.item_mut(id)?.meta.remove(key);
		state.log(op, container, id);
		Ok(())
	}

	async fn add_meta(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		key: &str,
		value: &str,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let item = state.container_mut(container)?.item_mut(id)?;
		item.meta.entry(key.to_string()).or_default().push(value.to_string());
		state.log(op, container, id);
		Ok(())
	}

	async fn update_meta(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		key: &str,
		value: &str,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let item = state.container_mut(container)?.item_mut(id)?;
		item.meta.insert(key.to_string(), vec![value.to_string()]);
		state.log(op, container, id);
		Ok(())
	}

	async fn update_body(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		body: &str,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		state.container_mut(container)?.item_mut(id)?.body = body.to_string();
		state.log(op, container, id);
		Ok(())
	}

	async fn type_support(&self, container: ContainerId, item_type: &str) -> BackendResult<TypeSupport> {
		let state = self.state.lock().await;
		state
			.container(container)?
			.types
			.get(item_type)
			.copied()
			.ok_or_else(|| BackendError::UnsupportedType { item_type: item_type.to_string() })
	}

	async fn permalink(&self, container: ContainerId, id: ItemId) -> BackendResult<String> {
		let state = self.state.lock().await;
		let c = state.container(container)?;
		let item = c
			.items
			.get(&id)
			.ok_or_else(|| BackendError::NotFound { what: format!("item {}/{}", container, id) })?;
		Ok(format!("{}/{}/", c.info.url, item.slug))
	}
}

#[async_trait]
impl TermStore for MemoryNetwork {
	async fn vocabularies(&self, container: ContainerId, item_type: &str) -> BackendResult<Vec<String>> {
		let state = self.state.lock().await;
		Ok(state.container(container)?.vocabularies.get(item_type).cloned().unwrap_or_default())
	}

	async fn list_terms(&self, container: ContainerId, vocabulary: &str) -> BackendResult<Vec<Term>> {
		let state = self.state.lock().await;
		Ok(state
			.container(container)?
			.terms
			.get(vocabulary)
			.map(|v| v.values().cloned().collect())
			.unwrap_or_default())
	}

	async fn item_terms(
		&self,
		container: ContainerId,
		item: ItemId,
		vocabulary: &str,
	) -> BackendResult<Vec<Term>> {
		let state = self.state.lock().await;
		let c = state.container(container)?;
		let ids = c.assignments.get(&(item, vocabulary.to_string())).cloned().unwrap_or_default();
		Ok(ids
			.iter()
			.filter_map(|id| c.terms.get(vocabulary).and_then(|v| v.get(id)).cloned())
			.collect())
	}

	async fn create_term(
		&self,
		_op: &Operation,
		container: ContainerId,
		vocabulary: &str,
		term: &NewTerm,
	) -> BackendResult<TermId> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		let id = TermId(c.next_term);
		let terms = c.vocabulary_mut(vocabulary);
		// Slugs are unique, names only among siblings
		let clash = terms.values().find(|t| {
			t.slug == term.slug || (t.parent == term.parent && t.name.to_lowercase() == term.name.to_lowercase())
		});
		if let Some(existing) = clash {
			return Err(BackendError::TermExists { existing: existing.id });
		}
		if let Some(parent) = term.parent {
			if !terms.contains_key(&parent) {
				return Err(BackendError::NotFound { what: format!("term {} in {}", parent, vocabulary) });
			}
		}
		terms.insert(
			id,
			Term {
				id,
				name: term.name.clone(),
				slug: term.slug.clone(),
				description: term.description.clone(),
				parent: term.parent,
			},
		);
		c.next_term += 1;
		Ok(id)
	}

	async fn assign_terms(
		&self,
		_op: &Operation,
		container: ContainerId,
		item: ItemId,
		vocabulary: &str,
		terms: &[TermId],
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		c.item_mut(item)?;
		c.assignments.insert((item, vocabulary.to_string()), terms.to_vec());
		Ok(())
	}

	async fn reparent(
		&self,
		_op: &Operation,
		container: ContainerId,
		vocabulary: &str,
		term: TermId,
		parent: Option<TermId>,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let terms = state.container_mut(container)?.vocabulary_mut(vocabulary);
		if let Some(parent) = parent {
			if parent == term || !terms.contains_key(&parent) {
				return Err(BackendError::Other { message: format!("cannot move term {} under {}", term, parent) });
			}
		}
		let entry = terms
			.get_mut(&term)
			.ok_or_else(|| BackendError::NotFound { what: format!("term {} in {}", term, vocabulary) })?;
		entry.parent = parent;
		Ok(())
	}

	async fn invalidate_hierarchy(&self, container: ContainerId, _vocabulary: &str) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		state.container_mut(container)?.invalidations += 1;
		Ok(())
	}
}

#[async_trait]
impl MediaStore for MemoryNetwork {
	async fn attachments(&self, container: ContainerId, item: ItemId) -> BackendResult<Vec<MediaAsset>> {
		let state = self.state.lock().await;
		let mut assets: Vec<MediaAsset> = state
			.container(container)?
			.assets
			.values()
			.filter(|a| a.owner == Some(item))
			.cloned()
			.collect();
		assets.sort_by_key(|a| (a.order, a.id));
		Ok(assets)
	}

	async fn get_asset(&self, container: ContainerId, id: AssetId) -> BackendResult<Option<MediaAsset>> {
		let state = self.state.lock().await;
		Ok(state.container(container)?.assets.get(&id).cloned())
	}

	async fn read(&self, container: ContainerId, path: &str) -> BackendResult<Vec<u8>> {
		let state = self.state.lock().await;
		state
			.container(container)?
			.files
			.get(path)
			.cloned()
			.ok_or_else(|| BackendError::NotFound { what: format!("file {} on {}", path, container) })
	}

	async fn write(
		&self,
		_op: &Operation,
		container: ContainerId,
		file_name: &str,
		bytes: &[u8],
	) -> BackendResult<StoredFile> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		let path = c.free_path(file_name);
		let url = format!("{}/{}", c.info.url, path);
		c.files.insert(path.clone(), bytes.to_vec());
		Ok(StoredFile { path, url })
	}

	async fn create_asset(
		&self,
		_op: &Operation,
		container: ContainerId,
		asset: &NewAsset,
	) -> BackendResult<AssetId> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		if !c.items.contains_key(&asset.owner) {
			return Err(BackendError::NotFound { what: format!("owner {}/{}", container, asset.owner) });
		}
		let id = AssetId(c.allocate());
		c.assets.insert(
			id,
			MediaAsset {
				id,
				owner: Some(asset.owner),
				guid: asset.guid.clone(),
				path: asset.path.clone(),
				file_name: asset.file_name.clone(),
				mime_type: asset.mime_type.clone(),
				title: asset.title.clone(),
				excerpt: asset.excerpt.clone(),
				order: asset.order,
				regenerable: asset.regenerable,
				meta: asset.meta.clone(),
			},
		);
		Ok(id)
	}

	async fn delete_asset(&self, _op: &Operation, container: ContainerId, id: AssetId) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		let c = state.container_mut(container)?;
		if let Some(asset) = c.assets.remove(&id) {
			c.files.remove(&asset.path);
		}
		Ok(())
	}

	async fn regenerate_renditions(
		&self,
		_op: &Operation,
		container: ContainerId,
		id: AssetId,
	) -> BackendResult<()> {
		let mut state = self.state.lock().await;
		state.container_mut(container)?.regenerated.push(id);
		Ok(())
	}
}

#[async_trait]
impl ContainerDirectory for MemoryNetwork {
	async fn containers(&self) -> BackendResult<Vec<Container>> {
		let state = self.state.lock().await;
		Ok(state.containers.values().map(|c| c.info.clone()).collect())
	}

	async fn primary_container(&self, user: UserId) -> BackendResult<Option<ContainerId>> {
		Ok(self.state.lock().await.primary.get(&user).copied())
	}

	async fn can_write(&self, user: UserId, container: ContainerId) -> BackendResult<bool> {
		let state = self.state.lock().await;
		Ok(state.containers.contains_key(&container) && !state.denied.contains(&(user, container)))
	}
}


// vim: ts=4
