//! Collaborator traits the broadcast engine drives
//!
//! Every call names its container explicitly. Write calls also take the
//! `Operation` so an implementation can tell writes made by a running broadcast
//! apart from user saves.

use async_trait::async_trait;

use crate::context::Operation;
use crate::error::BackendError;
use crate::types::*;

/// Result type for collaborator operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Content items of every container
#[async_trait]
pub trait ContentStore: Send + Sync {
	/// Fetch an item, None if it does not exist
	async fn get(&self, container: ContainerId, id: ItemId) -> BackendResult<Option<ContentItem>>;

	/// Insert an item. A zero id signals failure just like an error does.
	async fn create(
		&self,
		op: &Operation,
		container: ContainerId,
		fields: &ItemFields,
	) -> BackendResult<ItemId>;

	async fn update(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		fields: &ItemFields,
	) -> BackendResult<ItemId>;

	/// Permanently delete an item
	async fn delete(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()>;

	async fn trash(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()>;

	/// Restore a trashed item to its status before trashing
	async fn untrash(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()>;

	/// Set an item's status to publish
	async fn publish(&self, op: &Operation, container: ContainerId, id: ItemId) -> BackendResult<()>;

	async fn query(&self, container: ContainerId, filter: &ItemFilter) -> BackendResult<Vec<ContentItem>>;

	async fn set_sticky(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		sticky: bool,
	) -> BackendResult<()>;

	async fn get_meta(&self, container: ContainerId, id: ItemId) -> BackendResult<MetaMap>;

	/// Remove every value of a field
	async fn delete_meta(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		key: &str,
	) -> BackendResult<()>;

	/// Append one value to a field
	async fn add_meta(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		key: &str,
		value: &str,
	) -> BackendResult<()>;

	/// Replace all values of a field with one value
	async fn update_meta(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		key: &str,
		value: &str,
	) -> BackendResult<()>;

	async fn update_body(
		&self,
		op: &Operation,
		container: ContainerId,
		id: ItemId,
		body: &str,
	) -> BackendResult<()>;

	/// What an item type supports on a container
	async fn type_support(&self, container: ContainerId, item_type: &str) -> BackendResult<TypeSupport>;

	async fn permalink(&self, container: ContainerId, id: ItemId) -> BackendResult<String>;
}

/// Classification vocabularies and terms
#[async_trait]
pub trait TermStore: Send + Sync {
	/// Vocabularies that apply to an item type
	async fn vocabularies(&self, container: ContainerId, item_type: &str) -> BackendResult<Vec<String>>;

	async fn list_terms(&self, container: ContainerId, vocabulary: &str) -> BackendResult<Vec<Term>>;

	/// Terms assigned to an item
	async fn item_terms(
		&self,
		container: ContainerId,
		item: ItemId,
		vocabulary: &str,
	) -> BackendResult<Vec<Term>>;

	/// Create a term. A slug clash fails with `BackendError::TermExists`.
	async fn create_term(
		&self,
		op: &Operation,
		container: ContainerId,
		vocabulary: &str,
		term: &NewTerm,
	) -> BackendResult<TermId>;

	/// Replace the item's assignments in a vocabulary
	async fn assign_terms(
		&self,
		op: &Operation,
		container: ContainerId,
		item: ItemId,
		vocabulary: &str,
		terms: &[TermId],
	) -> BackendResult<()>;

	async fn reparent(
		&self,
		op: &Operation,
		container: ContainerId,
		vocabulary: &str,
		term: TermId,
		parent: Option<TermId>,
	) -> BackendResult<()>;

	/// Drop any cached hierarchy of the vocabulary
	async fn invalidate_hierarchy(&self, container: ContainerId, vocabulary: &str) -> BackendResult<()>;
}

/// Media files and their asset records
#[async_trait]
pub trait MediaStore: Send + Sync {
	/// Assets owned by an item
	async fn attachments(&self, container: ContainerId, item: ItemId) -> BackendResult<Vec<MediaAsset>>;

	async fn get_asset(&self, container: ContainerId, id: AssetId) -> BackendResult<Option<MediaAsset>>;

	async fn read(&self, container: ContainerId, path: &str) -> BackendResult<Vec<u8>>;

	/// Store a file in the container's storage area under a free name
	async fn write(
		&self,
		op: &Operation,
		container: ContainerId,
		file_name: &str,
		bytes: &[u8],
	) -> BackendResult<StoredFile>;

	async fn create_asset(
		&self,
		op: &Operation,
		container: ContainerId,
		asset: &NewAsset,
	) -> BackendResult<AssetId>;

	/// Delete an asset record and its file
	async fn delete_asset(&self, op: &Operation, container: ContainerId, id: AssetId) -> BackendResult<()>;

	async fn regenerate_renditions(
		&self,
		op: &Operation,
		container: ContainerId,
		id: AssetId,
	) -> BackendResult<()>;
}

/// Containers of the network and who may write where
#[async_trait]
pub trait ContainerDirectory: Send + Sync {
	async fn containers(&self) -> BackendResult<Vec<Container>>;

	/// The user's home container, listed first
	async fn primary_container(&self, _user: UserId) -> BackendResult<Option<ContainerId>> {
		Ok(None)
	}

	async fn can_write(&self, user: UserId, container: ContainerId) -> BackendResult<bool>;
}

// vim: ts=4
