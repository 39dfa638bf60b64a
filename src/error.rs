//! Error types for broadcast operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::types::{ContainerId, ItemRef, TermId};

/// Main error type for broadcast operations
#[derive(Debug)]
pub enum BroadcastError {
	/// Link record / user settings persistence failed
	Store(StoreError),

	/// A collaborator (content, term, media store) failed
	Backend(BackendError),

	/// Configuration error (nested)
	Config(ConfigError),

	/// The acting user may not perform this action
	PermissionDenied { action: String },

	/// Item does not exist
	NotFound { item: ItemRef },

	/// Item has no linked child on the container
	NotLinked { item: ItemRef, container: ContainerId },

	/// Request cannot be carried out as given
	InvalidRequest { message: String },
}

impl fmt::Display for BroadcastError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BroadcastError::Store(e) => write!(f, "Link store error: {}", e),
			BroadcastError::Backend(e) => write!(f, "Backend error: {}", e),
			BroadcastError::Config(e) => write!(f, "Configuration error: {}", e),
			BroadcastError::PermissionDenied { action } => {
				write!(f, "Permission denied: {}", action)
			}
			BroadcastError::NotFound { item } => write!(f, "Item {} not found", item),
			BroadcastError::NotLinked { item, container } => {
				write!(f, "Item {} has no linked child on container {}", item, container)
			}
			BroadcastError::InvalidRequest { message } => write!(f, "Invalid request: {}", message),
		}
	}
}

impl Error for BroadcastError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			BroadcastError::Store(e) => Some(e),
			BroadcastError::Backend(e) => Some(e),
			BroadcastError::Config(e) => Some(e),
			_ => None,
		}
	}
}

impl From<StoreError> for BroadcastError {
	fn from(e: StoreError) -> Self {
		BroadcastError::Store(e)
	}
}

impl From<BackendError> for BroadcastError {
	fn from(e: BackendError) -> Self {
		BroadcastError::Backend(e)
	}
}

impl From<ConfigError> for BroadcastError {
	fn from(e: ConfigError) -> Self {
		BroadcastError::Config(e)
	}
}

/// Link store errors
#[derive(Debug)]
pub enum StoreError {
	/// Failed to open or create the database
	Open { source: Box<dyn Error + Send + Sync> },

	/// A read or write transaction failed
	Transaction { source: Box<dyn Error + Send + Sync> },

	/// Stored value could not be decoded
	Corrupted { key: String, message: String },

	/// Stored value was written by a newer schema
	UnsupportedVersion { key: String, found: u32 },

	/// Value could not be encoded
	Encode { message: String },
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::Open { source } => write!(f, "Failed to open link database: {}", source),
			StoreError::Transaction { source } => write!(f, "Transaction failed: {}", source),
			StoreError::Corrupted { key, message } => {
				write!(f, "Stored value {} is corrupted: {}", key, message)
			}
			StoreError::UnsupportedVersion { key, found } => {
				write!(f, "Stored value {} has unsupported schema version {}", key, found)
			}
			StoreError::Encode { message } => write!(f, "Failed to encode value: {}", message),
		}
	}
}

impl Error for StoreError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			StoreError::Open { source } | StoreError::Transaction { source } => Some(&**source),
			_ => None,
		}
	}
}

impl From<redb::DatabaseError> for StoreError {
	fn from(e: redb::DatabaseError) -> Self {
		StoreError::Open { source: Box::new(e) }
	}
}

impl From<redb::TransactionError> for StoreError {
	fn from(e: redb::TransactionError) -> Self {
		StoreError::Transaction { source: Box::new(e) }
	}
}

impl From<redb::TableError> for StoreError {
	fn from(e: redb::TableError) -> Self {
		StoreError::Transaction { source: Box::new(e) }
	}
}

impl From<redb::StorageError> for StoreError {
	fn from(e: redb::StorageError) -> Self {
		StoreError::Transaction { source: Box::new(e) }
	}
}

impl From<redb::CommitError> for StoreError {
	fn from(e: redb::CommitError) -> Self {
		StoreError::Transaction { source: Box::new(e) }
	}
}

/// Collaborator failures
#[derive(Debug)]
pub enum BackendError {
	/// Referenced entity does not exist
	NotFound { what: String },

	/// Store refused to create an entity
	InsertFailed { message: String },

	/// Term with this slug already exists on the target
	TermExists { existing: TermId },

	/// Item type is not known to the container
	UnsupportedType { item_type: String },

	/// I/O error while moving files
	Io(io::Error),

	/// Generic failure
	Other { message: String },
}

impl fmt::Display for BackendError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BackendError::NotFound { what } => write!(f, "Not found: {}", what),
			BackendError::InsertFailed { message } => write!(f, "Insert failed: {}", message),
			BackendError::TermExists { existing } => write!(f, "Term already exists: {}", existing),
			BackendError::UnsupportedType { item_type } => {
				write!(f, "Unsupported item type: {}", item_type)
			}
			BackendError::Io(e) => write!(f, "I/O error: {}", e),
			BackendError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for BackendError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			BackendError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for BackendError {
	fn from(e: io::Error) -> Self {
		BackendError::Io(e)
	}
}

impl From<String> for BackendError {
	fn from(message: String) -> Self {
		BackendError::Other { message }
	}
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Io { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// A value is out of range
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Io { path, source } => write!(f, "Cannot read {}: {}", path, source),
			ConfigError::Parse { path, message } => write!(f, "Cannot parse {}: {}", path, message),
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ConfigError::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

/// Result alias used throughout the crate
pub type BroadcastResult<T> = Result<T, BroadcastError>;


// vim: ts=4
