//! # Broadcastr - Cross-Container Content Broadcasting
//!
//! Broadcastr copies a content item from one container (site, tenant, blog)
//! to others and keeps the copies linked to their parent. Classification
//! terms, media attachments and custom fields follow the item, and later
//! trash, restore or delete operations cascade to every linked child.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use broadcastr::{Backends, Broadcaster, BroadcastOptions, Config, LinkStore, Operation, Permissions};
//! use broadcastr::backend::memory::MemoryNetwork;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let network = Arc::new(MemoryNetwork::new().with_container(1, "main").with_container(2, "news"));
//!     let store = Arc::new(LinkStore::open("links.redb".as_ref())?);
//!     let broadcaster = Broadcaster::new(Backends::from_shared(network), store, Config::default())?;
//!
//!     let op = Operation::new(1.into(), Permissions::all());
//!     let item = "1/5".parse()?;
//!     if let Some(request) = broadcaster.prepare(&op, item, &[2.into()], BroadcastOptions::all()).await? {
//!         let report = broadcaster.broadcast(&op, &request).await?;
//!         println!("{} copies written", report.results.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Listening to Progress
//!
//! ```rust,ignore
//! use broadcastr::EventsBuilder;
//!
//! let broadcaster = broadcaster.with_events(
//!     EventsBuilder::new()
//!         .on_target_failed(|source, container, error| eprintln!("{} -> {}: {}", source, container, error))
//!         .build(),
//! );
//! ```

pub mod backend;
pub mod broadcast;
pub mod bulk;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod error;
pub mod groups;
pub mod lifecycle;
pub mod links;
pub mod logging;
pub mod media;
pub mod metadata;
pub mod orphans;
pub mod permalink;
pub mod store;
pub mod taxonomy;
pub mod types;

// Re-export commonly used types and functions
pub use backend::Backends;
pub use broadcast::{BroadcastReport, BroadcastRequest, Broadcaster, TargetFailure, TargetResult};
pub use bulk::{BulkAction, BulkItemResult};
pub use callbacks::{BroadcastEvents, EventsBuilder, NoEvents};
pub use config::Config;
pub use context::{Operation, Permissions};
pub use error::{BackendError, BroadcastError, BroadcastResult, ConfigError, StoreError};
pub use groups::{ContainerGroup, LastUsedSettings, UserGroupSettings};
pub use lifecycle::{CascadeOp, ChildAction};
pub use links::LinkRecord;
pub use orphans::OrphanCandidate;
pub use store::{LinkStore, LinkViolation};
pub use types::{BroadcastOptions, ContainerId, ContentItem, ItemId, ItemRef, ItemStatus, TermId, UserId};

// vim: ts=4
