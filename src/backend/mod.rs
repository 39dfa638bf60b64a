//! Collaborator abstraction layer
//!
//! The engine depends only on the traits in [`traits`]. [`memory`] holds a
//! complete in-process network used by the CLI demo and the tests.

pub mod memory;
pub mod traits;

use std::sync::Arc;

pub use memory::MemoryNetwork;
pub use traits::{BackendResult, ContainerDirectory, ContentStore, MediaStore, TermStore};

/// The set of collaborators one broadcaster talks to
#[derive(Clone)]
pub struct Backends {
	pub content: Arc<dyn ContentStore>,
	pub terms: Arc<dyn TermStore>,
	pub media: Arc<dyn MediaStore>,
	pub directory: Arc<dyn ContainerDirectory>,
}

impl Backends {
	/// Use one value for every collaborator role
	pub fn from_shared<T>(shared: Arc<T>) -> Self
	where
		T: ContentStore + TermStore + MediaStore + ContainerDirectory + 'static,
	{
		Backends {
			content: shared.clone(),
			terms: shared.clone(),
			media: shared.clone(),
			directory: shared,
		}
	}
}

// vim: ts=4
