//! Shared fixtures: a small in-memory network and a temporary link database

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;

use broadcastr::backend::memory::MemoryNetwork;
use broadcastr::types::MetaMap;
use broadcastr::{
	Backends, BroadcastEvents, BroadcastOptions, BroadcastReport, Broadcaster, Config, ContainerId, ContentItem, ItemRef,
	ItemStatus, LinkStore, Operation, Permissions, UserId,
};

pub const MAIN: u64 = 1;
pub const NEWS: u64 = 2;
pub const SHOP: u64 = 3;
pub const BLOG: u64 = 4;

pub struct Fixture {
	pub network: Arc<MemoryNetwork>,
	pub broadcaster: Broadcaster,
	// Keeps the database directory alive
	_dir: TempDir,
}

impl Fixture {
	pub fn new() -> Self {
		Self::with_network(three_containers(), Config::default())
	}

	pub fn with_network(network: MemoryNetwork, config: Config) -> Self {
		let dir = TempDir::new().unwrap();
		let store = Arc::new(LinkStore::open(&dir.path().join("links.redb")).unwrap());
		let network = Arc::new(network);
		let broadcaster = Broadcaster::new(Backends::from_shared(network.clone()), store, config).unwrap();
		Fixture { network, broadcaster, _dir: dir }
	}

	pub fn with_events(self, events: Box<dyn BroadcastEvents>) -> Self {
		Fixture { broadcaster: self.broadcaster.with_events(events), ..self }
	}

	pub fn op(&self) -> Operation {
		Operation::new(UserId(1), Permissions::all())
	}

	pub async fn post(&self, container: u64, slug: &str) -> ItemRef {
		self.network.insert_item(post(container, slug)).await.unwrap()
	}

	/// Prepare and broadcast with every option on
	pub async fn broadcast(&self, item: ItemRef, targets: &[u64]) -> BroadcastReport {
		self.broadcast_with(&self.op(), item, targets, BroadcastOptions::all()).await
	}

	pub async fn broadcast_with(
		&self,
		op: &Operation,
		item: ItemRef,
		targets: &[u64],
		options: BroadcastOptions,
	) -> BroadcastReport {
		let targets: Vec<ContainerId> = targets.iter().map(|&c| ContainerId(c)).collect();
		let request = self
			.broadcaster
			.prepare(op, item, &targets, options)
			.await
			.unwrap()
			.expect("item should be broadcastable");
		self.broadcaster.broadcast(op, &request).await.unwrap()
	}

	pub fn assert_symmetric(&self) {
		let violations = self.broadcaster.store().verify_symmetry().unwrap();
		assert!(violations.is_empty(), "one-sided links: {:?}", violations);
	}
}

pub fn three_containers() -> MemoryNetwork {
	MemoryNetwork::new().with_container(MAIN, "main").with_container(NEWS, "news").with_container(SHOP, "shop")
}

pub fn post(container: u64, slug: &str) -> ContentItem {
	ContentItem {
		container: ContainerId(container),
		item_type: "post".to_string(),
		status: ItemStatus::Publish,
		slug: slug.to_string(),
		title: slug.replace('-', " "),
		body: format!("Body of {}", slug),
		..Default::default()
	}
}

pub fn meta(pairs: &[(&str, &str)]) -> MetaMap {
	let mut out = MetaMap::new();
	for (k, v) in pairs {
		out.entry(k.to_string()).or_default().push(v.to_string());
	}
	out
}

// vim: ts=4
