//! Callback traits for broadcast progress events

use crate::error::BroadcastError;
use crate::types::{ContainerId, ItemId, ItemRef};

// Type aliases to reduce complexity
type TargetFn = dyn Fn(ItemRef, ContainerId) + Send + Sync;
type FinishedTargetFn = dyn Fn(ItemRef, ContainerId, ItemId, bool) + Send + Sync;
type FailedTargetFn = dyn Fn(ItemRef, ContainerId, &BroadcastError) + Send + Sync;
type ItemFn = dyn Fn(ItemRef, usize) + Send + Sync;

/// Hooks fired while a broadcast runs
pub trait BroadcastEvents: Send + Sync {
	/// Called once before the first target, with the number of targets
	fn on_started(&self, _source: ItemRef, _targets: usize) {}

	/// Called when work on a target begins
	fn on_target_entered(&self, _source: ItemRef, _container: ContainerId) {}

	/// Called after a target was written
	///
	/// # Arguments
	/// * `source` - The broadcast item
	/// * `container` - Target container
	/// * `item` - The child item on the target
	/// * `was_insert` - Whether the child was created by this broadcast
	fn on_target_finished(&self, _source: ItemRef, _container: ContainerId, _item: ItemId, _was_insert: bool) {}

	/// Called when a target is skipped because of an error
	fn on_target_failed(&self, _source: ItemRef, _container: ContainerId, _error: &BroadcastError) {}

	/// Called once after the last target, with the number of children written
	fn on_finished(&self, _source: ItemRef, _written: usize) {}
}

/// Default event handler that does nothing
pub struct NoEvents;

impl BroadcastEvents for NoEvents {}

/// Builder for event handlers using closures
#[derive(Default)]
pub struct EventsBuilder {
	started: Option<Box<ItemFn>>,
	target_entered: Option<Box<TargetFn>>,
	target_finished: Option<Box<FinishedTargetFn>>,
	target_failed: Option<Box<FailedTargetFn>>,
	finished: Option<Box<ItemFn>>,
}

impl EventsBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_started<F>(mut self, callback: F) -> Self
	where
		F: Fn(ItemRef, usize) + Send + Sync + 'static,
	{
		self.started = Some(Box::new(callback));
		self
	}

	pub fn on_target_entered<F>(mut self, callback: F) -> Self
	where
		F: Fn(ItemRef, ContainerId) + Send + Sync + 'static,
	{
		self.target_entered = Some(Box::new(callback));
		self
	}

	pub fn on_target_finished<F>(mut self, callback: F) -> Self
	where
		F: Fn(ItemRef, ContainerId, ItemId, bool) + Send + Sync + 'static,
	{
		self.target_finished = Some(Box::new(callback));
		self
	}

	pub fn on_target_failed<F>(mut self, callback: F) -> Self
	where
		F: Fn(ItemRef, ContainerId, &BroadcastError) + Send + Sync + 'static,
	{
		self.target_failed = Some(Box::new(callback));
		self
	}

	pub fn on_finished<F>(mut self, callback: F) -> Self
	where
		F: Fn(ItemRef, usize) + Send + Sync + 'static,
	{
		self.finished = Some(Box::new(callback));
		self
	}

	pub fn build(self) -> Box<dyn BroadcastEvents> {
		Box::new(ClosureEvents {
			started: self.started,
			target_entered: self.target_entered,
			target_finished: self.target_finished,
			target_failed: self.target_failed,
			finished: self.finished,
		})
	}
}

/// Internal closure-backed event handler
struct ClosureEvents {
	started: Option<Box<ItemFn>>,
	target_entered: Option<Box<TargetFn>>,
	target_finished: Option<Box<FinishedTargetFn>>,
	target_failed: Option<Box<FailedTargetFn>>,
	finished: Option<Box<ItemFn>>,
}

impl BroadcastEvents for ClosureEvents {
	fn on_started(&self, source: ItemRef, targets: usize) {
		if let Some(ref callback) = self.started {
			callback(source, targets);
		}
	}

	fn on_target_entered(&self, source: ItemRef, container: ContainerId) {
		if let Some(ref callback) = self.target_entered {
			callback(source, container);
		}
	}

	fn on_target_finished(&self, source: ItemRef, container: ContainerId, item: ItemId, was_insert: bool) {
		if let Some(ref callback) = self.target_finished {
			callback(source, container, item, was_insert);
		}
	}

	fn on_target_failed(&self, source: ItemRef, container: ContainerId, error: &BroadcastError) {
		if let Some(ref callback) = self.target_failed {
			callback(source, container, error);
		}
	}

	fn on_finished(&self, source: ItemRef, written: usize) {
		if let Some(ref callback) = self.finished {
			callback(source, written);
		}
	}
}


// vim: ts=4
