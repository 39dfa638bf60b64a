//! Broadcast orchestration
//!
//! A broadcast copies one source item onto a list of target containers. For
//! each target it decides between insert and update, writes the content and
//! then replicates classifications, media, custom fields and the sticky flag.
//! With linking enabled the parent/child link is recorded on both sides.
//!
//! Targets are processed one after the other. A failing target is reported in
//! the [`BroadcastReport`] and the remaining targets still run.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::backend::Backends;
use crate::callbacks::{BroadcastEvents, NoEvents};
use crate::config::Config;
use crate::context::Operation;
use crate::error::{BackendError, BroadcastError, BroadcastResult};
use crate::links::LinkRecord;
use crate::logging::*;
use crate::media::MediaDuplicator;
use crate::metadata::{FieldFilter, MetadataSync};
use crate::store::LinkStore;
use crate::taxonomy::TaxonomySync;
use crate::types::*;

/// Fail with `PermissionDenied` unless `allowed`
pub(crate) fn ensure(allowed: bool, action: &str) -> BroadcastResult<()> {
	if allowed {
		Ok(())
	} else {
		Err(BroadcastError::PermissionDenied { action: action.to_string() })
	}
}

/// The broadcast engine
///
/// Holds the collaborators, the link store and the configuration. All
/// operations take an [`Operation`] naming the acting user.
pub struct Broadcaster {
	pub(crate) backends: Backends,
	pub(crate) store: Arc<LinkStore>,
	pub(crate) config: Config,
	pub(crate) fields: FieldFilter,
	pub(crate) events: Arc<dyn BroadcastEvents>,
}

/// A validated broadcast: source, reachable targets and permitted options
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRequest {
	pub source: ContentItem,
	pub targets: Vec<ContainerId>,
	pub options: BroadcastOptions,
}

/// A target that was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetResult {
	pub container: ContainerId,
	pub item_id: ItemId,
	pub was_insert: bool,
}

/// A target that was skipped
#[derive(Debug)]
pub struct TargetFailure {
	pub container: ContainerId,
	pub error: BroadcastError,
}

/// Outcome of one broadcast
#[derive(Debug)]
pub struct BroadcastReport {
	pub source: ItemRef,
	pub results: Vec<TargetResult>,
	pub failures: Vec<TargetFailure>,
}

impl BroadcastReport {
	pub fn child_on(&self, container: ContainerId) -> Option<ItemId> {
		self.results.iter().find(|r| r.container == container).map(|r| r.item_id)
	}

	pub fn inserted(&self) -> usize {
		self.results.iter().filter(|r| r.was_insert).count()
	}
}

/// Everything about the source that stays fixed across targets
struct SourceContext<'r> {
	request: &'r BroadcastRequest,
	at: ItemRef,
	support: TypeSupport,
	thumbnail: Option<AssetId>,
	/// Link record of the source's hierarchical parent
	parent_record: Option<LinkRecord>,
}

impl Broadcaster {
	pub fn new(backends: Backends, store: Arc<LinkStore>, config: Config) -> BroadcastResult<Self> {
		config.validate()?;
		let fields = FieldFilter::from_config(&config);
		Ok(Broadcaster { backends, store, config, fields, events: Arc::new(NoEvents) })
	}

	pub fn with_events(mut self, events: Box<dyn BroadcastEvents>) -> Self {
		self.events = Arc::from(events);
		self
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &LinkStore {
		&self.store
	}

	/// Containers the user may write to, their primary container first, the rest by name
	pub async fn writable_containers(&self, op: &Operation) -> BroadcastResult<Vec<Container>> {
		if let Some(cached) = op.cached_containers() {
			return Ok(cached);
		}
		let directory = &self.backends.directory;
		let primary = directory.primary_container(op.user()).await?;

		let mut writable = Vec::new();
		for container in directory.containers().await? {
			if directory.can_write(op.user(), container.id).await? {
				writable.push(container);
			}
		}
		writable.sort_by(|a, b| {
			(Some(a.id) != primary, a.name.to_lowercase(), a.id).cmp(&(
				Some(b.id) != primary,
				b.name.to_lowercase(),
				b.id,
			))
		});
		op.cache_containers(&writable);
		Ok(writable)
	}

	/// Check and narrow a broadcast request.
	///
	/// Returns `None` when the item is in a state or of a type that is not
	/// broadcast. Options the user may not use are switched off. Targets are
	/// de-duplicated, the source container is removed and containers the user
	/// cannot write to are dropped.
	pub async fn prepare(
		&self,
		op: &Operation,
		item: ItemRef,
		targets: &[ContainerId],
		wanted: BroadcastOptions,
	) -> BroadcastResult<Option<BroadcastRequest>> {
		let perms = op.permissions();
		ensure(perms.broadcast, "broadcast")?;

		let source = self
			.backends
			.content
			.get(item.container, item.item)
			.await?
			.ok_or(BroadcastError::NotFound { item })?;

		let status_allowed = match source.status {
			ItemStatus::Publish | ItemStatus::Pending | ItemStatus::Private => true,
			ItemStatus::Draft => perms.drafts,
			ItemStatus::Future => perms.scheduled,
			ItemStatus::Trash | ItemStatus::Inherit => false,
		};
		if !status_allowed {
			debug!("{} has status {}, not broadcasting", item, source.status);
			return Ok(None);
		}
		if !self.config.is_post_type(&source.item_type) {
			debug!("{} is a {}, not broadcasting", item, source.item_type);
			return Ok(None);
		}

		let options = BroadcastOptions {
			link: wanted.link && perms.link,
			classifications: wanted.classifications && perms.taxonomies,
			metadata: wanted.metadata && perms.custom_fields,
		};

		let writable: BTreeSet<ContainerId> =
			self.writable_containers(op).await?.into_iter().map(|c| c.id).collect();
		let mut seen = BTreeSet::new();
		let mut accepted = Vec::with_capacity(targets.len());
		for &container in targets {
			if container == item.container || !seen.insert(container) {
				continue;
			}
			if !writable.contains(&container) {
				warn!("user {} cannot write to container {}, dropping target", op.user(), container);
				continue;
			}
			accepted.push(container);
		}

		Ok(Some(BroadcastRequest { source, targets: accepted, options }))
	}

	/// Entry point for item saves.
	///
	/// Saves made by a running broadcast are ignored, as are items that
	/// `prepare` rejects.
	pub async fn on_item_saved(
		&self,
		op: &Operation,
		item: ItemRef,
		targets: &[ContainerId],
		wanted: BroadcastOptions,
	) -> BroadcastResult<Option<BroadcastReport>> {
		if op.is_broadcasting() {
			debug!("save of {} happened inside a broadcast, ignoring", item);
			return Ok(None);
		}
		match self.prepare(op, item, targets, wanted).await? {
			Some(request) => Ok(Some(self.broadcast(op, &request).await?)),
			None => Ok(None),
		}
	}

	/// Replicate the request's source onto every target
	#[instrument(skip_all, fields(op = %op.id(), source = %request.source.item_ref()))]
	pub async fn broadcast(&self, op: &Operation, request: &BroadcastRequest) -> BroadcastResult<BroadcastReport> {
		ensure(op.permissions().broadcast, "broadcast")?;
		let source = &request.source;
		let at = source.item_ref();
		let link = request.options.link;
		let nested = op.nested_broadcast();

		let support = self.backends.content.type_support(source.container, &source.item_type).await?;
		let parent_record = match source.parent {
			Some(parent) if support.hierarchical => Some(self.store.get(ItemRef { container: at.container, item: parent })?),
			_ => None,
		};
		let ctx = SourceContext {
			request,
			at,
			support,
			thumbnail: self.fields.thumbnail_of(&source.meta),
			parent_record,
		};

		let mut source_record = if link { self.store.get(at)? } else { LinkRecord::new() };
		let mut report = BroadcastReport { source: at, results: Vec::new(), failures: Vec::new() };
		self.events.on_started(at, request.targets.len());

		for &container in &request.targets {
			self.events.on_target_entered(at, container);
			match self.broadcast_to(&nested, &ctx, &mut source_record, container).await {
				Ok(result) => {
					info!(
						"{} {} as {}/{}",
						if result.was_insert { "inserted" } else { "updated" },
						at,
						container,
						result.item_id
					);
					self.events.on_target_finished(at, container, result.item_id, result.was_insert);
					report.results.push(result);
				}
				Err(error) => {
					warn!("skipping container {} for {}: {}", container, at, error);
					self.events.on_target_failed(at, container, &error);
					report.failures.push(TargetFailure { container, error });
				}
			}
		}

		if link {
			self.store.set(at, &source_record)?;
		}
		self.save_last_used(op, &request.targets, request.options)?;
		self.events.on_finished(at, report.results.len());
		Ok(report)
	}

	async fn broadcast_to(
		&self,
		op: &Operation,
		ctx: &SourceContext<'_>,
		source_record: &mut LinkRecord,
		container: ContainerId,
	) -> BroadcastResult<TargetResult> {
		let link = ctx.request.options.link;
		let existing = if link { self.resolve_target(ctx.at, source_record, container).await? } else { None };

		let was_insert = existing.is_none();
		let child = self.upsert(op, ctx, existing, container).await?;
		let child_at = ItemRef { container, item: child };
		if link && was_insert {
			source_record.add_child(container, child);
		}

		// The link is completed even when a later step fails.
		let replicated = self.replicate(op, ctx, child_at, was_insert).await;
		if link {
			let mut child_record = self.store.get(child_at)?;
			child_record.set_parent(ctx.at);
			self.store.set(child_at, &child_record)?;
		}
		replicated?;

		Ok(TargetResult { container, item_id: child, was_insert })
	}

	/// Linked child on `container` that still exists.
	///
	/// A dangling link is dropped from both records here, so a failed
	/// re-insert never leaves the source pointing at a missing child.
	async fn resolve_target(
		&self,
		source: ItemRef,
		source_record: &mut LinkRecord,
		container: ContainerId,
	) -> BroadcastResult<Option<ContentItem>> {
		let Some(child) = source_record.child_on(container) else {
			return Ok(None);
		};
		if let Some(item) = self.backends.content.get(container, child).await? {
			return Ok(Some(item));
		}
		warn!("child {}/{} of {} no longer exists, inserting a new one", container, child, source);
		self.store.delete(ItemRef { container, item: child })?;
		source_record.remove_child(container);
		Ok(None)
	}

	async fn upsert(
		&self,
		op: &Operation,
		ctx: &SourceContext<'_>,
		existing: Option<ContentItem>,
		container: ContainerId,
	) -> BroadcastResult<ItemId> {
		let content = &self.backends.content;
		let mut fields = ctx.request.source.snapshot();
		let linked_parent = if ctx.support.hierarchical {
			ctx.parent_record.as_ref().and_then(|r| r.child_on(container))
		} else {
			None
		};

		match existing {
			Some(current) => {
				debug!("updating {}/{}", container, current.id);
				// Without a linked parent here the copy keeps wherever it was placed
				fields.parent = linked_parent.or(current.parent);
				Ok(content.update(op, container, current.id, &fields).await?)
			}
			None => {
				fields.parent = linked_parent;
				let id = content.create(op, container, &fields).await?;
				if !id.is_valid() {
					return Err(BackendError::InsertFailed {
						message: format!("container {} returned no id for {}", container, ctx.at),
					}
					.into());
				}
				Ok(id)
			}
		}
	}

	/// Classifications, media, custom fields and sticky flag
	async fn replicate(
		&self,
		op: &Operation,
		ctx: &SourceContext<'_>,
		child: ItemRef,
		was_insert: bool,
	) -> BroadcastResult<()> {
		let source = &ctx.request.source;
		let options = ctx.request.options;

		if options.classifications {
			let stats = TaxonomySync::new(&self.backends, self.config.max_term_depth)
				.sync(op, source, child, !was_insert)
				.await?;
			debug!(
				"{}: {} terms assigned, {} created, {} moved",
				child, stats.assigned, stats.created, stats.reparented
			);
		}

		if ctx.support.attachments {
			let media = MediaDuplicator::new(&self.backends);
			let copies = media.sync_attachments(op, source, child, ctx.thumbnail).await?;
			media.rewrite_body(op, child, &copies).await?;
		}

		if options.metadata && (ctx.support.custom_fields || ctx.support.thumbnails) {
			MetadataSync::new(&self.backends, &self.fields).sync(op, source, child).await?;
		}

		let content = &self.backends.content;
		let target = content
			.get(child.container, child.item)
			.await?
			.ok_or(BroadcastError::NotFound { item: child })?;
		if target.sticky != source.sticky {
			content.set_sticky(op, child.container, child.item, source.sticky).await?;
		}
		Ok(())
	}
}

// vim: ts=4
