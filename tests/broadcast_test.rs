//! Broadcast engine tests over an in-memory network
//!
//! This test suite covers:
//! - Inserting, linking and updating children
//! - Classification replication with missing ancestors
//! - Media duplication and body rewriting
//! - Custom field filtering and thumbnails
//! - Permissions, target filtering and reentrancy

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use broadcastr::backend::ContentStore;
use broadcastr::{
	BackendError, BroadcastError, BroadcastOptions, Config, ContainerId, ContentItem, EventsBuilder, ItemId,
	ItemRef, ItemStatus, Operation, Permissions, UserId,
};
use common::*;

// ============================================================================
// Linking
// ============================================================================

#[tokio::test]
async fn test_broadcast_inserts_and_links_children() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;

	let report = fx.broadcast(source, &[NEWS, SHOP]).await;

	assert_eq!(report.results.len(), 2);
	assert!(report.failures.is_empty());
	assert_eq!(report.inserted(), 2);

	let record = fx.broadcaster.store().get(source).unwrap();
	assert_eq!(record.child_count(), 2);
	for container in [NEWS, SHOP] {
		let child_id = report.child_on(ContainerId(container)).unwrap();
		let child = ItemRef::new(container, child_id);
		assert_eq!(record.child_on(ContainerId(container)), Some(child_id));
		assert_eq!(fx.broadcaster.store().get(child).unwrap().parent(), Some(source));

		let copy = fx.network.item(child).await.unwrap();
		assert_eq!(copy.slug, "hello-world");
		assert_eq!(copy.body, "Body of hello-world");
	}
	fx.assert_symmetric();
}

#[tokio::test]
async fn test_rebroadcast_updates_existing_children() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;

	let first = fx.broadcast(source, &[NEWS]).await;
	let second = fx.broadcast(source, &[NEWS]).await;

	assert_eq!(first.inserted(), 1);
	assert_eq!(second.inserted(), 0);
	assert_eq!(first.child_on(ContainerId(NEWS)), second.child_on(ContainerId(NEWS)));
	assert_eq!(fx.network.items(NEWS).await.len(), 1);
	fx.assert_symmetric();
}

#[tokio::test]
async fn test_dangling_link_is_replaced_by_fresh_child() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;
	let first = fx.broadcast(source, &[NEWS]).await;
	let old_child = ItemRef::new(NEWS, first.child_on(ContainerId(NEWS)).unwrap());

	// Removed behind the broadcaster's back
	fx.network.delete(&fx.op(), old_child.container, old_child.item).await.unwrap();

	let second = fx.broadcast(source, &[NEWS]).await;
	let new_id = second.child_on(ContainerId(NEWS)).unwrap();

	assert_eq!(second.inserted(), 1);
	assert_ne!(new_id, old_child.item);
	assert!(!fx.broadcaster.store().contains(old_child).unwrap());
	assert_eq!(fx.broadcaster.store().get(source).unwrap().child_on(ContainerId(NEWS)), Some(new_id));
	fx.assert_symmetric();
}

#[tokio::test]
async fn test_failed_insert_does_not_stop_other_targets() {
	let fx = Fixture::with_network(three_containers().fail_inserts_on(NEWS), Config::default());
	let source = fx.post(MAIN, "hello-world").await;

	let report = fx.broadcast(source, &[NEWS, SHOP]).await;

	assert_eq!(report.results.len(), 1);
	assert_eq!(report.results[0].container, ContainerId(SHOP));
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].container, ContainerId(NEWS));
	assert!(matches!(
		report.failures[0].error,
		BroadcastError::Backend(BackendError::InsertFailed { .. })
	));

	let record = fx.broadcaster.store().get(source).unwrap();
	assert_eq!(record.child_on(ContainerId(NEWS)), None);
	assert!(record.child_on(ContainerId(SHOP)).is_some());
	fx.assert_symmetric();
}

#[tokio::test]
async fn test_dangling_link_is_dropped_when_reinsert_fails() {
	let fx = Fixture::with_network(three_containers().fail_inserts_on(NEWS), Config::default());
	let source = fx.post(MAIN, "hello-world").await;
	let stale = fx.post(NEWS, "hello-world").await;
	let store = fx.broadcaster.store();
	let mut record = store.get(source).unwrap();
	record.add_child(ContainerId(NEWS), stale.item);
	store.set(source, &record).unwrap();
	let mut stale_record = store.get(stale).unwrap();
	stale_record.set_parent(source);
	store.set(stale, &stale_record).unwrap();

	fx.network.delete(&fx.op(), stale.container, stale.item).await.unwrap();
	let report = fx.broadcast(source, &[NEWS, SHOP]).await;

	assert_eq!(report.failures.len(), 1);
	assert!(matches!(
		report.failures[0].error,
		BroadcastError::Backend(BackendError::InsertFailed { .. })
	));
	assert!(!store.contains(stale).unwrap());
	let record = store.get(source).unwrap();
	assert_eq!(record.child_on(ContainerId(NEWS)), None);
	assert!(record.child_on(ContainerId(SHOP)).is_some());
	fx.assert_symmetric();
}

#[tokio::test]
async fn test_without_link_option_nothing_is_recorded() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;
	let options = BroadcastOptions { link: false, ..BroadcastOptions::all() };

	fx.broadcast_with(&fx.op(), source, &[NEWS], options).await;
	fx.broadcast_with(&fx.op(), source, &[NEWS], options).await;

	// Unlinked broadcasts cannot find their earlier copies
	assert_eq!(fx.network.items(NEWS).await.len(), 2);
	assert!(fx.broadcaster.store().records().unwrap().is_empty());
}

#[tokio::test]
async fn test_hierarchical_parent_follows_linked_copy() {
	let fx = Fixture::new();
	let about = fx
		.network
		.insert_item(ContentItem { item_type: "page".into(), ..post(MAIN, "about") })
		.await
		.unwrap();
	let team = fx
		.network
		.insert_item(ContentItem { item_type: "page".into(), parent: Some(about.item), ..post(MAIN, "team") })
		.await
		.unwrap();

	let parent_report = fx.broadcast(about, &[NEWS]).await;
	let child_report = fx.broadcast(team, &[NEWS, SHOP]).await;

	let news_team = ItemRef::new(NEWS, child_report.child_on(ContainerId(NEWS)).unwrap());
	let shop_team = ItemRef::new(SHOP, child_report.child_on(ContainerId(SHOP)).unwrap());
	assert_eq!(fx.network.item(news_team).await.unwrap().parent, parent_report.child_on(ContainerId(NEWS)));
	// The parent page was never broadcast to the shop
	assert_eq!(fx.network.item(shop_team).await.unwrap().parent, None);
}

#[tokio::test]
async fn test_update_keeps_local_parent_until_source_parent_is_linked() {
	let fx = Fixture::new();
	let about = fx
		.network
		.insert_item(ContentItem { item_type: "page".into(), ..post(MAIN, "about") })
		.await
		.unwrap();
	let team = fx
		.network
		.insert_item(ContentItem { item_type: "page".into(), parent: Some(about.item), ..post(MAIN, "team") })
		.await
		.unwrap();
	let first = fx.broadcast(team, &[NEWS]).await;
	let news_team = ItemRef::new(NEWS, first.child_on(ContainerId(NEWS)).unwrap());

	// Placed under a page that only exists on the news container
	let company = fx
		.network
		.insert_item(ContentItem { item_type: "page".into(), ..post(NEWS, "company") })
		.await
		.unwrap();
	let placed = ContentItem { parent: Some(company.item), ..fx.network.item(news_team).await.unwrap() };
	fx.network.insert_item(placed).await.unwrap();

	fx.broadcast(team, &[NEWS]).await;
	assert_eq!(fx.network.item(news_team).await.unwrap().parent, Some(company.item));

	let about_report = fx.broadcast(about, &[NEWS]).await;
	fx.broadcast(team, &[NEWS]).await;
	assert_eq!(fx.network.item(news_team).await.unwrap().parent, about_report.child_on(ContainerId(NEWS)));
}

// ============================================================================
// Classifications
// ============================================================================

#[tokio::test]
async fn test_missing_ancestors_are_created() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "borrowing").await;
	let tech = fx.network.insert_term(MAIN, "category", "Tech", "tech", None).await.unwrap();
	let lang = fx.network.insert_term(MAIN, "category", "Languages", "languages", Some(tech)).await.unwrap();
	let rust = fx.network.insert_term(MAIN, "category", "Rust", "rust", Some(lang)).await.unwrap();
	fx.network.set_item_terms(source, "category", &[rust]).await.unwrap();

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	let terms = fx.network.terms(NEWS, "category").await;
	assert_eq!(terms.len(), 3);
	let by_slug = |slug: &str| terms.iter().find(|t| t.slug == slug).unwrap().clone();
	assert_eq!(by_slug("tech").parent, None);
	assert_eq!(by_slug("languages").parent, Some(by_slug("tech").id));
	assert_eq!(by_slug("rust").parent, Some(by_slug("languages").id));

	assert_eq!(fx.network.item_term_slugs(child, "category").await, vec!["rust".to_string()]);
	assert_eq!(fx.network.invalidations(NEWS).await, 1);
}

#[tokio::test]
async fn test_existing_terms_are_matched_by_slug() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "release").await;
	let news = fx.network.insert_term(MAIN, "post_tag", "News", "news", None).await.unwrap();
	fx.network.set_item_terms(source, "post_tag", &[news]).await.unwrap();
	let existing = fx.network.insert_term(NEWS, "post_tag", "Latest news", "news", None).await.unwrap();

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	let terms = fx.network.terms(NEWS, "post_tag").await;
	assert_eq!(terms.len(), 1);
	assert_eq!(terms[0].id, existing);
	assert_eq!(fx.network.item_term_slugs(child, "post_tag").await, vec!["news".to_string()]);
	assert_eq!(fx.network.invalidations(NEWS).await, 0);
}

#[tokio::test]
async fn test_target_hierarchy_is_brought_in_line() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "borrowing").await;
	let tech = fx.network.insert_term(MAIN, "category", "Tech", "tech", None).await.unwrap();
	let rust = fx.network.insert_term(MAIN, "category", "Rust", "rust", Some(tech)).await.unwrap();
	fx.network.set_item_terms(source, "category", &[rust]).await.unwrap();
	// Both exist on the target, but as siblings
	let news_tech = fx.network.insert_term(NEWS, "category", "Tech", "tech", None).await.unwrap();
	let news_rust = fx.network.insert_term(NEWS, "category", "Rust", "rust", None).await.unwrap();

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	let terms = fx.network.terms(NEWS, "category").await;
	assert_eq!(terms.len(), 2);
	let moved = terms.iter().find(|t| t.id == news_rust).unwrap();
	assert_eq!(moved.parent, Some(news_tech));
	assert_eq!(fx.network.item_term_slugs(child, "category").await, vec!["rust".to_string()]);
	assert_eq!(fx.network.invalidations(NEWS).await, 1);
}

#[tokio::test]
async fn test_clashing_term_is_adopted_and_used_as_ancestor() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "borrowing").await;
	let rust = fx.network.insert_term(MAIN, "category", "Rust", "rust", None).await.unwrap();
	let asynch = fx.network.insert_term(MAIN, "category", "Async", "async", Some(rust)).await.unwrap();
	fx.network.set_item_terms(source, "category", &[asynch]).await.unwrap();
	// Same name under the same parent, different slug: the target refuses a second "Rust"
	let existing = fx.network.insert_term(NEWS, "category", "Rust", "rust-lang", None).await.unwrap();

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	let terms = fx.network.terms(NEWS, "category").await;
	assert_eq!(terms.len(), 2);
	assert!(terms.iter().all(|t| t.slug != "rust"));
	let created = terms.iter().find(|t| t.slug == "async").unwrap();
	assert_eq!(created.parent, Some(existing));
	assert_eq!(fx.network.item_term_slugs(child, "category").await, vec!["async".to_string()]);
	assert_eq!(fx.network.invalidations(NEWS).await, 1);
}

#[tokio::test]
async fn test_update_clears_removed_terms() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "release").await;
	let news = fx.network.insert_term(MAIN, "post_tag", "News", "news", None).await.unwrap();
	fx.network.set_item_terms(source, "post_tag", &[news]).await.unwrap();

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());
	assert_eq!(fx.network.item_term_slugs(child, "post_tag").await.len(), 1);

	fx.network.set_item_terms(source, "post_tag", &[]).await.unwrap();
	fx.broadcast(source, &[NEWS]).await;
	assert!(fx.network.item_term_slugs(child, "post_tag").await.is_empty());
}

// ============================================================================
// Media and custom fields
// ============================================================================

#[tokio::test]
async fn test_attachments_are_copied_and_body_rewritten() {
	let fx = Fixture::new();
	let source = fx
		.network
		.insert_item(ContentItem {
			id: ItemId(10),
			body: r#"[gallery ids="11,12,99"] <img src="https://main.example/uploads/a.jpg">"#.to_string(),
			..post(MAIN, "album")
		})
		.await
		.unwrap();
	let a = fx.network.attach_file(source, "a.jpg", b"aaaa").await.unwrap();
	let b = fx.network.attach_file(source, "b.jpg", b"bbbb").await.unwrap();
	assert_eq!((a.id.0, b.id.0), (11, 12));

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	let copies = fx.network.assets(NEWS).await;
	assert_eq!(copies.len(), 2);
	let copy_a = copies.iter().find(|c| c.file_name == "a.jpg").unwrap();
	let copy_b = copies.iter().find(|c| c.file_name == "b.jpg").unwrap();
	assert_eq!(copy_a.owner, Some(child.item));
	assert_eq!(fx.network.file(NEWS, &copy_a.path).await.unwrap(), b"aaaa".to_vec());

	let body = fx.network.item(child).await.unwrap().body;
	assert_eq!(
		body,
		format!(r#"[gallery ids="{},{},99"] <img src="{}">"#, copy_a.id, copy_b.id, copy_a.guid)
	);
	assert_eq!(fx.network.regenerated(NEWS).await.len(), 2);
}

#[tokio::test]
async fn test_rebroadcast_replaces_previous_copies() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "album").await;
	fx.network.attach_file(source, "a.jpg", b"aaaa").await.unwrap();

	fx.broadcast(source, &[NEWS]).await;
	fx.broadcast(source, &[NEWS]).await;

	assert_eq!(fx.network.assets(NEWS).await.len(), 1);
}

#[tokio::test]
async fn test_custom_fields_are_filtered() {
	let fx = Fixture::new();
	let source = fx
		.network
		.insert_item(ContentItem {
			id: ItemId(10),
			meta: meta(&[
				("color", "red"),
				("color", "blue"),
				("_internal_x", "1"),
				("_wp_page_template", "wide"),
				("_thumbnail_id", "11"),
			]),
			..post(MAIN, "styled")
		})
		.await
		.unwrap();
	let thumb = fx.network.attach_file(source, "thumb.png", b"png").await.unwrap();
	assert_eq!(thumb.id.0, 11);

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	// The thumbnail travels only as the featured image, not as an attachment copy
	let copies = fx.network.assets(NEWS).await;
	assert_eq!(copies.len(), 1);
	assert_eq!(copies[0].file_name, "thumb.png");

	let target_meta = fx.network.item(child).await.unwrap().meta;
	assert_eq!(target_meta.get("color").unwrap(), &vec!["red".to_string(), "blue".to_string()]);
	assert_eq!(target_meta.get("_wp_page_template").unwrap(), &vec!["wide".to_string()]);
	assert_eq!(target_meta.get("_thumbnail_id").unwrap(), &vec![copies[0].id.to_string()]);
	assert!(!target_meta.contains_key("_internal_x"));
}

#[tokio::test]
async fn test_metadata_option_off_leaves_fields_alone() {
	let fx = Fixture::new();
	let source = fx
		.network
		.insert_item(ContentItem { meta: meta(&[("color", "red")]), ..post(MAIN, "styled") })
		.await
		.unwrap();
	let options = BroadcastOptions { metadata: false, ..BroadcastOptions::all() };

	let report = fx.broadcast_with(&fx.op(), source, &[NEWS], options).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	assert!(fx.network.item(child).await.unwrap().meta.is_empty());
}

#[tokio::test]
async fn test_sticky_flag_is_copied() {
	let fx = Fixture::new();
	let source =
		fx.network.insert_item(ContentItem { sticky: true, ..post(MAIN, "pinned") }).await.unwrap();

	let report = fx.broadcast(source, &[NEWS]).await;
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	assert!(fx.network.item(child).await.unwrap().sticky);
}

// ============================================================================
// Preparation and permissions
// ============================================================================

#[tokio::test]
async fn test_broadcast_permission_required() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;
	let op = Operation::new(UserId(1), Permissions { broadcast: false, ..Permissions::all() });

	let result = fx.broadcaster.prepare(&op, source, &[ContainerId(NEWS)], BroadcastOptions::all()).await;

	assert!(matches!(result, Err(BroadcastError::PermissionDenied { .. })));
}

#[tokio::test]
async fn test_options_are_masked_by_permissions() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;
	let op = Operation::new(
		UserId(1),
		Permissions { link: false, custom_fields: false, ..Permissions::all() },
	);

	let request = fx
		.broadcaster
		.prepare(&op, source, &[ContainerId(NEWS)], BroadcastOptions::all())
		.await
		.unwrap()
		.unwrap();

	assert_eq!(request.options, BroadcastOptions { link: false, classifications: true, metadata: false });
}

#[tokio::test]
async fn test_targets_are_filtered() {
	let fx = Fixture::with_network(three_containers().deny_write(1, SHOP), Config::default());
	let source = fx.post(MAIN, "hello-world").await;
	let targets: Vec<ContainerId> = [NEWS, MAIN, NEWS, SHOP, 42].iter().map(|&c| ContainerId(c)).collect();

	let request = fx
		.broadcaster
		.prepare(&fx.op(), source, &targets, BroadcastOptions::all())
		.await
		.unwrap()
		.unwrap();

	assert_eq!(request.targets, vec![ContainerId(NEWS)]);
}

#[tokio::test]
async fn test_drafts_and_unlisted_types_are_not_broadcast() {
	let fx = Fixture::new();
	let draft = fx
		.network
		.insert_item(ContentItem { status: ItemStatus::Draft, ..post(MAIN, "wip") })
		.await
		.unwrap();
	let no_drafts = Operation::new(UserId(1), Permissions { drafts: false, ..Permissions::all() });
	let targets = [ContainerId(NEWS)];

	let prepared = fx.broadcaster.prepare(&no_drafts, draft, &targets, BroadcastOptions::all()).await.unwrap();
	assert!(prepared.is_none());
	let prepared = fx.broadcaster.prepare(&fx.op(), draft, &targets, BroadcastOptions::all()).await.unwrap();
	assert!(prepared.is_some());

	let fx = Fixture::with_network(three_containers(), Config { post_types: "page".into(), ..Config::default() });
	let source = fx.post(MAIN, "hello-world").await;
	let prepared = fx.broadcaster.prepare(&fx.op(), source, &targets, BroadcastOptions::all()).await.unwrap();
	assert!(prepared.is_none());
}

#[tokio::test]
async fn test_missing_source_is_not_found() {
	let fx = Fixture::new();
	let missing = ItemRef::new(MAIN, 404u64);

	let result = fx.broadcaster.prepare(&fx.op(), missing, &[ContainerId(NEWS)], BroadcastOptions::all()).await;

	assert!(matches!(result, Err(BroadcastError::NotFound { item }) if item == missing));
}

// ============================================================================
// Reentrancy and events
// ============================================================================

#[tokio::test]
async fn test_broadcast_writes_are_flagged_and_not_rebroadcast() {
	let fx = Fixture::new();
	let source = fx.post(MAIN, "hello-world").await;
	let op = fx.op();

	let report = fx
		.broadcaster
		.on_item_saved(&op, source, &[ContainerId(NEWS)], BroadcastOptions::all())
		.await
		.unwrap()
		.unwrap();
	let child = ItemRef::new(NEWS, report.child_on(ContainerId(NEWS)).unwrap());

	let writes = fx.network.writes().await;
	assert!(!writes.is_empty());
	assert!(writes.iter().all(|w| w.broadcasting));

	// A save hook fired by the child write must not broadcast again
	let nested = op.nested_broadcast();
	let again = fx
		.broadcaster
		.on_item_saved(&nested, child, &[ContainerId(SHOP)], BroadcastOptions::all())
		.await
		.unwrap();
	assert!(again.is_none());
	assert!(fx.network.items(SHOP).await.is_empty());
}

#[tokio::test]
async fn test_events_are_fired() {
	let finished = Arc::new(AtomicUsize::new(0));
	let failed = Arc::new(AtomicUsize::new(0));
	let (f, e) = (finished.clone(), failed.clone());

	let fx = Fixture::with_network(three_containers().fail_inserts_on(NEWS), Config::default()).with_events(
		EventsBuilder::new()
			.on_target_finished(move |_, _, _, was_insert| {
				assert!(was_insert);
				f.fetch_add(1, Ordering::SeqCst);
			})
			.on_target_failed(move |_, container, _| {
				assert_eq!(container, ContainerId(NEWS));
				e.fetch_add(1, Ordering::SeqCst);
			})
			.build(),
	);
	let source = fx.post(MAIN, "hello-world").await;

	fx.broadcast(source, &[NEWS, SHOP]).await;

	assert_eq!(finished.load(Ordering::SeqCst), 1);
	assert_eq!(failed.load(Ordering::SeqCst), 1);
}

// vim: ts=4
