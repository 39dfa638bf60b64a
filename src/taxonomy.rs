//! Classification replication
//!
//! Terms are matched across containers by slug, never by id. Missing terms are
//! created on the target together with any missing ancestors, after which the
//! target hierarchy is brought in line with the source's.

use std::collections::{BTreeMap, BTreeSet};

use crate::backend::{BackendResult, Backends};
use crate::context::Operation;
use crate::error::BackendError;
use crate::logging::*;
use crate::types::{ContainerId, ContentItem, ItemRef, NewTerm, Term, TermId};

/// What a classification pass changed on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermSyncStats {
	pub assigned: usize,
	pub created: usize,
	pub reparented: usize,
}

pub(crate) struct TaxonomySync<'a> {
	backends: &'a Backends,
	max_depth: usize,
}

/// Target vocabulary as known during one pass
struct TargetVocabulary<'v> {
	container: ContainerId,
	name: &'v str,
	terms: Vec<Term>,
}

impl TargetVocabulary<'_> {
	fn by_slug(&self, slug: &str) -> Option<&Term> {
		self.terms.iter().find(|t| t.slug == slug)
	}
}

impl<'a> TaxonomySync<'a> {
	pub(crate) fn new(backends: &'a Backends, max_depth: usize) -> Self {
		TaxonomySync { backends, max_depth }
	}

	/// Replicate every vocabulary of the source's item type onto `target`.
	///
	/// On update, previous assignments are replaced even when the source has none.
	pub(crate) async fn sync(
		&self,
		op: &Operation,
		source: &ContentItem,
		target: ItemRef,
		is_update: bool,
	) -> BackendResult<TermSyncStats> {
		let terms = &self.backends.terms;
		let mut stats = TermSyncStats::default();

		for vocabulary in terms.vocabularies(source.container, &source.item_type).await? {
			let assigned = terms.item_terms(source.container, source.id, &vocabulary).await?;
			if assigned.is_empty() && !is_update {
				continue;
			}
			let source_terms: BTreeMap<TermId, Term> = terms
				.list_terms(source.container, &vocabulary)
				.await?
				.into_iter()
				.map(|t| (t.id, t))
				.collect();
			let mut target_vocab = TargetVocabulary {
				container: target.container,
				name: &vocabulary,
				terms: terms.list_terms(target.container, &vocabulary).await?,
			};

			let changes_before = stats.created + stats.reparented;
			let mut ids = Vec::with_capacity(assigned.len());
			for term in &assigned {
				let id = self.resolve(op, term, &source_terms, &mut target_vocab, &mut stats).await?;
				if !ids.contains(&id) {
					ids.push(id);
				}
			}
			terms.assign_terms(op, target.container, target.item, &vocabulary, &ids).await?;
			stats.assigned += ids.len();

			stats.reparented += self.reconcile_hierarchy(op, &source_terms, &target_vocab).await?;
			if stats.created + stats.reparented > changes_before {
				terms.invalidate_hierarchy(target.container, &vocabulary).await?;
			}
			debug!("{} {} terms assigned on {}", ids.len(), vocabulary, target);
		}
		Ok(stats)
	}

	/// Target-local id for a source term, creating it and missing ancestors
	async fn resolve(
		&self,
		op: &Operation,
		term: &Term,
		source_terms: &BTreeMap<TermId, Term>,
		target: &mut TargetVocabulary<'_>,
		stats: &mut TermSyncStats,
	) -> BackendResult<TermId> {
		if let Some(existing) = target.by_slug(&term.slug) {
			return Ok(existing.id);
		}

		// Walk up until an ancestor already exists on the target or the walk has to stop.
		let mut chain = vec![term];
		let mut visited = BTreeSet::from([term.id]);
		let mut anchor = None;
		let mut next = term.parent;
		while let Some(parent_id) = next {
			if chain.len() > self.max_depth {
				warn!("term {} is nested deeper than {}, attaching at root", term.slug, self.max_depth);
				break;
			}
			let Some(parent) = source_terms.get(&parent_id) else {
				warn!("parent {} of term {} not found, attaching at root", parent_id, term.slug);
				break;
			};
			if !visited.insert(parent.id) {
				warn!("term {} has a cyclic ancestry, attaching at root", term.slug);
				break;
			}
			if let Some(existing) = target.by_slug(&parent.slug) {
				anchor = Some(existing.id);
				break;
			}
			chain.push(parent);
			next = parent.parent;
		}

		let mut parent = anchor;
		let mut id = TermId(0);
		for source_term in chain.into_iter().rev() {
			id = self.create_or_adopt(op, target, source_term, parent, stats).await?;
			parent = Some(id);
		}
		Ok(id)
	}

	async fn create_or_adopt(
		&self,
		op: &Operation,
		target: &mut TargetVocabulary<'_>,
		term: &Term,
		parent: Option<TermId>,
		stats: &mut TermSyncStats,
	) -> BackendResult<TermId> {
		let terms = &self.backends.terms;
		let new_term = NewTerm::from_term(term, parent);
		match terms.create_term(op, target.container, target.name, &new_term).await {
			Ok(id) => {
				debug!("created {} term {} as {}/{}", target.name, term.slug, target.container, id);
				stats.created += 1;
				target.terms.push(Term {
					id,
					name: new_term.name,
					slug: new_term.slug,
					description: new_term.description,
					parent,
				});
				Ok(id)
			}
			Err(BackendError::TermExists { existing }) => {
				warn!("{} term {} already exists as {}, adopting it", target.name, term.slug, existing);
				target.terms = terms.list_terms(target.container, target.name).await?;
				Ok(existing)
			}
			Err(e) => Err(e),
		}
	}

	/// Re-parent target terms whose parent differs from the source's, by slug
	async fn reconcile_hierarchy(
		&self,
		op: &Operation,
		source_terms: &BTreeMap<TermId, Term>,
		target: &TargetVocabulary<'_>,
	) -> BackendResult<usize> {
		let source_by_slug: BTreeMap<&str, &Term> =
			source_terms.values().map(|t| (t.slug.as_str(), t)).collect();
		let mut parents: BTreeMap<TermId, Option<TermId>> =
			target.terms.iter().map(|t| (t.id, t.parent)).collect();
		let mut moved = 0;

		for term in &target.terms {
			let Some(source) = source_by_slug.get(term.slug.as_str()) else {
				continue;
			};
			let expected = match source.parent {
				None => None,
				Some(parent_id) => {
					let Some(source_parent) = source_terms.get(&parent_id) else {
						continue;
					};
					match target.by_slug(&source_parent.slug) {
						Some(target_parent) => Some(target_parent.id),
						None => continue,
					}
				}
			};
			if parents.get(&term.id).copied().flatten() == expected {
				continue;
			}
			if creates_cycle(&parents, term.id, expected) {
				warn!("not moving {} term {}, it would become its own ancestor", target.name, term.slug);
				continue;
			}
			self.backends.terms.reparent(op, target.container, target.name, term.id, expected).await?;
			parents.insert(term.id, expected);
			debug!("moved {} term {} under {:?}", target.name, term.slug, expected);
			moved += 1;
		}
		Ok(moved)
	}
}

/// Whether putting `term` under `parent` closes a loop
fn creates_cycle(parents: &BTreeMap<TermId, Option<TermId>>, term: TermId, parent: Option<TermId>) -> bool {
	let mut current = parent;
	let mut steps = 0;
	while let Some(id) = current {
		if id == term || steps > parents.len() {
			return true;
		}
		steps += 1;
		current = parents.get(&id).copied().flatten();
	}
	false
}


// vim: ts=4
