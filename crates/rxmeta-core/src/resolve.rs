//! Concept resolution
//!
//! Walks the history relation (remapped-to and predecessor links) from a seed
//! identifier to a fixed point, then folds the discovered identifiers into a
//! single canonical concept. Chains discovered from different seeds that turn
//! out to share an identifier are unified afterwards by `MergeTable`, a
//! union-find over concepts keyed by RxCUI.
//!
//! The walk uses an explicit frontier and visited set rather than recursion:
//! chains are short in practice but the cache makes re-walks free, and the
//! iterative form bounds stack use on pathological data.

use crate::client::RxNavClient;
use crate::models::{Concept, ConceptHistory};
use crate::{MetaError, Result};
use rxmeta_common::{ConceptStatus, RxCui};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Resolves one seed identifier into its full historical chain.
pub struct ConceptResolver {
    client: std::sync::Arc<RxNavClient>,
}

impl ConceptResolver {
    pub fn new(client: std::sync::Arc<RxNavClient>) -> Self {
        ConceptResolver { client }
    }

    /// Discover the seed's complete identifier chain and build a Concept.
    ///
    /// Fails with `UnknownConcept` only when the seed itself has no record;
    /// a linked identifier with no record keeps its place in the history set
    /// but contributes no attributes.
    pub async fn resolve(&self, seed: RxCui) -> Result<Concept> {
        let mut records: HashMap<RxCui, ConceptHistory> = HashMap::new();
        let mut order: Vec<RxCui> = Vec::new();
        let mut frontier: VecDeque<RxCui> = VecDeque::from([seed]);

        while let Some(id) = frontier.pop_front() {
            if order.contains(&id) {
                continue;
            }
            order.push(id);
            match self.client.concept_history(id).await {
                Ok(Some(history)) => {
                    for link in history
                        .remapped_to
                        .iter()
                        .chain(history.predecessors.iter())
                    {
                        if !order.contains(link) {
                            frontier.push_back(*link);
                        }
                    }
                    records.insert(id, history);
                }
                Ok(None) => {
                    if id == seed && records.is_empty() && frontier.is_empty() {
                        return Err(MetaError::UnknownConcept(seed));
                    }
                    warn!(rxcui = %id, via = %seed, "Linked identifier has no history record");
                }
                Err(e) if e.is_recoverable() && id != seed => {
                    warn!(rxcui = %id, via = %seed, error = %e, "Skipping unreadable link");
                }
                Err(e) => return Err(e),
            }
        }

        let canonical = choose_canonical(&order, &records)
            .ok_or(MetaError::UnknownConcept(seed))?;
        let record = &records[&canonical];
        debug!(seed = %seed, canonical = %canonical, chain = order.len(), "Resolved concept");

        Ok(Concept {
            canonical,
            history: order,
            name: record.name.clone(),
            ingredients: record.ingredients.clone(),
            tty: record.tty,
            status: record.status,
        })
    }
}

/// The currently active identifier wins; otherwise the most recently retired
/// one, by the service's own end-date ordering, lowest RxCUI on ties.
fn choose_canonical(
    order: &[RxCui],
    records: &HashMap<RxCui, ConceptHistory>,
) -> Option<RxCui> {
    let mut actives: Vec<RxCui> = order
        .iter()
        .copied()
        .filter(|id| records.get(id).is_some_and(|r| r.status.is_active()))
        .collect();
    if !actives.is_empty() {
        actives.sort();
        if actives.len() > 1 {
            debug!(chosen = %actives[0], "Chain holds multiple active identifiers");
        }
        return Some(actives[0]);
    }
    order
        .iter()
        .copied()
        .filter(|id| records.contains_key(id))
        .max_by_key(|id| (hist_date_key(&records[id].end_date), std::cmp::Reverse(*id)))
}

/// End dates arrive as MYYYY or MMYYYY; normalize to a sortable YYYYMM value.
fn hist_date_key(date: &str) -> u32 {
    let (month, year) = match date.len() {
        5 => (&date[..1], &date[1..]),
        6 => (&date[..2], &date[2..]),
        _ => return 0,
    };
    match (year.parse::<u32>(), month.parse::<u32>()) {
        (Ok(y), Ok(m)) if m >= 1 && m <= 12 => y * 100 + m,
        _ => 0,
    }
}

/// Union-find over resolved concepts, keyed by historical identifier.
///
/// Feeding in concepts whose chains overlap produces a single concept
/// carrying the union of both chains. When both sides claim a distinct
/// active canonical the merge is ambiguous; the lowest RxCUI wins and the
/// event is logged for manual audit.
#[derive(Default)]
pub struct MergeTable {
    concepts: Vec<Option<Concept>>,
    parent: Vec<usize>,
    by_id: HashMap<RxCui, usize>,
    merges: usize,
    ambiguous: usize,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&mut self, mut slot: usize) -> usize {
        while self.parent[slot] != slot {
            self.parent[slot] = self.parent[self.parent[slot]];
            slot = self.parent[slot];
        }
        slot
    }

    /// Insert a resolved concept, merging it with any concept that shares an
    /// identifier.
    pub fn insert(&mut self, concept: Concept) {
        let slot = self.concepts.len();
        self.concepts.push(Some(concept));
        self.parent.push(slot);

        let history: Vec<RxCui> = self.concepts[slot]
            .as_ref()
            .map(|c| c.history.clone())
            .unwrap_or_default();
        let mut root = slot;
        for id in history {
            match self.by_id.get(&id).copied() {
                Some(other) => {
                    let other_root = self.find(other);
                    if other_root != root {
                        root = self.union(root, other_root);
                    }
                }
                None => {
                    self.by_id.insert(id, root);
                }
            }
        }
    }

    fn union(&mut self, a: usize, b: usize) -> usize {
        let (keep, absorb) = (a.min(b), a.max(b));
        let absorbed = self.concepts[absorb].take();
        let kept = self.concepts[keep].take();
        let merged = match (kept, absorbed) {
            (Some(x), Some(y)) => Some(self.merge_concepts(x, y)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        };
        self.concepts[keep] = merged;
        self.parent[absorb] = keep;
        self.merges += 1;
        keep
    }

    fn merge_concepts(&mut self, a: Concept, b: Concept) -> Concept {
        let both_active = a.status == ConceptStatus::Active
            && b.status == ConceptStatus::Active
            && a.canonical != b.canonical;
        let (mut keep, other) = if both_active {
            let (keep, other) = if a.canonical <= b.canonical { (a, b) } else { (b, a) };
            self.ambiguous += 1;
            let event = MetaError::AmbiguousMerge {
                kept: keep.canonical,
                discarded: other.canonical,
            };
            warn!(error = %event, "Ambiguous merge resolved by tie-break");
            (keep, other)
        } else if rank(&a) >= rank(&b) {
            (a, b)
        } else {
            (b, a)
        };
        for id in other.history {
            if !keep.history.contains(&id) {
                keep.history.push(id);
            }
        }
        keep
    }

    /// Final deduplicated concepts plus the identifier → canonical map.
    pub fn into_concepts(mut self) -> (Vec<Concept>, HashMap<RxCui, RxCui>) {
        let mut ids: Vec<RxCui> = self.by_id.keys().copied().collect();
        let mut canonical_of = HashMap::new();
        for id in ids.drain(..) {
            let slot = self.by_id[&id];
            let root = self.find(slot);
            if let Some(concept) = self.concepts[root].as_ref() {
                canonical_of.insert(id, concept.canonical);
            }
        }
        let mut concepts: Vec<Concept> = self.concepts.into_iter().flatten().collect();
        concepts.sort_by_key(|c| c.canonical);
        (concepts, canonical_of)
    }

    pub fn merge_count(&self) -> usize {
        self.merges
    }

    pub fn ambiguous_count(&self) -> usize {
        self.ambiguous
    }
}

/// Preference order when two chains merge without ambiguity: keep the side
/// whose canonical record is in better standing.
fn rank(concept: &Concept) -> u8 {
    match concept.status {
        ConceptStatus::Active => 3,
        ConceptStatus::Remapped => 2,
        ConceptStatus::Retired => 1,
        ConceptStatus::NeverActive => 0,
    }
}
