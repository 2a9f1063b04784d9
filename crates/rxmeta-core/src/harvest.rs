//! Phased harvest of every remote fact the assembly needs
//!
//! Phases mirror the shape of the data: first the universe of historical
//! RxCUIs, then per-identifier history resolution, then classification
//! memberships and packages for the surviving drug concepts, and finally the
//! classification trees themselves. Per-identifier work runs on a bounded
//! worker pool — a fixed number of tasks pulling identifiers from a shared
//! queue — so the remote service sees at most `workers` requests in flight.
//!
//! Everything after the harvest works on the returned `Harvest` value; no
//! remote call happens during assembly or serialization. Because every fetch
//! lands in the response cache before it is used, an aborted run restarted
//! against the same cache file resumes where it left off.

use crate::client::RxNavClient;
use crate::config::BuildConfig;
use crate::models::*;
use crate::packages::NdcExpander;
use crate::resolve::{ConceptResolver, MergeTable};
use crate::Result;
use rxmeta_common::RxCui;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Everything the tree assembler needs, gathered in one pass.
#[derive(Default)]
pub struct Harvest {
    /// Merged, deduplicated concepts, sorted by canonical identifier
    pub concepts: Vec<Concept>,
    /// Every historical identifier → its concept's canonical identifier
    pub canonical_of: HashMap<RxCui, RxCui>,
    /// Related concepts per canonical generic drug
    pub related: HashMap<RxCui, Vec<RelatedConcept>>,
    /// Primary-taxonomy memberships per canonical drug identifier
    pub primary_memberships: HashMap<RxCui, Vec<ClassMembership>>,
    /// Legacy-taxonomy memberships keyed by the historical identifier that
    /// matched
    pub legacy_memberships: HashMap<RxCui, Vec<ClassMembership>>,
    /// Packages per canonical drug identifier
    pub packages: HashMap<RxCui, Vec<PackageEntry>>,
    pub primary_tree: Vec<ClassTreeItem>,
    pub legacy_tree: Vec<ClassTreeItem>,
    /// Identifiers dropped by local recovery, with the reason
    pub skipped: Vec<(RxCui, String)>,
    pub merges: usize,
    pub ambiguous_merges: usize,
}

/// Drives the harvest phases over a bounded worker pool.
pub struct Harvester {
    client: Arc<RxNavClient>,
    workers: usize,
    seed_limit: Option<usize>,
    primary_root: String,
    legacy_root: String,
}

impl Harvester {
    pub fn new(client: Arc<RxNavClient>, config: &BuildConfig) -> Self {
        Harvester {
            client,
            workers: config.workers,
            seed_limit: config.seed_limit,
            primary_root: config.primary_class_root.clone(),
            legacy_root: config.legacy_class_root.clone(),
        }
    }

    pub async fn run(&self) -> Result<Harvest> {
        let mut harvest = Harvest::default();

        // Phase 1: the universe of RxNorm identifiers, past and present.
        info!("Phase 1/4: enumerating historical RxCUIs");
        let mut seeds = BTreeSet::new();
        for status in ["ACTIVE", "RETIRED", "NEVER ACTIVE"] {
            let set = self.client.status_rxcuis(status).await?;
            info!(status, count = set.len(), "Fetched status list");
            seeds.extend(set);
        }
        // NON-RXNORM codes are unrelated to the drug hierarchy; they are
        // fetched only to confirm they do not overlap the RxNorm set.
        let non_rxnorm = self.client.status_rxcuis("NON-RXNORM").await?;
        let overlap = seeds.intersection(&non_rxnorm).count();
        if overlap > 0 {
            warn!(overlap, "NON-RXNORM status list overlaps RxNorm identifiers");
        }
        for id in &non_rxnorm {
            seeds.remove(id);
        }
        let seeds: Vec<RxCui> = match self.seed_limit {
            Some(limit) => seeds.into_iter().take(limit).collect(),
            None => seeds.into_iter().collect(),
        };
        info!(count = seeds.len(), "Seed identifiers selected");

        // Phase 2: resolve every seed's historical chain and merge overlaps.
        info!(workers = self.workers, "Phase 2/4: resolving concept histories");
        let resolver = Arc::new(ConceptResolver::new(self.client.clone()));
        let seen: Arc<Mutex<HashSet<RxCui>>> = Arc::new(Mutex::new(HashSet::new()));
        let results = run_pool(self.workers, seeds, {
            let resolver = resolver.clone();
            let seen = seen.clone();
            move |id| {
                let resolver = resolver.clone();
                let seen = seen.clone();
                async move {
                    let already = seen.lock().map(|s| s.contains(&id)).unwrap_or(false);
                    if already {
                        return Ok(None);
                    }
                    let concept = resolver.resolve(id).await?;
                    if let Ok(mut s) = seen.lock() {
                        s.extend(concept.history.iter().copied());
                    }
                    Ok(Some(concept))
                }
            }
        })
        .await;

        let mut table = MergeTable::new();
        for (id, outcome) in results {
            match outcome {
                Ok(Some(concept)) => table.insert(concept),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(rxcui = %id, error = %e, "Skipping identifier");
                    harvest.skipped.push((id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
        harvest.merges = table.merge_count();
        harvest.ambiguous_merges = table.ambiguous_count();
        let (concepts, canonical_of) = table.into_concepts();
        info!(
            concepts = concepts.len(),
            merges = harvest.merges,
            ambiguous = harvest.ambiguous_merges,
            skipped = harvest.skipped.len(),
            "Resolution complete"
        );

        // Phase 3: per-drug facts.
        info!("Phase 3/4: memberships, related drugs, and packages");
        let concept_index: Arc<HashMap<RxCui, Concept>> = Arc::new(
            concepts
                .iter()
                .map(|c| (c.canonical, c.clone()))
                .collect(),
        );
        let drug_ids: Vec<RxCui> = concepts
            .iter()
            .filter(|c| c.tty.is_drug())
            .map(|c| c.canonical)
            .collect();
        let generic_ids: Vec<RxCui> = concepts
            .iter()
            .filter(|c| c.tty.is_generic_drug())
            .map(|c| c.canonical)
            .collect();

        let related_results = run_pool(self.workers, generic_ids, {
            let client = self.client.clone();
            move |id| {
                let client = client.clone();
                async move { client.all_related(id).await }
            }
        })
        .await;
        for (id, outcome) in related_results {
            match outcome {
                Ok(related) if !related.is_empty() => {
                    harvest.related.insert(id, related);
                }
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(rxcui = %id, error = %e, "No related-concept data");
                    harvest.skipped.push((id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let membership_results = run_pool(self.workers, drug_ids.clone(), {
            let client = self.client.clone();
            move |id| {
                let client = client.clone();
                async move { client.class_memberships(id, TaxonomySource::Primary).await }
            }
        })
        .await;
        let mut unclassified: Vec<RxCui> = Vec::new();
        for (id, outcome) in membership_results {
            match outcome {
                Ok(memberships) if !memberships.is_empty() => {
                    harvest.primary_memberships.insert(id, memberships);
                }
                Ok(_) => unclassified.push(id),
                Err(e) if e.is_recoverable() => {
                    warn!(rxcui = %id, error = %e, "No primary classification data");
                    harvest.skipped.push((id, e.to_string()));
                    unclassified.push(id);
                }
                Err(e) => return Err(e),
            }
        }

        // Legacy fallback lookups, only for drugs the primary taxonomy does
        // not claim. Probes the concept's historical identifiers in
        // discovery order and stops at the first hit.
        let legacy_results = run_pool(self.workers, unclassified, {
            let client = self.client.clone();
            let concept_index = concept_index.clone();
            move |id| {
                let client = client.clone();
                let concept_index = concept_index.clone();
                async move {
                    let Some(concept) = concept_index.get(&id) else {
                        return Ok(None);
                    };
                    for history_id in &concept.history {
                        let memberships = client
                            .class_memberships(*history_id, TaxonomySource::Legacy)
                            .await?;
                        if !memberships.is_empty() {
                            return Ok(Some((*history_id, memberships)));
                        }
                    }
                    Ok(None)
                }
            }
        })
        .await;
        for (id, outcome) in legacy_results {
            match outcome {
                Ok(Some((history_id, memberships))) => {
                    harvest.legacy_memberships.insert(history_id, memberships);
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(rxcui = %id, error = %e, "No legacy classification data");
                    harvest.skipped.push((id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let expander = Arc::new(NdcExpander::new(self.client.clone()));
        let package_results = run_pool(self.workers, drug_ids, {
            let expander = expander.clone();
            let concept_index = concept_index.clone();
            move |id| {
                let expander = expander.clone();
                let concept_index = concept_index.clone();
                async move {
                    match concept_index.get(&id) {
                        Some(concept) => expander.expand(concept).await,
                        None => Ok(Vec::new()),
                    }
                }
            }
        })
        .await;
        for (id, outcome) in package_results {
            match outcome {
                Ok(packages) if !packages.is_empty() => {
                    harvest.packages.insert(id, packages);
                }
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    warn!(rxcui = %id, error = %e, "No package data");
                    harvest.skipped.push((id, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        // Phase 4: the classification trees themselves.
        info!("Phase 4/4: classification trees");
        harvest.primary_tree = self.client.class_tree(&self.primary_root).await?;
        harvest.legacy_tree = self.client.class_tree(&self.legacy_root).await?;

        harvest.concepts = concepts;
        harvest.canonical_of = canonical_of;
        info!(
            concepts = harvest.concepts.len(),
            with_packages = harvest.packages.len(),
            primary_classified = harvest.primary_memberships.len(),
            legacy_classified = harvest.legacy_memberships.len(),
            "Harvest complete"
        );
        Ok(harvest)
    }
}

/// Fixed worker pool: `workers` tasks pull identifiers from a shared queue
/// and push `(id, outcome)` pairs to a results channel.
async fn run_pool<T, F, Fut>(workers: usize, ids: Vec<RxCui>, task: F) -> Vec<(RxCui, Result<T>)>
where
    T: Send + 'static,
    F: Fn(RxCui) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let (queue_tx, queue_rx) = tokio::sync::mpsc::unbounded_channel();
    for id in ids {
        // receiver lives until the workers finish, so sends cannot fail here
        let _ = queue_tx.send(id);
    }
    drop(queue_tx);
    let queue = Arc::new(tokio::sync::Mutex::new(queue_rx));

    let (result_tx, mut result_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut handles = Vec::new();
    for _ in 0..workers.max(1) {
        let queue = queue.clone();
        let result_tx = result_tx.clone();
        let task = task.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let id = { queue.lock().await.recv().await };
                let Some(id) = id else { break };
                let outcome = task(id).await;
                if result_tx.send((id, outcome)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut results = Vec::new();
    while let Some(item) = result_rx.recv().await {
        results.push(item);
    }
    for handle in handles {
        let _ = handle.await;
    }
    results
}
