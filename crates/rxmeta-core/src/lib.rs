// rxmeta-core — RxNorm/NDC i2b2 metadata pipeline
//
// Builds a historically complete i2b2 medications hierarchy from the NLM's
// RxNav REST API:
// - Harvest: cached, retried, deduplicated remote lookups over a bounded
//   worker pool (status lists, concept history, related concepts, class
//   memberships, historical NDCs, class trees)
// - Resolve: fixed-point discovery of historical RxCUI chains, merged into
//   canonical concepts with a union-find table
// - Classify: VA drug classes first, NDF-RT as legacy fallback, an
//   "unclassified" bucket as the last resort so no drug is dropped
// - Assemble: one rooted path tree with strict path/level invariants
// - Serialize: pipe-delimited i2b2 metadata rows in a single depth-first,
//   ingredient-ordered traversal

pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod harvest;
pub mod models;
pub mod ordering;
pub mod packages;
pub mod pipeline;
pub mod resolve;
pub mod tree;
pub mod writer;

pub use cache::{CacheStats, ResponseCache};
pub use classify::{ClassificationLinker, Taxonomy};
pub use client::{CachedFetcher, Fetch, FetchConfig, RxNavClient};
pub use config::BuildConfig;
pub use harvest::{Harvest, Harvester};
pub use models::{
    ClassChain, ClassMembership, Concept, ConceptHistory, PackageEntry, RelatedConcept,
    TaxonomySource,
};
pub use pipeline::{Pipeline, PipelineStats};
pub use resolve::{ConceptResolver, MergeTable};
pub use tree::{BaseCode, MetadataTree, TreeNode};
pub use writer::{MetadataRow, MetadataWriter};

use rxmeta_common::RxCui;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, MetaError>;

/// Error taxonomy for the metadata pipeline.
///
/// `UnknownConcept` and a single identifier's `RemoteUnavailable` are
/// recovered locally (the identifier is skipped and logged). `AmbiguousMerge`
/// is tie-broken deterministically and logged for audit. `TreeIntegrity` is
/// fatal: it means the output would be structurally wrong, so the run aborts
/// before any output file is written.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("remote service unavailable for [{signature}] after {attempts} attempts")]
    RemoteUnavailable { signature: String, attempts: u32 },

    #[error("no resolvable record for RxCUI {0}")]
    UnknownConcept(RxCui),

    #[error("overlapping history chains both claim an active canonical: kept {kept}, discarded {discarded}")]
    AmbiguousMerge { kept: RxCui, discarded: RxCui },

    #[error("tree integrity violation: {0}")]
    TreeIntegrity(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MetaError {
    /// Failures scoped to a single identifier are skipped with a warning
    /// rather than aborting a multi-hour run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MetaError::RemoteUnavailable { .. }
                | MetaError::UnknownConcept(_)
                | MetaError::Json(_)
        )
    }
}
