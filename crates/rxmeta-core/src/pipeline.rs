//! Pipeline orchestration
//!
//! Harvest, assemble, validate, serialize. The phases are strictly ordered:
//! no remote call happens after the harvest returns, and the output file is
//! not created until the assembled tree has passed validation, so a fatal
//! integrity error leaves only cache and log artifacts behind.

use crate::cache::ResponseCache;
use crate::client::{CachedFetcher, Fetch, FetchConfig, RxNavClient};
use crate::config::BuildConfig;
use crate::harvest::Harvester;
use crate::writer::MetadataWriter;
use crate::{tree, MetaError, Result};
use std::io::BufWriter;
use std::sync::Arc;
use tracing::{info, warn};

/// Counters reported after a successful run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub concepts: usize,
    pub merges: usize,
    pub ambiguous_merges: usize,
    pub skipped: usize,
    pub rows_written: usize,
}

/// The full metadata build.
pub struct Pipeline {
    config: BuildConfig,
    fetch: Arc<dyn Fetch>,
}

impl Pipeline {
    /// Production pipeline backed by the persistent cache and the remote
    /// service.
    pub fn new(config: BuildConfig) -> Result<Self> {
        config.validate().map_err(MetaError::Config)?;
        let cache = ResponseCache::open(&config.cache_path)?;
        let fetcher = CachedFetcher::new(
            cache,
            FetchConfig {
                timeout_secs: config.timeout_secs,
                max_retries: config.max_retries,
                retry_base_ms: config.retry_base_ms,
            },
        )?;
        Ok(Pipeline {
            config,
            fetch: Arc::new(fetcher),
        })
    }

    /// Pipeline with an injected fetcher; used by tests to script responses.
    pub fn with_fetch(config: BuildConfig, fetch: Arc<dyn Fetch>) -> Result<Self> {
        config.validate().map_err(MetaError::Config)?;
        Ok(Pipeline { config, fetch })
    }

    pub async fn run(&self) -> Result<PipelineStats> {
        info!("Step 1/4: harvesting remote facts");
        let client = Arc::new(RxNavClient::new(
            self.fetch.clone(),
            self.config.base_url.clone(),
        ));
        let harvest = Harvester::new(client, &self.config).run().await?;
        for (rxcui, reason) in &harvest.skipped {
            warn!(rxcui = %rxcui, reason, "Identifier skipped during harvest");
        }

        info!("Step 2/4: assembling metadata tree");
        let metadata = tree::assemble(&harvest, &self.config)?;

        info!("Step 3/4: validating tree invariants");
        metadata.validate()?;

        info!("Step 4/4: writing metadata file");
        std::fs::create_dir_all(&self.config.output_dir)?;
        let output_path = self.config.output_path();
        let file = std::fs::File::create(&output_path)?;
        let rows_written = MetadataWriter::new(BufWriter::new(file)).write_tree(&metadata)?;

        info!(
            path = %output_path.display(),
            rows = rows_written,
            concepts = harvest.concepts.len(),
            skipped = harvest.skipped.len(),
            "Metadata build complete"
        );
        Ok(PipelineStats {
            concepts: harvest.concepts.len(),
            merges: harvest.merges,
            ambiguous_merges: harvest.ambiguous_merges,
            skipped: harvest.skipped.len(),
            rows_written,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }
}
