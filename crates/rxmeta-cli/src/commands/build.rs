//! `rxmeta build` command

use crate::{BuildArgs, Result};
use rxmeta_core::{BuildConfig, Pipeline};

pub async fn run(args: &BuildArgs) -> Result<()> {
    let config = BuildConfig::builder()
        .base_url(args.base_url.clone())
        .output_dir(args.output_dir.clone())
        .output_filename(args.output_filename.clone())
        .path_prefix(args.prefix.clone())
        .prefix_level(args.prefix_level)
        .cache_path(args.cache.clone())
        .log_dir(args.log_dir.clone())
        .workers(args.workers)
        .timeout_secs(args.timeout_secs)
        .max_retries(args.max_retries)
        .add_provenance(args.add_provenance)
        .seed_limit(args.seed_limit)
        .build();

    println!("Building metadata from {}", config.base_url);
    println!("Cache: {}", config.cache_path.display());

    let pipeline = Pipeline::new(config.clone())?;
    let stats = pipeline.run().await?;

    println!(
        "✓ Wrote {} rows for {} concepts to {}",
        stats.rows_written,
        stats.concepts,
        config.output_path().display()
    );
    if stats.merges > 0 {
        println!(
            "  {} historical chains merged ({} ambiguous, see log)",
            stats.merges, stats.ambiguous_merges
        );
    }
    if stats.skipped > 0 {
        println!(
            "  {} identifiers skipped; the log enumerates each one",
            stats.skipped
        );
    }
    Ok(())
}
