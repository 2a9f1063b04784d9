//! `rxmeta cache` subcommands

use crate::{CliError, Result};
use rxmeta_core::ResponseCache;
use std::io::Write;
use std::path::Path;

pub fn stats(cache_path: &Path) -> Result<()> {
    if !cache_path.exists() {
        println!("No cache file at {}", cache_path.display());
        return Ok(());
    }
    let cache = ResponseCache::open(cache_path)
        .map_err(|e| CliError::cache(format!("{}: {}", cache_path.display(), e)))?;
    let stats = cache.stats();
    println!("{}: {} cached responses", cache_path.display(), stats.entries);
    Ok(())
}

pub fn clear(cache_path: &Path, yes: bool) -> Result<()> {
    if !cache_path.exists() {
        println!("No cache file at {}", cache_path.display());
        return Ok(());
    }
    if !yes {
        print!(
            "Clear {}? The next build will re-fetch everything. [y/N] ",
            cache_path.display()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(());
        }
    }
    let mut cache = ResponseCache::open(cache_path)
        .map_err(|e| CliError::cache(format!("{}: {}", cache_path.display(), e)))?;
    let removed = cache.clear()?;
    println!("Removed {} cached responses", removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stats_on_missing_file() {
        let dir = tempdir().unwrap();
        assert!(stats(&dir.path().join("absent.cache")).is_ok());
    }

    #[test]
    fn test_clear_with_yes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.cache");
        {
            let mut cache = ResponseCache::open(&path).unwrap();
            cache.append("sig", "body").unwrap();
        }
        clear(&path, true).unwrap();
        let cache = ResponseCache::open(&path).unwrap();
        assert_eq!(cache.stats().entries, 0);
    }
}
