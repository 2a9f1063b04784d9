// Build configuration consumed by the pipeline.
//
// The CLI shell owns argument parsing; the core treats this struct as an
// opaque settings object and never reads argv or the environment itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default RxNav REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://rxnav.nlm.nih.gov/REST";

/// Default metadata path prefix, per the metadata interoperability guidelines.
pub const DEFAULT_PATH_PREFIX: &str = "i2b2_RXNORM_NDC";

/// Root class of the VA drug classification.
pub const DEFAULT_PRIMARY_CLASS_ROOT: &str = "VA000";

/// Root class of the retired NDF-RT classification, used as fallback.
pub const DEFAULT_LEGACY_CLASS_ROOT: &str = "N0000010574";

/// Configuration for a metadata build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// RxNav REST base URL
    pub base_url: String,

    /// Directory the output file is written into
    pub output_dir: PathBuf,

    /// Output file name
    pub output_filename: String,

    /// Path prefix segment for every emitted row (no backslashes)
    pub path_prefix: String,

    /// Hierarchy level of the prefix row (root of the tree)
    pub prefix_level: usize,

    /// Response cache file (append-only, reusable across runs)
    pub cache_path: PathBuf,

    /// Directory for log files
    pub log_dir: PathBuf,

    /// Number of concurrent harvest workers
    pub workers: usize,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// Maximum attempts per remote request
    pub max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds
    pub retry_base_ms: u64,

    /// Emit the PROVENANCE folder and legacy applied-path markers
    pub add_provenance: bool,

    /// VA classification root class id
    pub primary_class_root: String,

    /// NDF-RT classification root class id
    pub legacy_class_root: String,

    /// Cap on the number of seed RxCUIs processed (testing/smoke runs)
    pub seed_limit: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from("./"),
            output_filename: "rxnorm_ndc.txt".to_string(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            prefix_level: 1,
            cache_path: PathBuf::from("rxcui.cache"),
            log_dir: PathBuf::from("./logs"),
            workers: 4,
            timeout_secs: 30,
            max_retries: 5,
            retry_base_ms: 1000,
            add_provenance: false,
            primary_class_root: DEFAULT_PRIMARY_CLASS_ROOT.to_string(),
            legacy_class_root: DEFAULT_LEGACY_CLASS_ROOT.to_string(),
            seed_limit: None,
        }
    }
}

impl BuildConfig {
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    /// Full path of the output file
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("base URL cannot be empty".to_string());
        }
        if self.path_prefix.is_empty() || self.path_prefix.contains('\\') {
            return Err("path prefix must be a single non-empty segment".to_string());
        }
        if self.output_filename.is_empty() {
            return Err("output filename cannot be empty".to_string());
        }
        if self.prefix_level == 0 {
            return Err("prefix level must be at least 1".to_string());
        }
        if self.workers == 0 {
            return Err("worker count must be at least 1".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.max_retries == 0 {
            return Err("at least one request attempt is required".to_string());
        }
        Ok(())
    }
}

/// Builder for BuildConfig
#[derive(Debug, Default)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn output_filename(mut self, name: impl Into<String>) -> Self {
        self.config.output_filename = name.into();
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.path_prefix = prefix.into();
        self
    }

    pub fn prefix_level(mut self, level: usize) -> Self {
        self.config.prefix_level = level;
        self
    }

    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_path = path.into();
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_base_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_ms = ms;
        self
    }

    pub fn add_provenance(mut self, flag: bool) -> Self {
        self.config.add_provenance = flag;
        self
    }

    pub fn primary_class_root(mut self, root: impl Into<String>) -> Self {
        self.config.primary_class_root = root.into();
        self
    }

    pub fn legacy_class_root(mut self, root: impl Into<String>) -> Self {
        self.config.legacy_class_root = root.into();
        self
    }

    pub fn seed_limit(mut self, limit: Option<usize>) -> Self {
        self.config.seed_limit = limit;
        self
    }

    pub fn build(self) -> BuildConfig {
        self.config
    }
}
