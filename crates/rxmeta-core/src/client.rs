//! Remote lookup: cached fetcher and typed RxNav client
//!
//! `Fetch` is the seam between the pipeline and the network. Production code
//! uses `CachedFetcher`; tests substitute a scripted in-memory fake.

use crate::cache::ResponseCache;
use crate::models::*;
use crate::{endpoints, MetaError, Result};
use async_trait::async_trait;
use rxmeta_common::{ConceptStatus, Ndc, RxCui, Tty};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A request signature → JSON response lookup.
///
/// The signature is the full request URL. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, signature: &str) -> Result<Value>;
}

/// Tuning for the remote fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts
    pub retry_base_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 30,
            max_retries: 5,
            retry_base_ms: 1000,
        }
    }
}

enum Flight {
    Lead(watch::Sender<()>),
    Wait(watch::Receiver<()>),
}

/// The only component that performs network I/O.
///
/// Cache hit: stored response, no network. Miss: remote GET with bounded
/// retries and exponential backoff, persisted before return. Concurrent
/// requests for the same signature collapse to one in-flight call; the
/// others wait for its cache write and then read it back.
pub struct CachedFetcher {
    client: reqwest::Client,
    cache: Mutex<ResponseCache>,
    in_flight: tokio::sync::Mutex<HashMap<String, watch::Receiver<()>>>,
    config: FetchConfig,
}

impl CachedFetcher {
    pub fn new(cache: ResponseCache, config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("rxmeta/0.1")
            .build()?;
        Ok(CachedFetcher {
            client,
            cache: Mutex::new(cache),
            in_flight: tokio::sync::Mutex::new(HashMap::new()),
            config,
        })
    }

    fn cache(&self) -> Result<MutexGuard<'_, ResponseCache>> {
        self.cache
            .lock()
            .map_err(|_| MetaError::Cache("response cache lock poisoned".to_string()))
    }

    pub fn cache_stats(&self) -> Result<crate::cache::CacheStats> {
        Ok(self.cache()?.stats())
    }

    /// Leader side of a single-flight fetch: re-check the cache, then go
    /// remote and persist before returning.
    async fn lead_fetch(&self, signature: &str) -> Result<String> {
        // A previous leader may have completed between the caller's cache
        // check and claiming leadership.
        if let Some(body) = self.cache()?.get(signature)? {
            return Ok(body);
        }
        debug!(signature, "Cache miss");
        let body = self.fetch_remote(signature).await?;
        // Write-before-return: a crash after this point never loses a
        // completed remote call.
        self.cache()?.append(signature, &body)?;
        Ok(body)
    }

    async fn fetch_remote(&self, signature: &str) -> Result<String> {
        for attempt in 1..=self.config.max_retries {
            match self.client.get(signature).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    warn!(
                        signature,
                        attempt,
                        max = self.config.max_retries,
                        %status,
                        "Remote request failed"
                    );
                }
                Err(e) => {
                    warn!(
                        signature,
                        attempt,
                        max = self.config.max_retries,
                        error = %e,
                        "Remote request error"
                    );
                }
            }
            if attempt < self.config.max_retries {
                let backoff =
                    Duration::from_millis(self.config.retry_base_ms << (attempt - 1).min(6));
                tokio::time::sleep(backoff).await;
            }
        }
        Err(MetaError::RemoteUnavailable {
            signature: signature.to_string(),
            attempts: self.config.max_retries,
        })
    }
}

#[async_trait]
impl Fetch for CachedFetcher {
    async fn fetch(&self, signature: &str) -> Result<Value> {
        loop {
            if let Some(body) = self.cache()?.get(signature)? {
                return Ok(serde_json::from_str(&body)?);
            }

            let flight = {
                let mut in_flight = self.in_flight.lock().await;
                match in_flight.get(signature) {
                    Some(rx) => Flight::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(());
                        in_flight.insert(signature.to_string(), rx);
                        Flight::Lead(tx)
                    }
                }
            };

            match flight {
                Flight::Wait(mut rx) => {
                    // Woken when the leader drops its sender, whether it
                    // succeeded (cache now warm) or failed (we take over).
                    let _ = rx.changed().await;
                }
                Flight::Lead(tx) => {
                    let outcome = self.lead_fetch(signature).await;
                    // The entry must come out of the in-flight map on every
                    // path, or later fetches of this signature would wait on
                    // a flight that no longer exists.
                    self.in_flight.lock().await.remove(signature);
                    drop(tx);
                    let body = outcome?;
                    return Ok(serde_json::from_str(&body)?);
                }
            }
        }
    }
}

/// Typed wrapper over the RxNav REST endpoints the pipeline uses.
pub struct RxNavClient {
    fetch: Arc<dyn Fetch>,
    base_url: String,
}

impl RxNavClient {
    pub fn new(fetch: Arc<dyn Fetch>, base_url: impl Into<String>) -> Self {
        RxNavClient {
            fetch,
            base_url: base_url.into(),
        }
    }

    /// RxCUIs carrying one lifecycle status (ACTIVE, RETIRED, NEVER ACTIVE,
    /// NON-RXNORM).
    pub async fn status_rxcuis(&self, status: &str) -> Result<BTreeSet<RxCui>> {
        let url = endpoints::history_status_url(&self.base_url, status);
        let value = self.fetch.fetch(&url).await?;
        let parsed: StatusResponse = serde_json::from_value(value)?;
        let mut out = BTreeSet::new();
        for raw in parsed.rxcui_list.map(|l| l.rxcuis).unwrap_or_default() {
            match raw.parse::<RxCui>() {
                Ok(rxcui) => {
                    out.insert(rxcui);
                }
                Err(_) => warn!(status, value = %raw, "Skipping unparseable RxCUI"),
            }
        }
        Ok(out)
    }

    /// Historical record for one RxCUI; `None` when the service has no record
    /// at all for the identifier.
    pub async fn concept_history(&self, rxcui: RxCui) -> Result<Option<ConceptHistory>> {
        let url = endpoints::concept_history_url(&self.base_url, rxcui);
        let value = self.fetch.fetch(&url).await?;
        let parsed: HistoryResponse = serde_json::from_value(value)?;
        let envelope = match parsed.concept {
            Some(envelope) => envelope,
            None => return Ok(None),
        };
        let record = envelope.record;
        let remapped_to = record
            .current_rxcui
            .parse::<RxCui>()
            .ok()
            .filter(|&successor| successor != rxcui);
        let predecessors = record
            .predecessor_rxcuis
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .filter(|&p| p != rxcui)
            .collect();
        let ingredients = envelope
            .ingredients
            .iter()
            .map(|b| b.base_name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(Some(ConceptHistory {
            rxcui,
            status: ConceptStatus::parse(&record.status),
            tty: Tty::parse(&record.tty),
            name: record.name,
            end_date: record.end_date,
            remapped_to,
            predecessors,
            ingredients,
        }))
    }

    /// All concepts related to an RxCUI, flattened across term-type groups.
    pub async fn all_related(&self, rxcui: RxCui) -> Result<Vec<RelatedConcept>> {
        let url = endpoints::all_related_url(&self.base_url, rxcui);
        let value = self.fetch.fetch(&url).await?;
        let parsed: AllRelatedResponse = serde_json::from_value(value)?;
        let mut out = Vec::new();
        for group in parsed.group.map(|g| g.concept_groups).unwrap_or_default() {
            for concept in group.concepts {
                if let Ok(related) = concept.rxcui.parse::<RxCui>() {
                    out.push(RelatedConcept {
                        rxcui: related,
                        name: concept.name,
                        tty: Tty::parse(&concept.tty),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Every NDC ever associated with a drug RxCUI, deduplicated and sorted.
    pub async fn historical_ndcs(&self, rxcui: RxCui) -> Result<Vec<Ndc>> {
        let url = endpoints::historical_ndcs_url(&self.base_url, rxcui);
        let value = self.fetch.fetch(&url).await?;
        let parsed: HistoricalNdcResponse = serde_json::from_value(value)?;
        let codes: BTreeSet<String> = parsed
            .concept
            .map(|c| c.times)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|t| t.ndc_time)
            .flat_map(|t| t.ndc)
            .collect();
        Ok(codes.into_iter().map(Ndc).collect())
    }

    /// Classification tree rooted at a class id.
    pub async fn class_tree(&self, class_id: &str) -> Result<Vec<ClassTreeItem>> {
        let url = endpoints::class_tree_url(&self.base_url, class_id);
        let value = self.fetch.fetch(&url).await?;
        let parsed: ClassTreeResponse = serde_json::from_value(value)?;
        Ok(parsed.tree)
    }

    /// Class memberships of an RxCUI within one classification source.
    pub async fn class_memberships(
        &self,
        rxcui: RxCui,
        source: TaxonomySource,
    ) -> Result<Vec<ClassMembership>> {
        let url = endpoints::class_by_rxcui_url(&self.base_url, rxcui, source.rela_source());
        let value = self.fetch.fetch(&url).await?;
        let parsed: ClassByRxcuiResponse = serde_json::from_value(value)?;
        let mut out: Vec<ClassMembership> = Vec::new();
        for info in parsed.list.map(|l| l.infos).unwrap_or_default() {
            let membership = ClassMembership {
                class_id: info.item.class_id,
                class_name: info.item.class_name,
            };
            if !out.contains(&membership) {
                out.push(membership);
            }
        }
        Ok(out)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
