//! NDC package expansion
//!
//! Packages are looked up for the canonical identifier only; re-querying
//! every historical identifier would attach the same package twice through
//! different routes.

use crate::client::RxNavClient;
use crate::models::{Concept, PackageEntry};
use crate::Result;
use std::sync::Arc;
use tracing::warn;

/// Expands a concept to its packaged products.
pub struct NdcExpander {
    client: Arc<RxNavClient>,
}

impl NdcExpander {
    pub fn new(client: Arc<RxNavClient>) -> Self {
        NdcExpander { client }
    }

    /// Deduplicated packages for a concept. A concept with none stays a leaf.
    ///
    /// There is no reliable descriptive name per NDC in the historical
    /// mapping, so packages are labeled with the code and the owning drug's
    /// name.
    pub async fn expand(&self, concept: &Concept) -> Result<Vec<PackageEntry>> {
        let ndcs = self.client.historical_ndcs(concept.canonical).await?;
        let entries = ndcs
            .into_iter()
            .inspect(|ndc| {
                if !ndc.is_normalized() {
                    warn!(rxcui = %concept.canonical, ndc = %ndc, "NDC not in 11-digit form");
                }
            })
            .map(|ndc| PackageEntry {
                name: format!("({}) {}", ndc, concept.name),
                ndc,
            })
            .collect();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Fetch;
    use async_trait::async_trait;
    use rxmeta_common::{ConceptStatus, Ndc, RxCui, Tty};
    use serde_json::{json, Value};

    struct OneShot(Value);

    #[async_trait]
    impl Fetch for OneShot {
        async fn fetch(&self, _signature: &str) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn concept() -> Concept {
        Concept {
            canonical: RxCui(597772),
            history: vec![RxCui(597772)],
            name: "deferasirox 125 MG Tablet for Oral Suspension [Exjade]".to_string(),
            ingredients: vec!["deferasirox".to_string()],
            tty: Tty::Sbd,
            status: ConceptStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_expand_dedups_and_labels() {
        let response = json!({
            "historicalNdcConcept": {
                "historicalNdcTime": [
                    {"ndcTime": [{"ndc": ["00078047015"]}, {"ndc": ["00078047015"]}]}
                ]
            }
        });
        let expander = NdcExpander::new(Arc::new(RxNavClient::new(
            Arc::new(OneShot(response)),
            "http://test/REST",
        )));
        let packages = expander.expand(&concept()).await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].ndc, Ndc::new("00078047015"));
        assert_eq!(
            packages[0].name,
            "(00078047015) deferasirox 125 MG Tablet for Oral Suspension [Exjade]"
        );
    }

    #[tokio::test]
    async fn test_expand_empty() {
        let expander = NdcExpander::new(Arc::new(RxNavClient::new(
            Arc::new(OneShot(json!({}))),
            "http://test/REST",
        )));
        assert!(expander.expand(&concept()).await.unwrap().is_empty());
    }
}
