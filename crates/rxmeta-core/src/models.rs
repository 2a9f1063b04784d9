// Wire-level response shapes and the domain types built from them.
//
// RxNav returns every scalar as a JSON string; the wire structs keep them as
// strings and the domain layer converts. Missing/empty members are the normal
// way the API says "no data", so almost everything is defaulted.

use rxmeta_common::{ConceptStatus, Ndc, RxCui, Tty};
use serde::Deserialize;

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "rxcuiList")]
    pub rxcui_list: Option<RxcuiList>,
}

#[derive(Debug, Deserialize)]
pub struct RxcuiList {
    #[serde(default)]
    pub rxcuis: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(rename = "rxcuiHistoryConcept")]
    pub concept: Option<HistoryEnvelope>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryEnvelope {
    #[serde(rename = "rxcuiConcept")]
    pub record: ConceptRecord,
    #[serde(rename = "bossConcept", default)]
    pub ingredients: Vec<BossRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptRecord {
    #[serde(default)]
    pub status: String,
    pub rxcui: String,
    #[serde(default)]
    pub tty: String,
    #[serde(rename = "str", default)]
    pub name: String,
    #[serde(rename = "startDate", default)]
    pub start_date: String,
    #[serde(rename = "endDate", default)]
    pub end_date: String,
    #[serde(rename = "isCurrent", default)]
    pub is_current: String,
    /// Successor identifier when this code was remapped; empty otherwise.
    #[serde(rename = "currentRxcui", default)]
    pub current_rxcui: String,
    /// Identifiers this code replaced, if any.
    #[serde(rename = "predecessorRxcuis", default)]
    pub predecessor_rxcuis: Vec<String>,
}

/// Base-of-strength ingredient entry from the history record.
#[derive(Debug, Deserialize)]
pub struct BossRecord {
    #[serde(rename = "baseRxcui", default)]
    pub base_rxcui: String,
    #[serde(rename = "baseName", default)]
    pub base_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AllRelatedResponse {
    #[serde(rename = "allRelatedGroup")]
    pub group: Option<AllRelatedGroup>,
}

#[derive(Debug, Deserialize)]
pub struct AllRelatedGroup {
    #[serde(rename = "conceptGroup", default)]
    pub concept_groups: Vec<ConceptGroup>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptGroup {
    #[serde(default)]
    pub tty: String,
    #[serde(rename = "conceptProperties", default)]
    pub concepts: Vec<ConceptProperty>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptProperty {
    pub rxcui: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tty: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoricalNdcResponse {
    #[serde(rename = "historicalNdcConcept")]
    pub concept: Option<HistoricalNdcConcept>,
}

#[derive(Debug, Deserialize)]
pub struct HistoricalNdcConcept {
    #[serde(rename = "historicalNdcTime", default)]
    pub times: Vec<NdcTimeGroup>,
}

#[derive(Debug, Deserialize)]
pub struct NdcTimeGroup {
    #[serde(rename = "ndcTime", default)]
    pub ndc_time: Vec<NdcTime>,
}

#[derive(Debug, Deserialize)]
pub struct NdcTime {
    #[serde(default)]
    pub ndc: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClassTreeResponse {
    #[serde(rename = "rxclassTree", default)]
    pub tree: Vec<ClassTreeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassTreeItem {
    #[serde(rename = "rxclassMinConceptItem")]
    pub item: MinConcept,
    #[serde(rename = "rxclassTree", default)]
    pub children: Vec<ClassTreeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinConcept {
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(rename = "className", default)]
    pub class_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassByRxcuiResponse {
    #[serde(rename = "rxclassDrugInfoList")]
    pub list: Option<DrugInfoList>,
}

#[derive(Debug, Deserialize)]
pub struct DrugInfoList {
    #[serde(rename = "rxclassDrugInfo", default)]
    pub infos: Vec<DrugInfo>,
}

#[derive(Debug, Deserialize)]
pub struct DrugInfo {
    #[serde(rename = "rxclassMinConceptItem")]
    pub item: MinConcept,
}

// ============================================================================
// Domain types
// ============================================================================

/// One RxCUI's historical record, decoded from the history endpoint.
#[derive(Debug, Clone)]
pub struct ConceptHistory {
    pub rxcui: RxCui,
    pub status: ConceptStatus,
    pub tty: Tty,
    pub name: String,
    pub end_date: String,
    /// Successor when this identifier was remapped
    pub remapped_to: Option<RxCui>,
    /// Identifiers this one replaced
    pub predecessors: Vec<RxCui>,
    pub ingredients: Vec<String>,
}

/// A canonical drug-orderable entity covering its full identifier history.
///
/// Every historical identifier maps to exactly one Concept; two discovered
/// chains sharing any identifier are unified before assembly.
#[derive(Debug, Clone)]
pub struct Concept {
    pub canonical: RxCui,
    /// Historical identifiers in discovery order; always contains `canonical`
    pub history: Vec<RxCui>,
    pub name: String,
    pub ingredients: Vec<String>,
    pub tty: Tty,
    pub status: ConceptStatus,
}

impl Concept {
    pub fn contains(&self, id: RxCui) -> bool {
        self.history.contains(&id)
    }
}

/// A concept related to another, as listed by the allrelated endpoint.
#[derive(Debug, Clone)]
pub struct RelatedConcept {
    pub rxcui: RxCui,
    pub name: String,
    pub tty: Tty,
}

/// Which classification system a node or chain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonomySource {
    /// VA drug classes
    Primary,
    /// NDF-RT, retired; consulted only when the primary has no entry
    Legacy,
}

impl TaxonomySource {
    /// relaSource parameter value for class queries.
    pub fn rela_source(self) -> &'static str {
        match self {
            TaxonomySource::Primary => "VA",
            TaxonomySource::Legacy => "NDFRT",
        }
    }

    /// Base-code namespace for emitted class rows.
    pub fn namespace(self) -> &'static str {
        match self {
            TaxonomySource::Primary => "VACLASS",
            TaxonomySource::Legacy => "NDFRT",
        }
    }
}

/// One class membership of a concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMembership {
    pub class_id: String,
    pub class_name: String,
}

/// A full ancestor chain from a taxonomy root down to a leaf class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassChain {
    pub source: TaxonomySource,
    /// Class codes from root to leaf
    pub codes: Vec<String>,
}

/// A packaged product attached beneath a drug concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub ndc: Ndc,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_response() {
        let raw = r#"{"rxcuiHistoryConcept":
          {"rxcuiConcept":
            {"status":"Retired","rxcui":"991041","tty":"SBD",
             "str":"Chlorpromazine hydrochloride 10 MG Oral Tablet [Thorazine]",
             "sab":"RXNORM","startDate":"062010","endDate":"022013",
             "isCurrent":"0","currentRxcui":"991039","scdRxcui":"991039"},
           "bossConcept":
            [{"baseRxcui":"2403","baseName":"Chlorpromazine",
              "bossRxcui":"104728","bossName":"Chlorpromazine hydrochloride",
              "numeratorValue":"10","numeratorUnit":"MG"}]}}"#;
        let parsed: HistoryResponse = serde_json::from_str(raw).unwrap();
        let envelope = parsed.concept.unwrap();
        assert_eq!(envelope.record.rxcui, "991041");
        assert_eq!(envelope.record.current_rxcui, "991039");
        assert_eq!(envelope.ingredients[0].base_name, "Chlorpromazine");
    }

    #[test]
    fn test_parse_all_related_response() {
        let raw = r#"{"allRelatedGroup":
          {"rxcui":"1049214",
           "conceptGroup":
            [{"tty":"BN",
              "conceptProperties":
               [{"rxcui":"216903","name":"Endocet","synonym":"","tty":"BN",
                 "language":"ENG","suppress":"N","umlscui":"C0720206"}]},
             {"tty":"SBD"}]}}"#;
        let parsed: AllRelatedResponse = serde_json::from_str(raw).unwrap();
        let groups = parsed.group.unwrap().concept_groups;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].concepts[0].rxcui, "216903");
        assert!(groups[1].concepts.is_empty());
    }

    #[test]
    fn test_parse_historical_ndcs() {
        let raw = r#"{"historicalNdcConcept":
          {"historicalNdcTime":
            [{"ndcTime":[{"ndc":["00078047015"],"startDate":"200512","endDate":"201802"}]}]}}"#;
        let parsed: HistoricalNdcResponse = serde_json::from_str(raw).unwrap();
        let ndcs: Vec<String> = parsed
            .concept
            .unwrap()
            .times
            .into_iter()
            .flat_map(|t| t.ndc_time)
            .flat_map(|t| t.ndc)
            .collect();
        assert_eq!(ndcs, vec!["00078047015"]);
    }

    #[test]
    fn test_parse_empty_responses() {
        let parsed: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.concept.is_none());
        let parsed: AllRelatedResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.group.is_none());
        let parsed: ClassByRxcuiResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.list.is_none());
    }

    #[test]
    fn test_parse_class_tree() {
        let raw = r#"{"rxclassTree":
          [{"rxclassMinConceptItem":{"classId":"VA000","className":"VA CLASSES","classType":"VA"},
            "rxclassTree":
             [{"rxclassMinConceptItem":{"classId":"AD000","className":"ANTIDOTES,DETERRENTS AND POISON CONTROL","classType":"VA"}}]}]}"#;
        let parsed: ClassTreeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.tree[0].item.class_id, "VA000");
        assert_eq!(parsed.tree[0].children[0].item.class_id, "AD000");
    }
}
