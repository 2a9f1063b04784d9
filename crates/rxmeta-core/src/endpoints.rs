//! RxNav REST endpoint URL construction
//!
//! Every request is identified by its full URL, which doubles as the cache
//! signature: identical URLs are served from cache, distinct URLs are
//! distinct facts.

use rxmeta_common::RxCui;

/// Percent-encode the characters RxNav status names actually contain.
fn encode(s: &str) -> String {
    s.replace(' ', "%20")
}

/// Historical RxCUI list for one lifecycle status (ACTIVE, RETIRED, ...).
pub fn history_status_url(base: &str, status: &str) -> String {
    format!("{}/rxcuihistory/status.json?type={}", base, encode(status))
}

/// Full historical record for one RxCUI, including remap and predecessor
/// links and the ingredient breakdown.
pub fn concept_history_url(base: &str, rxcui: RxCui) -> String {
    format!("{}/rxcuihistory/concept.json?rxcui={}", base, rxcui)
}

/// All related concepts of an RxCUI, grouped by term type.
pub fn all_related_url(base: &str, rxcui: RxCui) -> String {
    format!("{}/rxcui/{}/allrelated.json", base, rxcui)
}

/// All NDC packages ever associated with a drug RxCUI.
pub fn historical_ndcs_url(base: &str, rxcui: RxCui) -> String {
    format!("{}/rxcui/{}/allhistoricalndcs.json", base, rxcui)
}

/// Classification tree rooted at a class id.
pub fn class_tree_url(base: &str, class_id: &str) -> String {
    format!("{}/rxclass/classTree.json?classId={}", base, encode(class_id))
}

/// Class memberships of an RxCUI within one classification source.
pub fn class_by_rxcui_url(base: &str, rxcui: RxCui, rela_source: &str) -> String {
    format!(
        "{}/rxclass/class/byRxcui.json?rxcui={}&relaSource={}",
        base, rxcui, rela_source
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://rxnav.nlm.nih.gov/REST";

    #[test]
    fn test_status_url_encodes_spaces() {
        assert_eq!(
            history_status_url(BASE, "NEVER ACTIVE"),
            "https://rxnav.nlm.nih.gov/REST/rxcuihistory/status.json?type=NEVER%20ACTIVE"
        );
    }

    #[test]
    fn test_concept_history_url() {
        assert_eq!(
            concept_history_url(BASE, RxCui(616159)),
            "https://rxnav.nlm.nih.gov/REST/rxcuihistory/concept.json?rxcui=616159"
        );
    }

    #[test]
    fn test_class_by_rxcui_url() {
        assert_eq!(
            class_by_rxcui_url(BASE, RxCui(614373), "VA"),
            "https://rxnav.nlm.nih.gov/REST/rxclass/class/byRxcui.json?rxcui=614373&relaSource=VA"
        );
    }
}
