//! Classification linking
//!
//! Attaches each concept to classification-hierarchy chains. The VA taxonomy
//! is consulted first, by canonical identifier. A concept the VA knows
//! nothing about falls back to the retired NDF-RT taxonomy, probed with the
//! concept's historical identifiers in discovery order — the first identifier
//! with a membership wins, and among several classes claiming that identifier
//! the lowest class code is taken. A concept neither taxonomy claims is
//! placed under the "unclassified" bucket by the assembler, never dropped.

use crate::models::{ClassChain, ClassMembership, ClassTreeItem, TaxonomySource};
use crate::Concept;
use rxmeta_common::RxCui;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One node of a classification taxonomy.
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub source: TaxonomySource,
    pub code: String,
    pub name: String,
    pub parent: Option<String>,
}

/// A parent-linked classification taxonomy built from a class tree response.
pub struct Taxonomy {
    pub source: TaxonomySource,
    pub root: String,
    nodes: HashMap<String, ClassNode>,
}

impl Taxonomy {
    pub fn from_tree(source: TaxonomySource, root: &str, items: &[ClassTreeItem]) -> Self {
        let mut taxonomy = Taxonomy {
            source,
            root: root.to_string(),
            nodes: HashMap::new(),
        };
        taxonomy.add_items(items, None);
        taxonomy
    }

    fn add_items(&mut self, items: &[ClassTreeItem], parent: Option<&str>) {
        for item in items {
            let code = item.item.class_id.clone();
            // Class names arrive shouted; present them in sentence case.
            let name = sentence_case(&item.item.class_name);
            self.nodes.entry(code.clone()).or_insert(ClassNode {
                source: self.source,
                code: code.clone(),
                name,
                parent: parent.map(str::to_string),
            });
            self.add_items(&item.children, Some(&code));
        }
    }

    pub fn get(&self, code: &str) -> Option<&ClassNode> {
        self.nodes.get(code)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Class codes from the taxonomy root down to `leaf`. `None` when the
    /// leaf is unknown or its parent chain does not reach the root.
    pub fn chain_to_root(&self, leaf: &str) -> Option<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = leaf;
        loop {
            let node = self.nodes.get(current)?;
            chain.push(node.code.clone());
            if node.code == self.root {
                chain.reverse();
                return Some(chain);
            }
            match node.parent.as_deref() {
                // a chain longer than the node count means a parent cycle
                Some(parent) if chain.len() <= self.nodes.len() => current = parent,
                _ => return None,
            }
        }
    }
}

fn sentence_case(s: &str) -> String {
    let lowered = s.to_lowercase();
    let mut chars = lowered.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => lowered,
    }
}

/// Links concepts to classification chains using harvested memberships.
pub struct ClassificationLinker {
    pub primary: Taxonomy,
    pub legacy: Taxonomy,
    primary_memberships: HashMap<RxCui, Vec<ClassMembership>>,
    legacy_memberships: HashMap<RxCui, Vec<ClassMembership>>,
}

impl ClassificationLinker {
    pub fn new(
        primary: Taxonomy,
        legacy: Taxonomy,
        primary_memberships: HashMap<RxCui, Vec<ClassMembership>>,
        legacy_memberships: HashMap<RxCui, Vec<ClassMembership>>,
    ) -> Self {
        ClassificationLinker {
            primary,
            legacy,
            primary_memberships,
            legacy_memberships,
        }
    }

    /// Full ancestor chains for a concept. Empty when neither taxonomy
    /// claims it.
    pub fn classify(&self, concept: &Concept) -> Vec<ClassChain> {
        let mut chains = Vec::new();

        if let Some(memberships) = self.primary_memberships.get(&concept.canonical) {
            let mut class_ids: Vec<&str> =
                memberships.iter().map(|m| m.class_id.as_str()).collect();
            class_ids.sort_unstable();
            class_ids.dedup();
            for class_id in class_ids {
                match self.primary.chain_to_root(class_id) {
                    Some(codes) => chains.push(ClassChain {
                        source: TaxonomySource::Primary,
                        codes,
                    }),
                    None => warn!(
                        rxcui = %concept.canonical,
                        class_id,
                        "Membership class missing from primary taxonomy"
                    ),
                }
            }
        }

        if !chains.is_empty() {
            return chains;
        }

        // Legacy fallback: first historical identifier with a membership.
        for id in &concept.history {
            let Some(memberships) = self.legacy_memberships.get(id) else {
                continue;
            };
            let Some(chosen) = memberships.iter().min_by(|a, b| a.class_id.cmp(&b.class_id))
            else {
                continue;
            };
            if memberships.len() > 1 {
                debug!(
                    rxcui = %concept.canonical,
                    via = %id,
                    chosen = %chosen.class_id,
                    candidates = memberships.len(),
                    "Multiple legacy classes; taking lowest class code"
                );
            }
            match self.legacy.chain_to_root(&chosen.class_id) {
                Some(codes) => {
                    chains.push(ClassChain {
                        source: TaxonomySource::Legacy,
                        codes,
                    });
                    return chains;
                }
                None => warn!(
                    rxcui = %concept.canonical,
                    class_id = %chosen.class_id,
                    "Membership class missing from legacy taxonomy"
                ),
            }
        }

        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxmeta_common::{ConceptStatus, Tty};

    fn tree_item(class_id: &str, class_name: &str, children: Vec<ClassTreeItem>) -> ClassTreeItem {
        serde_json::from_value(serde_json::json!({
            "rxclassMinConceptItem": {"classId": class_id, "className": class_name},
        }))
        .map(|mut item: ClassTreeItem| {
            item.children = children;
            item
        })
        .unwrap()
    }

    fn va_taxonomy() -> Taxonomy {
        let tree = vec![tree_item(
            "VA000",
            "VA CLASSES",
            vec![tree_item(
                "AD000",
                "ANTIDOTES,DETERRENTS AND POISON CONTROL",
                vec![tree_item("AD300", "ANTIDOTES/DETERRENTS", vec![])],
            )],
        )];
        Taxonomy::from_tree(TaxonomySource::Primary, "VA000", &tree)
    }

    fn ndfrt_taxonomy() -> Taxonomy {
        let tree = vec![tree_item(
            "N0000010574",
            "NDFRT CLASSES",
            vec![
                tree_item("N0000000002", "HEMATOLOGIC AGENTS", vec![]),
                tree_item("N0000000005", "ANTIMICROBIALS", vec![]),
            ],
        )];
        Taxonomy::from_tree(TaxonomySource::Legacy, "N0000010574", &tree)
    }

    fn concept(canonical: u32, history: &[u32]) -> Concept {
        Concept {
            canonical: RxCui(canonical),
            history: history.iter().map(|&h| RxCui(h)).collect(),
            name: "x".to_string(),
            ingredients: vec![],
            tty: Tty::Scd,
            status: ConceptStatus::Active,
        }
    }

    fn membership(class_id: &str) -> ClassMembership {
        ClassMembership {
            class_id: class_id.to_string(),
            class_name: class_id.to_string(),
        }
    }

    #[test]
    fn test_chain_to_root() {
        let taxonomy = va_taxonomy();
        assert_eq!(
            taxonomy.chain_to_root("AD300").unwrap(),
            vec!["VA000", "AD000", "AD300"]
        );
        assert_eq!(taxonomy.chain_to_root("VA000").unwrap(), vec!["VA000"]);
        assert!(taxonomy.chain_to_root("ZZ999").is_none());
    }

    #[test]
    fn test_sentence_case_names() {
        let taxonomy = va_taxonomy();
        assert_eq!(taxonomy.get("AD300").unwrap().name, "Antidotes/deterrents");
    }

    #[test]
    fn test_primary_membership_wins() {
        let mut primary = HashMap::new();
        primary.insert(RxCui(614373), vec![membership("AD300")]);
        let mut legacy = HashMap::new();
        legacy.insert(RxCui(614373), vec![membership("N0000000002")]);

        let linker = ClassificationLinker::new(va_taxonomy(), ndfrt_taxonomy(), primary, legacy);
        let chains = linker.classify(&concept(614373, &[614373]));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].source, TaxonomySource::Primary);
        assert_eq!(chains[0].codes, vec!["VA000", "AD000", "AD300"]);
    }

    #[test]
    fn test_legacy_fallback_first_historical_match_lowest_code() {
        let mut legacy = HashMap::new();
        // first historical id has no membership; the second has two
        legacy.insert(
            RxCui(999000),
            vec![membership("N0000000005"), membership("N0000000002")],
        );

        let linker =
            ClassificationLinker::new(va_taxonomy(), ndfrt_taxonomy(), HashMap::new(), legacy);
        let chains = linker.classify(&concept(999001, &[999001, 999000]));
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].source, TaxonomySource::Legacy);
        assert_eq!(chains[0].codes, vec!["N0000010574", "N0000000002"]);
    }

    #[test]
    fn test_unclassifiable_concept_yields_no_chain() {
        let linker = ClassificationLinker::new(
            va_taxonomy(),
            ndfrt_taxonomy(),
            HashMap::new(),
            HashMap::new(),
        );
        assert!(linker.classify(&concept(777001, &[777001])).is_empty());
    }

    #[test]
    fn test_multiple_primary_memberships_yield_multiple_chains() {
        let tree = vec![tree_item(
            "VA000",
            "VA CLASSES",
            vec![
                tree_item("AD000", "A", vec![tree_item("AD300", "A3", vec![])]),
                tree_item("CN000", "C", vec![tree_item("CN100", "C1", vec![])]),
            ],
        )];
        let taxonomy = Taxonomy::from_tree(TaxonomySource::Primary, "VA000", &tree);
        let mut primary = HashMap::new();
        primary.insert(RxCui(1), vec![membership("CN100"), membership("AD300")]);

        let linker =
            ClassificationLinker::new(taxonomy, ndfrt_taxonomy(), primary, HashMap::new());
        let chains = linker.classify(&concept(1, &[1]));
        assert_eq!(chains.len(), 2);
        // sorted by class id for a deterministic chain order
        assert_eq!(chains[0].codes.last().unwrap(), "AD300");
        assert_eq!(chains[1].codes.last().unwrap(), "CN100");
    }
}
