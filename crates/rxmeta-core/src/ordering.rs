//! Deterministic sibling ordering
//!
//! Siblings at every tree level sort by (ingredient tuple, display name,
//! base code). The ingredient tuple is alphabetized case-insensitively, so a
//! combination drug sorts the same no matter what order the remote service
//! listed its ingredients in, and the trailing tie-breaks make the whole
//! ordering total: identical cache contents always produce identical output.

/// Alphabetized, lowercased ingredient names for a concept.
pub fn ingredient_key(ingredients: &[String]) -> Vec<String> {
    let mut key: Vec<String> = ingredients
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    key.sort();
    key.dedup();
    key
}

/// Total ordering key for a sibling node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SiblingKey {
    ingredients: Vec<String>,
    name: String,
    base_code: String,
}

pub fn sibling_key(ingredients: &[String], name: &str, base_code: &str) -> SiblingKey {
    SiblingKey {
        ingredients: ingredient_key(ingredients),
        name: name.trim().to_lowercase(),
        base_code: base_code.to_string(),
    }
}
