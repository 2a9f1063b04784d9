//! Tree assembly
//!
//! Merges resolved concepts, classification chains, and packages into one
//! rooted tree of path nodes:
//!
//! ```text
//! \<prefix>\                          Medications (root)
//! \<prefix>\VA000\...\<leaf class>\   classification chains
//! \<prefix>\...\<generic rxcui>\      generic drugs under their leaf class
//! \<prefix>\...\<branded rxcui>\      branded forms under their generic
//! \<prefix>\...\<ndc>\                packages under drugs
//! \<prefix>\UNCLASSIFIED\...          drugs neither taxonomy claims
//! ```
//!
//! A concept claimed by several classes is emitted once per class: same base
//! code, distinct full paths. Identical content reached through two discovery
//! routes collapses to one node. Structural invariants are enforced before
//! anything is written; a violation aborts the run with `TreeIntegrity`
//! because a malformed tree silently corrupts the downstream consumer.

use crate::classify::{ClassificationLinker, Taxonomy};
use crate::config::BuildConfig;
use crate::harvest::Harvest;
use crate::models::{Concept, PackageEntry, TaxonomySource};
use crate::ordering;
use crate::{MetaError, Result};
use rxmeta_common::{Ndc, RxCui};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub const UNCLASSIFIED_SEGMENT: &str = "UNCLASSIFIED";
pub const ROOT_BASECODE: &str = "RXNORM_ROOT";

/// Typed base code of a path node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseCode {
    Root,
    Class { source: TaxonomySource, code: String },
    Concept(RxCui),
    Package(Ndc),
    /// Structural folders with no code of their own (unclassified bucket,
    /// provenance rows)
    Bucket,
}

impl BaseCode {
    /// Namespaced code as emitted in C_BASECODE; empty for buckets.
    pub fn render(&self) -> String {
        match self {
            BaseCode::Root => ROOT_BASECODE.to_string(),
            BaseCode::Class { source, code } => format!("{}:{}", source.namespace(), code),
            BaseCode::Concept(rxcui) => format!("RXNORM:{}", rxcui),
            BaseCode::Package(ndc) => format!("NDC:{}", ndc),
            BaseCode::Bucket => String::new(),
        }
    }
}

/// One node of the assembled metadata tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Path segment (class code, RxCUI, NDC, or bucket tag)
    pub segment: String,
    pub name: String,
    pub base: BaseCode,
    /// Ingredient names driving sibling order; empty for non-concept nodes
    pub ingredients: Vec<String>,
    /// Reached through the legacy taxonomy fallback
    pub legacy_sourced: bool,
    /// Fixed visual-attribute code, for rows outside the root/folder/leaf
    /// scheme
    pub visual_override: Option<&'static str>,
    pub tooltip: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn new(
        segment: impl Into<String>,
        name: impl Into<String>,
        base: BaseCode,
        tooltip: impl Into<String>,
    ) -> Self {
        TreeNode {
            segment: segment.into(),
            name: name.into(),
            base,
            ingredients: Vec::new(),
            legacy_sourced: false,
            visual_override: None,
            tooltip: tooltip.into(),
            children: Vec::new(),
        }
    }

    fn has_child(&self, segment: &str) -> bool {
        self.children.iter().any(|c| c.segment == segment)
    }

    /// Insert a child, or return the existing one when an identical path was
    /// already created through another route. A segment collision with a
    /// different base code is a structural error.
    fn ensure_child(&mut self, node: TreeNode) -> Result<&mut TreeNode> {
        if let Some(idx) = self.children.iter().position(|c| c.segment == node.segment) {
            if self.children[idx].base != node.base {
                return Err(MetaError::TreeIntegrity(format!(
                    "segment [{}] carries two base codes: [{}] and [{}]",
                    node.segment,
                    self.children[idx].base.render(),
                    node.base.render()
                )));
            }
            return Ok(&mut self.children[idx]);
        }
        self.children.push(node);
        let idx = self.children.len() - 1;
        Ok(&mut self.children[idx])
    }
}

/// The assembled tree, ready for serialization.
pub struct MetadataTree {
    pub prefix: String,
    pub prefix_level: usize,
    pub root: TreeNode,
    /// M_APPLIED_PATH marker for legacy-sourced rows, when provenance is on
    pub legacy_applied_path: Option<String>,
    /// Occurrences of each rendered base code, for multi-leaf detection
    code_counts: HashMap<String, usize>,
}

impl MetadataTree {
    pub fn code_count(&self, rendered: &str) -> usize {
        self.code_counts.get(rendered).copied().unwrap_or(0)
    }

    /// Enforce the structural invariants the downstream consumer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.root.base != BaseCode::Root {
            return Err(MetaError::TreeIntegrity(
                "tree root must carry the root base code".to_string(),
            ));
        }
        if self.prefix_level == 0 {
            return Err(MetaError::TreeIntegrity("prefix level must be positive".to_string()));
        }
        validate_node(&self.root, 1)
    }
}

fn validate_node(node: &TreeNode, depth: usize) -> Result<()> {
    if node.segment.is_empty() || node.segment.contains('\\') {
        return Err(MetaError::TreeIntegrity(format!(
            "invalid path segment [{}] at depth {}",
            node.segment, depth
        )));
    }
    let mut segments = HashSet::new();
    for child in &node.children {
        if !segments.insert(child.segment.as_str()) {
            return Err(MetaError::TreeIntegrity(format!(
                "duplicate segment [{}] under [{}]",
                child.segment, node.segment
            )));
        }
        let placement_ok = match child.base {
            BaseCode::Root => false,
            BaseCode::Class { .. } => {
                matches!(node.base, BaseCode::Root | BaseCode::Class { .. })
            }
            BaseCode::Concept(_) => matches!(
                node.base,
                BaseCode::Class { .. } | BaseCode::Bucket | BaseCode::Concept(_)
            ),
            BaseCode::Package(_) => matches!(node.base, BaseCode::Concept(_)),
            BaseCode::Bucket => matches!(node.base, BaseCode::Root | BaseCode::Bucket),
        };
        if !placement_ok {
            return Err(MetaError::TreeIntegrity(format!(
                "node [{}] ({}) cannot sit under [{}] ({})",
                child.segment,
                child.base.render(),
                node.segment,
                node.base.render()
            )));
        }
        validate_node(child, depth + 1)?;
    }
    Ok(())
}

/// Assemble the harvested facts into a validated metadata tree.
pub fn assemble(harvest: &Harvest, config: &BuildConfig) -> Result<MetadataTree> {
    config.validate().map_err(MetaError::Config)?;

    let primary = Taxonomy::from_tree(
        TaxonomySource::Primary,
        &config.primary_class_root,
        &harvest.primary_tree,
    );
    let legacy = Taxonomy::from_tree(
        TaxonomySource::Legacy,
        &config.legacy_class_root,
        &harvest.legacy_tree,
    );
    let linker = ClassificationLinker::new(
        primary,
        legacy,
        harvest.primary_memberships.clone(),
        harvest.legacy_memberships.clone(),
    );

    let mut root = TreeNode::new(
        config.path_prefix.clone(),
        "Medications",
        BaseCode::Root,
        "RxNorm medications hierarchy",
    );

    // Configured root branches exist even when nothing lands beneath them.
    root.ensure_child(class_node(
        &linker.primary,
        &config.primary_class_root,
        Some("VA Drug Classes"),
        false,
    ))?;
    root.ensure_child(class_node(
        &linker.legacy,
        &config.legacy_class_root,
        Some("NDF-RT Drug Classes"),
        true,
    ))?;

    let concept_by_canonical: HashMap<RxCui, &Concept> =
        harvest.concepts.iter().map(|c| (c.canonical, c)).collect();

    // Branded forms hang beneath their generic; each branded concept is
    // claimed by the lowest-numbered generic that lists it.
    let mut assigned: HashMap<RxCui, RxCui> = HashMap::new();
    let mut branded_children: BTreeMap<RxCui, BTreeSet<RxCui>> = BTreeMap::new();
    for concept in harvest.concepts.iter().filter(|c| c.tty.is_generic_drug()) {
        let Some(related) = harvest.related.get(&concept.canonical) else {
            continue;
        };
        for rel in related.iter().filter(|r| r.tty.is_branded_drug()) {
            let Some(&branded) = harvest.canonical_of.get(&rel.rxcui) else {
                continue;
            };
            if branded == concept.canonical {
                continue;
            }
            let is_branded_concept = concept_by_canonical
                .get(&branded)
                .is_some_and(|c| c.tty.is_branded_drug());
            if is_branded_concept && !assigned.contains_key(&branded) {
                assigned.insert(branded, concept.canonical);
                branded_children
                    .entry(concept.canonical)
                    .or_default()
                    .insert(branded);
            }
        }
    }

    for concept in harvest.concepts.iter().filter(|c| c.tty.is_drug()) {
        if assigned.contains_key(&concept.canonical) {
            continue; // placed beneath its generic
        }
        let chains = linker.classify(concept);
        if chains.is_empty() {
            let bucket = root.ensure_child(unclassified_bucket())?;
            place_concept(
                bucket,
                concept,
                harvest,
                &branded_children,
                &concept_by_canonical,
                false,
            )?;
            continue;
        }
        for chain in &chains {
            let is_legacy = chain.source == TaxonomySource::Legacy;
            let taxonomy = match chain.source {
                TaxonomySource::Primary => &linker.primary,
                TaxonomySource::Legacy => &linker.legacy,
            };
            let mut cursor = &mut root;
            for code in &chain.codes {
                let renamed = if *code == taxonomy.root {
                    Some(match chain.source {
                        TaxonomySource::Primary => "VA Drug Classes",
                        TaxonomySource::Legacy => "NDF-RT Drug Classes",
                    })
                } else {
                    None
                };
                cursor = cursor.ensure_child(class_node(taxonomy, code, renamed, is_legacy))?;
            }
            place_concept(
                cursor,
                concept,
                harvest,
                &branded_children,
                &concept_by_canonical,
                is_legacy,
            )?;
        }
    }

    if config.add_provenance {
        root.ensure_child(provenance_folder(&config.base_url))?;
    }

    sort_children(&mut root);

    let mut code_counts = HashMap::new();
    count_codes(&root, &mut code_counts);

    let legacy_applied_path = config.add_provenance.then(|| {
        format!(
            "\\{}\\{}\\%",
            config.path_prefix, config.legacy_class_root
        )
    });

    let tree = MetadataTree {
        prefix: config.path_prefix.clone(),
        prefix_level: config.prefix_level,
        root,
        legacy_applied_path,
        code_counts,
    };
    tree.validate()?;
    Ok(tree)
}

fn class_node(
    taxonomy: &Taxonomy,
    code: &str,
    rename: Option<&str>,
    legacy: bool,
) -> TreeNode {
    let name = rename
        .map(str::to_string)
        .or_else(|| taxonomy.get(code).map(|n| n.name.clone()))
        .unwrap_or_else(|| code.to_string());
    let tooltip = match taxonomy.source {
        TaxonomySource::Primary => "VA drug class",
        TaxonomySource::Legacy => "NDF-RT drug class",
    };
    let mut node = TreeNode::new(
        code,
        name,
        BaseCode::Class {
            source: taxonomy.source,
            code: code.to_string(),
        },
        tooltip,
    );
    node.legacy_sourced = legacy;
    node
}

fn unclassified_bucket() -> TreeNode {
    TreeNode::new(
        UNCLASSIFIED_SEGMENT,
        "Unclassified Drugs",
        BaseCode::Bucket,
        "Medications without classification",
    )
}

/// Attach a concept (with its packages and branded children) beneath a leaf
/// node. A concept already present at this path was reached through another
/// discovery route and is left as-is.
fn place_concept(
    parent: &mut TreeNode,
    concept: &Concept,
    harvest: &Harvest,
    branded_children: &BTreeMap<RxCui, BTreeSet<RxCui>>,
    concept_by_canonical: &HashMap<RxCui, &Concept>,
    legacy: bool,
) -> Result<()> {
    let segment = concept.canonical.to_string();
    if parent.has_child(&segment) {
        // dedup: verify the existing node really is this concept
        parent.ensure_child(concept_node(concept, legacy))?;
        return Ok(());
    }

    let mut node = concept_node(concept, legacy);
    attach_packages(&mut node, harvest.packages.get(&concept.canonical), legacy);

    if let Some(brandeds) = branded_children.get(&concept.canonical) {
        for branded_id in brandeds {
            let Some(branded) = concept_by_canonical.get(branded_id) else {
                continue;
            };
            let mut child = concept_node(branded, legacy);
            attach_packages(&mut child, harvest.packages.get(branded_id), legacy);
            node.ensure_child(child)?;
        }
    }

    parent.ensure_child(node)?;
    Ok(())
}

fn concept_node(concept: &Concept, legacy: bool) -> TreeNode {
    let mut node = TreeNode::new(
        concept.canonical.to_string(),
        concept.name.clone(),
        BaseCode::Concept(concept.canonical),
        format!("Orderable Drug (RxNAV tty:{})", concept.tty),
    );
    node.ingredients = concept.ingredients.clone();
    node.legacy_sourced = legacy;
    node
}

fn attach_packages(node: &mut TreeNode, packages: Option<&Vec<PackageEntry>>, legacy: bool) {
    let Some(packages) = packages else { return };
    let owner = node.base.render();
    for package in packages {
        let mut child = TreeNode::new(
            package.ndc.to_string(),
            package.name.clone(),
            BaseCode::Package(package.ndc.clone()),
            format!("Package for Orderable Drug {}", owner),
        );
        child.legacy_sourced = legacy;
        if !node.has_child(&child.segment) {
            node.children.push(child);
        }
    }
}

fn provenance_folder(base_url: &str) -> TreeNode {
    let build_date = chrono::Local::now();
    let mut folder = TreeNode::new(
        "PROVENANCE",
        "Provenance",
        BaseCode::Bucket,
        "metadata provenance",
    );
    folder.visual_override = Some("FH ");
    let children = [
        (
            "VERSION",
            format!("RXNORM_{}", build_date.format("%Y%m%d")),
        ),
        ("SOURCE", format!("NLM RxNav REST API ({})", base_url)),
        ("BUILD_DATE", build_date.format("%Y-%m-%d").to_string()),
    ];
    for (tag, tooltip) in children {
        let mut child = TreeNode::new(tag, tag, BaseCode::Bucket, tooltip);
        child.visual_override = Some("LH ");
        folder.children.push(child);
    }
    folder
}

fn sort_children(node: &mut TreeNode) {
    node.children.sort_by_cached_key(|child| {
        ordering::sibling_key(&child.ingredients, &child.name, &child.base.render())
    });
    for child in &mut node.children {
        sort_children(child);
    }
}

fn count_codes(node: &TreeNode, counts: &mut HashMap<String, usize>) {
    let rendered = node.base.render();
    if !rendered.is_empty() {
        *counts.entry(rendered).or_insert(0) += 1;
    }
    for child in &node.children {
        count_codes(child, counts);
    }
}
