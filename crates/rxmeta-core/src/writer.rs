//! i2b2 metadata serialization
//!
//! One row per tree node, emitted in a single depth-first, sibling-ordered
//! traversal. The row iterator is lazy so the file is written incrementally;
//! a full RxNorm build is several hundred thousand rows and never needs to be
//! materialized in memory.
//!
//! String fields are wrapped in double quotes with embedded quotes escaped,
//! which keeps the pipe-delimited file loadable by SQL*Loader-style
//! importers. `C_HLEVEL` and empty base codes stay unquoted.

use crate::tree::{BaseCode, MetadataTree, TreeNode};
use crate::Result;
use std::io::Write;

/// Column order of the output file.
pub const FIELDNAMES: [&str; 15] = [
    "C_FULLNAME",
    "C_HLEVEL",
    "C_NAME",
    "C_BASECODE",
    "C_VISUALATTRIBUTES",
    "M_APPLIED_PATH",
    "C_SYNONYM_CD",
    "C_TABLENAME",
    "C_COLUMNNAME",
    "C_COLUMNDATATYPE",
    "C_OPERATOR",
    "C_DIMCODE",
    "C_FACTTABLECOLUMN",
    "C_TOOLTIP",
    "SOURCESYSTEM_CD",
];

pub const SOURCESYSTEM: &str = "rxnav.nlm.nih.gov";

/// One emitted metadata row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub fullname: String,
    pub hlevel: usize,
    pub name: String,
    pub basecode: String,
    pub visualattributes: String,
    pub applied_path: String,
    pub tooltip: String,
}

impl MetadataRow {
    /// Render the pipe-delimited line, without trailing newline.
    pub fn render(&self) -> String {
        let basecode = if self.basecode.is_empty() {
            String::new()
        } else {
            quote(&self.basecode)
        };
        [
            quote(&self.fullname),
            self.hlevel.to_string(),
            quote(&self.name),
            basecode,
            quote(&self.visualattributes),
            quote(&self.applied_path),
            quote("N"),
            quote("concept_dimension"),
            quote("concept_path"),
            quote("T"),
            quote("LIKE"),
            quote(&self.fullname),
            quote("concept_cd"),
            quote(&self.tooltip),
            quote(SOURCESYSTEM),
        ]
        .join("|")
    }
}

/// Quote a field for SQL*Loader-compatible import.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.trim().replace('"', "\\\""))
}

/// Lazy depth-first row iterator over an assembled tree.
pub struct RowIter<'a> {
    tree: &'a MetadataTree,
    stack: Vec<(&'a TreeNode, String, usize)>,
}

impl<'a> RowIter<'a> {
    fn new(tree: &'a MetadataTree) -> Self {
        RowIter {
            tree,
            stack: vec![(&tree.root, "\\".to_string(), tree.prefix_level)],
        }
    }

    fn visual_attributes(&self, node: &TreeNode, level: usize) -> String {
        if let Some(fixed) = node.visual_override {
            return fixed.to_string();
        }
        if level == self.tree.prefix_level {
            return "CA ".to_string();
        }
        if !node.children.is_empty() {
            return "FA ".to_string();
        }
        let rendered = node.base.render();
        let multi = matches!(node.base, BaseCode::Concept(_) | BaseCode::Package(_))
            && self.tree.code_count(&rendered) > 1;
        if multi {
            "MA ".to_string()
        } else {
            "LA ".to_string()
        }
    }
}

impl<'a> Iterator for RowIter<'a> {
    type Item = MetadataRow;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, parent_path, level) = self.stack.pop()?;
        let fullname = format!("{}{}\\", parent_path, node.segment);
        for child in node.children.iter().rev() {
            self.stack.push((child, fullname.clone(), level + 1));
        }
        let applied_path = match (&self.tree.legacy_applied_path, node.legacy_sourced) {
            (Some(marker), true) => marker.clone(),
            _ => "@".to_string(),
        };
        Some(MetadataRow {
            fullname: fullname.clone(),
            hlevel: level,
            name: node.name.clone(),
            basecode: node.base.render(),
            visualattributes: self.visual_attributes(node, level),
            applied_path,
            tooltip: if node.tooltip.is_empty() {
                fullname
                    .trim_matches('\\')
                    .replace('\\', " \\ ")
            } else {
                node.tooltip.clone()
            },
        })
    }
}

impl MetadataTree {
    /// Rows in depth-first, sibling-ordered traversal order.
    pub fn rows(&self) -> RowIter<'_> {
        RowIter::new(self)
    }
}

/// Incremental metadata file writer.
pub struct MetadataWriter<W: Write> {
    out: W,
}

impl<W: Write> MetadataWriter<W> {
    pub fn new(out: W) -> Self {
        MetadataWriter { out }
    }

    pub fn write_header(&mut self) -> Result<()> {
        writeln!(self.out, "{}", FIELDNAMES.join("|"))?;
        Ok(())
    }

    pub fn write_row(&mut self, row: &MetadataRow) -> Result<()> {
        writeln!(self.out, "{}", row.render())?;
        Ok(())
    }

    /// Write the header and every row; returns the row count.
    pub fn write_tree(&mut self, tree: &MetadataTree) -> Result<usize> {
        self.write_header()?;
        let mut rows = 0;
        for row in tree.rows() {
            self.write_row(&row)?;
            rows += 1;
        }
        self.out.flush()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::harvest::Harvest;
    use crate::models::{ClassMembership, Concept, PackageEntry, RelatedConcept};
    use crate::tree;
    use rxmeta_common::{ConceptStatus, Ndc, RxCui, Tty};
    use serde_json::json;

    fn scenario_harvest() -> Harvest {
        let mut harvest = Harvest::default();
        harvest.primary_tree = serde_json::from_value(json!([
            {"rxclassMinConceptItem": {"classId": "VA000", "className": "VA CLASSES"},
             "rxclassTree": [
                {"rxclassMinConceptItem": {"classId": "AD000", "className": "ANTIDOTES,DETERRENTS AND POISON CONTROL"},
                 "rxclassTree": [
                    {"rxclassMinConceptItem": {"classId": "AD300", "className": "ANTIDOTES/DETERRENTS"}}
                 ]}
             ]}
        ]))
        .unwrap();
        let generic = Concept {
            canonical: RxCui(614373),
            history: vec![RxCui(614373)],
            name: "deferasirox 125 MG Tablet for Oral Suspension".to_string(),
            ingredients: vec!["deferasirox".to_string()],
            tty: Tty::Scd,
            status: ConceptStatus::Active,
        };
        let branded = Concept {
            canonical: RxCui(597772),
            history: vec![RxCui(597772)],
            name: "deferasirox 125 MG Tablet for Oral Suspension [Exjade]".to_string(),
            ingredients: vec!["deferasirox".to_string()],
            tty: Tty::Sbd,
            status: ConceptStatus::Active,
        };
        harvest.canonical_of.insert(RxCui(614373), RxCui(614373));
        harvest.canonical_of.insert(RxCui(597772), RxCui(597772));
        harvest.related.insert(
            RxCui(614373),
            vec![RelatedConcept {
                rxcui: RxCui(597772),
                name: branded.name.clone(),
                tty: Tty::Sbd,
            }],
        );
        harvest.primary_memberships.insert(
            RxCui(614373),
            vec![ClassMembership {
                class_id: "AD300".to_string(),
                class_name: "ANTIDOTES/DETERRENTS".to_string(),
            }],
        );
        harvest.packages.insert(
            RxCui(597772),
            vec![PackageEntry {
                ndc: Ndc::new("00078047015"),
                name: "(00078047015) deferasirox 125 MG Tablet for Oral Suspension [Exjade]"
                    .to_string(),
            }],
        );
        harvest.concepts = vec![generic, branded];
        harvest
    }

    #[test]
    fn test_rows_depth_first_with_level_matching_segments() {
        let tree = tree::assemble(&scenario_harvest(), &BuildConfig::default()).unwrap();
        let rows: Vec<MetadataRow> = tree.rows().collect();

        assert_eq!(rows[0].fullname, "\\i2b2_RXNORM_NDC\\");
        assert_eq!(rows[0].hlevel, 1);
        assert_eq!(rows[0].basecode, "RXNORM_ROOT");
        assert_eq!(rows[0].visualattributes, "CA ");

        for row in &rows {
            let segments = row
                .fullname
                .split('\\')
                .filter(|s| !s.is_empty())
                .count();
            assert_eq!(row.hlevel, segments, "level mismatch on {}", row.fullname);
        }

        // a parent always precedes its children
        for pair in rows.windows(2) {
            if pair[1].fullname.starts_with(&pair[0].fullname) {
                assert_eq!(pair[1].hlevel, pair[0].hlevel + 1);
            }
        }
    }

    #[test]
    fn test_scenario_rows_and_basecodes() {
        let tree = tree::assemble(&scenario_harvest(), &BuildConfig::default()).unwrap();
        let rows: Vec<MetadataRow> = tree.rows().collect();

        let branded = rows
            .iter()
            .find(|r| r.basecode == "RXNORM:597772")
            .unwrap();
        assert_eq!(
            branded.fullname,
            "\\i2b2_RXNORM_NDC\\VA000\\AD000\\AD300\\614373\\597772\\"
        );
        assert_eq!(branded.hlevel, 6);
        assert_eq!(branded.visualattributes, "FA ");

        let package = rows
            .iter()
            .find(|r| r.basecode == "NDC:00078047015")
            .unwrap();
        assert_eq!(
            package.fullname,
            "\\i2b2_RXNORM_NDC\\VA000\\AD000\\AD300\\614373\\597772\\00078047015\\"
        );
        assert_eq!(package.hlevel, 7);
        assert_eq!(package.visualattributes, "LA ");
    }

    #[test]
    fn test_quote_escapes_embedded_quotes() {
        assert_eq!(quote(r#"5" bandage"#), r#""5\" bandage""#);
        assert_eq!(quote("  padded  "), "\"padded\"");
    }

    #[test]
    fn test_render_column_count_and_defaults() {
        let tree = tree::assemble(&scenario_harvest(), &BuildConfig::default()).unwrap();
        let row = tree.rows().next().unwrap();
        let line = row.render();
        let fields: Vec<&str> = line.split('|').collect();
        assert_eq!(fields.len(), FIELDNAMES.len());
        assert_eq!(fields[5], "\"@\"");
        assert_eq!(fields[7], "\"concept_dimension\"");
        assert_eq!(fields[14], "\"rxnav.nlm.nih.gov\"");
    }

    #[test]
    fn test_write_tree_emits_header_and_rows() {
        let tree = tree::assemble(&scenario_harvest(), &BuildConfig::default()).unwrap();
        let mut buffer = Vec::new();
        let rows = MetadataWriter::new(&mut buffer).write_tree(&tree).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), FIELDNAMES.join("|"));
        assert_eq!(lines.count(), rows);
    }

    #[test]
    fn test_serialization_is_idempotent() {
        let tree = tree::assemble(&scenario_harvest(), &BuildConfig::default()).unwrap();
        let mut first = Vec::new();
        MetadataWriter::new(&mut first).write_tree(&tree).unwrap();
        let mut second = Vec::new();
        MetadataWriter::new(&mut second).write_tree(&tree).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multi_leaf_visual_attribute() {
        let mut harvest = scenario_harvest();
        // second membership duplicates the concept under another class
        harvest.primary_tree = serde_json::from_value(json!([
            {"rxclassMinConceptItem": {"classId": "VA000", "className": "VA CLASSES"},
             "rxclassTree": [
                {"rxclassMinConceptItem": {"classId": "AD300", "className": "A3"}},
                {"rxclassMinConceptItem": {"classId": "CN100", "className": "C1"}}
             ]}
        ]))
        .unwrap();
        harvest.primary_memberships.insert(
            RxCui(614373),
            vec![
                ClassMembership {
                    class_id: "AD300".to_string(),
                    class_name: "A3".to_string(),
                },
                ClassMembership {
                    class_id: "CN100".to_string(),
                    class_name: "C1".to_string(),
                },
            ],
        );
        // drop the branded child so the generic is a leaf
        harvest.related.clear();
        harvest.packages.clear();
        harvest.concepts.retain(|c| c.canonical == RxCui(614373));

        let tree = tree::assemble(&harvest, &BuildConfig::default()).unwrap();
        let rows: Vec<MetadataRow> = tree.rows().collect();
        let emitted: Vec<&MetadataRow> = rows
            .iter()
            .filter(|r| r.basecode == "RXNORM:614373")
            .collect();
        assert_eq!(emitted.len(), 2);
        for row in emitted {
            assert_eq!(row.visualattributes, "MA ");
        }
    }
}
