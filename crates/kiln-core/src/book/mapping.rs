// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The ordered mapping specification: a YAML sequence of named sections
//! rather than a YAML mapping, so that section order is unambiguous
//! without reaching for an order-preserving map crate this stack doesn't
//! otherwise use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level mapping spec: an ordered list of sections plus an optional
/// global `xpaths` override table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MappingSpec {
    #[serde(default)]
    pub xpaths: BTreeMap<String, String>,
    pub sections: Vec<SectionMapping>,
}

impl MappingSpec {
    pub fn section(&self, name: &str) -> Option<&SectionMapping> {
        self.sections.iter().find(|s| s.name == name)
    }
}

/// One named section: the node set it iterates over (`xpath`), its
/// ordered fields (scalar XPath extractions interleaved with child-section
/// embeddings), and per-section XPath overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SectionMapping {
    pub name: String,
    pub xpath: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Per-section overrides, key-by-key; dotted keys (`source.url`)
    /// address nested fields. A blank override string forces the field
    /// empty.
    #[serde(default)]
    pub xpaths: BTreeMap<String, String>,
}

impl SectionMapping {
    /// Resolve the XPath expression to use for `key`, honoring override
    /// precedence: this section's own `xpaths` table first, then the
    /// mapping-wide global `xpaths` table, then the field's own default
    /// expression from `fields`. A blank override string forces the field
    /// empty.
    pub fn xpath_for<'a>(&'a self, key: &'a str, global_xpaths: &'a BTreeMap<String, String>) -> Option<&'a str> {
        if let Some(over) = self.xpaths.get(key) {
            return Some(over.as_str());
        }
        if let Some(over) = global_xpaths.get(key) {
            return Some(over.as_str());
        }
        self.fields.iter().find_map(|f| match f {
            FieldSpec::Scalar { key: k, xpath } if k == key => Some(xpath.as_str()),
            _ => None,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().filter_map(|f| match f {
            FieldSpec::Child { key, children } => Some((key.as_str(), children.as_slice())),
            _ => None,
        })
    }

    pub fn scalars(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| match f {
            FieldSpec::Scalar { key, .. } => Some(key.as_str()),
            _ => None,
        })
    }
}

/// A single ordered entry of a section's field list: either a scalar
/// XPath extraction, or an embedding of other named sections
/// (the `childN` keys of the legacy TOML mapping, generalized to one
/// `children` list per embedding point since ordinal numbering only
/// matters for the textual `childN` key name, not the semantics).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Child { key: String, children: Vec<String> },
    Scalar { key: String, xpath: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_precedence_section_over_field_default() {
        let section = SectionMapping {
            name: "section".into(),
            xpath: ".//sect1".into(),
            fields: vec![FieldSpec::Scalar {
                key: "name_version".into(),
                xpath: ".//title".into(),
            }],
            xpaths: BTreeMap::from([("name_version".into(), ".//title[2]".into())]),
        };

        assert_eq!(section.xpath_for("name_version", &BTreeMap::new()), Some(".//title[2]"));
    }

    #[test]
    fn falls_back_to_field_default_without_override() {
        let section = SectionMapping {
            name: "section".into(),
            xpath: ".//sect1".into(),
            fields: vec![FieldSpec::Scalar {
                key: "dependencies".into(),
                xpath: ".//xref/@linkend".into(),
            }],
            xpaths: BTreeMap::new(),
        };

        assert_eq!(section.xpath_for("dependencies", &BTreeMap::new()), Some(".//xref/@linkend"));
        assert_eq!(section.xpath_for("missing", &BTreeMap::new()), None);
    }

    #[test]
    fn global_override_wins_over_field_default_but_not_section_override() {
        let section = SectionMapping {
            name: "section".into(),
            xpath: ".//sect1".into(),
            fields: vec![FieldSpec::Scalar { key: "name_version".into(), xpath: ".//title".into() }],
            xpaths: BTreeMap::new(),
        };
        let globals = BTreeMap::from([("name_version".into(), ".//title[1]".into())]);
        assert_eq!(section.xpath_for("name_version", &globals), Some(".//title[1]"));
    }

    #[test]
    fn deserializes_yaml_sequence() {
        let yaml = r#"
xpaths:
  global_override: "//foo"
sections:
  - name: chapter
    xpath: "//chapter"
    fields:
      - key: chapter_id
        xpath: "@id"
      - key: sections
        children: ["section"]
  - name: section
    xpath: ".//sect1"
    fields:
      - key: section_id
        xpath: "@id"
"#;
        let spec: MappingSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.sections.len(), 2);
        assert_eq!(spec.section("chapter").unwrap().xpath, "//chapter");
        let (child_key, children) = spec.section("chapter").unwrap().children().next().unwrap();
        assert_eq!(child_key, "sections");
        assert_eq!(children, ["section"]);
    }
}
