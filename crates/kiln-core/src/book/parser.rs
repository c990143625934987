// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The Book Parser: XML book + ordered mapping spec → [`PackageRecord`]s.
//!
//! Grounded on `skw_parser.py`'s chapter/section iteration and
//! `_get_xpath_expr` override precedence, generalized onto the nested
//! [`MappingSpec`] and a genuine XPath 1.0 engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sxd_document::parser as xml_parser;
use sxd_xpath::Factory;
use sxd_xpath::nodeset::Node;
use thiserror::Error;

use super::mapping::MappingSpec;
use super::record::PackageRecord;
use super::xpath::{self, Extracted};

/// Per-profile parser configuration (`parser.yaml`), the Rust-native
/// successor to `parser.toml`'s `[main]`/`[xpaths]` tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParserConfig {
    /// Name of the [`MappingSpec`] section that iterates chapters.
    pub chapter_section: String,
    /// Name of the [`MappingSpec`] section that iterates package-yielding
    /// sections within a chapter.
    pub section_section: String,
    /// Custom/code packages, synthesized without corresponding to any book
    /// chapter/section.
    #[serde(default)]
    pub custom_packages: Vec<CustomPackageConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomPackageConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub chapter_id: Option<String>,
    pub section_id: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub xpath_commands: Vec<String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("book XML is not well-formed")]
    Xml(#[from] sxd_document::parser::Error),
    #[error("mapping spec has no section named {0:?}")]
    MissingSection(String),
    #[error(transparent)]
    Xpath(#[from] xpath::Error),
    #[error("ambiguous top-level match for {key:?}: expected a single value, got {count}")]
    Ambiguous { key: String, count: usize },
}

const SINGULAR_KEYS: &[&str] = &["package_name", "package_version", "name_version", "chapter_id", "section_id"];

pub struct BookParser {
    factory: Factory,
}

impl Default for BookParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BookParser {
    pub fn new() -> Self {
        Self { factory: Factory::new() }
    }

    pub fn run(&self, xml: &str, mapping: &MappingSpec, config: &ParserConfig) -> Result<Vec<PackageRecord>, Error> {
        let package = xml_parser::parse(xml)?;
        let document = package.as_document();

        let chapter_mapping = mapping
            .section(&config.chapter_section)
            .ok_or_else(|| Error::MissingSection(config.chapter_section.clone()))?;
        let section_mapping = mapping
            .section(&config.section_section)
            .ok_or_else(|| Error::MissingSection(config.section_section.clone()))?;

        let root = Node::Root(document.root());
        let chapters = xpath::evaluate(root, &chapter_mapping.xpath, &self.factory)?;
        let chapter_nodes = self.select_nodes(root, &chapter_mapping.xpath)?;

        // `chapters` is only used to detect a blank top-level match; the
        // actual iteration walks the typed nodeset from `select_nodes`.
        let _ = chapters;

        let mut records = Vec::new();

        for (index, chapter_node) in chapter_nodes.into_iter().enumerate() {
            let mut chapter_context = BTreeMap::new();
            self.extract_scalars(chapter_mapping, chapter_node, &mut chapter_context, index + 1, &mapping.xpaths)?;

            let chapter_id = chapter_context.get("chapter_id").cloned().unwrap_or_default();

            for (_child_key, child_names) in chapter_mapping.children() {
                for child_name in child_names {
                    if child_name != &section_mapping.name {
                        continue;
                    }

                    let section_nodes = self.select_nodes(chapter_node, &section_mapping.xpath)?;
                    for (section_index, section_node) in section_nodes.into_iter().enumerate() {
                        let mut context = chapter_context.clone();
                        self.extract_scalars(section_mapping, section_node, &mut context, section_index + 1, &mapping.xpaths)?;

                        let section_id = context.get("section_id").cloned().unwrap_or_default();
                        let record = self.build_record(&chapter_id, &section_id, &context);
                        records.push(record);
                    }
                }
            }
        }

        for custom in &config.custom_packages {
            records.push(self.build_custom_record(&package, custom)?);
        }

        Ok(records)
    }

    fn select_nodes<'d>(&self, context_node: Node<'d>, expr: &str) -> Result<Vec<Node<'d>>, Error> {
        let extracted = xpath::evaluate(context_node, expr, &self.factory)?;
        // Node-set results are flattened into strings by `evaluate`; for
        // selecting the actual node set to iterate we re-evaluate with the
        // raw XPath engine so callers keep live `Node` handles.
        let xpath = self
            .factory
            .build(expr)
            .map_err(|source| xpath::Error::InvalidExpression { expr: expr.to_owned(), source })?
            .ok_or_else(|| xpath::Error::EmptyExpression { expr: expr.to_owned() })?;
        let value = xpath
            .evaluate(&sxd_xpath::Context::new(), context_node)
            .map_err(|source| xpath::Error::Evaluation { expr: expr.to_owned(), source })?;

        match value {
            sxd_xpath::Value::Nodeset(nodes) => Ok(nodes.document_order()),
            _ => Ok(Vec::new()),
        }
    }

    fn extract_scalars(
        &self,
        section: &super::mapping::SectionMapping,
        node: Node<'_>,
        context: &mut BTreeMap<String, String>,
        xpath_index: usize,
        global_xpaths: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let mut had_name_version = false;

        for key in section.scalars() {
            self.extract_one(section, node, context, xpath_index, global_xpaths, key)?;
            had_name_version |= key == "name_version";
        }

        // Once `name`/`version` are known from a `name_version` split,
        // re-evaluate any key whose XPath referenced `{name}`/`{version}`
        // (including keys that ran before the split, earlier in field
        // order).
        if had_name_version {
            for key in section.scalars() {
                if key == "name_version" {
                    continue;
                }
                let raw_expr = section.xpath_for(key, global_xpaths).unwrap_or_default();
                if raw_expr.contains("{name}") || raw_expr.contains("{version}") {
                    self.extract_one(section, node, context, xpath_index, global_xpaths, key)?;
                }
            }
        }

        Ok(())
    }

    fn extract_one(
        &self,
        section: &super::mapping::SectionMapping,
        node: Node<'_>,
        context: &mut BTreeMap<String, String>,
        xpath_index: usize,
        global_xpaths: &BTreeMap<String, String>,
        key: &str,
    ) -> Result<(), Error> {
        let raw_expr = section.xpath_for(key, global_xpaths).unwrap_or_default();
        let expr = xpath::substitute(raw_expr, context, xpath_index);
        let extracted = xpath::evaluate(node, &expr, &self.factory)?;

        if SINGULAR_KEYS.contains(&key) {
            if let Extracted::List(items) = &extracted {
                if items.len() > 1 {
                    return Err(Error::Ambiguous { key: key.to_owned(), count: items.len() });
                }
            }
        }

        match key {
            "name_version" => {
                let value = extracted.into_scalar();
                if let Some(pos) = value.rfind('-') {
                    context.insert("name".to_owned(), value[..pos].to_owned());
                    context.insert("version".to_owned(), value[pos + 1..].to_owned());
                } else {
                    context.insert("name".to_owned(), value);
                }
            }
            "build_instructions" | "patches" | "additional_downloads" => {
                context.insert(key.to_owned(), extracted.into_list().join("\n"));
            }
            _ => {
                context.insert(key.to_owned(), extracted.into_scalar());
            }
        }
        Ok(())
    }

    fn build_record(&self, chapter_id: &str, section_id: &str, context: &BTreeMap<String, String>) -> PackageRecord {
        let mut record = PackageRecord {
            chapter_id: chapter_id.to_owned(),
            section_id: section_id.to_owned(),
            name: context.get("package_name").or_else(|| context.get("name")).cloned().unwrap_or_default(),
            version: context.get("package_version").or_else(|| context.get("version")).cloned().unwrap_or_default(),
            ..Default::default()
        };

        let mut urls = Vec::new();
        let mut checksums = Vec::new();

        for (key, value) in context {
            if let Some(class) = key.strip_prefix("dependencies.") {
                let deps: Vec<String> = value.split_whitespace().map(str::to_owned).collect();
                if !deps.is_empty() {
                    record.dependencies.insert(class.to_owned(), deps);
                }
            } else if key == "sources.url" {
                urls = value.split_whitespace().map(str::to_owned).collect();
            } else if key == "sources.checksum" {
                checksums = value.split_whitespace().map(str::to_owned).collect();
            } else if key == "build_instructions" {
                record.build_instructions = value.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect();
            } else if key == "patches" {
                record.patches = value.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect();
            } else if key == "additional_downloads" {
                record.additional_downloads = value.lines().map(str::to_owned).filter(|l| !l.is_empty()).collect();
            } else if !matches!(key.as_str(), "chapter_id" | "section_id" | "package_name" | "package_version" | "name" | "version" | "name_version") {
                record.book_meta.insert(key.clone(), value.clone());
            }
        }

        for (index, url) in urls.into_iter().enumerate() {
            record.sources.push(super::record::Source { url, checksum: checksums.get(index).cloned() });
        }

        record
    }

    fn build_custom_record(
        &self,
        package: &sxd_document::Package,
        custom: &CustomPackageConfig,
    ) -> Result<PackageRecord, Error> {
        let document = package.as_document();
        let root = Node::Root(document.root());

        let mut build_instructions = custom.commands.clone();
        for expr in &custom.xpath_commands {
            for node in self.select_nodes(root, expr)? {
                let text = node.string_value();
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    build_instructions.push(trimmed.to_owned());
                }
            }
        }

        Ok(PackageRecord {
            chapter_id: custom.chapter_id.clone().unwrap_or_else(|| format!("custom-{}", custom.name)),
            section_id: custom.section_id.clone().unwrap_or_else(|| format!("custom-{}", custom.name)),
            name: custom.name.clone(),
            version: custom.version.clone(),
            build_instructions,
            ..Default::default()
        })
    }
}

/// Index records by their `(slug(chapter_id), slug(section_id))` key for
/// downstream lookup (Scripter, Executer).
pub fn index(records: &[PackageRecord]) -> BTreeMap<(String, String), &PackageRecord> {
    records.iter().map(|r| (r.key(), r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::mapping::{FieldSpec, SectionMapping};

    fn mapping() -> MappingSpec {
        MappingSpec {
            xpaths: BTreeMap::new(),
            sections: vec![
                SectionMapping {
                    name: "chapter".into(),
                    xpath: "//chapter".into(),
                    fields: vec![
                        FieldSpec::Scalar { key: "chapter_id".into(), xpath: "@id".into() },
                        FieldSpec::Child { key: "sections".into(), children: vec!["section".into()] },
                    ],
                    xpaths: BTreeMap::new(),
                },
                SectionMapping {
                    name: "section".into(),
                    xpath: ".//sect1".into(),
                    fields: vec![
                        FieldSpec::Scalar { key: "section_id".into(), xpath: "@id".into() },
                        FieldSpec::Scalar { key: "name_version".into(), xpath: "title/text()".into() },
                        FieldSpec::Scalar {
                            key: "dependencies.required".into(),
                            xpath: ".//xref/@linkend".into(),
                        },
                    ],
                    xpaths: BTreeMap::new(),
                },
            ],
        }
    }

    const XML: &str = r#"<book>
        <chapter id="ch-intro">
            <sect1 id="sect-foo">
                <title>foo-1.0</title>
                <xref linkend="bar"/>
            </sect1>
        </chapter>
    </book>"#;

    #[test]
    fn parses_chapter_and_section_into_record() {
        let parser = BookParser::new();
        let config = ParserConfig {
            chapter_section: "chapter".into(),
            section_section: "section".into(),
            custom_packages: Vec::new(),
        };

        let records = parser.run(XML, &mapping(), &config).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.chapter_id, "ch-intro");
        assert_eq!(record.section_id, "sect-foo");
        assert_eq!(record.name, "foo");
        assert_eq!(record.version, "1.0");
        assert_eq!(record.dependencies.get("required"), Some(&vec!["bar".to_owned()]));
    }

    #[test]
    fn custom_packages_are_synthesized() {
        let parser = BookParser::new();
        let config = ParserConfig {
            chapter_section: "chapter".into(),
            section_section: "section".into(),
            custom_packages: vec![CustomPackageConfig {
                name: "linux-headers".into(),
                version: "6.1".into(),
                chapter_id: None,
                section_id: None,
                commands: vec!["make headers_install".into()],
                xpath_commands: Vec::new(),
            }],
        };

        let records = parser.run(XML, &mapping(), &config).unwrap();
        let custom = records.iter().find(|r| r.name == "linux-headers").unwrap();
        assert_eq!(custom.chapter_id, "custom-linux-headers");
        assert_eq!(custom.build_instructions, vec!["make headers_install".to_owned()]);
    }

    #[test]
    fn fields_referencing_name_version_are_reevaluated_after_the_split() {
        // `source_url` is listed (and thus extracted once) *before*
        // `name_version` in field order, but its XPath depends on `{name}`;
        // it must be re-evaluated once the split has happened.
        let mapping = MappingSpec {
            xpaths: BTreeMap::new(),
            sections: vec![
                SectionMapping {
                    name: "chapter".into(),
                    xpath: "//chapter".into(),
                    fields: vec![
                        FieldSpec::Scalar { key: "chapter_id".into(), xpath: "@id".into() },
                        FieldSpec::Child { key: "sections".into(), children: vec!["section".into()] },
                    ],
                    xpaths: BTreeMap::new(),
                },
                SectionMapping {
                    name: "section".into(),
                    xpath: ".//sect1".into(),
                    fields: vec![
                        FieldSpec::Scalar { key: "section_id".into(), xpath: "@id".into() },
                        FieldSpec::Scalar { key: "source_url".into(), xpath: "concat('mirror/', '{name}', '.tar')".into() },
                        FieldSpec::Scalar { key: "name_version".into(), xpath: "title/text()".into() },
                    ],
                    xpaths: BTreeMap::new(),
                },
            ],
        };

        let parser = BookParser::new();
        let config = ParserConfig {
            chapter_section: "chapter".into(),
            section_section: "section".into(),
            custom_packages: Vec::new(),
        };

        let records = parser.run(XML, &mapping, &config).unwrap();
        let record = &records[0];
        assert_eq!(record.book_meta.get("source_url"), Some(&"mirror/foo.tar".to_owned()));
    }
}
