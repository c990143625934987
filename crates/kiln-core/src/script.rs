// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The Scripter: one shell script per selected [`PackageRecord`],
//! deterministically named and ordered.
//!
//! Mirrors `skw_scripter.py`'s `_select_template` / `_expand_template` /
//! `_apply_regex` flow, generalized onto [`resolve::Resolver`] for
//! dependency-mode ordering.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fs_err as fs;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::book::{PackageRecord, slug};
use crate::resolve::Resolver;

/// Per-profile scripter configuration (`scripter.yaml`), the Rust-native
/// successor to `scripter.toml`'s flat `[global]`/`[chapter_id.X]`/
/// `[section_id.X]`/`[package.X]` tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScripterConfig {
    pub default_template: String,
    #[serde(default)]
    pub global: Overrides,
    #[serde(default)]
    pub chapters: BTreeMap<String, Overrides>,
    #[serde(default)]
    pub sections: BTreeMap<String, Overrides>,
    #[serde(default)]
    pub packages: BTreeMap<String, Overrides>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub dependency_mode: DependencyModeConfig,
}

/// Per-scope (global/chapter/section/package) template + regex overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Overrides {
    pub template: Option<String>,
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Include/exclude lists gating which records are scriptable at all.
/// Empty include lists mean "include everything", matching the Executer's
/// analogous include/exclude design.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Filter {
    #[serde(default)]
    pub include_chapters: Vec<String>,
    #[serde(default)]
    pub include_sections: Vec<String>,
    #[serde(default)]
    pub include_packages: Vec<String>,
    #[serde(default)]
    pub exclude_chapters: Vec<String>,
    #[serde(default)]
    pub exclude_sections: Vec<String>,
    #[serde(default)]
    pub exclude_packages: Vec<String>,
}

impl Filter {
    fn allows(&self, record: &PackageRecord) -> bool {
        let has_includes =
            !self.include_chapters.is_empty() || !self.include_sections.is_empty() || !self.include_packages.is_empty();

        let included = !has_includes
            || self.include_chapters.iter().any(|c| c == &record.chapter_id)
            || self.include_sections.iter().any(|s| s == &record.section_id)
            || self.include_packages.iter().any(|p| p == &record.name);

        let excluded = self.exclude_chapters.iter().any(|c| c == &record.chapter_id)
            || self.exclude_sections.iter().any(|s| s == &record.section_id)
            || self.exclude_packages.iter().any(|p| p == &record.name);

        included && !excluded
    }
}

/// Configuration for dependency-mode ordering, invoked when not every
/// selected record carries a non-empty `build_order`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DependencyModeConfig {
    pub target: Option<String>,
    #[serde(default)]
    pub include_classes: Vec<String>,
    #[serde(default)]
    pub dep_classes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("reading template {path:?}")]
    ReadTemplate { path: PathBuf, source: std::io::Error },
    #[error("invalid regex rule {rule:?}")]
    InvalidRegex { rule: String, source: regex::Error },
    #[error("writing script {path:?}")]
    WriteScript { path: PathBuf, source: std::io::Error },
    #[error("emptying scripts directory {path:?}")]
    EmptyDir { path: PathBuf, source: std::io::Error },
    #[cfg(unix)]
    #[error("setting permissions on {path:?}")]
    SetPermissions { path: PathBuf, source: std::io::Error },
}

const PLACEHOLDER_RE: &str = r"\{\{([^}]+)\}\}";

pub struct Scripter<'a> {
    profile_dir: &'a Path,
    config: &'a ScripterConfig,
    placeholder: Regex,
}

impl<'a> Scripter<'a> {
    pub fn new(profile_dir: &'a Path, config: &'a ScripterConfig) -> Self {
        Self {
            profile_dir,
            config,
            placeholder: Regex::new(PLACEHOLDER_RE).expect("static placeholder regex"),
        }
    }

    /// Select, order, expand and write one script per scriptable record
    /// into `scripts_dir`, emptying it first. Returns the ordered list of
    /// `(order, record)` pairs actually written, matching the filenames on
    /// disk.
    pub fn run<'r>(
        &self,
        records: &'r [PackageRecord],
        scripts_dir: &Path,
    ) -> Result<Vec<(usize, &'r PackageRecord)>, Error> {
        let scriptable: Vec<&PackageRecord> = records.iter().filter(|r| self.config.filter.allows(r)).collect();
        let ordered = self.order(&scriptable, records);

        if scripts_dir.exists() {
            fs::remove_dir_all(scripts_dir).map_err(|source| Error::EmptyDir { path: scripts_dir.to_owned(), source })?;
        }
        fs::create_dir_all(scripts_dir).map_err(|source| Error::EmptyDir { path: scripts_dir.to_owned(), source })?;

        for (order, record) in &ordered {
            let template = self.select_template(record)?;
            let expanded = self.expand(&template, record);
            let content = self.apply_regex(record, expanded)?;

            let chapter = if record.chapter_id.is_empty() { &record.name } else { &record.chapter_id };
            let section = if record.section_id.is_empty() { &record.version } else { &record.section_id };
            let name = format!("{order:04}_{}_{}.sh", slug(chapter), slug(section));
            let path = scripts_dir.join(&name);

            fs::write(&path, content).map_err(|source| Error::WriteScript { path: path.clone(), source })?;
            set_executable(&path)?;
        }

        Ok(ordered)
    }

    /// Linear mode if every scriptable record carries a non-empty
    /// `build_order`; otherwise dependency mode via [`Resolver`].
    fn order<'r>(&self, scriptable: &[&'r PackageRecord], all: &'r [PackageRecord]) -> Vec<(usize, &'r PackageRecord)> {
        let build_orders: Option<Vec<&str>> = scriptable
            .iter()
            .map(|r| r.book_meta.get("build_order").map(String::as_str).filter(|s| !s.is_empty()))
            .collect();

        if let Some(_orders) = build_orders {
            let mut sorted: Vec<&PackageRecord> = scriptable.to_vec();
            sorted.sort_by(|a, b| {
                let order_a = a.book_meta.get("build_order").map(String::as_str).unwrap_or_default();
                let order_b = b.book_meta.get("build_order").map(String::as_str).unwrap_or_default();
                (order_a, &a.chapter_id, &a.section_id, &a.name).cmp(&(order_b, &b.chapter_id, &b.section_id, &b.name))
            });
            return sorted.into_iter().enumerate().map(|(i, r)| (i + 1, r)).collect();
        }

        self.dependency_order(scriptable, all)
    }

    fn dependency_order<'r>(&self, scriptable: &[&'r PackageRecord], all: &'r [PackageRecord]) -> Vec<(usize, &'r PackageRecord)> {
        let cfg = &self.config.dependency_mode;

        let node_names: Vec<String> = all.iter().map(|r| r.name.clone()).collect();
        let dependencies: BTreeMap<String, BTreeMap<String, Vec<String>>> =
            all.iter().map(|r| (r.name.clone(), r.dependencies.clone())).collect();

        let mut dep_classes = cfg.dep_classes.clone();
        if !dep_classes.contains_key("default") && !cfg.include_classes.is_empty() {
            dep_classes.insert("default".to_owned(), cfg.include_classes.clone());
        }

        let root_ids: Vec<String> = match &cfg.target {
            Some(target) => vec![target.clone()],
            None => scriptable.iter().map(|r| r.name.clone()).collect(),
        };

        let mut resolver = Resolver::new(&node_names, &dependencies, &root_ids, dep_classes, &cfg.aliases);
        let order = resolver.resolve();

        let by_name: BTreeMap<&str, &PackageRecord> = all.iter().map(|r| (r.name.as_str(), r)).collect();
        let scriptable_names: std::collections::BTreeSet<&str> = scriptable.iter().map(|r| r.name.as_str()).collect();

        let mut result = Vec::new();
        for name in &order {
            if name.ends_with("-pass1") {
                continue; // synthetic fence node from resolver pass 2, not a package
            }
            let resolved = by_name.get(name.as_str()).copied().or_else(|| {
                cfg.aliases.get(name).and_then(|alias| by_name.get(alias.as_str()).copied())
            });
            if let Some(record) = resolved {
                if scriptable_names.contains(record.name.as_str()) {
                    result.push(record);
                }
            }
        }

        result.into_iter().enumerate().map(|(i, r)| (i + 1, r)).collect()
    }

    /// Template selection: package-name match > section-id match >
    /// chapter-id match > the configured default template.
    fn select_template(&self, record: &PackageRecord) -> Result<String, Error> {
        let mut template_file = self.config.default_template.clone();

        if let Some(over) = self.config.chapters.get(&record.chapter_id).and_then(|o| o.template.clone()) {
            template_file = over;
        }
        if let Some(over) = self.config.sections.get(&record.section_id).and_then(|o| o.template.clone()) {
            template_file = over;
        }
        if let Some(over) = self.config.packages.get(&record.name).and_then(|o| o.template.clone()) {
            template_file = over;
        }

        let path = self.profile_dir.join(&template_file);
        fs::read_to_string(&path).map_err(|source| Error::ReadTemplate { path, source })
    }

    /// `{{a.b.c}}` walks the record as a JSON value by key at each
    /// component; lists join with a single space, except
    /// `build_instructions`, which joins with newlines; missing paths
    /// expand to the empty string.
    fn expand(&self, template: &str, record: &PackageRecord) -> String {
        let value = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);

        self.placeholder
            .replace_all(template, |caps: &Captures<'_>| resolve_path(&value, &caps[1]))
            .into_owned()
    }

    /// Ordered regex rules from global + chapter + section + package
    /// sections, concatenated in that order.
    fn apply_regex(&self, record: &PackageRecord, mut content: String) -> Result<String, Error> {
        let mut rules: Vec<&str> = self.config.global.regex.iter().map(String::as_str).collect();
        if let Some(o) = self.config.chapters.get(&record.chapter_id) {
            rules.extend(o.regex.iter().map(String::as_str));
        }
        if let Some(o) = self.config.sections.get(&record.section_id) {
            rules.extend(o.regex.iter().map(String::as_str));
        }
        if let Some(o) = self.config.packages.get(&record.name) {
            rules.extend(o.regex.iter().map(String::as_str));
        }

        for rule in rules {
            match parse_rule(rule) {
                Some((mode, pattern, replacement)) => {
                    content = apply_rule(&content, mode, &pattern, &replacement)?;
                }
                None => {
                    tracing::warn!(rule, "malformed regex rule, skipping");
                }
            }
        }

        Ok(content)
    }
}

fn resolve_path(value: &serde_json::Value, path: &str) -> String {
    let mut current = value;
    for part in path.split('.') {
        match current {
            serde_json::Value::Object(map) => match map.get(part) {
                Some(v) => current = v,
                None => return String::new(),
            },
            _ => return String::new(),
        }
    }
    stringify(current, path)
}

fn stringify(value: &serde_json::Value, key_path: &str) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(items) => {
            let strings: Vec<String> = items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            let separator = if key_path.rsplit('.').next() == Some("build_instructions") { "\n" } else { " " };
            strings.join(separator)
        }
        other => other.to_string(),
    }
}

/// Parse a `{mode}{delim}{pattern}{delim}{replacement}{delim?}` rule; a
/// trailing empty delimiter is tolerated. Malformed rules return `None`.
fn parse_rule(rule: &str) -> Option<(char, String, String)> {
    let mut chars = rule.chars();
    let mode = chars.next()?;
    if mode != 's' && mode != 'r' {
        return None;
    }
    let delim = chars.next()?;
    let rest: String = chars.collect();
    let parts: Vec<&str> = rest.split(delim).collect();

    match parts.as_slice() {
        [pattern, replacement] => Some((mode, (*pattern).to_owned(), (*replacement).to_owned())),
        [pattern, replacement, trailing] if trailing.is_empty() => {
            Some((mode, (*pattern).to_owned(), (*replacement).to_owned()))
        }
        _ => None,
    }
}

fn apply_rule(content: &str, mode: char, pattern: &str, replacement: &str) -> Result<String, Error> {
    match mode {
        's' => Ok(content.replace(pattern, replacement)),
        'r' => {
            let re = Regex::new(pattern).map_err(|source| Error::InvalidRegex { rule: pattern.to_owned(), source })?;
            Ok(re.replace_all(content, replacement).into_owned())
        }
        _ => unreachable!("parse_rule only yields 's' or 'r'"),
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::Permissions::from_mode(0o755);
    std::fs::set_permissions(path, permissions).map_err(|source| Error::SetPermissions { path: path.to_owned(), source })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(chapter: &str, section: &str, name: &str, version: &str) -> PackageRecord {
        PackageRecord {
            chapter_id: chapter.into(),
            section_id: section.into(),
            name: name.into(),
            version: version.into(),
            build_instructions: vec!["make".into(), "make install".into()],
            ..Default::default()
        }
    }

    #[test]
    fn template_expansion_idempotent_for_literals() {
        let dir = tempdir().unwrap();
        let config = ScripterConfig { default_template: "t.sh".into(), ..Default::default() };
        let scripter = Scripter::new(dir.path(), &config);
        let literal = "#!/bin/bash\necho hello\n";
        assert_eq!(scripter.expand(literal, &record("c", "s", "foo", "1.0")), literal);
    }

    #[test]
    fn expand_joins_build_instructions_with_newlines() {
        let dir = tempdir().unwrap();
        let config = ScripterConfig { default_template: "t.sh".into(), ..Default::default() };
        let scripter = Scripter::new(dir.path(), &config);
        let record = record("c", "s", "foo", "1.0");
        let out = scripter.expand("{{build_instructions}}", &record);
        assert_eq!(out, "make\nmake install");
    }

    #[test]
    fn expand_missing_path_is_empty() {
        let dir = tempdir().unwrap();
        let config = ScripterConfig { default_template: "t.sh".into(), ..Default::default() };
        let scripter = Scripter::new(dir.path(), &config);
        let out = scripter.expand("[{{nonexistent.path}}]", &record("c", "s", "foo", "1.0"));
        assert_eq!(out, "[]");
    }

    #[test]
    fn regex_rule_literal_and_pattern() {
        assert_eq!(apply_rule("hello world", 's', "world", "there").unwrap(), "hello there");
        assert_eq!(apply_rule("a1b2c3", 'r', r"\d", "_").unwrap(), "a_b_c_");
    }

    #[test]
    fn parse_rule_tolerates_trailing_empty_delimiter() {
        assert_eq!(parse_rule("s/foo/bar/"), Some(('s', "foo".to_owned(), "bar".to_owned())));
        assert_eq!(parse_rule("s/foo/bar"), Some(('s', "foo".to_owned(), "bar".to_owned())));
        assert_eq!(parse_rule("x/foo/bar"), None);
        assert_eq!(parse_rule("s/only-one-part"), None);
    }

    #[test]
    fn linear_mode_orders_by_build_order_scenario_a() {
        let dir = tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts");
        fs::write(dir.path().join("t.sh"), "{{build_instructions}}\n").unwrap();

        let mut foo = record("c1", "s1", "foo", "1.0");
        foo.book_meta.insert("build_order".into(), "0001".into());
        let mut bar = record("c1", "s2", "bar", "2.0");
        bar.book_meta.insert("build_order".into(), "0002".into());

        let records = vec![bar.clone(), foo.clone()];
        let config = ScripterConfig { default_template: "t.sh".into(), ..Default::default() };
        let scripter = Scripter::new(dir.path(), &config);

        let written = scripter.run(&records, &scripts_dir).unwrap();
        assert_eq!(written.iter().map(|(_, r)| r.name.as_str()).collect::<Vec<_>>(), vec!["foo", "bar"]);
        assert!(scripts_dir.join("0001_c1_s1.sh").exists());
        assert!(scripts_dir.join("0002_c1_s2.sh").exists());
    }

    #[test]
    fn dependency_mode_orders_simple_chain_scenario_b() {
        let dir = tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts");
        fs::write(dir.path().join("t.sh"), "#!/bin/bash\n").unwrap();

        let a = record("c", "sa", "a", "1.0");
        let mut b = record("c", "sb", "b", "1.0");
        b.dependencies.insert("required".into(), vec!["a".into()]);
        let mut c = record("c", "sc", "c", "1.0");
        c.dependencies.insert("required".into(), vec!["b".into()]);

        let records = vec![c.clone(), a.clone(), b.clone()];
        let config = ScripterConfig {
            default_template: "t.sh".into(),
            dependency_mode: DependencyModeConfig {
                target: Some("c".into()),
                include_classes: vec!["required".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let scripter = Scripter::new(dir.path(), &config);

        let written = scripter.run(&records, &scripts_dir).unwrap();
        assert_eq!(written.iter().map(|(_, r)| r.name.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
