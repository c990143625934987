// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Per-profile executer configuration (`executer.yaml`), the Rust-native
//! successor to `executer.toml`'s `[main]`/`[host]`/`[chroot]`/`[package]`/
//! `[extract.targets]` tables (`skw_executer.py.__init__`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecuterConfig {
    /// `${var}`-templated; resolved via [`crate::paths::Paths::expand_vars`].
    pub package_dir: String,
    #[serde(default)]
    pub download_repos: Vec<String>,
    #[serde(default)]
    pub upload_repo: String,
    pub chroot_dir: String,
    #[serde(default = "default_extract_dir")]
    pub default_extract_dir: String,
    #[serde(default = "default_true")]
    pub require_confirm_root: bool,
    #[serde(default)]
    pub package_format: PackageFormat,
    pub package_name_template: String,
    #[serde(default)]
    pub host: IncludeLists,
    #[serde(default)]
    pub chroot: IncludeLists,
    #[serde(default)]
    pub package_include: IncludeLists,
    #[serde(default)]
    pub package_exclude: IncludeLists,
    #[serde(default)]
    pub extract_targets: ExtractTargets,
    /// Optional pre-package hook script, invoked with `SKW_*` env vars
    /// before the staged tree is archived.
    pub pre_package_hook: Option<String>,
}

fn default_extract_dir() -> String {
    "/".to_owned()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageFormat {
    Tar,
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
}

impl PackageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PackageFormat::Tar => "tar",
            PackageFormat::TarGz => "tar.gz",
            PackageFormat::TarXz => "tar.xz",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IncludeLists {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub chapters: Vec<String>,
}

impl IncludeLists {
    pub fn matches(&self, name: &str, name_version: &str, section: &str, chapter: &str) -> bool {
        self.packages.iter().any(|p| p == name || p == name_version)
            || self.sections.iter().any(|s| s == section)
            || self.chapters.iter().any(|c| c == chapter)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExtractTargets {
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
    #[serde(default)]
    pub chapters: BTreeMap<String, String>,
}

impl ExtractTargets {
    pub fn resolve(&self, name: &str, section: &str, chapter: &str, default: &str) -> String {
        self.packages
            .get(name)
            .or_else(|| self.sections.get(section))
            .or_else(|| self.chapters.get(chapter))
            .cloned()
            .unwrap_or_else(|| default.to_owned())
    }
}
