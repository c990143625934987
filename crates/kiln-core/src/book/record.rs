// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! [`PackageRecord`], the normalized output of the Book Parser, plus the
//! normative `slug` function shared by every stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One resolved source (URL + optional checksum).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// The normalized description of one book section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub chapter_id: String,
    pub section_id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub patches: Vec<String>,
    #[serde(default)]
    pub additional_downloads: Vec<String>,
    /// keyed by dependency class: `required`, `recommended`, `optional`,
    /// `runtime`, `external`, plus qualifier-suffixed classes such as
    /// `required_first`/`required_after` handled by the resolver.
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub build_instructions: Vec<String>,
    /// explicit per-record overrides consumed downstream (`package`,
    /// `exec_mode`, `build_order`), left untyped since only the Executer
    /// and Scripter interpret individual keys.
    #[serde(default)]
    pub book_meta: BTreeMap<String, String>,
}

impl PackageRecord {
    /// Stable key: `(slug(chapter_id), slug(section_id))`.
    pub fn key(&self) -> (String, String) {
        (slug(&self.chapter_id), slug(&self.section_id))
    }

    pub fn name_version(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// The normative slug function:
/// lower-case; `/`/`\` → `_`; whitespace runs → `-`; any run of characters
/// outside `[a-z0-9._+-]` → `-`; collapse repeated `-`; trim leading/
/// trailing `-`; empty result → `"unnamed"`.
pub fn slug(input: &str) -> String {
    let lowered = input.to_lowercase().replace(['/', '\\'], "_");

    let mut collapsed = String::with_capacity(lowered.len());
    let mut last_was_dash = false;

    for c in lowered.chars() {
        let is_allowed = c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-');
        if is_allowed && !c.is_whitespace() {
            if c == '-' {
                if !last_was_dash {
                    collapsed.push('-');
                    last_was_dash = true;
                }
            } else {
                collapsed.push(c);
                last_was_dash = false;
            }
        } else if !last_was_dash {
            collapsed.push('-');
            last_was_dash = true;
        }
    }

    let trimmed = collapsed.trim_matches('-');

    if trimmed.is_empty() { "unnamed".to_owned() } else { trimmed.to_owned() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_idempotent() {
        for input in ["Chapter 6: X/Org", "  weird///chars!!  ", "", "already-slugged"] {
            let once = slug(input);
            let twice = slug(&once);
            assert_eq!(once, twice, "slug not idempotent for {input:?}");
        }
    }

    #[test]
    fn slug_empty_yields_unnamed() {
        assert_eq!(slug(""), "unnamed");
        assert_eq!(slug("***"), "unnamed");
    }

    #[test]
    fn slug_lowercases_and_collapses() {
        assert_eq!(slug("GCC Pass 1"), "gcc-pass-1");
        assert_eq!(slug("a//b\\\\c"), "a_b_c");
    }

    #[test]
    fn slug_collapses_literal_dashes_adjacent_to_separators() {
        assert_eq!(slug("a - b"), "a-b");
        assert_eq!(slug("GCC - Pass 1"), "gcc-pass-1");
    }

    #[test]
    fn record_key_uses_slug() {
        let record = PackageRecord {
            chapter_id: "Chapter 5".into(),
            section_id: "Binutils-2.41".into(),
            ..Default::default()
        };
        assert_eq!(record.key(), ("chapter-5".to_owned(), "binutils-2.41".to_owned()));
    }
}
