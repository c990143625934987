// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The Book Parser subsystem: turns a DocBook XML tree into an ordered
//! list of [`PackageRecord`]s.

pub mod mapping;
pub mod parser;
pub mod record;
pub mod xpath;

use std::path::Path;

use fs_err as fs;

pub use mapping::MappingSpec;
pub use parser::{BookParser, ParserConfig};
pub use record::{PackageRecord, slug};

/// Write one YAML record per [`PackageRecord`] under `dir`, file-named
/// `{slug(chapter_id)}_{slug(section_id)}.yaml`, named from the first two
/// resolved fields, sanitized. Multi-line strings and sequences serialize
/// in YAML block style via `serde_yaml`.
pub fn write_records(dir: &Path, records: &[PackageRecord]) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|source| Error::Io { path: dir.to_owned(), source })?;

    for record in records {
        let (chapter, section) = record.key();
        let path = dir.join(format!("{chapter}_{section}.yaml"));
        let yaml = serde_yaml::to_string(record).map_err(|source| Error::Serialize { source })?;
        fs::write(&path, yaml).map_err(|source| Error::Io { path, source })?;
    }

    Ok(())
}

/// Read back every `*.yaml` record under `dir`, as written by
/// [`write_records`].
pub fn read_records(dir: &Path) -> Result<Vec<PackageRecord>, Error> {
    let mut records = Vec::new();

    let entries = fs::read_dir(dir).map_err(|source| Error::Io { path: dir.to_owned(), source })?;
    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    paths.sort();

    for path in paths {
        let content = fs::read_to_string(&path).map_err(|source| Error::Io { path: path.clone(), source })?;
        let record: PackageRecord =
            serde_yaml::from_str(&content).map_err(|source| Error::Deserialize { path, source })?;
        records.push(record);
    }

    Ok(records)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{path}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing package record")]
    Serialize {
        #[source]
        source: serde_yaml::Error,
    },
    #[error("deserializing package record from {path}")]
    Deserialize {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn round_trips_records() {
        let dir = tempdir().unwrap();
        let records = vec![PackageRecord {
            chapter_id: "Chapter 5".into(),
            section_id: "Binutils".into(),
            name: "binutils".into(),
            version: "2.41".into(),
            ..Default::default()
        }];

        write_records(dir.path(), &records).unwrap();
        assert!(dir.path().join("chapter-5_binutils.yaml").exists());

        let read_back = read_records(dir.path()).unwrap();
        assert_eq!(read_back, records);
    }
}
