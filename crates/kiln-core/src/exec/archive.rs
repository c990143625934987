// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Archive creation and safe extraction. Mirrors `skw_executer.py`'s
//! `_create_archive` / `_safe_extract`, with the tar/gzip/xz
//! compression-backend split found in other packaging tools in this
//! ecosystem.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;

use fs_err as fs;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::config::PackageFormat;

#[derive(Debug, Error)]
pub enum Error {
    #[error("creating archive {path:?}")]
    Create { path: PathBuf, source: std::io::Error },
    #[error("opening archive {path:?}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("reading archive {path:?}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("hashing {path:?}")]
    Hash { path: PathBuf, source: std::io::Error },
    #[error("SECURITY ERROR: archive member {member:?} escapes extraction target")]
    PathTraversal { member: String },
    #[error("system `tar` exited with {status}")]
    TarExtract { status: std::process::ExitStatus },
    #[error("invoking system `tar`")]
    TarSpawn { source: std::io::Error },
}

/// Create `out_path` from the contents of `destdir`, rooted at `/`
/// (`arcname="/"` in the Python prototype: entries are paths relative to
/// `destdir`, not prefixed by it).
pub fn create(destdir: &Path, out_path: &Path, format: PackageFormat) -> Result<(), Error> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::Create { path: out_path.to_owned(), source })?;
    }

    let file = fs::File::create(out_path).map_err(|source| Error::Create { path: out_path.to_owned(), source })?;

    write_archive(file, destdir, format).map_err(|source| Error::Create { path: out_path.to_owned(), source })
}

fn write_archive(file: fs::File, destdir: &Path, format: PackageFormat) -> std::io::Result<()> {
    match format {
        PackageFormat::Tar => {
            let mut builder = tar::Builder::new(file);
            builder.append_dir_all(".", destdir)?;
            builder.finish()
        }
        PackageFormat::TarGz => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            builder.append_dir_all(".", destdir)?;
            builder.into_inner()?.finish()?;
            Ok(())
        }
        PackageFormat::TarXz => {
            let encoder = liblzma::write::XzEncoder::new(file, 6);
            let mut builder = tar::Builder::new(encoder);
            builder.append_dir_all(".", destdir)?;
            builder.into_inner()?.finish()?;
            Ok(())
        }
    }
}

/// SHA-256 of the entire file, hex-encoded.
pub fn sha256_file(path: &Path) -> Result<String, Error> {
    let mut reader = fs::File::open(path).map(BufReader::new).map_err(|source| Error::Hash {
        path: path.to_owned(),
        source,
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher).map_err(|source| Error::Hash { path: path.to_owned(), source })?;
    Ok(hex::encode(hasher.finalize()))
}

fn open_reader(path: &Path, format: PackageFormat) -> Result<tar::Archive<Box<dyn std::io::Read>>, Error> {
    let file = fs::File::open(path).map_err(|source| Error::Open { path: path.to_owned(), source })?;
    let reader: Box<dyn std::io::Read> = match format {
        PackageFormat::Tar => Box::new(BufReader::new(file)),
        PackageFormat::TarGz => Box::new(flate2::bufread::GzDecoder::new(BufReader::new(file))),
        PackageFormat::TarXz => Box::new(liblzma::bufread::XzDecoder::new(BufReader::new(file))),
    };
    Ok(tar::Archive::new(reader))
}

/// Whether `archive` contains a `_metadata/{name}--{version}.json` member.
/// Absence on a cache hit is a warning, not a failure.
pub fn contains_metadata(archive: &Path, format: PackageFormat, name: &str, version: &str) -> Result<bool, Error> {
    let wanted = format!("_metadata/{name}--{version}.json");
    let mut reader = open_reader(archive, format)?;
    let entries = reader.entries().map_err(|source| Error::Read { path: archive.to_owned(), source })?;

    for entry in entries {
        let entry = entry.map_err(|source| Error::Read { path: archive.to_owned(), source })?;
        let path = entry.path().map_err(|source| Error::Read { path: archive.to_owned(), source })?;
        let normalized = path.strip_prefix("./").unwrap_or(&path);
        if normalized.to_string_lossy() == wanted {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Validate every non-symlink, non-hardlink member resolves inside
/// `target`, then delegate the actual extraction (including symlinks and
/// hardlinks) to the system `tar` binary, preserving its native semantics.
pub fn safe_extract(archive: &Path, target: &Path, format: PackageFormat) -> Result<(), Error> {
    let mut reader = open_reader(archive, format)?;
    let entries = reader.entries().map_err(|source| Error::Read { path: archive.to_owned(), source })?;

    for entry in entries {
        let entry = entry.map_err(|source| Error::Read { path: archive.to_owned(), source })?;
        let header = entry.header();

        if header.entry_type().is_symlink() || header.entry_type().is_hard_link() {
            continue;
        }

        let path = entry.path().map_err(|source| Error::Read { path: archive.to_owned(), source })?;
        let stripped = path.strip_prefix("/").unwrap_or(&path);
        let resolved = resolve_lexical(target, stripped);

        if !resolved.starts_with(target) {
            return Err(Error::PathTraversal { member: path.to_string_lossy().into_owned() });
        }
    }

    extract_with_system_tar(archive, target)
}

fn resolve_lexical(base: &Path, relative: &Path) -> PathBuf {
    let mut stack: Vec<std::ffi::OsString> = base.components().map(|c| c.as_os_str().to_owned()).collect();

    for component in relative.components() {
        match component {
            std::path::Component::ParentDir => {
                stack.pop();
            }
            std::path::Component::Normal(part) => stack.push(part.to_owned()),
            _ => {}
        }
    }

    stack.into_iter().collect()
}

fn extract_with_system_tar(archive: &Path, target: &Path) -> Result<(), Error> {
    fs::create_dir_all(target).map_err(|source| Error::Create { path: target.to_owned(), source })?;

    let status = Command::new("tar")
        .arg("--extract")
        .arg("--file")
        .arg(archive)
        .arg("--directory")
        .arg(target)
        .arg("--preserve-permissions")
        .arg("--keep-directory-symlink")
        .arg("--delay-directory-restore")
        .status()
        .map_err(|source| Error::TarSpawn { source })?;

    if !status.success() {
        return Err(Error::TarExtract { status });
    }

    Ok(())
}

/// Recursively list every file under `root`, as paths relative to it, for
/// the embedded metadata's `files[]` field. Sorted for determinism.
pub fn list_files(root: &Path) -> Result<Vec<String>, Error> {
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), Error> {
    let entries = fs::read_dir(dir).map_err(|source| Error::Read { path: dir.to_owned(), source })?;

    for entry in entries {
        let entry = entry.map_err(|source| Error::Read { path: dir.to_owned(), source })?;
        let path = entry.path();

        if path.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().into_owned());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn round_trips_a_tar_archive() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("usr/bin")).unwrap();
        fs::write(src.path().join("usr/bin/tool"), b"binary").unwrap();

        let out = tempdir().unwrap();
        let archive_path = out.path().join("pkg.tar");
        create(src.path(), &archive_path, PackageFormat::Tar).unwrap();
        assert!(archive_path.exists());

        let extract_dir = tempdir().unwrap();
        safe_extract(&archive_path, extract_dir.path(), PackageFormat::Tar).unwrap();
        assert_eq!(fs::read(extract_dir.path().join("usr/bin/tool")).unwrap(), b"binary");
    }

    #[test]
    fn sha256_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.bin");
        fs::write(&path, b"hello world").unwrap();
        let first = sha256_file(&path).unwrap();
        let second = sha256_file(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn rejects_path_traversal_member() {
        let out = tempdir().unwrap();
        let archive_path = out.path().join("evil.tar");
        let file = fs::File::create(&archive_path).unwrap();
        let mut builder = tar::Builder::new(file);
        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_cksum();
        builder.append_data(&mut header, "../../etc/passwd", &b"evil"[..]).unwrap();
        builder.finish().unwrap();

        let target = tempdir().unwrap();
        let result = safe_extract(&archive_path, target.path(), PackageFormat::Tar);
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn list_files_is_sorted_and_relative() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/2.txt"), "").unwrap();
        fs::write(dir.path().join("1.txt"), "").unwrap();

        let files = list_files(dir.path()).unwrap();
        assert_eq!(files, vec!["1.txt".to_owned(), "b/2.txt".to_owned()]);
    }
}
