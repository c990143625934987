// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Cache probe / download / upload against the ordered *download repos*
//! (local paths or HTTP base URLs), mirroring `skw_executer.py`'s
//! `_package_exists` / `_install_package` / `_upload_package`.
//!
//! Local hits are archive-presence only (sidecar informational); remote
//! hits download the sidecar and verify its `sha256` against the
//! downloaded archive before the hit is trusted.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use fs_err as fs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::archive;

const HEAD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error probing {url}")]
    Network { url: String, source: reqwest::Error },
    #[error("downloading {url}")]
    Download { url: String, source: reqwest::Error },
    #[error("writing {path:?}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("reading sidecar {path:?}")]
    ReadSidecar { path: PathBuf, source: std::io::Error },
    #[error("parsing sidecar {path:?}")]
    ParseSidecar { path: PathBuf, source: serde_json::Error },
    #[error("checksum mismatch for {archive:?}: expected {expected}, got {actual}")]
    ChecksumMismatch { archive: PathBuf, expected: String, actual: String },
    #[error(transparent)]
    Archive(#[from] archive::Error),
    #[error("upload target {target:?} looks like an HTTP URL, which is unsupported")]
    HttpUpload { target: String },
    #[error("invoking scp")]
    ScpSpawn { source: std::io::Error },
    #[error("scp exited with {status}")]
    ScpFailed { status: std::process::ExitStatus },
    #[error("copying {from:?} to {to:?}")]
    Copy { from: PathBuf, to: PathBuf, source: std::io::Error },
}

/// A sidecar `<archive>.meta.json`, mirroring the embedded
/// `_metadata/{name}--{version}.json` fields plus a `sha256` used for
/// cache integrity verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidecar {
    pub package_name: String,
    pub package_version: String,
    pub book: String,
    pub profile: String,
    pub chapter_id: String,
    pub section_id: String,
    pub exec_mode: String,
    pub build_date: String,
    pub hostname: String,
    pub files: Vec<String>,
    pub sha256: String,
    #[serde(default)]
    pub builder_host: String,
    #[serde(default)]
    pub builder_user: String,
}

#[derive(Debug, Clone)]
pub enum Hit {
    Local { repo: PathBuf },
    Http { repo: String },
}

impl Hit {
    pub fn repo_display(&self) -> String {
        match self {
            Hit::Local { repo } => repo.display().to_string(),
            Hit::Http { repo } => repo.clone(),
        }
    }
}

/// Iterate the ordered download repos; a local path hit is the archive
/// file existing, an HTTP hit is `HEAD` on the archive URL returning 200.
pub fn probe(repos: &[String], pkg_file: &str) -> Result<Option<Hit>, Error> {
    for repo in repos {
        if let Some(base) = repo.strip_prefix("http") {
            let _ = base;
            let url = format!("{}/{}", repo.trim_end_matches('/'), pkg_file);
            if head_ok(&url)? {
                return Ok(Some(Hit::Http { repo: repo.clone() }));
            }
        } else {
            let path = Path::new(repo).join(pkg_file);
            if path.exists() {
                return Ok(Some(Hit::Local { repo: PathBuf::from(repo) }));
            }
        }
    }
    Ok(None)
}

fn head_ok(url: &str) -> Result<bool, Error> {
    let client = reqwest::blocking::Client::builder()
        .timeout(HEAD_TIMEOUT)
        .build()
        .map_err(|source| Error::Network { url: url.to_owned(), source })?;

    match client.head(url).send() {
        Ok(response) => Ok(response.status() == reqwest::StatusCode::OK),
        // Non-fatal for cache probe: move to next repo.
        Err(_) => Ok(false),
    }
}

/// Resolve a cache hit to a local archive path, downloading + verifying
/// when the hit is remote. Returns the archive path and, when a sidecar
/// was consulted, its parsed contents.
pub fn resolve(hit: &Hit, pkg_file: &str, downloads_dir: &Path) -> Result<(PathBuf, Option<Sidecar>), Error> {
    match hit {
        Hit::Local { repo } => Ok((repo.join(pkg_file), None)),
        Hit::Http { repo } => {
            let base = repo.trim_end_matches('/');
            let archive_path = download(&format!("{base}/{pkg_file}"), &downloads_dir.join(pkg_file))?;

            let meta_name = format!("{pkg_file}.meta.json");
            let meta_path = download(&format!("{base}/{meta_name}"), &downloads_dir.join(&meta_name))?;

            let bytes = fs::read(&meta_path).map_err(|source| Error::ReadSidecar { path: meta_path.clone(), source })?;
            let sidecar: Sidecar =
                serde_json::from_slice(&bytes).map_err(|source| Error::ParseSidecar { path: meta_path, source })?;

            let actual = archive::sha256_file(&archive_path)?;
            if actual != sidecar.sha256 {
                return Err(Error::ChecksumMismatch {
                    archive: archive_path,
                    expected: sidecar.sha256,
                    actual,
                });
            }

            Ok((archive_path, Some(sidecar)))
        }
    }
}

fn download(url: &str, dest: &Path) -> Result<PathBuf, Error> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| Error::Download { url: url.to_owned(), source })?;
    let bytes = response.bytes().map_err(|source| Error::Download { url: url.to_owned(), source })?;
    fs::write(dest, bytes).map_err(|source| Error::Write { path: dest.to_owned(), source })?;
    Ok(dest.to_owned())
}

/// Write the archive + sidecar to `upload_repo`: `scp` for an `scp`-style
/// `host:path` target, otherwise a local copy. HTTP uploads are
/// unsupported and treated as a fatal configuration error.
pub fn upload(upload_repo: &str, archive_path: &Path, sidecar_path: &Path) -> Result<(), Error> {
    if upload_repo.is_empty() {
        return Ok(());
    }
    if upload_repo.starts_with("http") {
        return Err(Error::HttpUpload { target: upload_repo.to_owned() });
    }

    if upload_repo.contains(':') && !upload_repo.starts_with('/') {
        scp(archive_path, upload_repo)?;
        scp(sidecar_path, upload_repo)?;
        return Ok(());
    }

    let dest_dir = PathBuf::from(upload_repo);
    fs::create_dir_all(&dest_dir).map_err(|source| Error::Write { path: dest_dir.clone(), source })?;

    for source_path in [archive_path, sidecar_path] {
        let file_name = source_path.file_name().expect("archive paths always have a file name");
        let dest = dest_dir.join(file_name);
        if dest != *source_path {
            fs::copy(source_path, &dest).map_err(|source| Error::Copy {
                from: source_path.to_owned(),
                to: dest,
                source,
            })?;
        }
    }

    Ok(())
}

fn scp(path: &Path, target: &str) -> Result<(), Error> {
    let destination = format!("{target}/");
    let status = Command::new("scp")
        .arg(path)
        .arg(&destination)
        .status()
        .map_err(|source| Error::ScpSpawn { source })?;

    if !status.success() {
        return Err(Error::ScpFailed { status });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn local_probe_finds_existing_archive() {
        let repo = tempdir().unwrap();
        fs::write(repo.path().join("foo-1.0.tar.xz"), b"pkg").unwrap();

        let repos = vec![repo.path().to_string_lossy().into_owned()];
        let hit = probe(&repos, "foo-1.0.tar.xz").unwrap();
        assert!(matches!(hit, Some(Hit::Local { .. })));
    }

    #[test]
    fn local_probe_misses_when_absent() {
        let repo = tempdir().unwrap();
        let repos = vec![repo.path().to_string_lossy().into_owned()];
        let hit = probe(&repos, "foo-1.0.tar.xz").unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn upload_copies_archive_and_sidecar_locally() {
        let src = tempdir().unwrap();
        let archive_path = src.path().join("foo-1.0.tar.xz");
        let sidecar_path = src.path().join("foo-1.0.tar.xz.meta.json");
        fs::write(&archive_path, b"pkg").unwrap();
        fs::write(&sidecar_path, b"{}").unwrap();

        let dest = tempdir().unwrap();
        upload(&dest.path().to_string_lossy(), &archive_path, &sidecar_path).unwrap();

        assert!(dest.path().join("foo-1.0.tar.xz").exists());
        assert!(dest.path().join("foo-1.0.tar.xz.meta.json").exists());
    }

    #[test]
    fn upload_rejects_http_targets() {
        let src = tempdir().unwrap();
        let archive_path = src.path().join("foo-1.0.tar.xz");
        fs::write(&archive_path, b"pkg").unwrap();
        let result = upload("http://example.com/repo", &archive_path, &archive_path);
        assert!(matches!(result, Err(Error::HttpUpload { .. })));
    }
}
