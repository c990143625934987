// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The Executer: runs one generated script per [`PackageRecord`], packages
//! the result, and installs/uploads it, honoring a cache of already-built
//! archives.
//!
//! Mirrors `skw_executer.py`'s `run_all` / `_run_script` / `_create_archive`
//! / `_install_package` top-level flow.

pub mod archive;
pub mod cache;
pub mod config;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use fs_err as fs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::book::{PackageRecord, slug};
pub use config::{ExecuterConfig, PackageFormat};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no package record matches script {script:?}")]
    UnknownScript { script: PathBuf },
    #[error("listing scripts in {dir:?}")]
    ListScripts { dir: PathBuf, source: std::io::Error },
    #[error("template placeholder ${{{key}}} is missing or empty for {name}")]
    MissingTemplateKey { key: String, name: String },
    #[error("running script {script:?}")]
    RunScript { script: PathBuf, source: std::io::Error },
    #[error("script {script:?} exited with {status}")]
    ScriptFailed { script: PathBuf, status: std::process::ExitStatus },
    #[error("running pre-package hook {hook:?}")]
    PrePackageHook { hook: PathBuf, source: std::io::Error },
    #[error("pre-package hook {hook:?} exited with {status}")]
    PrePackageHookFailed { hook: PathBuf, status: std::process::ExitStatus },
    #[error("staging destdir {path:?}")]
    StageDestdir { path: PathBuf, source: std::io::Error },
    #[error("writing metadata {path:?}")]
    WriteMetadata { path: PathBuf, source: std::io::Error },
    #[error("serializing metadata for {name}")]
    SerializeMetadata { name: String, source: serde_json::Error },
    #[error(transparent)]
    Archive(#[from] archive::Error),
    #[error(transparent)]
    Cache(#[from] cache::Error),
    #[error(transparent)]
    Container(#[from] container::Error),
    #[error("root confirmation declined for install target {target:?}")]
    InstallDeclined { target: PathBuf },
    #[error("prompting for root confirmation")]
    ConfirmPrompt { source: std::io::Error },
    #[error("opening log file {path:?}")]
    OpenLog { path: PathBuf, source: std::io::Error },
    #[error("spawning script {script:?}")]
    SpawnScript { script: PathBuf, source: std::io::Error },
}

/// Whether a script runs directly on the host or inside a chrooted tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Host,
    Chroot,
}

/// Everything recorded about one build, both embedded in the archive
/// under `_metadata/{name}--{version}.json` and written as a sidecar
/// `<archive>.meta.json` next to it as a builder-host sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMetadata {
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
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub builder_host: String,
    #[serde(default)]
    pub builder_user: String,
}

pub struct Executer<'a> {
    config: &'a ExecuterConfig,
    book: &'a str,
    profile: &'a str,
    chroot_dir: &'a Path,
    downloads_dir: &'a Path,
    logs_dir: &'a Path,
    /// Skips the interactive `[y/N]` root-install prompt when true
    /// (the CLI's `--yes` flag).
    auto_confirm: bool,
    script_name_re: Regex,
}

impl<'a> Executer<'a> {
    pub fn new(
        config: &'a ExecuterConfig,
        book: &'a str,
        profile: &'a str,
        chroot_dir: &'a Path,
        downloads_dir: &'a Path,
        logs_dir: &'a Path,
    ) -> Self {
        Self {
            config,
            book,
            profile,
            chroot_dir,
            downloads_dir,
            logs_dir,
            auto_confirm: false,
            script_name_re: Regex::new(r"^\d+_(?P<key>.+)\.sh$").expect("static script name regex"),
        }
    }

    pub fn with_auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.auto_confirm = auto_confirm;
        self
    }

    /// Run every script under `scripts_dir`, in filename order, against
    /// `records`. `install_target` mirrors `--mv-to-repo`/install
    /// destinations: `None` means package-only, no install.
    pub fn run_all(
        &self,
        scripts_dir: &Path,
        records: &[PackageRecord],
        install_target: Option<&Path>,
    ) -> Result<Vec<PathBuf>, Error> {
        let by_key: BTreeMap<String, &PackageRecord> =
            records.iter().map(|r| (format!("{}_{}", r.key().0, r.key().1), r)).collect();

        let mut scripts: Vec<PathBuf> = fs::read_dir(scripts_dir)
            .map_err(|source| Error::ListScripts { dir: scripts_dir.to_owned(), source })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sh"))
            .collect();
        scripts.sort();

        let mut produced = Vec::new();

        for script in &scripts {
            let record = self.locate_record(script, &by_key)?;
            if let Some(path) = self.run_one(script, record, install_target)? {
                produced.push(path);
            }
        }

        Ok(produced)
    }

    fn locate_record<'r>(&self, script: &Path, by_key: &BTreeMap<String, &'r PackageRecord>) -> Result<&'r PackageRecord, Error> {
        let file_name = script.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let key = self
            .script_name_re
            .captures(file_name)
            .and_then(|caps| caps.name("key").map(|m| m.as_str().to_owned()))
            .ok_or_else(|| Error::UnknownScript { script: script.to_owned() })?;

        by_key
            .get(&key)
            .copied()
            .ok_or_else(|| Error::UnknownScript { script: script.to_owned() })
    }

    fn run_one(&self, script: &Path, record: &PackageRecord, install_target: Option<&Path>) -> Result<Option<PathBuf>, Error> {
        let exec_mode = self.exec_mode(record);
        let should_package = self.should_package(record);
        let pkg_file = self.package_filename(record)?;
        let log_path = self.log_path(script)?;

        if should_package {
            if let Some(hit) = cache::probe(&self.config.download_repos, &pkg_file)? {
                let (archive_path, _sidecar) = cache::resolve(&hit, &pkg_file, self.downloads_dir)?;

                match archive::contains_metadata(&archive_path, self.config.package_format, &record.name, &record.version) {
                    Ok(true) => {}
                    Ok(false) => {
                        let note = format!(
                            "WARN: cached {pkg_file} is missing _metadata/{}--{}.json",
                            record.name, record.version
                        );
                        tracing::warn!(target: "kiln::exec", "{note}");
                        self.append_log(&log_path, &note)?;
                    }
                    Err(error) => {
                        let note = format!("WARN: failed to inspect cached {pkg_file}: {error}");
                        tracing::warn!(target: "kiln::exec", "{note}");
                        self.append_log(&log_path, &note)?;
                    }
                }

                let note = format!("SKIPPED: using cached {pkg_file} from {}", hit.repo_display());
                tracing::info!(target: "kiln::exec", "{note}");
                self.append_log(&log_path, &note)?;

                if let Some(target) = install_target {
                    self.install(&archive_path, record, target, exec_mode)?;
                }
                return Ok(Some(archive_path));
            }
        }

        let destdir = self.stage_destdir(record, exec_mode)?;
        self.run_script(script, record, exec_mode, &destdir, &log_path)?;

        if !should_package {
            self.cleanup(&destdir);
            return Ok(None);
        }

        let archive_path = self.package(record, &destdir, exec_mode, &pkg_file)?;

        if let Some(target) = install_target {
            self.install(&archive_path, record, target, exec_mode)?;
        }

        cache::upload(&self.config.upload_repo, &archive_path, &sidecar_path(&archive_path))?;

        self.cleanup(&destdir);

        Ok(Some(archive_path))
    }

    fn exec_mode(&self, record: &PackageRecord) -> ExecMode {
        if let Some(over) = record.book_meta.get("exec_mode") {
            return if over == "chroot" { ExecMode::Chroot } else { ExecMode::Host };
        }

        let name_version = record.name_version();
        if self.config.host.matches(&record.name, &name_version, &record.section_id, &record.chapter_id) {
            return ExecMode::Host;
        }
        if self.config.chroot.matches(&record.name, &name_version, &record.section_id, &record.chapter_id) {
            return ExecMode::Chroot;
        }

        ExecMode::Host
    }

    fn should_package(&self, record: &PackageRecord) -> bool {
        if let Some(over) = record.book_meta.get("package") {
            return over != "false" && over != "exclude";
        }

        let name_version = record.name_version();
        if self
            .config
            .package_exclude
            .matches(&record.name, &name_version, &record.section_id, &record.chapter_id)
        {
            return false;
        }
        if !self.config.package_include.packages.is_empty()
            || !self.config.package_include.sections.is_empty()
            || !self.config.package_include.chapters.is_empty()
        {
            return self
                .config
                .package_include
                .matches(&record.name, &name_version, &record.section_id, &record.chapter_id);
        }

        true
    }

    fn package_filename(&self, record: &PackageRecord) -> Result<String, Error> {
        let fields: BTreeMap<&str, &str> = BTreeMap::from([
            ("name", record.name.as_str()),
            ("version", record.version.as_str()),
            ("chapter_id", record.chapter_id.as_str()),
            ("section_id", record.section_id.as_str()),
        ]);

        let base = expand_template(&self.config.package_name_template, &fields, &record.name)?;
        Ok(format!("{base}.{}", self.config.package_format.extension()))
    }

    fn stage_destdir(&self, record: &PackageRecord, exec_mode: ExecMode) -> Result<PathBuf, Error> {
        let name_version = slug(&record.name_version());
        let destdir = match exec_mode {
            ExecMode::Host => self.downloads_dir.parent().unwrap_or(self.downloads_dir).join("destdir").join(&name_version),
            ExecMode::Chroot => self.chroot_dir.join("destdir").join(&name_version),
        };
        fs::create_dir_all(&destdir).map_err(|source| Error::StageDestdir { path: destdir.clone(), source })?;
        Ok(destdir)
    }

    fn run_script(
        &self,
        script: &Path,
        record: &PackageRecord,
        exec_mode: ExecMode,
        destdir: &Path,
        log_path: &Path,
    ) -> Result<(), Error> {
        let mut command = match exec_mode {
            ExecMode::Host => {
                let destdir_str = destdir.to_string_lossy().into_owned();
                let cmd = container::host_command(script, Some(&destdir_str));
                RunTarget::Host(cmd)
            }
            ExecMode::Chroot => {
                let script_name = script.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                let binds = vec![
                    container::Bind::new("/dev", "/dev"),
                    container::Bind::new("/proc", "/proc"),
                    container::Bind::new("/sys", "/sys"),
                    container::Bind::new(script.parent().unwrap_or(script), "/scripts"),
                ];
                let mounts = container::Mounts::new(self.chroot_dir, &binds)?;

                // `destdir` is the host-absolute path under `chroot_dir`; the
                // script inside the chroot sees the same tree rooted at `/`.
                let internal_destdir = format!(
                    "/{}",
                    destdir.strip_prefix(self.chroot_dir).unwrap_or(destdir).to_string_lossy()
                );
                let cmd = container::chroot_command(self.chroot_dir, script_name, Some(&internal_destdir));
                RunTarget::Chroot(cmd, mounts)
            }
        };

        let status = run_teed(command.command_mut(), script, log_path)?;

        if !status.success() {
            return Err(Error::ScriptFailed { script: script.to_owned(), status });
        }

        let _ = record;
        Ok(())
    }

    /// `<logs_dir>/{script_stem}.log`, where `script_stem` is the script's
    /// file name with its `.sh` extension stripped.
    fn log_path(&self, script: &Path) -> Result<PathBuf, Error> {
        fs::create_dir_all(self.logs_dir).map_err(|source| Error::OpenLog { path: self.logs_dir.to_owned(), source })?;
        let stem = script.file_stem().and_then(|s| s.to_str()).unwrap_or("script");
        Ok(self.logs_dir.join(format!("{stem}.log")))
    }

    fn append_log(&self, log_path: &Path, line: &str) -> Result<(), Error> {
        use std::io::Write as _;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|source| Error::OpenLog { path: log_path.to_owned(), source })?;
        writeln!(file, "{line}").map_err(|source| Error::OpenLog { path: log_path.to_owned(), source })?;
        Ok(())
    }

    fn package(&self, record: &PackageRecord, destdir: &Path, exec_mode: ExecMode, pkg_file: &str) -> Result<PathBuf, Error> {
        if let Some(hook) = &self.config.pre_package_hook {
            self.run_pre_package_hook(hook, record, destdir, exec_mode, pkg_file)?;
        }

        let files = archive::list_files(destdir)?;

        let metadata_dir = destdir.join("_metadata");
        fs::create_dir_all(&metadata_dir).map_err(|source| Error::StageDestdir { path: metadata_dir.clone(), source })?;

        let metadata = BuildMetadata {
            package_name: record.name.clone(),
            package_version: record.version.clone(),
            book: self.book.to_owned(),
            profile: self.profile.to_owned(),
            chapter_id: record.chapter_id.clone(),
            section_id: record.section_id.clone(),
            exec_mode: if exec_mode == ExecMode::Chroot { "chroot".to_owned() } else { "host".to_owned() },
            build_date: format_now(),
            hostname: hostname(),
            files,
            sha256: String::new(),
            builder_host: hostname(),
            builder_user: std::env::var("USER").unwrap_or_default(),
        };

        let metadata_path = metadata_dir.join(format!("{}--{}.json", record.name, record.version));
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|source| Error::SerializeMetadata { name: record.name.clone(), source })?;
        fs::write(&metadata_path, json).map_err(|source| Error::WriteMetadata { path: metadata_path, source })?;

        let package_dir = PathBuf::from(&self.config.package_dir);
        fs::create_dir_all(&package_dir).map_err(|source| Error::StageDestdir { path: package_dir.clone(), source })?;
        let archive_path = package_dir.join(pkg_file);
        archive::create(destdir, &archive_path, self.config.package_format)?;

        let sha256 = archive::sha256_file(&archive_path)?;
        let sidecar = cache::Sidecar {
            package_name: metadata.package_name,
            package_version: metadata.package_version,
            book: metadata.book,
            profile: metadata.profile,
            chapter_id: metadata.chapter_id,
            section_id: metadata.section_id,
            exec_mode: metadata.exec_mode,
            build_date: metadata.build_date,
            hostname: metadata.hostname,
            files: metadata.files,
            sha256,
            builder_host: metadata.builder_host,
            builder_user: metadata.builder_user,
        };
        let sidecar_json = serde_json::to_vec_pretty(&sidecar)
            .map_err(|source| Error::SerializeMetadata { name: record.name.clone(), source })?;
        fs::write(sidecar_path(&archive_path), sidecar_json)
            .map_err(|source| Error::WriteMetadata { path: sidecar_path(&archive_path), source })?;

        Ok(archive_path)
    }

    fn run_pre_package_hook(
        &self,
        hook: &str,
        record: &PackageRecord,
        destdir: &Path,
        exec_mode: ExecMode,
        pkg_file: &str,
    ) -> Result<(), Error> {
        let hook_path = PathBuf::from(hook);
        let status = std::process::Command::new(&hook_path)
            .env("SKW_DESTDIR", destdir)
            .env("SKW_PKG_FILE", pkg_file)
            .env("SKW_EXEC_MODE", if exec_mode == ExecMode::Chroot { "chroot" } else { "host" })
            .env("SKW_BOOK", self.book)
            .env("SKW_PROFILE", self.profile)
            .env("SKW_PACKAGE_DIR", &self.config.package_dir)
            .env("SKW_CHROOT_DIR", self.chroot_dir)
            .env("SKW_CHAPTER_ID", &record.chapter_id)
            .env("SKW_SECTION_ID", &record.section_id)
            .env("SKW_PACKAGE_NAME", &record.name)
            .env("SKW_PACKAGE_VERSION", &record.version)
            .status()
            .map_err(|source| Error::PrePackageHook { hook: hook_path.clone(), source })?;

        if !status.success() {
            return Err(Error::PrePackageHookFailed { hook: hook_path, status });
        }

        Ok(())
    }

    fn install(&self, archive_path: &Path, record: &PackageRecord, target: &Path, exec_mode: ExecMode) -> Result<(), Error> {
        if target == Path::new("/") && self.config.require_confirm_root && !self.auto_confirm {
            let confirmed = tui::confirm(format!("Install {} to / ?", record.name_version()))
                .map_err(|source| Error::ConfirmPrompt { source })?;
            if !confirmed {
                return Err(Error::InstallDeclined { target: target.to_owned() });
            }
        }

        let resolved_target = if exec_mode == ExecMode::Chroot {
            self.chroot_dir.to_owned()
        } else {
            let extract_target = self.config.extract_targets.resolve(
                &record.name,
                &record.section_id,
                &record.chapter_id,
                &self.config.default_extract_dir,
            );
            if extract_target == "/" { target.to_owned() } else { target.join(extract_target.trim_start_matches('/')) }
        };

        archive::safe_extract(archive_path, &resolved_target, self.config.package_format)?;
        Ok(())
    }

    fn cleanup(&self, destdir: &Path) {
        if let Err(error) = fs::remove_dir_all(destdir) {
            tracing::warn!(%error, path = %destdir.display(), "failed to clean up destdir");
        }
    }
}

/// Carries the bind-mount guard alongside the command to run under it, so
/// mounts stay live until the process has exited and are unwound (in
/// reverse order, via `Mounts`' `Drop`) once this value goes out of scope.
enum RunTarget {
    Host(std::process::Command),
    Chroot(std::process::Command, container::Mounts),
}

impl RunTarget {
    fn command_mut(&mut self) -> &mut std::process::Command {
        match self {
            RunTarget::Host(cmd) => cmd,
            RunTarget::Chroot(cmd, _mounts) => cmd,
        }
    }
}

/// Spawn `command`, streaming its stdout and stderr to both the console and
/// `log_path` (appended), matching the host/chroot mode's "stream to a log
/// file under `<exec_dir>/logs/` while echoing to the console" requirement.
fn run_teed(command: &mut std::process::Command, script: &Path, log_path: &Path) -> Result<std::process::ExitStatus, Error> {
    use std::io::{BufRead, BufReader, Write as _};
    use std::process::Stdio;
    use std::sync::{Arc, Mutex};

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|source| Error::OpenLog { path: log_path.to_owned(), source })?;
    let log_file = Arc::new(Mutex::new(log_file));

    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::SpawnScript { script: script.to_owned(), source })?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let out_log = Arc::clone(&log_file);
    let stdout_thread = std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            println!("{line}");
            if let Ok(mut file) = out_log.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
    });

    let err_log = Arc::clone(&log_file);
    let stderr_thread = std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            eprintln!("{line}");
            if let Ok(mut file) = err_log.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
    });

    let status = child.wait().map_err(|source| Error::RunScript { script: script.to_owned(), source })?;
    let _ = stdout_thread.join();
    let _ = stderr_thread.join();

    Ok(status)
}

fn sidecar_path(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".meta.json");
    PathBuf::from(name)
}

fn expand_template(template: &str, fields: &BTreeMap<&str, &str>, name: &str) -> Result<String, Error> {
    let re = Regex::new(r"\$\{([^}]+)\}").expect("static template placeholder regex");
    let mut error = None;

    let expanded = re.replace_all(template, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match fields.get(key).filter(|v| !v.is_empty()) {
            Some(value) => (*value).to_owned(),
            None => {
                error.get_or_insert(key.to_owned());
                String::new()
            }
        }
    });

    match error {
        Some(key) => Err(Error::MissingTemplateKey { key, name: name.to_owned() }),
        None => Ok(expanded.into_owned()),
    }
}

fn format_now() -> String {
    let now: DateTime<Utc> = SystemTime::now().into();
    now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::exec::config::{ExecuterConfig, IncludeLists, PackageFormat};

    fn record(chapter: &str, section: &str, name: &str, version: &str) -> PackageRecord {
        PackageRecord {
            chapter_id: chapter.into(),
            section_id: section.into(),
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    fn base_config(package_dir: &Path) -> ExecuterConfig {
        ExecuterConfig {
            package_dir: package_dir.to_string_lossy().into_owned(),
            download_repos: vec![],
            upload_repo: String::new(),
            chroot_dir: "/nonexistent".into(),
            default_extract_dir: "/".into(),
            require_confirm_root: true,
            package_format: PackageFormat::Tar,
            package_name_template: "${name}-${version}".into(),
            host: IncludeLists::default(),
            chroot: IncludeLists::default(),
            package_include: IncludeLists::default(),
            package_exclude: IncludeLists::default(),
            extract_targets: Default::default(),
            pre_package_hook: None,
        }
    }

    #[test]
    fn package_filename_expands_template() {
        let dir = tempdir().unwrap();
        let config = base_config(dir.path());
        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), dir.path(), dir.path());
        let record = record("c", "s", "foo", "1.2");
        assert_eq!(executer.package_filename(&record).unwrap(), "foo-1.2.tar");
    }

    #[test]
    fn package_filename_fails_on_missing_key() {
        let dir = tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.package_name_template = "${missing}".into();
        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), dir.path(), dir.path());
        let record = record("c", "s", "foo", "1.2");
        assert!(matches!(executer.package_filename(&record), Err(Error::MissingTemplateKey { .. })));
    }

    #[test]
    fn locate_record_matches_by_chapter_section_key() {
        let dir = tempdir().unwrap();
        let config = base_config(dir.path());
        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), dir.path(), dir.path());
        let records = vec![record("Chapter 5", "Binutils-2.41", "binutils", "2.41")];
        let by_key: BTreeMap<String, &PackageRecord> =
            records.iter().map(|r| (format!("{}_{}", r.key().0, r.key().1), r)).collect();

        let script = dir.path().join("0001_chapter-5_binutils-2.41.sh");
        let found = executer.locate_record(&script, &by_key).unwrap();
        assert_eq!(found.name, "binutils");
    }

    #[test]
    fn run_all_skips_and_installs_cache_hit_scenario_f() {
        let dir = tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts");
        fs::create_dir_all(&scripts_dir).unwrap();
        fs::write(scripts_dir.join("0001_c_s.sh"), "#!/bin/bash\nexit 0\n").unwrap();

        let downloads = dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        let logs = dir.path().join("logs");

        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("foo-1.0.tar"), b"cached").unwrap();

        let mut config = base_config(dir.path().join("pkgs").as_path());
        config.download_repos = vec![repo.to_string_lossy().into_owned()];
        config.require_confirm_root = false;

        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), &downloads, &logs);
        let records = vec![record("c", "s", "foo", "1.0")];

        let produced = executer.run_all(&scripts_dir, &records, None).unwrap();
        assert_eq!(produced, vec![repo.join("foo-1.0.tar")]);

        let log_contents = fs::read_to_string(logs.join("0001_c_s.log")).unwrap();
        assert!(log_contents.contains("SKIPPED: using cached foo-1.0.tar from"));
    }

    #[test]
    fn run_script_tees_output_to_log_file() {
        let dir = tempdir().unwrap();
        let config = base_config(dir.path());
        let logs = dir.path().join("logs");
        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), dir.path(), &logs);

        let script = dir.path().join("0001_c_s.sh");
        fs::write(&script, "#!/bin/bash\necho hello-stdout\necho hello-stderr >&2\n").unwrap();
        let destdir = dir.path().join("destdir");
        fs::create_dir_all(&destdir).unwrap();

        let r = record("c", "s", "foo", "1.0");
        let log_path = executer.log_path(&script).unwrap();
        executer.run_script(&script, &r, ExecMode::Host, &destdir, &log_path).unwrap();

        let log_contents = fs::read_to_string(&log_path).unwrap();
        assert!(log_contents.contains("hello-stdout"));
        assert!(log_contents.contains("hello-stderr"));
    }

    #[test]
    fn should_package_respects_explicit_override() {
        let dir = tempdir().unwrap();
        let config = base_config(dir.path());
        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), dir.path(), dir.path());
        let mut r = record("c", "s", "foo", "1.0");
        r.book_meta.insert("package".into(), "false".into());
        assert!(!executer.should_package(&r));
    }

    #[test]
    fn exec_mode_respects_explicit_override() {
        let dir = tempdir().unwrap();
        let config = base_config(dir.path());
        let executer = Executer::new(&config, "lfs", "default", Path::new("/chroot"), dir.path(), dir.path());
        let mut r = record("c", "s", "foo", "1.0");
        r.book_meta.insert("exec_mode".into(), "chroot".into());
        assert_eq!(executer.exec_mode(&r), ExecMode::Chroot);
    }
}
