// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::Args;
use fs_err as fs;
use kiln_core::book;
use kiln_core::exec::{Executer, ExecuterConfig};
use kiln_core::timing::{Kind, Timing};
use thiserror::Error;
use tui::Styled;

use crate::env::Env;

#[derive(Debug, Args)]
pub struct Execute {
    #[arg(long)]
    pub book: String,
    #[arg(long)]
    pub profile: String,
    /// Skip the interactive confirmation before installing onto `/`.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("reading {path:?}")]
    Io { path: std::path::PathBuf, source: std::io::Error },
    #[error("parsing {path:?} as YAML")]
    Yaml { path: std::path::PathBuf, source: serde_yaml::Error },
    #[error(transparent)]
    ReadRecords(#[from] book::Error),
    #[error(transparent)]
    Exec(#[from] kiln_core::exec::Error),
    #[error("moving {archive:?} into repo {repo:?}")]
    MvToRepo { archive: std::path::PathBuf, repo: std::path::PathBuf, source: std::io::Error },
}

pub fn execute(env: &Env, command: Execute, mv_to_repo: Option<&str>) -> Result<(), Error> {
    let mut timing = Timing::default();
    let timer = timing.begin(Kind::Execute);

    let paths = env.paths(&command.book, &command.profile);

    let config_path = paths.profile_dir().join("executer.yaml");
    let config_yaml = fs::read_to_string(&config_path).map_err(|source| Error::Io { path: config_path.clone(), source })?;
    let mut config: ExecuterConfig =
        serde_yaml::from_str(&config_yaml).map_err(|source| Error::Yaml { path: config_path, source })?;

    // `${var}` tokens in repo/upload/package paths expand against
    // build_dir/profiles_dir/package_dir/book/profile, then environment
    // variables, iteratively.
    config.package_dir = paths.expand_vars(&config.package_dir);
    config.chroot_dir = paths.expand_vars(&config.chroot_dir);
    config.upload_repo = paths.expand_vars(&config.upload_repo);
    for repo in &mut config.download_repos {
        *repo = paths.expand_vars(repo);
    }

    let records = book::read_records(&paths.parser_metadata_dir())?;

    let chroot_dir = std::path::PathBuf::from(&config.chroot_dir);
    let downloads_dir = paths.downloads_dir();
    let logs_dir = paths.logs_dir();
    let executer = Executer::new(&config, &command.book, &command.profile, &chroot_dir, &downloads_dir, &logs_dir)
        .with_auto_confirm(command.yes);

    let produced = executer.run_all(&paths.scripts_dir(), &records, Some(Path::new("/")))?;

    timing.finish(timer);
    println!("Produced {} packages", produced.len().to_string().bold());
    timing.print_table();

    if let Some(repo) = mv_to_repo {
        let repo_dir = paths.package_dir().join(repo);
        fs::create_dir_all(&repo_dir).map_err(|source| Error::Io { path: repo_dir.clone(), source })?;
        for archive in &produced {
            let Some(file_name) = archive.file_name() else { continue };
            let dest = repo_dir.join(file_name);
            fs::rename(archive, &dest).map_err(|source| Error::MvToRepo { archive: archive.clone(), repo: repo_dir.clone(), source })?;
            println!("Moved {} -> {}", archive.display(), dest.display());
        }
    }

    Ok(())
}
