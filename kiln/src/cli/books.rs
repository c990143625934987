// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

use clap::Args;
use fs_err as fs;
use thiserror::Error;
use tui::Styled;

use crate::env::Env;
use crate::registry::BookRegistry;

#[derive(Debug, Args)]
pub struct AddBook {
    pub book: String,
    #[arg(long)]
    pub repo_url: String,
}

#[derive(Debug, Args)]
pub struct InstallBook {
    #[arg(long)]
    pub book: String,
    #[arg(long)]
    pub profile: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
    #[error("running `git {args}`")]
    GitSpawn { args: String, source: std::io::Error },
    #[error("`git {args}` exited with {status}")]
    GitFailed { args: String, status: std::process::ExitStatus },
    #[error("running `make` in {dir:?}")]
    MakeSpawn { dir: std::path::PathBuf, source: std::io::Error },
    #[error("`make` in {dir:?} exited with {status}")]
    MakeFailed { dir: std::path::PathBuf, status: std::process::ExitStatus },
    #[error("creating {path:?}")]
    Io { path: std::path::PathBuf, source: std::io::Error },
}

pub fn list_books(env: &Env) {
    let registry = BookRegistry::load(&env.config);
    if registry.0.is_empty() {
        println!("{}", "No books registered.".dim());
        return;
    }
    for (name, repo_url) in &registry.0 {
        println!("{}  {repo_url}", name.bold());
    }
}

pub fn add_book(env: &Env, command: AddBook) -> Result<(), Error> {
    BookRegistry::add(&env.config, &command.book, &command.repo_url)?;
    println!("Registered book {} -> {}", command.book.bold(), command.repo_url);
    Ok(())
}

pub fn install_book(env: &Env, command: InstallBook) -> Result<(), Error> {
    let registry = BookRegistry::load(&env.config);
    let repo_url = registry.require(&command.book)?;

    let paths = env.paths(&command.book, &command.profile);
    let src_dir = paths.book_src_dir();

    if src_dir.join(".git").exists() {
        run_git(&["-C", &src_dir.to_string_lossy(), "pull"])?;
    } else {
        fs::create_dir_all(src_dir.parent().unwrap_or(&src_dir)).map_err(|source| Error::Io { path: src_dir.clone(), source })?;
        run_git(&["clone", repo_url, &src_dir.to_string_lossy()])?;
    }

    let status = Command::new("make")
        .current_dir(&src_dir)
        .status()
        .map_err(|source| Error::MakeSpawn { dir: src_dir.clone(), source })?;
    if !status.success() {
        return Err(Error::MakeFailed { dir: src_dir, status });
    }

    println!("Installed book {} into {}", command.book.bold(), src_dir.display());
    Ok(())
}

fn run_git(args: &[&str]) -> Result<(), Error> {
    let joined = args.join(" ");
    let status = Command::new("git")
        .args(args)
        .status()
        .map_err(|source| Error::GitSpawn { args: joined.clone(), source })?;
    if !status.success() {
        return Err(Error::GitFailed { args: joined, status });
    }
    Ok(())
}
