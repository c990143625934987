// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Resolved runtime locations, plus the config manager every subcommand
//! loads book/profile registries through.

use std::path::PathBuf;

use kiln_core::Paths;
use thiserror::Error;

const PROGRAM: &str = "kiln";

#[derive(Debug, Error)]
pub enum Error {
    #[error("resolving a user config directory ($XDG_CONFIG_HOME or $HOME not set)")]
    NoConfigDir(#[from] config::CreateUserError),
    #[error("resolving a cache directory")]
    NoCacheDir,
    #[error("resolving a data directory")]
    NoDataDir,
}

pub struct Env {
    pub config: config::Manager,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Env {
    pub fn new(cache_dir: Option<PathBuf>, config_dir: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self, Error> {
        let cache_dir = cache_dir
            .or_else(|| dirs::cache_dir().map(|d| d.join(PROGRAM)))
            .ok_or(Error::NoCacheDir)?;
        let data_dir = data_dir
            .or_else(|| dirs::data_dir().map(|d| d.join(PROGRAM)))
            .ok_or(Error::NoDataDir)?;

        let config = match config_dir {
            Some(dir) => config::Manager::custom(dir),
            None => config::Manager::user(PROGRAM)?,
        };

        Ok(Self { config, cache_dir, data_dir })
    }

    pub fn build_dir(&self) -> PathBuf {
        self.data_dir.join("build")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.data_dir.join("profiles")
    }

    pub fn package_dir(&self) -> PathBuf {
        self.cache_dir.join("packages")
    }

    pub fn paths(&self, book: &str, profile: &str) -> Paths {
        Paths::new(self.build_dir(), self.profiles_dir(), self.package_dir(), book, profile)
    }
}
