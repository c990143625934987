// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Args;
use fs_err as fs;
use kiln_core::book;
use kiln_core::script::{Scripter, ScripterConfig};
use kiln_core::timing::{Kind, Timing};
use thiserror::Error;
use tui::Styled;

use crate::env::Env;

#[derive(Debug, Args)]
pub struct Script {
    #[arg(long)]
    pub book: String,
    #[arg(long)]
    pub profile: String,
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
    Script(#[from] kiln_core::script::Error),
}

pub fn script(env: &Env, command: Script) -> Result<(), Error> {
    let mut timing = Timing::default();
    let timer = timing.begin(Kind::Script);

    let paths = env.paths(&command.book, &command.profile);

    let config_path = paths.profile_dir().join("scripter.yaml");
    let config_yaml = fs::read_to_string(&config_path).map_err(|source| Error::Io { path: config_path.clone(), source })?;
    let config: ScripterConfig =
        serde_yaml::from_str(&config_yaml).map_err(|source| Error::Yaml { path: config_path, source })?;

    let records = book::read_records(&paths.parser_metadata_dir())?;

    let profile_dir = paths.profile_dir();
    let scripter = Scripter::new(&profile_dir, &config);
    let written = scripter.run(&records, &paths.scripts_dir())?;

    timing.finish(timer);
    println!("Wrote {} scripts to {}", written.len().to_string().bold(), paths.scripts_dir().display());
    timing.print_table();
    Ok(())
}
