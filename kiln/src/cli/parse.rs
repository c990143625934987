// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Args;
use kiln_core::book;
use kiln_core::timing::{Kind, Timing};
use thiserror::Error;
use tui::Styled;

use super::sections;
use crate::env::Env;

#[derive(Debug, Args)]
pub struct Parse {
    #[arg(long)]
    pub book: String,
    #[arg(long)]
    pub profile: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] sections::Error),
    #[error(transparent)]
    Write(#[from] book::Error),
}

pub fn parse(env: &Env, command: Parse) -> Result<(), Error> {
    let mut timing = Timing::default();
    let timer = timing.begin(Kind::Parse);

    let records = sections::load_and_parse(env, &command.book, &command.profile)?;
    let dir = env.paths(&command.book, &command.profile).parser_metadata_dir();
    book::write_records(&dir, &records)?;

    timing.finish(timer);
    println!("Wrote {} records to {}", records.len().to_string().bold(), dir.display());
    timing.print_table();
    Ok(())
}
