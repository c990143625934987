// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap::{Args, Subcommand as ClapSubcommand};
use clap_complete::generate_to;
use clap_complete::shells::{Bash, Fish, Zsh};
use clap_mangen::Man;
use fs_err::{self as fs, File};
use thiserror::Error;

use crate::env::{self, Env};

mod books;
mod execute;
mod parse;
mod profiles;
mod script;
mod sections;

#[derive(Debug, Parser)]
pub struct Command {
    #[command(flatten)]
    pub global: Global,
    #[command(subcommand)]
    pub subcommand: Option<Subcommand>,
}

#[derive(Debug, Args)]
pub struct Global {
    #[arg(short, long = "verbose", default_value = "false", global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Move freshly built packages into a named repo directory after `execute`")]
    pub mv_to_repo: Option<String>,
    #[arg(long, global = true, hide = true)]
    pub generate_manpages: Option<PathBuf>,
    #[arg(long, global = true, hide = true)]
    pub generate_completions: Option<PathBuf>,
}

#[derive(Debug, ClapSubcommand)]
pub enum Subcommand {
    ListBooks,
    ListProfiles(profiles::ListProfiles),
    ListSections(sections::ListSections),
    AddBook(books::AddBook),
    AddProfile(profiles::AddProfile),
    InstallBook(books::InstallBook),
    Parse(parse::Parse),
    Script(script::Script),
    Execute(execute::Execute),
}

pub fn process(command: Command) -> Result<(), Error> {
    let Command { global, subcommand } = command;

    if let Some(dir) = &global.generate_manpages {
        fs::create_dir_all(dir)?;
        let main_cmd = Command::command();
        let main_man = Man::new(main_cmd.clone());
        let mut buffer = File::create(dir.join("kiln.1"))?;
        main_man.render(&mut buffer)?;
        for sub in main_cmd.get_subcommands() {
            let sub_man = Man::new(sub.clone());
            let name = format!("kiln-{}.1", sub.get_name());
            let mut buffer = File::create(dir.join(&name))?;
            sub_man.render(&mut buffer)?;
        }
        return Ok(());
    }

    if let Some(dir) = &global.generate_completions {
        fs::create_dir_all(dir)?;
        let mut cmd = Command::command();
        generate_to(Bash, &mut cmd, "kiln", dir)?;
        generate_to(Fish, &mut cmd, "kiln", dir)?;
        generate_to(Zsh, &mut cmd, "kiln", dir)?;
        return Ok(());
    }

    if global.mv_to_repo.is_some() && !matches!(subcommand, Some(Subcommand::Execute(_))) {
        eprintln!("The `--mv-to-repo` flag must be used with the `execute` subcommand");
        std::process::exit(1);
    }

    let env = Env::new(global.cache_dir.clone(), global.config_dir.clone(), global.data_dir.clone())?;

    if global.verbose {
        println!("cache directory: {:?}", env.cache_dir);
        println!("data directory: {:?}", env.data_dir);
    }

    match subcommand {
        Some(Subcommand::ListBooks) => books::list_books(&env),
        Some(Subcommand::ListProfiles(command)) => profiles::list_profiles(&env, command),
        Some(Subcommand::ListSections(command)) => sections::list_sections(&env, command)?,
        Some(Subcommand::AddBook(command)) => books::add_book(&env, command)?,
        Some(Subcommand::AddProfile(command)) => profiles::add_profile(&env, command)?,
        Some(Subcommand::InstallBook(command)) => books::install_book(&env, command)?,
        Some(Subcommand::Parse(command)) => parse::parse(&env, command)?,
        Some(Subcommand::Script(command)) => script::script(&env, command)?,
        Some(Subcommand::Execute(command)) => execute::execute(&env, command, global.mv_to_repo.as_deref())?,
        None => (),
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Env(#[from] env::Error),
    #[error(transparent)]
    Books(#[from] books::Error),
    #[error(transparent)]
    Profiles(#[from] profiles::Error),
    #[error(transparent)]
    Sections(#[from] sections::Error),
    #[error(transparent)]
    Parse(#[from] parse::Error),
    #[error(transparent)]
    Script(#[from] script::Error),
    #[error(transparent)]
    Execute(#[from] execute::Error),
    #[error("io error")]
    Io(#[from] std::io::Error),
}
