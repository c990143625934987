// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Args;
use fs_err as fs;
use thiserror::Error;
use tui::Styled;

use crate::env::Env;
use crate::registry::ProfileRegistry;

#[derive(Debug, Args)]
pub struct ListProfiles {
    #[arg(long)]
    pub book: String,
}

#[derive(Debug, Args)]
pub struct AddProfile {
    pub book: String,
    pub profile: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
    #[error("creating profile directory {path:?}")]
    Io { path: std::path::PathBuf, source: std::io::Error },
}

pub fn list_profiles(env: &Env, command: ListProfiles) {
    let registry = ProfileRegistry::load(&env.config);
    match registry.0.get(&command.book) {
        Some(profiles) if !profiles.is_empty() => {
            for profile in profiles {
                println!("{profile}");
            }
        }
        _ => println!("{}", format!("No profiles registered for book {:?}.", command.book).dim()),
    }
}

const STUB_PARSER: &str = "chapter_section: chapter\nsection_section: section\ncustom_packages: []\n";
const STUB_SCRIPTER: &str = "default_template: default.sh\n";
const STUB_EXECUTER: &str = "package_dir: \"${package_dir}\"\nchroot_dir: \"${build_dir}/chroot\"\npackage_name_template: \"${name}-${version}\"\n";

pub fn add_profile(env: &Env, command: AddProfile) -> Result<(), Error> {
    ProfileRegistry::add(&env.config, &command.book, &command.profile)?;

    let profile_dir = env.paths(&command.book, &command.profile).profile_dir();
    fs::create_dir_all(&profile_dir).map_err(|source| Error::Io { path: profile_dir.clone(), source })?;

    write_stub(&profile_dir.join("parser.yaml"), STUB_PARSER)?;
    write_stub(&profile_dir.join("scripter.yaml"), STUB_SCRIPTER)?;
    write_stub(&profile_dir.join("executer.yaml"), STUB_EXECUTER)?;

    println!("Created profile {} for book {}", command.profile.bold(), command.book.bold());
    Ok(())
}

fn write_stub(path: &std::path::Path, contents: &str) -> Result<(), Error> {
    if !path.exists() {
        fs::write(path, contents).map_err(|source| Error::Io { path: path.to_owned(), source })?;
    }
    Ok(())
}
