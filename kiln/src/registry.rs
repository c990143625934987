// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Book and profile registries: small YAML-backed maps saved through
//! [`config::Manager`], the way `boulder`'s `profile::Map` layers a
//! `BTreeMap` over the same config domain/merge machinery.

use std::collections::BTreeMap;

use config::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("book {0:?} is not registered; run `kiln add-book {0} --repo-url <url>` first")]
    UnknownBook(String),
    #[error("profile {1:?} is not registered for book {0:?}; run `kiln add-profile {0} {1}` first")]
    UnknownProfile(String, String),
    #[error("saving config")]
    Save(#[from] config::SaveError),
}

/// `name -> repo_url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookRegistry(pub BTreeMap<String, String>);

impl Config for BookRegistry {
    fn domain() -> String {
        "books".to_owned()
    }
}

impl BookRegistry {
    fn merge(self, other: Self) -> Self {
        Self(self.0.into_iter().chain(other.0).collect())
    }

    pub fn load(manager: &config::Manager) -> Self {
        manager.load::<Self>().into_iter().reduce(Self::merge).unwrap_or_default()
    }

    pub fn require(&self, book: &str) -> Result<&str, Error> {
        self.0.get(book).map(String::as_str).ok_or_else(|| Error::UnknownBook(book.to_owned()))
    }

    pub fn add(manager: &config::Manager, name: &str, repo_url: &str) -> Result<(), Error> {
        let mut registry = Self::load(manager);
        registry.0.insert(name.to_owned(), repo_url.to_owned());
        manager.save("books", &registry)?;
        Ok(())
    }
}

/// `book -> [profile names]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRegistry(pub BTreeMap<String, Vec<String>>);

impl Config for ProfileRegistry {
    fn domain() -> String {
        "profiles".to_owned()
    }
}

impl ProfileRegistry {
    fn merge(self, other: Self) -> Self {
        let mut merged = self.0;
        for (book, profiles) in other.0 {
            let entry = merged.entry(book).or_default();
            for profile in profiles {
                if !entry.contains(&profile) {
                    entry.push(profile);
                }
            }
        }
        Self(merged)
    }

    pub fn load(manager: &config::Manager) -> Self {
        manager.load::<Self>().into_iter().reduce(Self::merge).unwrap_or_default()
    }

    pub fn require(&self, book: &str, profile: &str) -> Result<(), Error> {
        if self.0.get(book).is_some_and(|profiles| profiles.iter().any(|p| p == profile)) {
            Ok(())
        } else {
            Err(Error::UnknownProfile(book.to_owned(), profile.to_owned()))
        }
    }

    pub fn add(manager: &config::Manager, book: &str, profile: &str) -> Result<(), Error> {
        let mut registry = Self::load(manager);
        let profiles = registry.0.entry(book.to_owned()).or_default();
        if !profiles.iter().any(|p| p == profile) {
            profiles.push(profile.to_owned());
        }
        manager.save("profiles", &registry)?;
        Ok(())
    }
}
