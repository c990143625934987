// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Args;
use fs_err as fs;
use kiln_core::book::{BookParser, MappingSpec, ParserConfig};
use thiserror::Error;

use crate::env::Env;

#[derive(Debug, Args)]
pub struct ListSections {
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
    Parser(#[from] kiln_core::book::parser::Error),
}

/// Load `book.xml`, `mapping.yaml` and `parser.yaml` for `(book, profile)`
/// and run the book parser, without persisting the result.
pub fn load_and_parse(env: &Env, book: &str, profile: &str) -> Result<Vec<kiln_core::book::PackageRecord>, Error> {
    let paths = env.paths(book, profile);

    let xml_path = paths.book_xml("book.xml");
    let xml = fs::read_to_string(&xml_path).map_err(|source| Error::Io { path: xml_path, source })?;

    let mapping_path = paths.profile_dir().join("mapping.yaml");
    let mapping_yaml = fs::read_to_string(&mapping_path).map_err(|source| Error::Io { path: mapping_path.clone(), source })?;
    let mapping: MappingSpec =
        serde_yaml::from_str(&mapping_yaml).map_err(|source| Error::Yaml { path: mapping_path, source })?;

    let parser_path = paths.profile_dir().join("parser.yaml");
    let parser_yaml = fs::read_to_string(&parser_path).map_err(|source| Error::Io { path: parser_path.clone(), source })?;
    let config: ParserConfig =
        serde_yaml::from_str(&parser_yaml).map_err(|source| Error::Yaml { path: parser_path, source })?;

    let records = BookParser::new().run(&xml, &mapping, &config)?;
    Ok(records)
}

pub fn list_sections(env: &Env, command: ListSections) -> Result<(), Error> {
    let records = load_and_parse(env, &command.book, &command.profile)?;
    for record in &records {
        println!("{}\t{}\t{}\t{}", record.chapter_id, record.section_id, record.name, record.version);
    }
    Ok(())
}
