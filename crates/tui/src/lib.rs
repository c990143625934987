// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Small terminal styling + prompting helpers shared by the CLI.

use std::fmt;

use crossterm::style::Stylize;
use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;

/// Adds short styling combinators to anything displayable, mirroring the
/// ad-hoc `.red()` / `.dim()` calls scattered through the CLI.
pub trait Styled: fmt::Display + Sized {
    fn red(self) -> String {
        self.to_string().red().to_string()
    }

    fn green(self) -> String {
        self.to_string().green().to_string()
    }

    fn yellow(self) -> String {
        self.to_string().yellow().to_string()
    }

    fn blue(self) -> String {
        self.to_string().blue().to_string()
    }

    fn cyan(self) -> String {
        self.to_string().cyan().to_string()
    }

    fn magenta(self) -> String {
        self.to_string().magenta().to_string()
    }

    fn grey(self) -> String {
        self.to_string().grey().to_string()
    }

    fn dim(self) -> String {
        self.to_string().dim().to_string()
    }

    fn bold(self) -> String {
        self.to_string().bold().to_string()
    }
}

impl<T: fmt::Display> Styled for T {}

/// Ask the operator a yes/no question, defaulting to "no" when not
/// answered interactively (e.g. stdin isn't a tty).
pub fn confirm(prompt: impl Into<String>) -> std::io::Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt.into())
        .default(false)
        .interact()
}
