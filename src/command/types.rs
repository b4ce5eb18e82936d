// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Fully resolved launch command.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// File written into the job directory before launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub contents: String,
    pub executable: bool,
}

/// What gets executed: program, arguments and environment changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Applied on top of the inherited environment
    pub env: BTreeMap<String, String>,
    pub job_dir: PathBuf,
    pub files: Vec<StagedFile>,
}

impl CommandSpec {
    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Shell form of the command, environment changes first. This is what
    /// `--dry-run` prints.
    pub fn render(&self) -> String {
        self.env
            .iter()
            .map(|(name, value)| format!("{name}={}", shell_quote(value)))
            .chain(self.argv().into_iter().map(shell_quote))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
