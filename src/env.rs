// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Selection of the environment variables forwarded into the MPI job.

use std::collections::{BTreeMap, BTreeSet};

/// Process environment as an ordered map, so everything derived from it is deterministic
pub type Environment = BTreeMap<String, String>;

/// Variables always forwarded by exact name
pub const BASELINE_NAMES: &[&str] = &[
    "CLASSPATH",
    "LD_LIBRARY_PATH",
    "LD_PRELOAD",
    "PATH",
    "PYTHONPATH",
    "PYTHONUNBUFFERED",
];

/// Variable families always forwarded (`<prefix>` or `<prefix>_*`)
pub const BASELINE_PREFIXES: &[&str] = &[
    "DAPL", "IPATH", "KMP", "MKL", "O64", "OMP", "PSC", "PSM", "TMI", "VSMP",
];

/// Snapshot of the current process environment
pub fn current_environment() -> Environment {
    std::env::vars().collect()
}

/// Exact names and prefixes that select variables to forward
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSpec {
    names: BTreeSet<String>,
    prefixes: BTreeSet<String>,
}

impl EnvironmentSpec {
    /// Spec with only the baseline names and prefixes
    pub fn baseline() -> Self {
        Self {
            names: BASELINE_NAMES.iter().map(|s| s.to_string()).collect(),
            prefixes: BASELINE_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add prefixes. Additions only: nothing in the baseline can be removed.
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes.extend(
            prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty()),
        );
        self
    }

    /// Whether a variable name is selected
    pub fn matches(&self, name: &str) -> bool {
        if self.names.contains(name) {
            return true;
        }
        self.prefixes.iter().any(|prefix| {
            name.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
        })
    }

    /// Names of the variables in `env` selected by this spec, sorted
    pub fn filter(&self, env: &Environment) -> Vec<String> {
        env.keys().filter(|name| self.matches(name)).cloned().collect()
    }
}

/// Build the spec from baseline, flavor-specific and user prefixes and apply it
pub fn filter(env: &Environment, flavor_prefixes: &[&str], user_prefixes: &[String]) -> Vec<String> {
    EnvironmentSpec::baseline()
        .with_prefixes(flavor_prefixes.iter().copied())
        .with_prefixes(user_prefixes.iter().cloned())
        .filter(env)
}
