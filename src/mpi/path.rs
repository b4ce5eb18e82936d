// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Locating the real `mpirun` and its install prefix.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::env::Environment;

/// Searched after `$PATH`, like `which` does on most systems
const DEFAULT_PATH: &[&str] = &["/usr/local/bin", "/usr/bin", "/usr/sbin", "/bin", "/sbin"];

/// Directory holding the `mpirun` symlinks that route invocations to mympirun
fn fake_path_pattern() -> Option<&'static Regex> {
    static FAKE: OnceLock<Option<Regex>> = OnceLock::new();
    FAKE.get_or_init(|| Regex::new(r"^.*?(?:VSC-tools|mympirun).*?/bin/fake(?:/[^/]*)?$").ok())
        .as_ref()
}

pub fn is_fake_dir(entry: &str) -> bool {
    fake_path_pattern().is_some_and(|re| re.is_match(entry))
}

/// `$PATH` without the fake `mpirun` directories, order preserved
pub fn strip_fake(path: &str) -> String {
    path.split(':')
        .filter(|entry| !is_fake_dir(entry))
        .collect::<Vec<_>>()
        .join(":")
}

/// First regular file called `name` on the stripped path or the system default path
pub fn which(name: &str, path: &str) -> Option<PathBuf> {
    let stripped = strip_fake(path);
    let mut dirs: Vec<&str> = stripped.split(':').filter(|d| !d.is_empty()).collect();
    for dir in DEFAULT_PATH {
        if !dirs.contains(dir) {
            dirs.push(dir);
        }
    }

    dirs.into_iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|candidate| candidate.is_file())
}

/// Version of the `easybuild_name` installation that `mpirun` belongs to.
///
/// Uses `EBROOT<NAME>`/`EBVERSION<NAME>` when `mpirun` lives under that
/// root, else the `<name>/<version>/` component of the path itself.
pub fn installed_version(easybuild_name: &str, mpirun: &Path, env: &Environment) -> Option<String> {
    let key = easybuild_name.to_uppercase().replace('-', "_");
    if let Some(root) = env.get(&format!("EBROOT{key}")) {
        if !root.is_empty() && mpirun.starts_with(root) {
            if let Some(version) = env.get(&format!("EBVERSION{key}")) {
                return Some(version.clone());
            }
        }
    }

    let pattern = format!(r"(?:^|/){}/(\d+(?:[.-][^/]+)?)/", regex::escape(easybuild_name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(&mpirun.to_string_lossy())
        .map(|caps| caps[1].to_string())
}
