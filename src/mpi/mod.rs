// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! MPI flavors: detection and the per-implementation command syntax.

mod intelmpi;
mod mpich;
mod openmpi;
pub mod path;
mod types;

pub use intelmpi::IntelMpi;
pub use mpich::{Mpich2, Mvapich2};
pub use openmpi::OpenMpi;
pub use types::{Device, HostfileFormat, Launcher, PassStyle};

use std::path::Path;

use tracing::debug;

use crate::env::Environment;
use crate::error::DetectionError;
use crate::layout::ProcessLayout;

/// Remote shells every flavor can fall back to
pub const GENERIC_LAUNCHERS: &[&str] = &["ssh", "rsh"];

/// Shared interface of all MPI flavor descriptors
///
/// Descriptors are stateless; everything that varies per run is passed in.
/// Default methods describe a Hydra based `mpiexec`.
pub trait MpiFlavor: Sync {
    /// Canonical name, as accepted by `--setmpi`
    fn name(&self) -> &'static str;

    /// Script names (symlinks to this binary) that select this flavor
    fn script_names(&self) -> &'static [&'static str];

    /// EasyBuild module name, used to recognise the install prefix of `mpirun`
    fn easybuild_name(&self) -> &'static str;

    /// `Err(reason)` when this version cannot be driven
    fn check_version(&self, version: &str) -> Result<(), String>;

    /// Variable families forwarded in addition to the baseline
    fn env_prefixes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Variable holding the node-local rank in each started process
    fn local_rank_var(&self) -> &'static str;

    fn hostfile_format(&self) -> HostfileFormat {
        HostfileFormat::ColonCount
    }

    fn hostfile_args(&self, path: &str) -> Vec<String> {
        vec!["-machinefile".to_string(), path.to_string()]
    }

    fn pass_style(&self) -> PassStyle {
        PassStyle::CommaList("-envlist")
    }

    /// Tokens that set `name=value` in every rank
    fn global_option(&self, name: &str, value: &str) -> Vec<String> {
        vec!["-genv".to_string(), name.to_string(), value.to_string()]
    }

    fn is_hydra(&self) -> bool {
        true
    }

    /// Hydra launcher flag stem, `-<keyword>` and `-<keyword>-exec`
    fn launcher_keyword(&self) -> &'static str {
        "launcher"
    }

    /// Scheduler-integrated launchers this flavor can use
    fn native_launchers(&self) -> &'static [&'static str] {
        &["slurm", "fork"]
    }

    fn launcher_args(&self, launcher: &Launcher) -> Vec<String> {
        let keyword = self.launcher_keyword();
        match launcher {
            Launcher::Native(name) => vec![format!("-{keyword}"), name.to_string()],
            Launcher::Generic { name, exec } => vec![
                format!("-{keyword}"),
                name.clone(),
                format!("-{keyword}-exec"),
                exec.clone(),
            ],
        }
    }

    /// Flags that depend on the per-node counts
    fn per_node_args(&self, _layout: &ProcessLayout) -> Vec<String> {
        Vec::new()
    }

    /// Flags selecting the interconnect
    fn device_args(&self, _device: Device) -> Vec<String> {
        Vec::new()
    }

    /// Native pinning flags, also called when native pinning is off so it can be disabled explicitly
    fn pinning_args(&self, _native: bool, _hybrid: Option<i64>) -> Vec<String> {
        Vec::new()
    }

    /// Global variables enabling MPI statistics (`stats` > 0) and MPI level debugging
    fn diagnostic_globals(&self, _stats: u32, _debug: bool) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Variables set directly in the environment of the launched `mpirun`
    fn child_env(&self, _native_pinning: bool, _hybrid: Option<i64>) -> Vec<(String, String)> {
        Vec::new()
    }

    fn is_for(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name) || self.easybuild_name().eq_ignore_ascii_case(name)
    }
}

/// All known flavors, in detection order
static FLAVORS: &[&dyn MpiFlavor] = &[&OpenMpi, &IntelMpi, &Mpich2, &Mvapich2];

/// Registered flavor names, for `--showmpi`
pub fn names() -> Vec<&'static str> {
    FLAVORS.iter().map(|f| f.name()).collect()
}

/// Select the flavor: explicit name, then script name, then the install
/// prefix of the `mpirun` found on `PATH`. There is no fallback.
pub fn detect(
    requested: Option<&str>,
    scriptname: &str,
    mpirun: Option<&Path>,
    env: &Environment,
) -> Result<&'static dyn MpiFlavor, DetectionError> {
    if let Some(name) = requested {
        return FLAVORS
            .iter()
            .copied()
            .find(|f| f.is_for(name))
            .ok_or_else(|| DetectionError::UnknownFlavor {
                name: name.to_string(),
                known: names().join(", "),
            });
    }

    if let Some(flavor) = FLAVORS
        .iter()
        .copied()
        .find(|f| f.script_names().iter().any(|s| *s == scriptname))
    {
        debug!(flavor = flavor.name(), scriptname, "flavor selected by script name");
        return Ok(flavor);
    }

    if let Some(mpirun) = mpirun {
        for &flavor in FLAVORS {
            let Some(version) = path::installed_version(flavor.easybuild_name(), mpirun, env) else {
                continue;
            };
            flavor
                .check_version(&version)
                .map_err(|reason| DetectionError::UnsupportedVersion {
                    flavor: flavor.name().to_string(),
                    version: version.clone(),
                    reason,
                })?;
            debug!(flavor = flavor.name(), version = %version, mpirun = %mpirun.display(), "flavor selected by mpirun");
            return Ok(flavor);
        }
    }

    Err(DetectionError::FlavorNotDetected {
        scriptname: scriptname.to_string(),
        mpirun: mpirun.map(Path::to_path_buf),
    })
}
