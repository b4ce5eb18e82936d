// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Job schedulers: detection and resource inventory.

mod local;
mod pbs;
mod slurm;
mod types;

pub use local::Local;
pub use pbs::Pbs;
pub use slurm::Slurm;
pub use types::{NodeResources, ResourceSnapshot};

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::debug;

use crate::env::Environment;
use crate::error::{DetectionError, ResourceError};

/// Shared interface of all scheduler descriptors
pub trait Scheduler: Sync {
    /// Canonical name, as accepted by `--schedtype`
    fn name(&self) -> &'static str;

    /// Alternative names accepted by `--schedtype`
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Variables that carry the job id, in order of preference
    fn job_id_vars(&self) -> &'static [&'static str];

    /// Variable that must also be present for the environment to count as ours
    fn node_info_var(&self) -> Option<&'static str> {
        None
    }

    /// Launcher name understood by Hydra-style launchers
    fn native_launcher(&self) -> &'static str;

    /// Read the allocation
    fn snapshot(&self, env: &Environment) -> Result<ResourceSnapshot, ResourceError>;

    fn is_for(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
            || self.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Whether the environment carries this scheduler's signature
    fn detect(&self, env: &Environment) -> bool {
        let has_id = self
            .job_id_vars()
            .iter()
            .any(|var| env.get(*var).is_some_and(|v| !v.is_empty()));
        let has_nodes = self.node_info_var().map_or(true, |var| env.contains_key(var));
        has_id && has_nodes
    }

    /// Job id from the environment, or a generated one
    fn job_id(&self, env: &Environment) -> String {
        self.job_id_vars()
            .iter()
            .find_map(|var| env.get(*var).filter(|v| !v.is_empty()).cloned())
            .unwrap_or_else(|| generate_job_id(self.name()))
    }
}

/// All known schedulers, in detection order. Slurm comes before PBS since
/// PBS variables can leak into Slurm jobs.
static SCHEDULERS: &[&dyn Scheduler] = &[&Slurm, &Pbs, &Local];

/// Fallback when no signature matches
static DEFAULT: &dyn Scheduler = &Local;

/// Registered scheduler names, for `--showsched`
pub fn names() -> Vec<&'static str> {
    SCHEDULERS.iter().map(|s| s.name()).collect()
}

/// Select the scheduler: explicit name first, then environment signature, then local
pub fn detect(
    requested: Option<&str>,
    env: &Environment,
) -> Result<&'static dyn Scheduler, DetectionError> {
    if let Some(name) = requested {
        return SCHEDULERS
            .iter()
            .copied()
            .find(|s| s.is_for(name))
            .ok_or_else(|| DetectionError::UnknownScheduler {
                name: name.to_string(),
                known: names().join(", "),
            });
    }

    let found = SCHEDULERS
        .iter()
        .copied()
        .find(|s| s.detect(env))
        .unwrap_or(DEFAULT);
    debug!(scheduler = found.name(), "scheduler detected");
    Ok(found)
}

/// Job id for runs outside a scheduler allocation
fn generate_job_id(scheduler: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("SCHED_{}{}{:05}", scheduler, millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_detect_requested() {
        let found = detect(Some("torque"), &Environment::new()).unwrap();
        assert_eq!(found.name(), "pbs");

        let found = detect(Some("SLURM"), &Environment::new()).unwrap();
        assert_eq!(found.name(), "slurm");
    }

    #[test]
    fn test_detect_unknown_requested() {
        let err = detect(Some("lsf"), &Environment::new()).err().unwrap();
        match err {
            DetectionError::UnknownScheduler { name, known } => {
                assert_eq!(name, "lsf");
                assert!(known.contains("slurm"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_detect_from_environment() {
        let found = detect(None, &env(&[("PBS_JOBID", "1.master"), ("PBS_NODEFILE", "/x")])).unwrap();
        assert_eq!(found.name(), "pbs");

        // Slurm wins when both sets of variables are present
        let both = env(&[
            ("PBS_JOBID", "1.master"),
            ("PBS_NODEFILE", "/x"),
            ("SLURM_JOB_ID", "42"),
            ("SLURM_NODELIST", "node[1-2]"),
        ]);
        assert_eq!(detect(None, &both).unwrap().name(), "slurm");
    }

    #[test]
    fn test_detect_falls_back_to_local() {
        let found = detect(None, &env(&[("PBS_JOBID", "1")])).unwrap();
        assert_eq!(found.name(), "local");
        assert_eq!(detect(None, &Environment::new()).unwrap().name(), "local");
    }

    #[test]
    fn test_job_id() {
        let e = env(&[("SLURM_JOB_ID", "4711")]);
        assert_eq!(Slurm.job_id(&e), "4711");

        let generated = Local.job_id(&Environment::new());
        assert!(generated.starts_with("SCHED_local"));
    }

    #[test]
    fn test_names() {
        assert_eq!(names(), vec!["slurm", "pbs", "local"]);
    }
}
