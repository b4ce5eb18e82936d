// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! PBS/Torque: allocation from `$PBS_NODEFILE`.

use std::fs;
use std::path::PathBuf;

use super::{ResourceSnapshot, Scheduler};
use crate::env::Environment;
use crate::error::ResourceError;

pub struct Pbs;

impl Scheduler for Pbs {
    fn name(&self) -> &'static str {
        "pbs"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["torque"]
    }

    fn job_id_vars(&self) -> &'static [&'static str] {
        &["PBS_JOBID"]
    }

    fn node_info_var(&self) -> Option<&'static str> {
        Some("PBS_NODEFILE")
    }

    fn native_launcher(&self) -> &'static str {
        "pbsdsh"
    }

    fn snapshot(&self, env: &Environment) -> Result<ResourceSnapshot, ResourceError> {
        let path = env
            .get("PBS_NODEFILE")
            .map(PathBuf::from)
            .ok_or(ResourceError::MissingVariable("PBS_NODEFILE"))?;

        let content = fs::read_to_string(&path).map_err(|source| ResourceError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(ResourceSnapshot::from_slot_list(
            self.job_id(env),
            content.lines(),
        ))
    }
}
