// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Runs without a batch scheduler: just this host.

use std::thread;

use super::{NodeResources, ResourceSnapshot, Scheduler};
use crate::env::Environment;
use crate::error::ResourceError;

pub struct Local;

impl Scheduler for Local {
    fn name(&self) -> &'static str {
        "local"
    }

    fn job_id_vars(&self) -> &'static [&'static str] {
        &["LOCAL_JOBID"]
    }

    fn native_launcher(&self) -> &'static str {
        "fork"
    }

    fn snapshot(&self, env: &Environment) -> Result<ResourceSnapshot, ResourceError> {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        let cores = thread::available_parallelism()
            .map_err(|e| ResourceError::Probe(format!("cannot determine local core count: {e}")))?
            .get();

        Ok(ResourceSnapshot::new(
            self.job_id(env),
            vec![NodeResources::new(host, cores)],
        ))
    }
}
