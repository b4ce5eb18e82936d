// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Intel MPI with the Hydra process manager (4.1 and later).

use super::types::version_in_range;
use super::{Device, MpiFlavor};
use crate::layout::ProcessLayout;

/// `I_MPI_DEBUG` level used for `--debugmpi`
const DEBUG_LEVEL: u32 = 50;

pub struct IntelMpi;

impl MpiFlavor for IntelMpi {
    fn name(&self) -> &'static str {
        "intelmpi"
    }

    fn script_names(&self) -> &'static [&'static str] {
        &["impirun", "ihmpirun"]
    }

    fn easybuild_name(&self) -> &'static str {
        "impi"
    }

    fn check_version(&self, version: &str) -> Result<(), String> {
        if version_in_range(version, Some("4.1"), None) {
            Ok(())
        } else {
            Err("only the Hydra based Intel MPI 4.1 and later is supported".to_string())
        }
    }

    fn env_prefixes(&self) -> &'static [&'static str] {
        &["I_MPI"]
    }

    fn local_rank_var(&self) -> &'static str {
        "MPI_LOCALRANKID"
    }

    fn launcher_keyword(&self) -> &'static str {
        "bootstrap"
    }

    fn native_launchers(&self) -> &'static [&'static str] {
        &["slurm", "pbsdsh", "fork"]
    }

    fn per_node_args(&self, layout: &ProcessLayout) -> Vec<String> {
        match layout.uniform_per_node() {
            Some(ppn) => vec!["-perhost".to_string(), ppn.to_string()],
            None => Vec::new(),
        }
    }

    fn device_args(&self, device: Device) -> Vec<String> {
        let fabrics = match device {
            Device::Infiniband => "shm:dapl",
            Device::Det => "det",
            Device::Shm => "shm",
            Device::Socket => "shm:sock",
        };
        self.global_option("I_MPI_FABRICS", fabrics)
    }

    fn pinning_args(&self, native: bool, hybrid: Option<i64>) -> Vec<String> {
        let mut args = self.global_option("I_MPI_PIN", if native { "1" } else { "0" });
        if native && hybrid.is_some_and(|h| h > 1) {
            args.extend(self.global_option("I_MPI_PIN_DOMAIN", "auto:compact"));
            args.extend(self.global_option("KMP_AFFINITY", "compact"));
        }
        args
    }

    fn diagnostic_globals(&self, stats: u32, debug: bool) -> Vec<(String, String)> {
        let mut globals = Vec::new();
        if debug {
            globals.push(("I_MPI_DEBUG".to_string(), format!("+{DEBUG_LEVEL}")));
        }
        if stats > 0 {
            globals.push(("I_MPI_STATS".to_string(), stats.to_string()));
        }
        globals
    }

    fn child_env(&self, _native_pinning: bool, _hybrid: Option<i64>) -> Vec<(String, String)> {
        vec![("PBS_ENVIRONMENT".to_string(), "PBS_BATCH_MPI".to_string())]
    }
}
