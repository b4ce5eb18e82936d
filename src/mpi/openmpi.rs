// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Open MPI (`orterun`/`prterun` style `mpirun`).

use super::types::version_in_range;
use super::{Device, HostfileFormat, Launcher, MpiFlavor, PassStyle};

pub struct OpenMpi;

impl MpiFlavor for OpenMpi {
    fn name(&self) -> &'static str {
        "openmpi"
    }

    fn script_names(&self) -> &'static [&'static str] {
        &["ompirun"]
    }

    fn easybuild_name(&self) -> &'static str {
        "OpenMPI"
    }

    fn check_version(&self, version: &str) -> Result<(), String> {
        if version_in_range(version, Some("2.0"), Some("2.1")) {
            return Err("Open MPI 2.0.x is incompatible, use 1.x or 2.1 and later".to_string());
        }
        Ok(())
    }

    fn local_rank_var(&self) -> &'static str {
        "OMPI_COMM_WORLD_LOCAL_RANK"
    }

    fn hostfile_format(&self) -> HostfileFormat {
        HostfileFormat::SlotsKeyword
    }

    fn hostfile_args(&self, path: &str) -> Vec<String> {
        vec!["--hostfile".to_string(), path.to_string()]
    }

    fn pass_style(&self) -> PassStyle {
        PassStyle::PerVariable("-x")
    }

    fn global_option(&self, name: &str, value: &str) -> Vec<String> {
        vec!["-x".to_string(), format!("{name}={value}")]
    }

    fn is_hydra(&self) -> bool {
        false
    }

    /// The runtime picks up Slurm and PBS/TM allocations by itself
    fn native_launchers(&self) -> &'static [&'static str] {
        &["slurm", "pbsdsh", "fork"]
    }

    fn launcher_args(&self, launcher: &Launcher) -> Vec<String> {
        match launcher {
            Launcher::Native(_) => Vec::new(),
            Launcher::Generic { exec, .. } => vec![
                "--mca".to_string(),
                "plm".to_string(),
                "rsh".to_string(),
                "--mca".to_string(),
                "plm_rsh_agent".to_string(),
                exec.clone(),
            ],
        }
    }

    fn device_args(&self, device: Device) -> Vec<String> {
        let btl = match device {
            Device::Infiniband => "sm,openib,self",
            Device::Det | Device::Socket => "sm,tcp,self",
            Device::Shm => "sm,self",
        };
        vec!["--mca".to_string(), "btl".to_string(), btl.to_string()]
    }

    fn pinning_args(&self, native: bool, _hybrid: Option<i64>) -> Vec<String> {
        let policy = if native { "core" } else { "none" };
        vec!["--bind-to".to_string(), policy.to_string()]
    }
}
