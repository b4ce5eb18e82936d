// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! MPICH2 and MVAPICH2, both driven through Hydra.

use super::types::version_in_range;
use super::MpiFlavor;

pub struct Mpich2;

impl MpiFlavor for Mpich2 {
    fn name(&self) -> &'static str {
        "mpich2"
    }

    fn script_names(&self) -> &'static [&'static str] {
        &["m2hmpirun"]
    }

    fn easybuild_name(&self) -> &'static str {
        "MPICH"
    }

    fn check_version(&self, version: &str) -> Result<(), String> {
        if version_in_range(version, Some("1.4"), None) {
            Ok(())
        } else {
            Err("Hydra is only available from MPICH2 1.4".to_string())
        }
    }

    fn env_prefixes(&self) -> &'static [&'static str] {
        &["MPICH"]
    }

    fn local_rank_var(&self) -> &'static str {
        "MPI_LOCALRANKID"
    }

    fn pinning_args(&self, native: bool, _hybrid: Option<i64>) -> Vec<String> {
        if native {
            ["-binding", "rr", "-topolib", "hwloc"]
                .map(String::from)
                .to_vec()
        } else {
            Vec::new()
        }
    }
}

pub struct Mvapich2;

impl MpiFlavor for Mvapich2 {
    fn name(&self) -> &'static str {
        "mvapich2"
    }

    fn script_names(&self) -> &'static [&'static str] {
        &["mhmpirun"]
    }

    fn easybuild_name(&self) -> &'static str {
        "MVAPICH2"
    }

    fn check_version(&self, version: &str) -> Result<(), String> {
        if version_in_range(version, Some("1.6"), None) {
            Ok(())
        } else {
            Err("Hydra is only available from MVAPICH2 1.6".to_string())
        }
    }

    fn env_prefixes(&self) -> &'static [&'static str] {
        &["MV2", "HYDRA"]
    }

    fn local_rank_var(&self) -> &'static str {
        "MV2_COMM_WORLD_LOCAL_RANK"
    }

    fn child_env(&self, native_pinning: bool, _hybrid: Option<i64>) -> Vec<(String, String)> {
        if native_pinning {
            vec![
                ("MV2_ENABLE_AFFINITY".to_string(), "1".to_string()),
                ("MV2_CPU_BINDING_POLICY".to_string(), "bunch".to_string()),
            ]
        } else {
            vec![("MV2_ENABLE_AFFINITY".to_string(), "0".to_string())]
        }
    }
}
