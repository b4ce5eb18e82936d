// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Resolved option set consumed by the launch core.
//!
//! By the time an `OptionSet` exists, CLI flags, `MYMPIRUN_*` variables and
//! `--disable-*` inverses have all been folded into plain values. The core
//! only reads it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

/// Default watchdog timeout in seconds
pub const DEFAULT_OUTPUT_CHECK_TIMEOUT: i64 = 3600;

/// How the node sequence is reordered before processes are assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderMode {
    #[default]
    Normal,
    Sort,
    Random { seed: Option<u64> },
}

impl FromStr for OrderMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mode, seed) = match s.split_once('_') {
            Some((mode, seed)) => (mode, Some(seed)),
            None => (s, None),
        };

        match (mode, seed) {
            ("normal", None) => Ok(OrderMode::Normal),
            ("sort", None) => Ok(OrderMode::Sort),
            ("random", None) => Ok(OrderMode::Random { seed: None }),
            ("random", Some(seed)) => seed
                .parse()
                .map(|seed| OrderMode::Random { seed: Some(seed) })
                .map_err(|_| ValidationError::InvalidSeed(seed.to_string())),
            _ => Err(ValidationError::UnknownOrder(s.to_string())),
        }
    }
}

/// Placement strategy for the pinning override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStrategy {
    /// Ranks on neighbouring cores
    Compact,
    /// Ranks as far apart as possible
    Spread,
    /// Ranks cycle over the cores
    Cycle,
}

/// Parsed `--overridepin` value, e.g. `spread` or `cyclepin`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinOverride {
    pub strategy: PinStrategy,
    /// `pin` suffix: every rank gets exactly one core
    pub single_core: bool,
}

impl FromStr for PinOverride {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, single_core) = match s.strip_suffix("pin") {
            Some(base) => (base, true),
            None => (s, false),
        };

        let strategy = match base {
            "compact" | "packed" => PinStrategy::Compact,
            "spread" => PinStrategy::Spread,
            "cycle" => PinStrategy::Cycle,
            _ => return Err(ValidationError::UnknownPinOverride(s.to_string())),
        };

        Ok(PinOverride {
            strategy,
            single_core,
        })
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct OptionSet {
    pub hybrid: Option<i64>,
    pub universe: Option<i64>,
    pub double: bool,
    pub multi: Option<i64>,
    pub order: OrderMode,
    pub overridepin: Option<PinOverride>,
    pub pinmpi: bool,
    pub launcher: Option<String>,
    pub variablesprefix: Vec<String>,
    pub output: Option<PathBuf>,
    /// Separate file for the job's stderr
    pub error: Option<PathBuf>,
    pub output_check_timeout: i64,
    pub output_check_fatal: bool,
    pub setmpi: Option<String>,
    pub schedtype: Option<String>,
    pub mpirunoptions: Option<String>,
    pub dry_run: bool,
    pub rdma: bool,
    pub socket: bool,
    pub noenvmodules: bool,
    pub branchcount: Option<u32>,
    pub basepath: Option<PathBuf>,
    pub debug: bool,
    /// MPI statistics level, 0 is off
    pub stats: u32,
    /// MPI level debugging
    pub debugmpi: bool,
    /// The MPI program and its arguments
    pub command: Vec<String>,
}

impl Default for OptionSet {
    fn default() -> Self {
        Self {
            hybrid: None,
            universe: None,
            double: false,
            multi: None,
            order: OrderMode::Normal,
            overridepin: None,
            pinmpi: true,
            launcher: None,
            variablesprefix: Vec::new(),
            output: None,
            error: None,
            output_check_timeout: DEFAULT_OUTPUT_CHECK_TIMEOUT,
            output_check_fatal: true,
            setmpi: None,
            schedtype: None,
            mpirunoptions: None,
            dry_run: false,
            rdma: false,
            socket: false,
            noenvmodules: false,
            branchcount: None,
            basepath: None,
            debug: false,
            stats: 0,
            debugmpi: false,
            command: Vec::new(),
        }
    }
}

impl OptionSet {
    /// Watchdog timeout, `None` when disabled by a negative value
    pub fn watchdog_timeout(&self) -> Option<Duration> {
        u64::try_from(self.output_check_timeout)
            .ok()
            .map(Duration::from_secs)
    }

    /// Native MPI pinning is only used when no override is requested
    pub fn native_pinning(&self) -> bool {
        self.pinmpi && self.overridepin.is_none()
    }

    /// Statistics level handed to the MPI runtime; MPI debugging asks for at least 2
    pub fn stats_level(&self) -> u32 {
        if self.debugmpi {
            self.stats.max(2)
        } else {
            self.stats
        }
    }

    /// Raw `--mpirunoptions` split with shell quoting rules
    pub fn mpirun_options(&self) -> Result<Vec<String>, ValidationError> {
        let Some(raw) = &self.mpirunoptions else {
            return Ok(Vec::new());
        };
        shell_words::split(raw).map_err(|e| ValidationError::MpirunOptions {
            value: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Checks that don't depend on the resource snapshot
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rdma && self.socket {
            return Err(ValidationError::Conflict("rdma", "socket"));
        }
        if self.command.is_empty() {
            return Err(ValidationError::NoCommand);
        }
        self.mpirun_options()?;
        Ok(())
    }
}

/// Split a comma separated option value, dropping empty items
pub fn split_comma_list<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
