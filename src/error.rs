// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Error taxonomy, one family per launch stage.
//!
//! Every fatal path ends up here so `main` can report which stage failed
//! and pick the matching exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code used when the watchdog kills a silent job.
pub const HANG_EXIT_CODE: i32 = 124;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("detection: {0}")]
    Detection(#[from] DetectionError),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("planning: {0}")]
    Resource(#[from] ResourceError),

    #[error("launching: {0}")]
    Launch(#[from] LaunchError),
}

impl Error {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Detection(_) => 2,
            Error::Validation(_) => 3,
            Error::Resource(_) => 4,
            Error::Launch(_) => 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("unknown MPI flavor '{name}' (known: {known})")]
    UnknownFlavor { name: String, known: String },

    #[error("unknown scheduler '{name}' (known: {known})")]
    UnknownScheduler { name: String, known: String },

    #[error(
        "no MPI flavor supports scriptname '{scriptname}' or mpirun {mpirun:?}; \
         call mympirun through one of the flavor aliases or use --setmpi"
    )]
    FlavorNotDetected {
        scriptname: String,
        mpirun: Option<PathBuf>,
    },

    #[error("{flavor} {version} is not supported: {reason}")]
    UnsupportedVersion {
        flavor: String,
        version: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("--{option} must be a positive integer, got {value}")]
    NotPositive { option: &'static str, value: i64 },

    #[error("--{0} and --{1} are mutually exclusive")]
    Conflict(&'static str, &'static str),

    #[error("unknown order mode '{0}' (supported: normal, sort, random[_<seed>])")]
    UnknownOrder(String),

    #[error("invalid random seed '{0}'")]
    InvalidSeed(String),

    #[error("unknown pinning override '{0}' (supported: compact, spread, cycle, with optional 'pin' suffix)")]
    UnknownPinOverride(String),

    #[error("no executable or command provided")]
    NoCommand,

    #[error("too many processes requested for node {0}")]
    TooManyProcesses(String),

    #[error("cannot split --mpirunoptions '{value}': {reason}")]
    MpirunOptions { value: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no nodes allocated, nothing to schedule onto")]
    NoNodes,

    #[error("node {0} has no usable cores")]
    NoCores(String),

    #[error("${0} is not set")]
    MissingVariable(&'static str),

    #[error("inconsistent allocation: {0}")]
    Inconsistent(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Probe(String),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stage {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote start on node {node} failed twice: {reason}")]
    RemoteStart { node: String, reason: String },

    #[error("i/o while supervising job: {0}")]
    Io(#[from] std::io::Error),
}
