// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Remote shell helper used as the generic launcher's exec.
//!
//! Invoked by the MPI runtime as `mympirun-rsh [ssh options] <host> <command...>`.
//! A start that fails on the transport level is retried once.

use std::process::{Command, ExitStatus};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LaunchError;

/// Name the helper is installed under, next to the main binary
pub const RSH_HELPER_NAME: &str = "mympirun-rsh";

/// ssh reports its own failures (connection refused, auth, ...) with this status
const SSH_FAILURE_STATUS: i32 = 255;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// ssh options that take a value
const OPTIONS_WITH_VALUE: &[&str] = &[
    "-b", "-c", "-D", "-E", "-e", "-F", "-I", "-i", "-J", "-L", "-l", "-m", "-O", "-o", "-p", "-Q",
    "-R", "-S", "-W", "-w",
];

/// A parsed remote invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Transport options passed through to ssh
    pub options: Vec<String>,
    pub host: String,
    pub command: Vec<String>,
}

impl RemoteCommand {
    /// Split `[options] host command...`
    pub fn parse(args: &[String]) -> Option<Self> {
        let mut options = Vec::new();
        let mut rest = args.iter();

        let host = loop {
            let arg = rest.next()?;
            if !arg.starts_with('-') {
                break arg.clone();
            }
            options.push(arg.clone());
            if OPTIONS_WITH_VALUE.contains(&arg.as_str()) {
                options.push(rest.next()?.clone());
            }
        };

        Some(Self {
            options,
            host,
            command: rest.cloned().collect(),
        })
    }
}

/// Why one attempt did not start the remote side
fn start_failure(result: &std::io::Result<ExitStatus>) -> Option<String> {
    match result {
        Err(e) => Some(format!("failed to execute transport: {e}")),
        Ok(status) if status.code() == Some(SSH_FAILURE_STATUS) => {
            Some(format!("transport exited with status {SSH_FAILURE_STATUS}"))
        }
        Ok(_) => None,
    }
}

/// Run the command on the remote host, retrying a failed start once.
/// Returns the remote exit code.
pub fn run_remote(transport: &str, remote: &RemoteCommand) -> Result<i32, LaunchError> {
    run_remote_with_delay(transport, remote, RETRY_DELAY)
}

fn run_remote_with_delay(
    transport: &str,
    remote: &RemoteCommand,
    delay: Duration,
) -> Result<i32, LaunchError> {
    let attempt = || {
        Command::new(transport)
            .args(&remote.options)
            .arg(&remote.host)
            .args(&remote.command)
            .status()
    };

    let mut result = attempt();
    if let Some(reason) = start_failure(&result) {
        warn!(host = %remote.host, "remote start failed ({reason}), retrying once");
        std::thread::sleep(delay);
        result = attempt();
    }

    if let Some(reason) = start_failure(&result) {
        return Err(LaunchError::RemoteStart {
            node: remote.host.clone(),
            reason,
        });
    }

    let status = result?;
    debug!(host = %remote.host, ?status, "remote command finished");
    Ok(status.code().unwrap_or(1))
}
