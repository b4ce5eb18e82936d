// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Process group of the launched job.

use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::{debug, warn};

/// Guard around the job's process group. Until the child has been reaped,
/// dropping the guard kills the whole group.
pub struct ProcessGroup {
    pgid: Option<Pid>,
    reaped: bool,
}

impl ProcessGroup {
    /// The child was started with `process_group(0)`, so its pid is the group id
    pub fn new(child_pid: Option<u32>) -> Self {
        let pgid = child_pid
            .and_then(|pid| i32::try_from(pid).ok())
            .map(Pid::from_raw);
        Self {
            pgid,
            reaped: false,
        }
    }

    pub fn signal(&self, signal: Signal) {
        let Some(pgid) = self.pgid else {
            return;
        };
        match killpg(pgid, signal) {
            Ok(()) => debug!(pgid = pgid.as_raw(), ?signal, "signalled process group"),
            Err(e) => debug!(pgid = pgid.as_raw(), ?signal, "failed to signal process group: {e}"),
        }
    }

    /// Child exited and was waited for
    pub fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// SIGTERM, then SIGKILL if the child is still around after `grace`
    pub async fn terminate(&mut self, child: &mut Child, grace: Duration) {
        self.signal(Signal::SIGTERM);
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            warn!("job ignored SIGTERM, killing it");
            self.signal(Signal::SIGKILL);
            if let Err(e) = child.wait().await {
                warn!("failed to reap killed job: {e}");
            }
        }
        self.mark_reaped();
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if !self.reaped {
            self.signal(Signal::SIGKILL);
        }
    }
}
