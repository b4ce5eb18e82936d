// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Output inactivity timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle the output readers use to report activity
#[derive(Debug, Clone)]
pub struct Activity {
    start: Instant,
    /// Millis since `start` of the last observed output
    last: Arc<AtomicU64>,
}

impl Activity {
    pub fn touch(&self) {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last_seen(&self) -> Instant {
        self.start + Duration::from_millis(self.last.load(Ordering::Relaxed))
    }
}

/// Fires when no output was seen for `timeout`. A `None` timeout never fires.
#[derive(Debug)]
pub struct Watchdog {
    activity: Activity,
    timeout: Option<Duration>,
}

impl Watchdog {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            activity: Activity {
                start: Instant::now(),
                last: Arc::new(AtomicU64::new(0)),
            },
            timeout,
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity.clone()
    }

    /// When the timer expires unless more output arrives
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| self.activity.last_seen() + t)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }

    /// Restart the timer without output, after a non-fatal expiry
    pub fn rearm(&self) {
        self.activity.touch();
    }
}
