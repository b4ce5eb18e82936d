// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-run directory holding the host file and the pinning wrapper.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::command::CommandSpec;
use crate::error::LaunchError;

const DIR_NAME: &str = ".mympirun";

/// `<base>/.mympirun/<jobid>_<millis>`, base defaulting to `$HOME`, then the temp dir
pub fn job_dir_path(basepath: Option<&Path>, home: Option<&str>, job_id: &str) -> PathBuf {
    let base = match (basepath, home) {
        (Some(base), _) => base.to_path_buf(),
        (None, Some(home)) if !home.is_empty() => PathBuf::from(home),
        _ => std::env::temp_dir(),
    };
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    base.join(DIR_NAME).join(format!("{job_id}_{millis}"))
}

/// Staged job directory. Dropping it removes the directory, so a failed
/// launch does not leave it behind.
#[derive(Debug)]
pub struct JobDir {
    path: PathBuf,
    removed: bool,
}

impl JobDir {
    /// Create the directory and write every file the command refers to
    pub fn stage(spec: &CommandSpec) -> Result<Self, LaunchError> {
        let stage_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| LaunchError::Stage { path, source }
        };

        fs::create_dir_all(&spec.job_dir).map_err(stage_err(&spec.job_dir))?;
        let staged = Self {
            path: spec.job_dir.clone(),
            removed: false,
        };

        for file in &spec.files {
            fs::write(&file.path, &file.contents).map_err(stage_err(&file.path))?;
            if file.executable {
                fs::set_permissions(&file.path, fs::Permissions::from_mode(0o700))
                    .map_err(stage_err(&file.path))?;
            }
            debug!(path = %file.path.display(), "staged");
        }

        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and everything in it
    pub fn remove(mut self) -> Result<(), LaunchError> {
        self.removed = true;
        fs::remove_dir_all(&self.path).map_err(|source| LaunchError::Stage {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for JobDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "job directory removed"),
            Err(e) => warn!(path = %self.path.display(), "failed to remove job directory: {e}"),
        }
    }
}
