// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Launch supervision: runs the command and watches its output for hangs.
//!
//! Single-threaded async design using tokio:
//! - One reader task per output stream, forwarding to the terminal or file
//! - Readers record activity in an atomic timestamp
//! - The main task multiplexes child exit, the watchdog deadline and
//!   interrupts via tokio::select!

mod group;
mod jobdir;
mod watchdog;

pub use jobdir::{job_dir_path, JobDir};
pub use watchdog::{Activity, Watchdog};

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use futures::future::join_all;
use nix::sys::signal::Signal;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use self::group::ProcessGroup;
use crate::command::CommandSpec;
use crate::error::{LaunchError, HANG_EXIT_CODE};

/// How long readers may take to drain after the job is gone
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervision lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    HealthyExit,
    HangWarned,
    HangKilled,
    ChildFailed,
}

/// Watchdog and output settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// `None` disables the watchdog
    pub timeout: Option<Duration>,
    /// Kill the job on expiry instead of warning
    pub fatal: bool,
    /// Redirect both output streams into this file
    pub output: Option<PathBuf>,
    /// Separate file for stderr, taking it out of `output`
    pub error: Option<PathBuf>,
    /// Time between SIGTERM and SIGKILL when killing the job
    pub kill_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(3600)),
            fatal: true,
            output: None,
            error: None,
            kill_grace: Duration::from_secs(10),
        }
    }
}

/// Result of a supervised run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Final state
    pub state: SupervisorState,
    /// Exit code for mympirun itself
    pub exit_code: i32,
    pub hang_warnings: u32,
    /// Every state the run went through, in order
    pub transitions: Vec<SupervisorState>,
}

/// Run the job - single-threaded async
pub fn run(spec: &CommandSpec, config: &SupervisorConfig) -> Result<Outcome, LaunchError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(supervise(spec, config))
}

/// Interrupts (SIGINT/SIGTERM) seen by this process, as a counter
fn interrupts() -> watch::Receiver<u64> {
    static INTERRUPTS: OnceLock<watch::Sender<u64>> = OnceLock::new();
    INTERRUPTS
        .get_or_init(|| {
            let (tx, _) = watch::channel(0);
            ctrlc::set_handler(|| {
                if let Some(tx) = INTERRUPTS.get() {
                    tx.send_modify(|count| *count += 1);
                }
            })
            .ok(); // Ignore error if handler can't be set (e.g., in tests)
            tx
        })
        .subscribe()
}

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

async fn create(path: &Path) -> Result<tokio::fs::File, LaunchError> {
    tokio::fs::File::create(path)
        .await
        .map_err(|source| LaunchError::Stage {
            path: path.to_path_buf(),
            source,
        })
}

/// Sinks for stdout and stderr: the terminal, one shared output file,
/// or a separate error file for stderr
async fn sinks(output: Option<&Path>, error: Option<&Path>) -> Result<(Sink, Sink), LaunchError> {
    let (out, shared): (Sink, Option<Sink>) = match output {
        Some(path) => {
            let file = create(path).await?;
            let clone = file.try_clone().await?;
            (Box::new(file), Some(Box::new(clone)))
        }
        None => (Box::new(tokio::io::stdout()), None),
    };
    let err: Sink = match (error, shared) {
        (Some(path), _) => Box::new(create(path).await?),
        (None, Some(shared)) => shared,
        (None, None) => Box::new(tokio::io::stderr()),
    };
    Ok((out, err))
}

/// Copy one output stream to its sink, reporting every chunk as activity
async fn pump<R>(mut reader: R, mut sink: Sink, activity: Activity) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        activity.touch();
        sink.write_all(&buf[..n]).await?;
        sink.flush().await?;
        total += n as u64;
    }
    Ok(total)
}

/// Sleep until the deadline, forever without one
async fn expiry(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => futures::future::pending().await,
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Spawn the command in its own process group and supervise it to the end
pub async fn supervise(spec: &CommandSpec, config: &SupervisorConfig) -> Result<Outcome, LaunchError> {
    supervise_with(spec, config, interrupts()).await
}

/// Every change on `interrupts` forwards SIGTERM to the job's process group
async fn supervise_with(
    spec: &CommandSpec,
    config: &SupervisorConfig,
    mut interrupts: watch::Receiver<u64>,
) -> Result<Outcome, LaunchError> {
    let mut transitions = vec![SupervisorState::Starting];

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            command: spec.program.clone(),
            source,
        })?;
    let mut group = ProcessGroup::new(child.id());
    info!(pid = ?child.id(), command = %spec.render(), "job started");

    let watchdog = Watchdog::new(config.timeout);
    let (out_sink, err_sink) = sinks(config.output.as_deref(), config.error.as_deref()).await?;

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump(stdout, out_sink, watchdog.activity())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, err_sink, watchdog.activity())));
    }
    transitions.push(SupervisorState::Running);

    let mut hang_warnings = 0u32;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,

            _ = expiry(watchdog.deadline()) => {
                if !watchdog.is_expired(std::time::Instant::now()) {
                    // output arrived while sleeping
                    continue;
                }
                let silence = config.timeout.unwrap_or_default();
                if config.fatal {
                    error!(timeout = ?silence, "no output from job, killing it");
                    transitions.push(SupervisorState::HangKilled);
                    group.terminate(&mut child, config.kill_grace).await;
                    drain(readers).await;
                    return Ok(Outcome {
                        state: SupervisorState::HangKilled,
                        exit_code: HANG_EXIT_CODE,
                        hang_warnings,
                        transitions,
                    });
                }
                warn!(timeout = ?silence, "no output from job, it may be hanging");
                hang_warnings += 1;
                transitions.push(SupervisorState::HangWarned);
                watchdog.rearm();
                transitions.push(SupervisorState::Running);
            }

            Ok(()) = interrupts.changed() => {
                warn!("interrupted, forwarding SIGTERM to job");
                group.signal(Signal::SIGTERM);
            }
        }
    };
    group.mark_reaped();
    drain(readers).await;

    let code = exit_code(status);
    let state = if status.success() {
        SupervisorState::HealthyExit
    } else {
        SupervisorState::ChildFailed
    };
    transitions.push(state);
    debug!(code, ?state, "job finished");

    Ok(Outcome {
        state,
        exit_code: code,
        hang_warnings,
        transitions,
    })
}

/// Wait for the readers to flush what is left in the pipes
async fn drain(readers: Vec<tokio::task::JoinHandle<io::Result<u64>>>) {
    match tokio::time::timeout(DRAIN_TIMEOUT, join_all(readers)).await {
        Ok(results) => {
            for result in results {
                match result {
                    Ok(Ok(bytes)) => debug!(bytes, "output stream closed"),
                    Ok(Err(e)) => warn!("failed to forward job output: {e}"),
                    Err(e) => warn!("output reader failed: {e}"),
                }
            }
        }
        Err(_) => warn!("job output still open after exit, not waiting for it"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Instant;

    fn shell(script: &str) -> CommandSpec {
        CommandSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: BTreeMap::new(),
            job_dir: std::env::temp_dir(),
            files: Vec::new(),
        }
    }

    fn config(timeout_ms: Option<u64>, fatal: bool) -> SupervisorConfig {
        SupervisorConfig {
            timeout: timeout_ms.map(Duration::from_millis),
            fatal,
            output: None,
            error: None,
            kill_grace: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_healthy_exit() {
        let outcome = supervise(&shell("echo hello"), &config(Some(5000), true)).await.unwrap();
        assert_eq!(outcome.state, SupervisorState::HealthyExit);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(
            outcome.transitions,
            vec![
                SupervisorState::Starting,
                SupervisorState::Running,
                SupervisorState::HealthyExit
            ]
        );
    }

    #[tokio::test]
    async fn test_child_failure_propagates() {
        let outcome = supervise(&shell("exit 3"), &config(Some(5000), true)).await.unwrap();
        assert_eq!(outcome.state, SupervisorState::ChildFailed);
        assert_eq!(outcome.exit_code, 3);
    }

    #[tokio::test]
    async fn test_silent_job_is_killed() {
        let start = Instant::now();
        let outcome = supervise(&shell("sleep 30"), &config(Some(1000), true)).await.unwrap();

        assert_eq!(outcome.state, SupervisorState::HangKilled);
        assert_eq!(outcome.exit_code, HANG_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_silent_job_warned_when_not_fatal() {
        let outcome = supervise(&shell("sleep 2; echo done"), &config(Some(1000), false))
            .await
            .unwrap();

        assert!(outcome.hang_warnings >= 1);
        assert!(outcome.transitions.contains(&SupervisorState::HangWarned));
        assert_eq!(outcome.state, SupervisorState::HealthyExit);
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_output_resets_timer() {
        let script = "for i in 1 2 3 4 5; do echo $i; sleep 0.3; done";
        let outcome = supervise(&shell(script), &config(Some(1000), true)).await.unwrap();
        assert_eq!(outcome.state, SupervisorState::HealthyExit);
        assert_eq!(outcome.hang_warnings, 0);
    }

    #[tokio::test]
    async fn test_disabled_watchdog() {
        let outcome = supervise(&shell("sleep 0.3"), &config(None, true)).await.unwrap();
        assert_eq!(outcome.state, SupervisorState::HealthyExit);
    }

    #[tokio::test]
    async fn test_output_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("job.out");
        let cfg = SupervisorConfig {
            output: Some(output.clone()),
            ..config(Some(5000), true)
        };

        let outcome = supervise(&shell("echo out; echo err >&2"), &cfg).await.unwrap();
        assert_eq!(outcome.exit_code, 0);

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("out\n"));
        assert!(content.contains("err\n"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut spec = shell("true");
        spec.program = "/nonexistent/mympirun/mpirun".to_string();
        let err = supervise(&spec, &config(None, true)).await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_env_applied() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("env.out");
        let mut spec = shell("echo $OMP_NUM_THREADS");
        spec.env.insert("OMP_NUM_THREADS".to_string(), "7".to_string());
        let cfg = SupervisorConfig {
            output: Some(output.clone()),
            ..config(Some(5000), true)
        };

        supervise(&spec, &cfg).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "7\n");
    }

    #[tokio::test]
    async fn test_error_file_separate() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("job.out");
        let error = dir.path().join("job.err");
        let cfg = SupervisorConfig {
            output: Some(output.clone()),
            error: Some(error.clone()),
            ..config(Some(5000), true)
        };

        supervise(&shell("echo out; echo err >&2"), &cfg).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "out\n");
        assert_eq!(std::fs::read_to_string(&error).unwrap(), "err\n");
    }

    #[tokio::test]
    async fn test_rendered_command_runs_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("job.out");
        let mut spec = shell(r#"printf '%s\n' "$@"; echo "$GREETING""#);
        spec.args.extend(["job".into(), "a b".into(), "it's".into(), "$HOME".into(), "*".into()]);
        spec.env.insert("GREETING".to_string(), "hello  world".to_string());
        let cfg = SupervisorConfig {
            output: Some(output.clone()),
            ..config(Some(5000), true)
        };

        supervise(&spec, &cfg).await.unwrap();
        let supervised = std::fs::read_to_string(&output).unwrap();
        assert_eq!(supervised, "a b\nit's\n$HOME\n*\nhello  world\n");

        let rendered = std::process::Command::new("sh")
            .arg("-c")
            .arg(spec.render())
            .current_dir(dir.path())
            .output()
            .unwrap();
        assert_eq!(String::from_utf8(rendered.stdout).unwrap(), supervised);
    }

    /// pid is a zombie or gone
    fn is_gone(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat.rsplit(')').next().is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn test_interrupt_terminates_group() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("job.out");
        let cfg = SupervisorConfig {
            output: Some(output.clone()),
            ..config(None, true)
        };
        let (tx, rx) = watch::channel(0u64);

        let watched = output.clone();
        tokio::spawn(async move {
            // Interrupt once the background sleep reported its pid
            for _ in 0..100 {
                if std::fs::read_to_string(&watched).is_ok_and(|s| s.ends_with('\n')) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            tx.send_modify(|count| *count += 1);
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(tx);
        });

        let start = Instant::now();
        let outcome = supervise_with(&shell("sleep 30 & echo $!; wait"), &cfg, rx)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.state, SupervisorState::ChildFailed);
        assert_eq!(outcome.exit_code, 128 + Signal::SIGTERM as i32);

        let pid = std::fs::read_to_string(&output).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_gone(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(is_gone(pid), "background process {pid} survived the interrupt");
    }
}
