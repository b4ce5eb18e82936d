// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Translates the layout and options into a `CommandSpec` using the
//! flavor's option mapping.
//!
//! Argument order is fixed: host file, branch count, launcher, device,
//! globals, process count, per-node flags, pinning, forwarded variables,
//! raw `--mpirunoptions` (split with shell quoting), pinning wrapper and finally the user command.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use super::{CommandSpec, StagedFile};
use crate::env::{self, Environment};
use crate::error::Result;
use crate::layout::{CoreSet, ProcessLayout};
use crate::mpi::{path, Device, Launcher, MpiFlavor, GENERIC_LAUNCHERS};
use crate::options::OptionSet;
use crate::sched::Scheduler;

pub const HOSTFILE_NAME: &str = "nodes";
pub const PIN_WRAPPER_NAME: &str = "pinning_override_wrapper.sh";

/// Environment-module bookkeeping passed to every rank as globals
const MODULE_VARIABLES: &[&str] = &["MODULEPATH", "LOADEDMODULES", "MODULESHOME"];

/// Everything the builder reads; all of it is fixed for the run
pub struct BuildContext<'a> {
    pub flavor: &'a dyn MpiFlavor,
    pub scheduler: &'a dyn Scheduler,
    pub layout: &'a ProcessLayout,
    pub opts: &'a OptionSet,
    /// Inherited process environment
    pub env: &'a Environment,
    pub device: Device,
    pub job_dir: &'a Path,
    /// Real `mpirun`, when it was found
    pub mpirun: Option<&'a Path>,
    /// Remote shell helper installed next to this binary
    pub rsh_helper: Option<&'a Path>,
}

/// Pick the launcher: an explicit remote shell request wins, then the
/// scheduler's own mechanism if the flavor can drive it, else ssh.
pub fn select_launcher(
    flavor: &dyn MpiFlavor,
    scheduler: &dyn Scheduler,
    requested: Option<&str>,
    rsh_helper: Option<&Path>,
) -> Launcher {
    let generic = |name: &str| {
        let exec = match (name, rsh_helper) {
            ("ssh", Some(helper)) => helper.display().to_string(),
            _ => name.to_string(),
        };
        Launcher::Generic {
            name: name.to_string(),
            exec,
        }
    };

    let wanted = requested.unwrap_or_else(|| scheduler.native_launcher());
    if GENERIC_LAUNCHERS.iter().any(|g| *g == wanted) {
        return generic(wanted);
    }

    match flavor.native_launchers().iter().copied().find(|l| *l == wanted) {
        Some(native) => Launcher::Native(native),
        None => {
            if requested.is_some() {
                warn!(
                    launcher = wanted,
                    flavor = flavor.name(),
                    "launcher not supported by flavor, using ssh"
                );
            } else {
                debug!(
                    launcher = wanted,
                    flavor = flavor.name(),
                    "scheduler launcher not supported by flavor, using ssh"
                );
            }
            generic("ssh")
        }
    }
}

/// `OMP_NUM_THREADS`: inherited value, else cores divided over the hybrid ranks, else 1
fn omp_threads(ctx: &BuildContext) -> String {
    if let Some(value) = ctx.env.get("OMP_NUM_THREADS").filter(|v| !v.is_empty()) {
        return value.clone();
    }
    match ctx.opts.hybrid {
        Some(hybrid) if hybrid > 0 => {
            let cores = ctx.layout.nodes().first().map_or(1, |n| n.cores);
            let hybrid = usize::try_from(hybrid).unwrap_or(1);
            (cores / hybrid).max(1).to_string()
        }
        _ => "1".to_string(),
    }
}

/// Bash wrapper that pins each local rank with numactl. Every node gets the
/// map computed for its own core count; unknown hostnames use the first map.
fn pin_wrapper(flavor: &dyn MpiFlavor, layout: &ProcessLayout) -> String {
    let map_of = |hints: &[CoreSet]| {
        hints
            .iter()
            .map(|h| format!("\"{h}\""))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut script = String::from("#!/bin/bash\n");
    script.push_str(&format!("MYMPIRUN_LOCALRANK=${{{}:-0}}\n", flavor.local_rank_var()));
    script.push_str("case \"$(hostname)\" in\n");
    for node in layout.active_nodes() {
        script.push_str(&format!(
            "    {name}|{name}.*) MYMPIRUN_LOCALRANK_MAP=({map}) ;;\n",
            name = node.node,
            map = map_of(&node.hints)
        ));
    }
    if let Some(first) = layout.active_nodes().next() {
        script.push_str(&format!(
            "    *) MYMPIRUN_LOCALRANK_MAP=({}) ;;\n",
            map_of(&first.hints)
        ));
    }
    script.push_str("esac\n");
    script.push_str(
        "exec numactl --physcpubind=\"${MYMPIRUN_LOCALRANK_MAP[$MYMPIRUN_LOCALRANK]}\" \"$@\"\n",
    );
    script
}

/// Build the command for one launch
pub fn build(ctx: &BuildContext) -> Result<CommandSpec> {
    let opts = ctx.opts;
    let flavor = ctx.flavor;
    opts.validate()?;

    // Environment changes for the mpirun process itself
    let mut overrides: BTreeMap<String, String> = BTreeMap::new();
    if let Some(path) = ctx.env.get("PATH") {
        let stripped = path::strip_fake(path);
        if &stripped != path {
            overrides.insert("PATH".to_string(), stripped);
        }
    }
    overrides.insert("OMP_NUM_THREADS".to_string(), omp_threads(ctx));
    overrides.extend(flavor.child_env(opts.native_pinning(), opts.hybrid));

    let mut merged = ctx.env.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    let forwarded = env::filter(&merged, flavor.env_prefixes(), &opts.variablesprefix);

    // Globals, unless the variable is forwarded anyway
    let mut globals: Vec<(String, String)> = vec![("MKL_NUM_THREADS".to_string(), "1".to_string())];
    globals.extend(flavor.diagnostic_globals(opts.stats_level(), opts.debugmpi));
    if !opts.noenvmodules {
        globals.extend(MODULE_VARIABLES.iter().filter_map(|name| {
            ctx.env
                .get(*name)
                .map(|value| (name.to_string(), value.clone()))
        }));
    }
    globals.retain(|(name, _)| !forwarded.contains(name));

    let hostfile = ctx.job_dir.join(HOSTFILE_NAME);
    let mut files = vec![StagedFile {
        path: hostfile.clone(),
        contents: flavor.hostfile_format().render(ctx.layout),
        executable: false,
    }];

    let mut args = flavor.hostfile_args(&hostfile.display().to_string());
    if let (true, Some(count)) = (flavor.is_hydra(), opts.branchcount) {
        args.extend(["--branch-count".to_string(), count.to_string()]);
    }

    let launcher = select_launcher(flavor, ctx.scheduler, opts.launcher.as_deref(), ctx.rsh_helper);
    args.extend(flavor.launcher_args(&launcher));
    args.extend(flavor.device_args(ctx.device));
    for (name, value) in &globals {
        args.extend(flavor.global_option(name, value));
    }
    args.extend(["-np".to_string(), ctx.layout.total().to_string()]);
    args.extend(flavor.per_node_args(ctx.layout));
    args.extend(flavor.pinning_args(opts.native_pinning(), opts.hybrid));
    args.extend(flavor.pass_style().args(&forwarded));

    args.extend(opts.mpirun_options()?);

    if opts.overridepin.is_some() {
        let wrapper = ctx.job_dir.join(PIN_WRAPPER_NAME);
        files.push(StagedFile {
            path: wrapper.clone(),
            contents: pin_wrapper(flavor, ctx.layout),
            executable: true,
        });
        args.push(wrapper.display().to_string());
    }

    args.extend(opts.command.iter().cloned());

    let program = ctx
        .mpirun
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "mpirun".to_string());

    debug!(?launcher, device = ctx.device.name(), forwarded = forwarded.len(), "command built");

    Ok(CommandSpec {
        program,
        args,
        env: overrides,
        job_dir: ctx.job_dir.to_path_buf(),
        files,
    })
}
