// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod command;
mod env;
mod error;
mod layout;
mod mpi;
mod options;
mod rsh;
mod sched;
mod supervisor;

use error::Error;
use options::{split_comma_list, OptionSet, DEFAULT_OUTPUT_CHECK_TIMEOUT};

#[derive(Parser, Debug)]
#[command(name = "mympirun")]
#[command(about = "mpirun wrapper - plans the process layout for the current allocation and supervises the MPI job")]
#[command(version, disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Run this many processes per node
    #[arg(short = 'h', long, env = "MYMPIRUN_HYBRID", allow_hyphen_values = true)]
    hybrid: Option<i64>,

    /// Run exactly this many processes in total
    #[arg(long, env = "MYMPIRUN_UNIVERSE", allow_hyphen_values = true)]
    universe: Option<i64>,

    /// Run two processes per core
    #[arg(long, env = "MYMPIRUN_DOUBLE")]
    double: bool,

    /// Run this many processes per core
    #[arg(long, env = "MYMPIRUN_MULTI", allow_hyphen_values = true)]
    multi: Option<i64>,

    /// Node order: normal, sort, random or random_<seed>
    #[arg(long, env = "MYMPIRUN_ORDER")]
    order: Option<String>,

    /// Pin ranks with numactl instead of the MPI runtime: compact, spread or cycle, `pin` suffix for one core per rank
    #[arg(long, env = "MYMPIRUN_OVERRIDEPIN")]
    overridepin: Option<String>,

    /// Let the MPI runtime pin processes (default)
    #[arg(long, env = "MYMPIRUN_PINMPI", overrides_with = "disable_pinmpi")]
    pinmpi: bool,

    #[arg(long, env = "MYMPIRUN_DISABLE_PINMPI", overrides_with = "pinmpi")]
    disable_pinmpi: bool,

    /// Process launcher, e.g. ssh, rsh, slurm, pbsdsh
    #[arg(long, env = "MYMPIRUN_LAUNCHER")]
    launcher: Option<String>,

    /// Extra variable names or prefixes to forward, comma separated
    #[arg(short = 'V', long, env = "MYMPIRUN_VARIABLESPREFIX", value_delimiter = ',')]
    variablesprefix: Vec<String>,

    /// Write the job's stdout and stderr to this file
    #[arg(long, env = "MYMPIRUN_OUTPUT")]
    output: Option<PathBuf>,

    /// Write the job's stderr to this file instead
    #[arg(long, env = "MYMPIRUN_ERROR")]
    error: Option<PathBuf>,

    /// Seconds without output before the job counts as hanging, negative disables the check
    #[arg(
        long,
        env = "MYMPIRUN_OUTPUT_CHECK_TIMEOUT",
        default_value_t = DEFAULT_OUTPUT_CHECK_TIMEOUT,
        allow_hyphen_values = true
    )]
    output_check_timeout: i64,

    /// Kill a hanging job (default)
    #[arg(long, env = "MYMPIRUN_OUTPUT_CHECK_FATAL", overrides_with = "disable_output_check_fatal")]
    output_check_fatal: bool,

    #[arg(long, env = "MYMPIRUN_DISABLE_OUTPUT_CHECK_FATAL", overrides_with = "output_check_fatal")]
    disable_output_check_fatal: bool,

    /// Use this MPI flavor instead of detecting it
    #[arg(short = 'M', long, env = "MYMPIRUN_SETMPI")]
    setmpi: Option<String>,

    /// Use this scheduler instead of detecting it
    #[arg(short = 'S', long, env = "MYMPIRUN_SCHEDTYPE")]
    schedtype: Option<String>,

    /// List the known MPI flavors
    #[arg(short = 'm', long, env = "MYMPIRUN_SHOWMPI")]
    showmpi: bool,

    /// List the known schedulers
    #[arg(short = 's', long, env = "MYMPIRUN_SHOWSCHED")]
    showsched: bool,

    /// Extra options appended to the mpirun command line
    #[arg(long, env = "MYMPIRUN_MPIRUNOPTIONS", allow_hyphen_values = true)]
    mpirunoptions: Option<String>,

    /// Print the command instead of running it
    #[arg(short = 'D', long, env = "MYMPIRUN_DRY_RUN")]
    dry_run: bool,

    /// Force the RDMA device
    #[arg(long, env = "MYMPIRUN_RDMA")]
    rdma: bool,

    /// Force the socket device
    #[arg(long, env = "MYMPIRUN_SOCKET")]
    socket: bool,

    /// Do not pass environment module variables to the job
    #[arg(long, env = "MYMPIRUN_NOENVMODULES")]
    noenvmodules: bool,

    /// Branch count of the Hydra launch tree
    #[arg(long, env = "MYMPIRUN_BRANCHCOUNT")]
    branchcount: Option<u32>,

    /// Directory for the per-job files instead of $HOME
    #[arg(long, env = "MYMPIRUN_BASEPATH")]
    basepath: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'd', long, env = "MYMPIRUN_DEBUG")]
    debug: bool,

    /// MPI statistics level, 0 disables them
    #[arg(long, env = "MYMPIRUN_STATS", default_value_t = 0)]
    stats: u32,

    /// Debug output from the MPI runtime, implies --debug and --stats 2
    #[arg(long, env = "MYMPIRUN_DEBUGMPI")]
    debugmpi: bool,

    /// MPI program and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Args {
    fn into_options(self) -> std::result::Result<OptionSet, error::ValidationError> {
        let order = match &self.order {
            Some(order) => order.parse()?,
            None => Default::default(),
        };
        let overridepin = self.overridepin.as_deref().map(str::parse).transpose()?;

        Ok(OptionSet {
            hybrid: self.hybrid,
            universe: self.universe,
            double: self.double,
            multi: self.multi,
            order,
            overridepin,
            pinmpi: self.pinmpi || !self.disable_pinmpi,
            launcher: self.launcher,
            variablesprefix: split_comma_list(&self.variablesprefix),
            output: self.output,
            error: self.error,
            output_check_timeout: self.output_check_timeout,
            output_check_fatal: self.output_check_fatal || !self.disable_output_check_fatal,
            setmpi: self.setmpi,
            schedtype: self.schedtype,
            mpirunoptions: self.mpirunoptions,
            dry_run: self.dry_run,
            rdma: self.rdma,
            socket: self.socket,
            noenvmodules: self.noenvmodules,
            branchcount: self.branchcount,
            basepath: self.basepath,
            debug: self.debug || self.debugmpi,
            stats: self.stats,
            debugmpi: self.debugmpi,
            command: self.command,
        })
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Basename of the invoked executable
fn script_name(argv0: &str) -> &str {
    Path::new(argv0)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(argv0)
}

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let argv0 = argv.first().map(String::as_str).unwrap_or("mympirun");

    // Remote shell mode: started by the MPI runtime, not by the user
    if script_name(argv0) == rsh::RSH_HELPER_NAME {
        init_logging(false);
        std::process::exit(run_rsh(&argv[1..]));
    }
    if argv.get(1).map(String::as_str) == Some("--rsh-agent") {
        init_logging(false);
        std::process::exit(run_rsh(&argv[2..]));
    }

    let args = Args::parse();
    init_logging(args.debug || args.debugmpi);

    let code = match run(args, script_name(argv0)) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map_or(1, Error::exit_code)
}

fn run_rsh(args: &[String]) -> i32 {
    let Some(remote) = rsh::RemoteCommand::parse(args) else {
        error!("usage: {} [ssh options] <host> <command...>", rsh::RSH_HELPER_NAME);
        return 2;
    };

    match rsh::run_remote("ssh", &remote) {
        Ok(code) => code,
        Err(err) => {
            let err = Error::from(err);
            error!("{err}");
            err.exit_code()
        }
    }
}

/// Helper next to our own binary, if installed
fn rsh_helper() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let helper = exe.parent()?.join(rsh::RSH_HELPER_NAME);
    helper.is_file().then_some(helper)
}

fn run(args: Args, scriptname: &str) -> Result<i32> {
    if args.showmpi || args.showsched {
        if args.showmpi {
            println!("MPI flavors: {}", mpi::names().join(", "));
        }
        if args.showsched {
            println!("Schedulers: {}", sched::names().join(", "));
        }
        return Ok(0);
    }

    let opts = args.into_options().map_err(Error::from)?;
    opts.validate().map_err(Error::from)?;
    let environment = env::current_environment();

    // Detection
    let scheduler = sched::detect(opts.schedtype.as_deref(), &environment).map_err(Error::from)?;
    let search_path = environment.get("PATH").map(String::as_str).unwrap_or_default();
    let mpirun = mpi::path::which("mpirun", search_path);
    let flavor = mpi::detect(
        opts.setmpi.as_deref(),
        scriptname,
        mpirun.as_deref(),
        &environment,
    )
    .map_err(Error::from)?;
    debug!(scheduler = scheduler.name(), flavor = flavor.name(), mpirun = ?mpirun, "detected");

    // Planning
    let snapshot = scheduler.snapshot(&environment).map_err(Error::from)?;
    let layout = layout::plan(&snapshot, &opts)?;
    debug!(counts = ?layout.counts(), total = layout.total(), "layout planned");

    // Building
    let device = mpi::Device::select(opts.rdma, opts.socket, snapshot.node_count() == 1, |p| p.exists());
    let job_dir = supervisor::job_dir_path(
        opts.basepath.as_deref(),
        environment.get("HOME").map(String::as_str),
        &snapshot.job_id,
    );
    let helper = rsh_helper();
    let spec = command::build(&command::BuildContext {
        flavor,
        scheduler,
        layout: &layout,
        opts: &opts,
        env: &environment,
        device,
        job_dir: &job_dir,
        mpirun: mpirun.as_deref(),
        rsh_helper: helper.as_deref(),
    })?;

    // Nothing is staged for a dry run
    if opts.dry_run {
        println!("{}", spec.render());
        return Ok(0);
    }

    // Launching
    let staged = supervisor::JobDir::stage(&spec).map_err(Error::from)?;
    let config = supervisor::SupervisorConfig {
        timeout: opts.watchdog_timeout(),
        fatal: opts.output_check_fatal,
        output: opts.output.clone(),
        error: opts.error.clone(),
        ..Default::default()
    };
    let outcome = supervisor::run(&spec, &config).map_err(Error::from)?;
    debug!(state = ?outcome.state, transitions = ?outcome.transitions, "job finished");

    let dir = staged.path().to_path_buf();
    staged
        .remove()
        .map_err(Error::from)
        .with_context(|| format!("cleaning up {}", dir.display()))?;

    Ok(outcome.exit_code)
}
