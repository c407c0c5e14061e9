// `snapalyze` -- Analyze cluster telemetry snapshots
//
// Run with --help for brief help.
//
// Every command reads a set of snapshots, either the files given after `--` or all the .json files
// in the data directory, and reports on the latest snapshot or on a window of history ending at the
// latest snapshot.
//
// Quirks
//
// The job-wide GPU figure is the sum of the per-host GPU averages divided by the number of hosts in
// the job's layout, including hosts that are not reporting and hosts where the job has no GPUs.  A
// two-host job that saturates its GPUs on one host thus shows 50%.  This is consistent with the
// other tools that consume the same snapshots.
//
// The default end of the history window is the time of the latest snapshot, not the wall clock
// time, so that old snapshot sets show something useful.

mod configs;
mod format;
mod history;
mod listing;
mod usage;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use snaplog::{self, GpuLayout, Snapshot, Timestamp, Window};
use std::env;
use std::io;
use std::process;
use std::str::FromStr;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the usage of jobs on a node in the latest snapshot
    Node(NodeArgs),

    /// Print the usage of jobs across all their nodes in the latest snapshot
    Job(JobArgs),

    /// Print the history of a node, optionally with the usage of a job on it
    History(HistoryArgs),

    /// Print the history of a job across all its nodes
    JobHistory(JobHistoryArgs),

    /// Print the per-core breakdown of a node in the latest snapshot
    Cores(NodeArgs),

    /// Print the jobs on a node in the latest snapshot, the user's own first
    Jobs(JobsArgs),

    /// Print the warnings for a node, optionally with those of a job on it
    Warnings(NodeArgs),
}

#[derive(Args, Debug)]
pub struct NodeArgs {
    /// Select this host
    #[arg(long)]
    host: String,

    /// Select this job [default: all jobs on the host]
    #[arg(long, short)]
    job: Option<String>,

    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    /// Select this job [default: all jobs]
    #[arg(long, short)]
    job: Option<String>,

    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Select this host
    #[arg(long)]
    host: String,

    /// Track this job on the host [default: none]
    #[arg(long, short)]
    job: Option<String>,

    #[command(flatten)]
    window_args: WindowArgs,

    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct JobHistoryArgs {
    /// Select this job
    #[arg(long, short)]
    job: String,

    #[command(flatten)]
    window_args: WindowArgs,

    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Select this host
    #[arg(long)]
    host: String,

    /// List this user's jobs first [default: $LOGNAME]
    #[arg(long, short)]
    user: Option<String>,

    #[command(flatten)]
    input_args: InputArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct InputArgs {
    /// Select the directory of snapshot files [default: $SNAP_ROOT, or $HOME/snapshots]
    #[arg(long)]
    data_path: Option<String>,

    /// File containing JSON data with the analysis configuration [default: none]
    #[arg(long)]
    config_file: Option<String>,

    /// File containing JSON data with the GPU indices of each job on each host [default: none]
    #[arg(long)]
    gpu_layout: Option<String>,

    /// File containing JSON data with precomputed warning flags per host [default: none]
    #[arg(long)]
    warnings_file: Option<String>,

    /// Snapshot file names (overrides --data-path)
    #[arg(last = true)]
    snapshot_files: Vec<String>,
}

#[derive(Args, Debug)]
pub struct WindowArgs {
    /// Length of the history window, format `WwDdHhMm` with all parts optional, or a number of
    /// seconds [default: from the config file, or 1h]
    #[arg(long, value_parser = parse_window)]
    window: Option<i64>,

    /// End of the history window, seconds since the epoch or RFC 3339 [default: the time of the
    /// latest snapshot]
    #[arg(long, value_parser = parse_now)]
    now: Option<Timestamp>,

    /// Use all snapshots, ignoring --window and --now
    #[arg(long, default_value_t = false)]
    all: bool,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Select fields and options (csv, fixed, header, noheader) for the output, comma-separated
    /// [default: command dependent]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print useful statistics about the input to stderr, and turn on debug logging
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

// The command arg parsers don't need to include the string being parsed because the error generated
// by clap includes that.

fn parse_window(s: &str) -> Result<i64> {
    if let Ok(secs) = i64::from_str(s) {
        if secs <= 0 {
            bail!("Window must be positive")
        }
        return Ok(secs);
    }
    Ok(run_time(s)?.num_seconds())
}

fn parse_now(s: &str) -> Result<Timestamp> {
    if let Ok(t) = i64::from_str(s) {
        return Ok(t);
    }
    match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(d) => Ok(d.timestamp()),
        Err(_) => bail!("Invalid time"),
    }
}

// This is WwDdHhMm with all parts optional but at least one part required.  There is possibly too
// much flexibility here, as the parts can be in any order.
fn run_time(s: &str) -> Result<chrono::Duration> {
    let mut weeks = 0i64;
    let mut days = 0i64;
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut seen = String::new();
    let mut ds = String::new();
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            ds.push(ch);
            continue;
        }
        if ds.is_empty() || !"wdhm".contains(ch) || seen.contains(ch) {
            bail!("Bad suffix")
        }
        let val = match i64::from_str(&ds) {
            Ok(v) => v,
            Err(_) => bail!("Bad number"),
        };
        ds.clear();
        seen.push(ch);
        match ch {
            'w' => weeks = val,
            'd' => days = val,
            'h' => hours = val,
            _ => minutes = val,
        }
    }
    if !ds.is_empty() || seen.is_empty() {
        bail!("Inconsistent")
    }
    let duration = [
        chrono::Duration::try_weeks(weeks),
        chrono::Duration::try_days(days),
        chrono::Duration::try_hours(hours),
        chrono::Duration::try_minutes(minutes),
    ]
    .into_iter()
    .try_fold(chrono::Duration::zero(), |acc, part| acc.checked_add(&part?));
    let duration = match duration {
        Some(d) => d,
        None => bail!("Bad number"),
    };
    if duration.num_seconds() == 0 {
        bail!("Window must be positive")
    }
    Ok(duration)
}

#[test]
fn test_run_time() {
    // This is illegal as a run time, though parse_window accepts it as seconds
    assert!(run_time("3").is_err());

    // Years (and other things) are not supported
    assert!(run_time("3y").is_err());
    assert!(run_time("d").is_err());
    assert!(run_time("3d2d").is_err());
    assert!(run_time("0m").is_err());

    let x = run_time("3m").unwrap();
    assert!(x.num_minutes() == 3);
    assert!(x.num_minutes() == x.num_seconds() / 60);
    assert!(x.num_hours() == 0);

    let x = run_time("4h7m").unwrap();
    assert!(x.num_minutes() == 4 * 60 + 7);
    assert!(x.num_hours() == 4);

    let x = run_time("2d4h7m").unwrap();
    assert!(x.num_minutes() == (2 * 24 + 4) * 60 + 7);

    let x = run_time("1w2d").unwrap();
    assert!(x.num_seconds() == 9 * 24 * 60 * 60);

    // Too large for a duration
    assert!(run_time("99999999999999w").is_err());
    assert!(run_time("99999999999999999999m").is_err());
    assert!(parse_window("99999999999999w").is_err());
}

#[test]
fn test_parse_window_and_now() {
    assert!(parse_window("600").unwrap() == 600);
    assert!(parse_window("2h").unwrap() == 7200);
    assert!(parse_window("0").is_err());
    assert!(parse_window("-5").is_err());
    assert!(parse_window("2x").is_err());

    assert!(parse_now("1692093600").unwrap() == 1692093600);
    assert!(parse_now("2023-08-15T10:00:00+00:00").unwrap() == 1692093600);
    assert!(parse_now("yesterday").is_err());
}

fn main() {
    match snapalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn snapalyze() -> Result<()> {
    let cli = Cli::parse();

    let (input_args, meta_args) = match cli.command {
        Commands::Node(ref args) | Commands::Cores(ref args) | Commands::Warnings(ref args) => {
            (&args.input_args, &args.meta_args)
        }
        Commands::Job(ref args) => (&args.input_args, &args.meta_args),
        Commands::History(ref args) => (&args.input_args, &args.meta_args),
        Commands::JobHistory(ref args) => (&args.input_args, &args.meta_args),
        Commands::Jobs(ref args) => (&args.input_args, &args.meta_args),
    };

    // Library logging goes to stderr.  RUST_LOG overrides the level implied by --verbose.

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if meta_args.verbose { "debug" } else { "warn" })
        }))
        .init();

    // Validate and regularize input parameters from switches and defaults.

    let config = if let Some(ref config_filename) = input_args.config_file {
        configs::read_from_json(config_filename)?
    } else {
        configs::Config::default()
    };

    let gpu_layout = if let Some(ref layout_filename) = input_args.gpu_layout {
        snaplog::read_gpu_layout(layout_filename)?
    } else {
        GpuLayout::new()
    };

    let warning_flags = if let Some(ref flags_filename) = input_args.warnings_file {
        Some(snaplog::read_warning_flags(flags_filename)?)
    } else {
        None
    };

    // Snapshot files.  If they are provided on the command line then the data path is not used.

    let snapshot_files = if !input_args.snapshot_files.is_empty() {
        input_args.snapshot_files.clone()
    } else {
        let data_path = if input_args.data_path.is_some() {
            input_args.data_path.clone()
        } else if let Ok(val) = env::var("SNAP_ROOT") {
            Some(val)
        } else if let Ok(val) = env::var("HOME") {
            Some(val + "/snapshots")
        } else {
            None
        };
        if meta_args.verbose {
            eprintln!("Data path: {:?}", data_path);
        }
        match data_path {
            Some(ref p) => snaplog::find_snapshot_files(p)?,
            None => bail!("No data path"),
        }
    };

    if meta_args.verbose {
        eprintln!("Snapshot files: {:?}", snapshot_files);
    }

    let snapshots = snaplog::read_snapshots(&snapshot_files)?;
    let latest = match latest_snapshot(&snapshots) {
        Some(s) => s,
        None => bail!("No snapshots"),
    };

    if meta_args.verbose {
        eprintln!("Snapshots: {}", snapshots.len());
        eprintln!("Latest snapshot: {} ({})", latest.timestamp, snaplog::time_string(latest.timestamp));
        eprintln!("Nodes in latest snapshot: {}", latest.nodes.len());
        eprintln!("Jobs in latest snapshot: {}", latest.jobs.len());
    }

    let cpu_keys = &config.cpu_keys;
    let mut stdout = io::stdout();
    let output = &mut stdout;

    match cli.command {
        Commands::Node(ref args) => usage::print_node_usage(
            output,
            latest,
            &args.host,
            args.job.as_deref(),
            cpu_keys,
            &gpu_layout,
            &args.print_args,
        ),
        Commands::Job(ref args) => usage::print_job_usage(
            output,
            latest,
            args.job.as_deref(),
            cpu_keys,
            &gpu_layout,
            &args.print_args,
        ),
        Commands::History(ref args) => {
            let window = history_window(&args.window_args, config.window_secs, latest.timestamp);
            debug!(?window, "history window");
            let points = snaplog::build_history(
                &snapshots,
                window,
                &args.host,
                args.job.as_deref(),
                cpu_keys,
                &gpu_layout,
            );
            if points.is_empty() {
                bail!("Host {} is not in any snapshot in the window", args.host);
            }
            history::print_history(output, &points, &args.print_args)
        }
        Commands::JobHistory(ref args) => {
            let window = history_window(&args.window_args, config.window_secs, latest.timestamp);
            debug!(?window, "history window");
            let points =
                snaplog::build_job_history(&snapshots, window, &args.job, cpu_keys, &gpu_layout);
            history::print_job_history(output, &points, &args.print_args)
        }
        Commands::Cores(ref args) => listing::print_cores(
            output,
            latest,
            &args.host,
            args.job.as_deref(),
            cpu_keys,
            &args.print_args,
        ),
        Commands::Jobs(ref args) => {
            let username = match args.user {
                Some(ref u) => u.clone(),
                None => env::var("LOGNAME").unwrap_or_default(),
            };
            listing::print_jobs(
                output,
                latest,
                &args.host,
                &username,
                warning_flags.as_ref(),
                &args.print_args,
            )
        }
        Commands::Warnings(ref args) => match warning_flags {
            Some(ref flags) => listing::print_warnings(
                output,
                flags,
                &args.host,
                args.job.as_deref(),
                &args.print_args,
            ),
            None => bail!("The warnings command requires --warnings-file"),
        },
    }
}

// The latest snapshot is the one with the greatest timestamp; of several with that timestamp, the
// last one read wins.

fn latest_snapshot(snapshots: &[Snapshot]) -> Option<&Snapshot> {
    snapshots.iter().max_by_key(|s| s.timestamp)
}

fn history_window(args: &WindowArgs, default_secs: i64, latest: Timestamp) -> Window {
    if args.all {
        Window::All
    } else {
        Window::trailing(
            args.now.unwrap_or(latest),
            args.window.unwrap_or(default_secs),
        )
    }
}

#[test]
fn test_history_window() {
    let args = WindowArgs {
        window: None,
        now: None,
        all: false,
    };
    assert!(history_window(&args, 3600, 1000) == Window::trailing(1000, 3600));

    let args = WindowArgs {
        window: Some(60),
        now: Some(500),
        all: false,
    };
    assert!(history_window(&args, 3600, 1000) == Window::trailing(500, 60));

    let args = WindowArgs {
        window: Some(60),
        now: Some(500),
        all: true,
    };
    assert!(history_window(&args, 3600, 1000) == Window::All);
}

#[test]
fn test_latest_snapshot() {
    let snaps = snaplog::read_snapshots(&vec![
        "../snaplog/test_data/single.json".to_string(),
        "../snaplog/test_data/history.json".to_string(),
    ])
    .unwrap();
    assert!(latest_snapshot(&snaps).unwrap().timestamp == 1692093660);
    assert!(latest_snapshot(&[]).is_none());
}

#[test]
fn test_cli_parses() {
    let cli = Cli::try_parse_from([
        "snapalyze",
        "history",
        "--host",
        "c1",
        "--window",
        "2h",
        "--fmt",
        "csv,time,user",
        "--",
        "a.json",
        "b.json",
    ])
    .unwrap();
    match cli.command {
        Commands::History(args) => {
            assert!(args.host == "c1");
            assert!(args.window_args.window == Some(7200));
            assert!(args.input_args.snapshot_files == vec!["a.json", "b.json"]);
            assert!(args.print_args.fmt.as_deref() == Some("csv,time,user"));
        }
        _ => panic!("Wrong command"),
    }
    assert!(Cli::try_parse_from(["snapalyze", "node"]).is_err());
}
