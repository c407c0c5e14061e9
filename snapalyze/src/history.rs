// Print the history of a node, optionally with a job on it, or the history of a job across its
// hosts.  One row per snapshot in the window.

use crate::format;
use crate::PrintArgs;

use anyhow::Result;
use snaplog::{self, HistoryPoint, JobHistoryPoint, UsageRecord};
use std::collections::HashMap;
use std::io;

// Memory is printed in MB, like everywhere else in the output, though the history holds bytes.

const DEFAULT_NODE_FIELDS: &str = "timestr,user,system,wait,mem,swap,gpus";
const DEFAULT_JOB_FIELDS: &str = "timestr,cpu-user,cpu-system,cpu-wait,mem,gpu";

pub fn print_history(
    output: &mut dyn io::Write,
    points: &[HistoryPoint],
    print_args: &PrintArgs,
) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&HistoryPoint, ()) -> String> = HashMap::new();
    formatters.insert("time".to_string(), &format_time);
    formatters.insert("timestr".to_string(), &format_timestr);
    formatters.insert("user".to_string(), &format_user);
    formatters.insert("system".to_string(), &format_system);
    formatters.insert("wait".to_string(), &format_wait);
    formatters.insert("mem".to_string(), &format_mem);
    formatters.insert("swap".to_string(), &format_swap);
    formatters.insert("ib-in".to_string(), &format_ib_in);
    formatters.insert("ib-out".to_string(), &format_ib_out);
    formatters.insert("ib-pkts-in".to_string(), &format_ib_pkts_in);
    formatters.insert("ib-pkts-out".to_string(), &format_ib_pkts_out);
    formatters.insert("lustre-read".to_string(), &format_lustre_read);
    formatters.insert("lustre-write".to_string(), &format_lustre_write);
    formatters.insert("jobfs-read".to_string(), &format_jobfs_read);
    formatters.insert("jobfs-write".to_string(), &format_jobfs_write);
    formatters.insert("gpus".to_string(), &format_gpus);
    formatters.insert("job-user".to_string(), &format_job_user);
    formatters.insert("job-system".to_string(), &format_job_system);
    formatters.insert("job-wait".to_string(), &format_job_wait);
    formatters.insert("job-mem".to_string(), &format_job_mem);
    formatters.insert("job-mem-max".to_string(), &format_job_mem_max);
    formatters.insert("job-mem-requested".to_string(), &format_job_mem_requested);

    let spec = print_args.fmt.as_deref().unwrap_or(DEFAULT_NODE_FIELDS);
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others)?;
    if !fields.is_empty() {
        format::format_data(output, &fields, &formatters, &opts, points, ())?;
    }
    Ok(())
}

fn format_time(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.time)
}

fn format_timestr(p: &HistoryPoint, _: ()) -> String {
    p.time_string.clone()
}

fn format_user(p: &HistoryPoint, _: ()) -> String {
    format!("{:.1}", p.user)
}

fn format_system(p: &HistoryPoint, _: ()) -> String {
    format!("{:.1}", p.system)
}

fn format_wait(p: &HistoryPoint, _: ()) -> String {
    format!("{:.1}", p.wait)
}

fn format_mb(bytes: f64) -> String {
    format!("{:.0}", bytes / snaplog::BYTES_PER_MB)
}

fn format_mem(p: &HistoryPoint, _: ()) -> String {
    format_mb(p.mem)
}

fn format_swap(p: &HistoryPoint, _: ()) -> String {
    format_mb(p.swap)
}

fn format_ib_in(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.infiniband_in)
}

fn format_ib_out(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.infiniband_out)
}

fn format_ib_pkts_in(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.infiniband_pkts_in)
}

fn format_ib_pkts_out(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.infiniband_pkts_out)
}

fn format_lustre_read(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.lustre_read)
}

fn format_lustre_write(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.lustre_write)
}

fn format_jobfs_read(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.jobfs_read)
}

fn format_jobfs_write(p: &HistoryPoint, _: ()) -> String {
    format!("{}", p.jobfs_write)
}

// The GPUs go into a single column, separated by "/", in index order.

fn format_gpus(p: &HistoryPoint, _: ()) -> String {
    if p.gpus.is_empty() {
        "-".to_string()
    } else {
        p.gpus
            .iter()
            .map(|g| format!("{:.0}", g))
            .collect::<Vec<String>>()
            .join("/")
    }
}

fn format_job_user(p: &HistoryPoint, _: ()) -> String {
    format!("{:.1}", p.job_user)
}

fn format_job_system(p: &HistoryPoint, _: ()) -> String {
    format!("{:.1}", p.job_system)
}

fn format_job_wait(p: &HistoryPoint, _: ()) -> String {
    format!("{:.1}", p.job_wait)
}

fn format_job_mem(p: &HistoryPoint, _: ()) -> String {
    format_mb(p.job_mem)
}

fn format_job_mem_max(p: &HistoryPoint, _: ()) -> String {
    format_mb(p.job_mem_max)
}

fn format_job_mem_requested(p: &HistoryPoint, _: ()) -> String {
    format_mb(p.job_mem_requested)
}

pub fn print_job_history(
    output: &mut dyn io::Write,
    points: &[JobHistoryPoint],
    print_args: &PrintArgs,
) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&JobHistoryPoint, ()) -> String> = HashMap::new();
    formatters.insert("time".to_string(), &format_job_time);
    formatters.insert("timestr".to_string(), &format_job_timestr);
    formatters.insert("cpu-user".to_string(), &format_cpu_user);
    formatters.insert("cpu-system".to_string(), &format_cpu_system);
    formatters.insert("cpu-wait".to_string(), &format_cpu_wait);
    formatters.insert("cpu-idle".to_string(), &format_cpu_idle);
    formatters.insert("mem".to_string(), &format_usage_mem);
    formatters.insert("mem-max".to_string(), &format_usage_mem_max);
    formatters.insert("gpu".to_string(), &format_usage_gpu);
    formatters.insert("ib-in".to_string(), &format_usage_ib_in);
    formatters.insert("ib-out".to_string(), &format_usage_ib_out);
    formatters.insert("lustre-read".to_string(), &format_usage_lustre_read);
    formatters.insert("lustre-write".to_string(), &format_usage_lustre_write);

    let spec = print_args.fmt.as_deref().unwrap_or(DEFAULT_JOB_FIELDS);
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others)?;
    if !fields.is_empty() {
        format::format_data(output, &fields, &formatters, &opts, points, ())?;
    }
    Ok(())
}

fn format_job_time(p: &JobHistoryPoint, _: ()) -> String {
    format!("{}", p.time)
}

fn format_job_timestr(p: &JobHistoryPoint, _: ()) -> String {
    p.time_string.clone()
}

fn with_usage(p: &JobHistoryPoint, f: impl Fn(&UsageRecord) -> f64) -> String {
    match p.usage {
        Some(ref u) => format!("{:.1}", f(u)),
        None => "N/A".to_string(),
    }
}

fn format_cpu_user(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.cpu.user)
}

fn format_cpu_system(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.cpu.system)
}

fn format_cpu_wait(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.cpu.wait)
}

fn format_cpu_idle(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.cpu.idle)
}

fn format_usage_mem(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.mem.used)
}

fn format_usage_mem_max(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.mem.max)
}

fn format_usage_gpu(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.gpu.total)
}

fn format_usage_ib_in(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.infiniband.bytes_in)
}

fn format_usage_ib_out(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.infiniband.bytes_out)
}

fn format_usage_lustre_read(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.lustre.read)
}

fn format_usage_lustre_write(p: &JobHistoryPoint, _: ()) -> String {
    with_usage(p, |u| u.lustre.write)
}

#[cfg(test)]
fn test_snapshots() -> Vec<snaplog::Snapshot> {
    snaplog::read_snapshots(&vec![
        "../snaplog/test_data/single.json".to_string(),
        "../snaplog/test_data/history.json".to_string(),
    ])
    .unwrap()
}

#[test]
fn test_print_history() {
    let snaps = test_snapshots();
    let h = snaplog::build_history(
        &snaps,
        snaplog::Window::All,
        "c1",
        Some("1001"),
        &snaplog::CpuKeys::default(),
        &snaplog::GpuLayout::new(),
    );
    let mut out = Vec::new();
    let args = PrintArgs {
        fmt: Some("csv,time,user,mem,gpus,job-user,job-mem".to_string()),
    };
    print_history(&mut out, &h, &args).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "1692093540,0.5,2000,-,0.0,0\n\
                1692093600,42.5,20000,-,50.0,4096\n\
                1692093660,30.0,21000,-,60.0,4200\n"
    );
}

#[test]
fn test_print_job_history() {
    let snaps = test_snapshots();
    let h = snaplog::build_job_history(
        &snaps,
        snaplog::Window::All,
        "1002",
        &snaplog::CpuKeys::default(),
        &snaplog::GpuLayout::new(),
    );
    let mut out = Vec::new();
    let args = PrintArgs {
        fmt: Some("csv,time,cpu-user,gpu".to_string()),
    };
    print_job_history(&mut out, &h, &args).unwrap();

    // Job 1002 is only in the middle snapshot
    assert!(
        String::from_utf8(out).unwrap()
            == "1692093540,N/A,N/A\n1692093600,32.5,0.0\n1692093660,N/A,N/A\n"
    );
}
