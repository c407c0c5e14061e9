// Print job usage on a host, or across hosts, for the latest snapshot.

use crate::format;
use crate::PrintArgs;

use anyhow::{bail, Result};
use snaplog::{self, CpuKeys, GpuLayout, Snapshot, Timestamp, UsageRecord};
use std::collections::HashMap;
use std::io;

/// One output row.  `host` is the host for per-node usage and the host list for job-wide usage.
/// `usage` is None when there is no data for the job.

pub struct UsageRow<'a> {
    time: Timestamp,
    job_id: &'a str,
    user: &'a str,
    host: String,
    usage: Option<UsageRecord>,
}

/// Print the usage on `host` of `job_id`, or of every job on the host if `job_id` is None.

pub fn print_node_usage(
    output: &mut dyn io::Write,
    snapshot: &Snapshot,
    host: &str,
    job_id: Option<&str>,
    cpu_keys: &CpuKeys,
    gpu_layout: &GpuLayout,
    print_args: &PrintArgs,
) -> Result<()> {
    let node = match snapshot.nodes.get(host) {
        Some(node) => node,
        None => bail!("Host {host} is not in the latest snapshot"),
    };
    let rows = select_jobs(snapshot, job_id)?
        .filter(|(_, job)| job.layout.contains_key(host))
        .map(|(id, job)| UsageRow {
            time: snapshot.timestamp,
            job_id: id,
            user: &job.username,
            host: host.to_string(),
            usage: snaplog::compute_node_usage(id, job, node, host, gpu_layout, cpu_keys),
        })
        .collect::<Vec<UsageRow>>();
    print_rows(output, print_args, &rows)
}

/// Print the job-wide usage of `job_id`, or of every job if `job_id` is None.

pub fn print_job_usage(
    output: &mut dyn io::Write,
    snapshot: &Snapshot,
    job_id: Option<&str>,
    cpu_keys: &CpuKeys,
    gpu_layout: &GpuLayout,
    print_args: &PrintArgs,
) -> Result<()> {
    let rows = select_jobs(snapshot, job_id)?
        .map(|(id, job)| UsageRow {
            time: snapshot.timestamp,
            job_id: id,
            user: &job.username,
            host: job.layout.keys().map(|h| h.as_str()).collect::<Vec<&str>>().join(","),
            usage: snaplog::compute_job_usage(id, job, &snapshot.nodes, gpu_layout, cpu_keys),
        })
        .collect::<Vec<UsageRow>>();
    print_rows(output, print_args, &rows)
}

fn select_jobs<'a>(
    snapshot: &'a Snapshot,
    job_id: Option<&'a str>,
) -> Result<Box<dyn Iterator<Item = (&'a str, &'a snaplog::JobRecord)> + 'a>> {
    match job_id {
        Some(id) => match snapshot.jobs.get_key_value(id) {
            Some((id, job)) => Ok(Box::new(std::iter::once((id.as_str(), job)))),
            None => bail!("Job {id} is not in the latest snapshot"),
        },
        None => Ok(Box::new(snaplog::jobs_in_order(snapshot).into_iter())),
    }
}

const DEFAULT_FIELDS: &str = "job,user,host,cpu-user,cpu-system,cpu-wait,mem,gpu";

fn print_rows(output: &mut dyn io::Write, print_args: &PrintArgs, rows: &[UsageRow]) -> Result<()> {
    let mut formatters: HashMap<String, &dyn Fn(&UsageRow, ()) -> String> = HashMap::new();
    formatters.insert("time".to_string(), &format_time);
    formatters.insert("timestr".to_string(), &format_timestr);
    formatters.insert("job".to_string(), &format_job);
    formatters.insert("user".to_string(), &format_user);
    formatters.insert("host".to_string(), &format_host);
    formatters.insert("cpu-user".to_string(), &format_cpu_user);
    formatters.insert("cpu-system".to_string(), &format_cpu_system);
    formatters.insert("cpu-wait".to_string(), &format_cpu_wait);
    formatters.insert("cpu-idle".to_string(), &format_cpu_idle);
    formatters.insert("mem".to_string(), &format_mem);
    formatters.insert("mem-max".to_string(), &format_mem_max);
    formatters.insert("mem-total".to_string(), &format_mem_total);
    formatters.insert("gpu".to_string(), &format_gpu);
    formatters.insert("ib-in".to_string(), &format_ib_in);
    formatters.insert("ib-out".to_string(), &format_ib_out);
    formatters.insert("lustre-read".to_string(), &format_lustre_read);
    formatters.insert("lustre-write".to_string(), &format_lustre_write);

    let spec = print_args.fmt.as_deref().unwrap_or(DEFAULT_FIELDS);
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others)?;
    if !fields.is_empty() {
        format::format_data(output, &fields, &formatters, &opts, rows, ())?;
    }
    Ok(())
}

fn format_time(r: &UsageRow, _: ()) -> String {
    format!("{}", r.time)
}

fn format_timestr(r: &UsageRow, _: ()) -> String {
    snaplog::time_string(r.time)
}

fn format_job(r: &UsageRow, _: ()) -> String {
    r.job_id.to_string()
}

fn format_user(r: &UsageRow, _: ()) -> String {
    r.user.to_string()
}

fn format_host(r: &UsageRow, _: ()) -> String {
    r.host.clone()
}

// Every numeric field is "N/A" when there is no data, to keep it apart from zero usage.

fn with_usage(r: &UsageRow, f: impl Fn(&UsageRecord) -> f64) -> String {
    match r.usage {
        Some(ref u) => format!("{:.1}", f(u)),
        None => "N/A".to_string(),
    }
}

fn format_cpu_user(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.cpu.user)
}

fn format_cpu_system(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.cpu.system)
}

fn format_cpu_wait(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.cpu.wait)
}

fn format_cpu_idle(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.cpu.idle)
}

fn format_mem(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.mem.used)
}

fn format_mem_max(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.mem.max)
}

fn format_mem_total(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.mem.total)
}

fn format_gpu(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.gpu.total)
}

fn format_ib_in(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.infiniband.bytes_in)
}

fn format_ib_out(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.infiniband.bytes_out)
}

fn format_lustre_read(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.lustre.read)
}

fn format_lustre_write(r: &UsageRow, _: ()) -> String {
    with_usage(r, |u| u.lustre.write)
}

#[cfg(test)]
fn test_snapshot() -> Snapshot {
    snaplog::read_snapshots(&vec!["../snaplog/test_data/single.json".to_string()])
        .unwrap()
        .remove(0)
}

#[cfg(test)]
fn print_args(fmt: &str) -> PrintArgs {
    PrintArgs {
        fmt: Some(fmt.to_string()),
    }
}

#[test]
fn test_print_node_usage() {
    let s = test_snapshot();
    let mut out = Vec::new();
    print_node_usage(
        &mut out,
        &s,
        "c1",
        None,
        &CpuKeys::default(),
        &GpuLayout::new(),
        &print_args("csv,job,user,cpu-user,mem"),
    )
    .unwrap();
    assert!(String::from_utf8(out).unwrap() == "1001,alice,50.0,4096.0\n1002,bob,35.0,1024.0\n");

    // Unknown host, unknown job
    let mut out = Vec::new();
    let args = print_args("job");
    assert!(print_node_usage(&mut out, &s, "c9", None, &CpuKeys::default(), &GpuLayout::new(), &args).is_err());
    assert!(print_node_usage(&mut out, &s, "c1", Some("7"), &CpuKeys::default(), &GpuLayout::new(), &args).is_err());
}

#[test]
fn test_print_job_usage() {
    let s = test_snapshot();
    let gpus = snaplog::read_gpu_layout("../snaplog/test_data/gpus.json").unwrap();
    let mut out = Vec::new();
    print_job_usage(
        &mut out,
        &s,
        Some("1002"),
        &CpuKeys::default(),
        &gpus,
        &print_args("csv,header,job,host,cpu-user,gpu,mem-total"),
    )
    .unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "job,host,cpu-user,gpu,mem-total\n1002,\"c1,c2\",32.5,30.0,288000.0\n"
    );
}

#[test]
fn test_all_jobs_in_id_order() {
    let mut s = test_snapshot();
    let job = s.jobs["1001"].clone();
    s.jobs.insert("999".to_string(), job);
    let mut out = Vec::new();
    print_job_usage(
        &mut out,
        &s,
        None,
        &CpuKeys::default(),
        &GpuLayout::new(),
        &print_args("csv,job,user"),
    )
    .unwrap();
    assert!(String::from_utf8(out).unwrap() == "999,alice\n1001,alice\n1002,bob\n");

    let mut out = Vec::new();
    print_node_usage(
        &mut out,
        &s,
        "c1",
        None,
        &CpuKeys::default(),
        &GpuLayout::new(),
        &print_args("csv,job"),
    )
    .unwrap();
    assert!(String::from_utf8(out).unwrap() == "999\n1001\n1002\n");
}

#[test]
fn test_no_data_prints_na() {
    let mut s = test_snapshot();
    s.nodes.clear();
    let mut out = Vec::new();
    print_job_usage(
        &mut out,
        &s,
        Some("1001"),
        &CpuKeys::default(),
        &GpuLayout::new(),
        &print_args("csv,job,cpu-user,gpu"),
    )
    .unwrap();
    assert!(String::from_utf8(out).unwrap() == "1001,N/A,N/A\n");
}
