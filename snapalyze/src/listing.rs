// Listings for one node in the latest snapshot: the per-core breakdown, the jobs on the node, and
// the warnings for the node.

use crate::format;
use crate::PrintArgs;

use anyhow::{bail, Result};
use snaplog::{self, CoreUsage, CpuKeys, NodeData, Snapshot, Warning, WarningFlags};
use std::collections::HashMap;
use std::io;

fn get_node<'a>(snapshot: &'a Snapshot, host: &str) -> Result<&'a NodeData> {
    match snapshot.nodes.get(host) {
        Some(node) => Ok(node),
        None => bail!("Host {host} is not in the latest snapshot"),
    }
}

/// Print the breakdown of every core on `host`, marking the cores of `job_id` with "*".

pub fn print_cores(
    output: &mut dyn io::Write,
    snapshot: &Snapshot,
    host: &str,
    job_id: Option<&str>,
    cpu_keys: &CpuKeys,
    print_args: &PrintArgs,
) -> Result<()> {
    let node = get_node(snapshot, host)?;
    let cores = snaplog::core_usage(node, cpu_keys, snaplog::selected_cores(snapshot, host, job_id));

    let mut formatters: HashMap<String, &dyn Fn(&CoreUsage, ()) -> String> = HashMap::new();
    formatters.insert("core".to_string(), &format_core);
    formatters.insert("user".to_string(), &format_core_user);
    formatters.insert("system".to_string(), &format_core_system);
    formatters.insert("wait".to_string(), &format_core_wait);
    formatters.insert("idle".to_string(), &format_core_idle);
    formatters.insert("selected".to_string(), &format_core_selected);

    let spec = print_args.fmt.as_deref().unwrap_or("core,selected,user,system,wait,idle");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others)?;
    if !fields.is_empty() {
        format::format_data(output, &fields, &formatters, &opts, &cores, ())?;
    }
    Ok(())
}

fn format_core(c: &CoreUsage, _: ()) -> String {
    format!("{}", c.index)
}

fn format_core_user(c: &CoreUsage, _: ()) -> String {
    format!("{:.1}", c.user)
}

fn format_core_system(c: &CoreUsage, _: ()) -> String {
    format!("{:.1}", c.system)
}

fn format_core_wait(c: &CoreUsage, _: ()) -> String {
    format!("{:.1}", c.wait)
}

fn format_core_idle(c: &CoreUsage, _: ()) -> String {
    format!("{:.1}", c.idle)
}

fn format_core_selected(c: &CoreUsage, _: ()) -> String {
    (if c.selected { "*" } else { "" }).to_string()
}

struct JobLine<'a> {
    job_id: &'a str,
    user: &'a str,
    owner: &'static str,
    description: String,
    warning: bool,
}

/// Print the jobs on `host`, those of `username` first, each group in job ID order.  Jobs
/// with warnings on the host are marked with "!" if there are warning flags.

pub fn print_jobs(
    output: &mut dyn io::Write,
    snapshot: &Snapshot,
    host: &str,
    username: &str,
    flags: Option<&WarningFlags>,
    print_args: &PrintArgs,
) -> Result<()> {
    get_node(snapshot, host)?;
    let (own, other) = snaplog::jobs_on_node(snapshot, host, username);
    let lines = own
        .iter()
        .map(|id| (*id, "own"))
        .chain(other.iter().map(|id| (*id, "other")))
        .map(|(id, owner)| {
            let job = &snapshot.jobs[id];
            JobLine {
                job_id: id,
                user: &job.username,
                owner,
                description: snaplog::describe_job(id, job),
                warning: flags
                    .map(|f| snaplog::has_job_warning(f, host, id))
                    .unwrap_or(false),
            }
        })
        .collect::<Vec<JobLine>>();

    let mut formatters: HashMap<String, &dyn Fn(&JobLine, ()) -> String> = HashMap::new();
    formatters.insert("job".to_string(), &format_job_id);
    formatters.insert("user".to_string(), &format_job_user);
    formatters.insert("owner".to_string(), &format_job_owner);
    formatters.insert("desc".to_string(), &format_job_desc);
    formatters.insert("warn".to_string(), &format_job_warn);

    let spec = print_args.fmt.as_deref().unwrap_or("noheader,warn,owner,desc");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others)?;
    if !fields.is_empty() {
        format::format_data(output, &fields, &formatters, &opts, &lines, ())?;
    }
    Ok(())
}

fn format_job_id(j: &JobLine, _: ()) -> String {
    j.job_id.to_string()
}

fn format_job_user(j: &JobLine, _: ()) -> String {
    j.user.to_string()
}

fn format_job_owner(j: &JobLine, _: ()) -> String {
    j.owner.to_string()
}

fn format_job_desc(j: &JobLine, _: ()) -> String {
    j.description.clone()
}

fn format_job_warn(j: &JobLine, _: ()) -> String {
    (if j.warning { "!" } else { "" }).to_string()
}

/// Print the warnings for `host`, and for `job_id` on the host if given, one per line.

pub fn print_warnings(
    output: &mut dyn io::Write,
    flags: &WarningFlags,
    host: &str,
    job_id: Option<&str>,
    print_args: &PrintArgs,
) -> Result<()> {
    let warnings = snaplog::host_warnings(flags, host, job_id);

    let mut formatters: HashMap<String, &dyn Fn(&Warning, ()) -> String> = HashMap::new();
    formatters.insert("scope".to_string(), &format_warning_scope);
    formatters.insert("text".to_string(), &format_warning_text);
    formatters.insert("warning".to_string(), &format_warning);

    let spec = print_args.fmt.as_deref().unwrap_or("noheader,warning");
    let (fields, others) = format::parse_fields(spec, &formatters);
    let opts = format::standard_options(&others)?;
    if !fields.is_empty() {
        format::format_data(output, &fields, &formatters, &opts, &warnings, ())?;
    }
    Ok(())
}

fn format_warning_scope(w: &Warning, _: ()) -> String {
    match w.scope {
        snaplog::Scope::Node => "node".to_string(),
        snaplog::Scope::Job => "job".to_string(),
    }
}

fn format_warning_text(w: &Warning, _: ()) -> String {
    w.text.clone()
}

fn format_warning(w: &Warning, _: ()) -> String {
    w.to_string()
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
fn test_print_cores() {
    let s = test_snapshot();
    let mut out = Vec::new();
    print_cores(&mut out, &s, "c1", Some("1002"), &CpuKeys::default(), &print_args("csv,core,selected,user,idle"))
        .unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "0,,50.0,35.0\n1,,50.0,35.0\n2,*,30.0,60.0\n3,*,40.0,50.0\n"
    );
    let mut out = Vec::new();
    assert!(print_cores(&mut out, &s, "c3", None, &CpuKeys::default(), &print_args("core")).is_err());
}

#[test]
fn test_print_jobs() {
    let s = test_snapshot();
    let flags = snaplog::read_warning_flags("../snaplog/test_data/warnings.json").unwrap();

    // bob's job first, and there are no job warnings on c1
    let mut out = Vec::new();
    print_jobs(&mut out, &s, "c1", "bob", Some(&flags), &print_args("csv,warn,owner,job,user")).unwrap();
    assert!(String::from_utf8(out).unwrap() == ",own,1002,bob\n,other,1001,alice\n");

    let mut out = Vec::new();
    print_jobs(&mut out, &s, "c2", "alice", Some(&flags), &print_args("noheader,warn,owner,desc")).unwrap();
    assert!(String::from_utf8(out).unwrap() == "!  other  1002: train [R, 4 cores]\n");
}

#[test]
fn test_print_warnings() {
    let flags = snaplog::read_warning_flags("../snaplog/test_data/warnings.json").unwrap();
    let mut out = Vec::new();
    print_warnings(&mut out, &flags, "c2", Some("1002"), &print_args("noheader,warning")).unwrap();
    assert!(
        String::from_utf8(out).unwrap()
            == "Warning: Job spends significant time waiting\n\
                Warning: Job underutilizes requested memory\n"
    );

    let mut out = Vec::new();
    print_warnings(&mut out, &flags, "c1", None, &print_args("csv,scope,text")).unwrap();
    assert!(String::from_utf8(out).unwrap() == "node,Node is using disk swap\n");

    // Unknown host has no warnings
    let mut out = Vec::new();
    print_warnings(&mut out, &flags, "c9", None, &print_args("noheader,warning")).unwrap();
    assert!(out.is_empty());
}
