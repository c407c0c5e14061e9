// Per-node views for listings: the per-core breakdown and the jobs on the node.

use crate::snapshot::{CpuKeys, JobRecord, NodeData, Snapshot};

use itertools::Itertools;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoreUsage {
    pub index: usize,
    pub user: f64,
    pub wait: f64,
    pub system: f64,
    pub idle: f64,

    /// True if the core is one of the selected job's cores on the node.
    pub selected: bool,
}

/// Return the breakdown of every core on `node`, marking the cores in `selected_cores`.

pub fn core_usage(node: &NodeData, cpu_keys: &CpuKeys, selected_cores: &[usize]) -> Vec<CoreUsage> {
    node.cpu
        .core_rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let c = cpu_keys.decode(row);
            CoreUsage {
                index,
                user: c.user,
                wait: c.wait,
                system: c.system,
                idle: c.idle,
                selected: selected_cores.contains(&index),
            }
        })
        .collect()
}

/// The cores of job `job_id` on `host` in `snapshot`, empty if the job is unknown or does not run
/// on the host.

pub fn selected_cores<'a>(snapshot: &'a Snapshot, host: &str, job_id: Option<&str>) -> &'a [usize] {
    job_id
        .and_then(|id| snapshot.jobs.get(id))
        .and_then(|job| job.layout.get(host))
        .map(|cores| cores.as_slice())
        .unwrap_or(&[])
}

/// Job ID order: IDs that are unsigned integers come first, ascending by value, and any other IDs
/// follow in string order.  "999" thus precedes "1000".

pub fn job_id_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// All the jobs in `snapshot`, in job ID order.

pub fn jobs_in_order(snapshot: &Snapshot) -> Vec<(&str, &JobRecord)> {
    snapshot
        .jobs
        .iter()
        .map(|(id, job)| (id.as_str(), job))
        .sorted_by(|a, b| job_id_order(a.0, b.0))
        .collect()
}

/// Return the IDs of the jobs with cores on `host`, split into the jobs belonging to `username`
/// and the others ("cohabitants").  Both lists are in job ID order.

pub fn jobs_on_node<'a>(snapshot: &'a Snapshot, host: &str, username: &str) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut own = vec![];
    let mut other = vec![];
    for (id, job) in jobs_in_order(snapshot) {
        if !job.layout.contains_key(host) {
            continue;
        }
        if job.username == username {
            own.push(id);
        } else {
            other.push(id);
        }
    }
    (own, other)
}

/// One-line description of a job: "id: name [state, N cores]".

pub fn describe_job(job_id: &str, job: &JobRecord) -> String {
    format!("{}: {} [{}, {} cores]", job_id, job.name, job.state, job.n_cpus)
}

/// Names of the GPU series for `node`: gpu0, gpu1, ...

pub fn gpu_names(node: &NodeData) -> Vec<String> {
    (0..node.gpu_count).map(|i| format!("gpu{}", i)).collect()
}

#[cfg(test)]
use crate::testutil::{job, node, snapshot};

#[test]
fn test_core_usage() {
    let n = node(&[[10.0, 5.0, 1.0, 2.0, 82.0], [0.0, 0.0, 0.0, 0.0, 100.0]], &[]);
    let cs = core_usage(&n, &CpuKeys::default(), &[1]);
    assert!(cs.len() == 2);
    assert!(cs[0].user == 15.0 && cs[0].system == 1.0 && cs[0].wait == 2.0 && cs[0].idle == 82.0);
    assert!(!cs[0].selected);
    assert!(cs[1].selected && cs[1].index == 1);
}

#[test]
fn test_jobs_on_node() {
    let mut mine = job(&[("a", &[0])], 0);
    mine.username = "alice".to_string();
    let mut theirs = job(&[("a", &[1]), ("b", &[0])], 0);
    theirs.username = "bob".to_string();
    let mut elsewhere = job(&[("b", &[1])], 0);
    elsewhere.username = "alice".to_string();
    let s = snapshot(
        0,
        vec![("a", node(&[[0.0; 5]; 2], &[]))],
        vec![("20", mine.clone()), ("10", mine), ("15", theirs), ("30", elsewhere)],
    );
    let (own, other) = jobs_on_node(&s, "a", "alice");
    assert!(own == vec!["10", "20"]);
    assert!(other == vec!["15"]);

    assert!(selected_cores(&s, "a", Some("15")) == [1]);
    assert!(selected_cores(&s, "a", Some("30")).is_empty());
    assert!(selected_cores(&s, "a", Some("99")).is_empty());
    assert!(selected_cores(&s, "a", None).is_empty());
}

#[test]
fn test_job_ids_ordered_by_value() {
    let a = job(&[("a", &[0])], 0);
    let s = snapshot(
        0,
        vec![("a", node(&[[0.0; 5]], &[]))],
        vec![("1000", a.clone()), ("x7", a.clone()), ("999", a.clone()), ("10000", a)],
    );
    let (own, other) = jobs_on_node(&s, "a", "user");
    assert!(own == vec!["999", "1000", "10000", "x7"]);
    assert!(other.is_empty());
    assert!(jobs_in_order(&s).iter().map(|(id, _)| *id).collect::<Vec<_>>() == own);

    assert!(job_id_order("999", "1000") == Ordering::Less);
    assert!(job_id_order("abc", "12") == Ordering::Greater);
    assert!(job_id_order("abc", "abd") == Ordering::Less);
}

#[test]
fn test_describe_job_and_gpu_names() {
    let mut j = job(&[("a", &[0, 1])], 0);
    j.name = "train".to_string();
    assert!(describe_job("42", &j) == "42: train [R, 2 cores]");

    let n = node(&[[0.0; 5]], &[1.0, 2.0, 3.0]);
    assert!(gpu_names(&n) == vec!["gpu0", "gpu1", "gpu2"]);
}
