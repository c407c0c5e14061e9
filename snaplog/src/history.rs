// Time series for charting, built from a window of snapshots.

use crate::jobusage::compute_job_usage;
use crate::nodeusage::compute_node_usage;
use crate::snapshot::{CpuKeys, GpuLayout, Snapshot, Timestamp};
use crate::usage::UsageRecord;

use chrono::{Local, TimeZone};
use itertools::Itertools;
use serde::Serialize;
use tracing::debug;

/// Snapshot memory figures are in MB; history memory figures are in bytes.

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The span of snapshot times to include in a series.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Every snapshot.
    All,

    /// Snapshots with times in the closed interval [now - seconds, now].
    Trailing { now: Timestamp, seconds: i64 },
}

impl Window {
    pub fn trailing(now: Timestamp, seconds: i64) -> Window {
        Window::Trailing { now, seconds }
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        match *self {
            Window::All => true,
            Window::Trailing { now, seconds } => now.saturating_sub(seconds) <= t && t <= now,
        }
    }
}

/// One point of a node's history.  Node-wide fields are always present; the `job_` fields pertain
/// to the tracked job on the node and are zero when the job is not in the snapshot.
///
/// Memory and swap are bytes.  CPU and GPU are percentages.  I/O counters are as reported.

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub time: Timestamp,

    /// Local time as "HH:MM", for axis labels.
    pub time_string: String,

    pub user: f64,
    pub system: f64,
    pub wait: f64,
    pub mem: f64,
    pub swap: f64,
    pub infiniband_in: f64,
    pub infiniband_out: f64,
    pub infiniband_pkts_in: f64,
    pub infiniband_pkts_out: f64,
    pub lustre_read: f64,
    pub lustre_write: f64,
    pub jobfs_read: f64,
    pub jobfs_write: f64,

    /// Utilization by GPU index, one entry per GPU on the node.
    pub gpus: Vec<f64>,

    pub job_user: f64,
    pub job_system: f64,
    pub job_wait: f64,
    pub job_mem: f64,
    pub job_mem_max: f64,
    pub job_mem_requested: f64,
}

/// One point of a job's history across all its hosts.  `usage` is None when the job is not in the
/// snapshot or none of its hosts are reporting.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHistoryPoint {
    pub time: Timestamp,
    pub time_string: String,
    pub usage: Option<UsageRecord>,
}

/// Build the history of `host` from the snapshots within `window`, optionally tracking the usage
/// of job `job_id` on the host.
///
/// The snapshots need not be sorted or prefiltered; the result is sorted ascending by time, and
/// snapshots with the same time keep their relative order.  Snapshots in which the host does not
/// appear are skipped.
///
/// A job that is not in a snapshot (not started yet, or already gone) has zero job fields in that
/// point, which can't be distinguished from a job that used nothing.

pub fn build_history(
    snapshots: &[Snapshot],
    window: Window,
    host: &str,
    job_id: Option<&str>,
    cpu_keys: &CpuKeys,
    gpu_layout: &GpuLayout,
) -> Vec<HistoryPoint> {
    snapshots
        .iter()
        .filter(|s| window.contains(s.timestamp))
        .sorted_by_key(|s| s.timestamp)
        .filter_map(|s| {
            let point = history_point(s, host, job_id, cpu_keys, gpu_layout);
            if point.is_none() {
                debug!(host, time = s.timestamp, "host not in snapshot");
            }
            point
        })
        .collect()
}

/// Build the job-wide history of job `job_id` from the snapshots within `window`.  There is one
/// point per snapshot in the window, sorted as for `build_history`.

pub fn build_job_history(
    snapshots: &[Snapshot],
    window: Window,
    job_id: &str,
    cpu_keys: &CpuKeys,
    gpu_layout: &GpuLayout,
) -> Vec<JobHistoryPoint> {
    snapshots
        .iter()
        .filter(|s| window.contains(s.timestamp))
        .sorted_by_key(|s| s.timestamp)
        .map(|s| JobHistoryPoint {
            time: s.timestamp,
            time_string: time_string(s.timestamp),
            usage: s
                .jobs
                .get(job_id)
                .and_then(|job| compute_job_usage(job_id, job, &s.nodes, gpu_layout, cpu_keys)),
        })
        .collect()
}

fn history_point(
    snapshot: &Snapshot,
    host: &str,
    job_id: Option<&str>,
    cpu_keys: &CpuKeys,
    gpu_layout: &GpuLayout,
) -> Option<HistoryPoint> {
    let node = snapshot.nodes.get(host)?;
    let total = cpu_keys.decode(&node.cpu.total_row);
    let ib = node.infiniband.unwrap_or_default();

    let mut point = HistoryPoint {
        time: snapshot.timestamp,
        time_string: time_string(snapshot.timestamp),
        user: total.user,
        system: total.system,
        wait: total.wait,
        mem: node.mem.used * BYTES_PER_MB,
        swap: (node.swap.total - node.swap.free) * BYTES_PER_MB,
        infiniband_in: ib.bytes_in,
        infiniband_out: ib.bytes_out,
        infiniband_pkts_in: ib.pkts_in,
        infiniband_pkts_out: ib.pkts_out,
        lustre_read: node.lustre.read,
        lustre_write: node.lustre.write,
        jobfs_read: node.jobfs.read,
        jobfs_write: node.jobfs.write,
        gpus: (0..node.gpu_count).map(|i| node.gpu_util(i)).collect(),
        ..Default::default()
    };

    if let Some((job_id, job)) = job_id.and_then(|id| snapshot.jobs.get_key_value(id)) {
        // An empty core list on the host leaves the job's CPU fields at zero.
        let usage = compute_node_usage(job_id, job, node, host, gpu_layout, cpu_keys)
            .unwrap_or_default();
        point.job_user = usage.cpu.user;
        point.job_system = usage.cpu.system;
        point.job_wait = usage.cpu.wait;
        // Memory is reported per host regardless of the core list.
        if job.mem.contains_key(host) {
            point.job_mem = job.mem_on(host) * BYTES_PER_MB;
            point.job_mem_max = job.mem_max * BYTES_PER_MB;
            point.job_mem_requested = job.mem_requested * BYTES_PER_MB;
        }
    }

    Some(point)
}

/// Format `t` as local "HH:MM".

pub fn time_string(t: Timestamp) -> String {
    match Local.timestamp_opt(t, 0).earliest() {
        Some(d) => d.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

#[cfg(test)]
use crate::testutil::{job, node, snapshot};

#[cfg(test)]
fn sample_snapshots() -> Vec<Snapshot> {
    let mut n = node(&[[40.0, 10.0, 5.0, 5.0, 40.0]; 2], &[25.0, 75.0]);
    n.mem.used = 2.0;
    n.swap.total = 8.0;
    n.swap.free = 5.0;
    n.jobfs.read = 11.0;
    let mut j = job(&[("a", &[0, 1])], 0);
    j.mem.insert("a".to_string(), 1.0);
    j.mem_max = 1.5;
    j.mem_requested = 4.0;
    vec![
        snapshot(300, vec![("a", n.clone())], vec![("7", j.clone())]),
        snapshot(100, vec![("a", n.clone())], vec![]),
        snapshot(200, vec![("a", n.clone())], vec![("7", j)]),
        snapshot(250, vec![("b", n)], vec![]),
    ]
}

#[test]
fn test_history_sorted_and_windowed() {
    let snaps = sample_snapshots();
    let keys = CpuKeys::default();
    let h = build_history(&snaps, Window::All, "a", None, &keys, &GpuLayout::new());
    assert!(h.len() == 3);
    assert!(h.iter().map(|p| p.time).collect::<Vec<_>>() == vec![100, 200, 300]);

    // Window is closed at both ends
    let h = build_history(&snaps, Window::trailing(300, 100), "a", None, &keys, &GpuLayout::new());
    assert!(h.iter().map(|p| p.time).collect::<Vec<_>>() == vec![200, 300]);

    let h = build_history(&snaps, Window::trailing(250, 100), "a", None, &keys, &GpuLayout::new());
    assert!(h.iter().map(|p| p.time).collect::<Vec<_>>() == vec![200]);
}

#[test]
fn test_history_stable_on_ties() {
    let mut n1 = node(&[[10.0, 0.0, 0.0, 0.0, 90.0]], &[]);
    n1.mem.used = 1.0;
    let mut n2 = n1.clone();
    n2.mem.used = 2.0;
    let snaps = vec![
        snapshot(500, vec![("a", n1.clone())], vec![]),
        snapshot(100, vec![("a", n1)], vec![]),
        snapshot(100, vec![("a", n2)], vec![]),
    ];
    let h = build_history(&snaps, Window::All, "a", None, &CpuKeys::default(), &GpuLayout::new());
    assert!(h[0].mem == BYTES_PER_MB && h[1].mem == 2.0 * BYTES_PER_MB);
    assert!(h[2].time == 500);
}

#[test]
fn test_history_node_fields() {
    let snaps = sample_snapshots();
    let h = build_history(&snaps, Window::All, "a", None, &CpuKeys::default(), &GpuLayout::new());
    let p = &h[0];
    assert!(p.user == 50.0 && p.system == 5.0 && p.wait == 5.0);
    assert!(p.mem == 2.0 * BYTES_PER_MB);
    assert!(p.swap == 3.0 * BYTES_PER_MB);
    assert!(p.infiniband_in == 0.0 && p.infiniband_pkts_out == 0.0);
    assert!(p.jobfs_read == 11.0);
    assert!(p.gpus == vec![25.0, 75.0]);
    assert!(p.time_string.len() == 5 && &p.time_string[2..3] == ":");
}

#[test]
fn test_history_job_fields_zero_before_start() {
    let snaps = sample_snapshots();
    let h = build_history(&snaps, Window::All, "a", Some("7"), &CpuKeys::default(), &GpuLayout::new());

    // Not started at t=100
    assert!(h[0].time == 100);
    assert!(h[0].job_user == 0.0 && h[0].job_mem == 0.0 && h[0].job_mem_requested == 0.0);

    // Running at t=200
    assert!(h[1].job_user == 50.0 && h[1].job_system == 5.0 && h[1].job_wait == 5.0);
    assert!(h[1].job_mem == BYTES_PER_MB);
    assert!(h[1].job_mem_max == 1.5 * BYTES_PER_MB);
    assert!(h[1].job_mem_requested == 4.0 * BYTES_PER_MB);
}

#[test]
fn test_history_job_mem_without_cores() {
    let n = node(&[[40.0, 10.0, 5.0, 5.0, 40.0]], &[]);
    let mut j = job(&[("a", &[])], 0);
    j.mem.insert("a".to_string(), 3.0);
    j.mem_max = 4.0;
    let snaps = vec![snapshot(100, vec![("a", n)], vec![("7", j)])];
    let h = build_history(&snaps, Window::All, "a", Some("7"), &CpuKeys::default(), &GpuLayout::new());
    assert!(h.len() == 1);
    assert!(h[0].job_user == 0.0);
    assert!(h[0].job_mem == 3.0 * BYTES_PER_MB);
    assert!(h[0].job_mem_max == 4.0 * BYTES_PER_MB);
}

#[test]
fn test_job_history() {
    let snaps = sample_snapshots();
    let h = build_job_history(&snaps, Window::All, "7", &CpuKeys::default(), &GpuLayout::new());
    assert!(h.len() == 4);
    assert!(h.iter().map(|p| p.time).collect::<Vec<_>>() == vec![100, 200, 250, 300]);
    assert!(h[0].usage.is_none());
    assert!(h[1].usage.unwrap().cpu.user == 50.0);
    assert!(h[2].usage.is_none());
    assert!(h[3].usage.unwrap().mem.used == 1.0);
}

#[test]
fn test_time_string() {
    let t = Local.with_ymd_and_hms(2023, 8, 15, 7, 5, 0).unwrap().timestamp();
    assert!(time_string(t) == "07:05");
}
