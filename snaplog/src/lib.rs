// This library handles snapshots of cluster telemetry: per-node CPU, memory, GPU, network and file
// system counters, plus the layouts of the jobs on the nodes (which cores and GPUs each job has on
// each host).  It reads snapshots and computes normalized usage from them.
//
// All the computation is pure: the functions take snapshot data and return new records, and
// nothing is cached or retained between calls.
//
// The pieces, leaf first:
//
//  - Node usage: the average utilization of one job on one host.
//
//  - Job usage: node usages combined across all the hosts of a job.
//
//  - History: per-timestamp records for charting, for a node and optionally a job on it, or for a
//    job across its hosts.
//
//  - Warnings: ordered warnings from flags that have been computed elsewhere.
//
// Missing data resolve to zero wherever zero is the truth (a job with no cores on a host uses
// nothing there) and to None where there is no data to compute from (a job with no reporting
// hosts), so that callers can tell "0%" from "N/A".

mod history;
mod jobusage;
mod nodeusage;
mod nodeview;
mod snapfile;
mod snapshot;
mod usage;
mod warnings;

#[cfg(test)]
mod testutil;

// The input data model.

pub use snapshot::{
    CpuCounters, CpuData, CpuKeys, GpuLayout, Infiniband, IoCounters, JobRecord, MemData, NodeData,
    Snapshot, SwapData, Timestamp,
};

// The UsageRecord holds normalized utilization for a job on a node or across nodes: CPU and GPU
// figures are percentages, memory is MB, I/O is as reported by the nodes.

pub use usage::{CpuUsage, GpuUsage, IbUsage, LustreUsage, MemUsage, UsageRecord};

// Compute the usage of one job on one host.  None means no data: the host is in the job's layout
// but without any cores.

pub use nodeusage::compute_node_usage;

// Compute the usage of one job across all its reporting hosts.  None means no data: no host is
// reporting.

pub use jobusage::compute_job_usage;

// Build chart series from a window of snapshots, for a host (optionally tracking a job on it) or
// for a job across hosts.

pub use history::{build_history, build_job_history, time_string, HistoryPoint, JobHistoryPoint, Window};

// Snapshot memory is in MB; history memory is in bytes.

pub use history::BYTES_PER_MB;

// Derive ordered warnings from precomputed flags.

pub use warnings::{
    derive_warnings, has_job_warning, host_warnings, HostFlags, JobFlags, NodeFlags, Scope,
    Warning, WarningFlags, WarningKind,
};

// Per-node listings: core breakdown, jobs on the node, job descriptions, GPU series names.  Jobs
// are listed with integer IDs in numeric order.

pub use nodeview::{
    core_usage, describe_job, gpu_names, job_id_order, jobs_in_order, jobs_on_node,
    selected_cores, CoreUsage,
};

// Read snapshot, GPU layout and warning flag files, and find snapshot files in a directory.

pub use snapfile::{find_snapshot_files, read_gpu_layout, read_snapshots, read_warning_flags};

// Feeding a snapshot through the whole pipeline must give the same numbers as computing directly,
// modulo the MB-to-bytes scaling of the history.

#[test]
fn test_pipeline_agrees_with_direct_computation() {
    let snaps = read_snapshots(&vec!["test_data/single.json".to_string()]).unwrap();
    let gpus = read_gpu_layout("test_data/gpus.json").unwrap();
    let keys = CpuKeys::default();
    let s = &snaps[0];

    let direct = compute_node_usage("1001", &s.jobs["1001"], &s.nodes["c1"], "c1", &gpus, &keys)
        .unwrap();
    assert!(direct.cpu == CpuUsage { user: 50.0, system: 5.0, wait: 10.0, idle: 35.0 });

    let h = build_history(&snaps, Window::All, "c1", Some("1001"), &keys, &gpus);
    assert!(h.len() == 1);
    assert!(h[0].job_user == direct.cpu.user);
    assert!(h[0].job_system == direct.cpu.system);
    assert!(h[0].job_wait == direct.cpu.wait);
    assert!(h[0].job_mem == direct.mem.used * BYTES_PER_MB);
    assert!(h[0].job_mem_max == direct.mem.max * BYTES_PER_MB);
    assert!(h[0].mem == 20000.0 * BYTES_PER_MB);
    assert!(h[0].swap == 512.0 * BYTES_PER_MB);
    assert!(h[0].infiniband_in == 1000.0 && h[0].infiniband_pkts_out == 20.0);

    let job = compute_job_usage("1002", &s.jobs["1002"], &s.nodes, &gpus, &keys).unwrap();
    assert!(job.cpu == CpuUsage { user: 32.5, system: 7.5, wait: 2.5, idle: 57.5 });
    assert!(job.mem == MemUsage { used: 4096.0, max: 5000.0, total: 288000.0 });
    // GPU average 60 on c2, nothing mapped on c1, divided by two hosts
    assert!(job.gpu.total == 30.0);
    assert!(job.infiniband == IbUsage { bytes_in: 1000.0, bytes_out: 2000.0 });
    assert!(job.lustre == LustreUsage { read: 400.0, write: 450.0 });

    let jh = build_job_history(&snaps, Window::All, "1002", &keys, &gpus);
    assert!(jh.len() == 1 && jh[0].usage == Some(job));
}

#[test]
fn test_history_from_files() {
    let snaps = read_snapshots(&vec![
        "test_data/single.json".to_string(),
        "test_data/history.json".to_string(),
    ])
    .unwrap();
    let keys = CpuKeys::default();
    let gpus = GpuLayout::new();

    // c2 is only in the middle snapshot
    let h = build_history(&snaps, Window::All, "c2", None, &keys, &gpus);
    assert!(h.len() == 1 && h[0].gpus == vec![80.0, 40.0]);

    let h = build_history(&snaps, Window::trailing(1692093660, 120), "c1", Some("1001"), &keys, &gpus);
    assert!(h.iter().map(|p| p.time).collect::<Vec<_>>() == vec![1692093540, 1692093600, 1692093660]);

    // Job 1001 has not started in the first snapshot
    assert!(h[0].job_user == 0.0 && h[0].job_mem == 0.0);
    assert!(h[1].job_user == 50.0);
    assert!(h[2].job_user == 60.0 && h[2].job_mem == 4200.0 * BYTES_PER_MB);

    let h = build_history(&snaps, Window::trailing(1692093660, 60), "c1", None, &keys, &gpus);
    assert!(h.len() == 2);
}
