// Usage of a single job on a single host.

use crate::snapshot::{CpuKeys, GpuLayout, JobRecord, NodeData};
use crate::usage::{CpuUsage, GpuUsage, IbUsage, LustreUsage, MemUsage, UsageRecord};

use tracing::{debug, trace};

/// Figures for a job on one host before the CPU counters are averaged over the job's cores.  The
/// `usage.cpu` field is zero; `cpu` holds the sums over the `cores` assigned cores.

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HostSums {
    pub cores: usize,
    pub cpu: CpuUsage,
    pub usage: UsageRecord,
}

/// Compute the average utilization of job `job_id` on `host`, given the node's snapshot data.
///
/// If the job has no cores on the host then the result is the all-zero record.  If the host is in
/// the job's layout but with an empty core list then there is nothing to average over and the
/// result is None.
///
/// CPU figures are averages over the job's cores on the host, so they are comparable between jobs
/// of different sizes.  Memory `used` is the job's own memory on the host, `total` is the node's.
/// The GPU figure is the average over the GPUs assigned to the job on the host, and is zero if the
/// job has no GPUs or the assignment is unknown.  InfiniBand and Lustre are the node's figures.

pub fn compute_node_usage(
    job_id: &str,
    job: &JobRecord,
    node: &NodeData,
    host: &str,
    gpu_layout: &GpuLayout,
    cpu_keys: &CpuKeys,
) -> Option<UsageRecord> {
    let cores = match job.layout.get(host) {
        Some(cores) => cores,
        None => return Some(UsageRecord::default()),
    };
    let sums = host_sums(job_id, job, node, host, cores, gpu_layout, cpu_keys);
    if sums.cores == 0 {
        debug!(job_id, host, "job has an empty core list on host");
        return None;
    }
    let mut usage = sums.usage;
    usage.cpu = sums.cpu.scaled(1.0 / sums.cores as f64);
    trace!(job_id, host, ?usage, "node usage");
    Some(usage)
}

pub(crate) fn host_sums(
    job_id: &str,
    job: &JobRecord,
    node: &NodeData,
    host: &str,
    cores: &[usize],
    gpu_layout: &GpuLayout,
    cpu_keys: &CpuKeys,
) -> HostSums {
    let mut cpu = CpuUsage::default();
    for &ix in cores {
        match node.cpu.core_rows.get(ix) {
            Some(row) => cpu.add(&cpu_keys.decode(row).into()),
            None => {
                // Broken layout.  The core still counts toward the average.
                debug!(job_id, host, core = ix, "core index out of range");
            }
        }
    }

    let infiniband = match node.infiniband {
        Some(ref ib) => IbUsage {
            bytes_in: ib.bytes_in,
            bytes_out: ib.bytes_out,
        },
        None => IbUsage::default(),
    };

    HostSums {
        cores: cores.len(),
        cpu,
        usage: UsageRecord {
            cpu: CpuUsage::default(),
            mem: MemUsage {
                used: job.mem_on(host),
                max: job.mem_max,
                total: node.mem.total,
            },
            gpu: GpuUsage {
                total: gpu_average(job_id, job, node, host, gpu_layout),
            },
            infiniband,
            lustre: LustreUsage {
                read: node.lustre.read,
                write: node.lustre.write,
            },
        },
    }
}

// Average utilization of the GPUs assigned to the job on the host, zero when the job has no GPUs
// or the assignment is unknown or empty.

fn gpu_average(
    job_id: &str,
    job: &JobRecord,
    node: &NodeData,
    host: &str,
    gpu_layout: &GpuLayout,
) -> f64 {
    if job.n_gpus == 0 {
        return 0.0;
    }
    match gpu_layout.get(job_id).and_then(|hosts| hosts.get(host)) {
        Some(gpus) if !gpus.is_empty() => {
            let sum = gpus.iter().fold(0.0, |acc, &g| acc + node.gpu_util(g));
            sum / gpus.len() as f64
        }
        _ => 0.0,
    }
}

#[cfg(test)]
use crate::testutil::{gpu_layout, job, node};

#[test]
fn test_absent_host_is_zero() {
    let j = job(&[("a", &[0, 1])], 0);
    let n = node(&[[50.0, 0.0, 5.0, 10.0, 35.0]; 2], &[]);
    let u = compute_node_usage("1", &j, &n, "b", &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u == UsageRecord::default());
}

#[test]
fn test_uniform_cores_reproduce() {
    let j = job(&[("a", &[0, 1])], 0);
    let n = node(&[[50.0, 0.0, 5.0, 10.0, 35.0]; 4], &[]);
    let u = compute_node_usage("1", &j, &n, "a", &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.cpu == CpuUsage { user: 50.0, system: 5.0, wait: 10.0, idle: 35.0 });
}

#[test]
fn test_averages_only_assigned_cores() {
    let j = job(&[("a", &[1, 3])], 0);
    let n = node(
        &[
            [90.0, 0.0, 0.0, 0.0, 10.0],
            [20.0, 10.0, 4.0, 6.0, 60.0],
            [90.0, 0.0, 0.0, 0.0, 10.0],
            [40.0, 0.0, 2.0, 2.0, 56.0],
        ],
        &[],
    );
    let u = compute_node_usage("1", &j, &n, "a", &GpuLayout::new(), &CpuKeys::default()).unwrap();
    // user includes nice
    assert!(u.cpu == CpuUsage { user: 35.0, system: 3.0, wait: 4.0, idle: 58.0 });
}

#[test]
fn test_memory_and_io_passthrough() {
    let mut j = job(&[("a", &[0])], 0);
    j.mem.insert("a".to_string(), 2048.0);
    j.mem_max = 4096.0;
    let mut n = node(&[[1.0, 0.0, 0.0, 0.0, 99.0]], &[]);
    n.mem.total = 65536.0;
    n.lustre.read = 7.0;
    n.lustre.write = 9.0;
    let u = compute_node_usage("1", &j, &n, "a", &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.mem == MemUsage { used: 2048.0, max: 4096.0, total: 65536.0 });
    assert!(u.lustre == LustreUsage { read: 7.0, write: 9.0 });
    // No InfiniBand device
    assert!(u.infiniband == IbUsage::default());

    n.infiniband = Some(crate::snapshot::Infiniband {
        bytes_in: 100.0,
        bytes_out: 200.0,
        pkts_in: 1.0,
        pkts_out: 2.0,
    });
    let u = compute_node_usage("1", &j, &n, "a", &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.infiniband == IbUsage { bytes_in: 100.0, bytes_out: 200.0 });
}

#[test]
fn test_gpu_usage() {
    let n = node(&[[1.0, 0.0, 0.0, 0.0, 99.0]], &[10.0, 20.0, 60.0, 90.0]);
    let layout = gpu_layout(&[("1", "a", &[1, 2])]);
    let keys = CpuKeys::default();

    let j = job(&[("a", &[0])], 2);
    let u = compute_node_usage("1", &j, &n, "a", &layout, &keys).unwrap();
    assert!(u.gpu.total == 40.0);

    // Unknown mapping for this job
    let u = compute_node_usage("2", &j, &n, "a", &layout, &keys).unwrap();
    assert!(u.gpu.total == 0.0);

    // Empty mapping
    let empty = gpu_layout(&[("1", "a", &[])]);
    let u = compute_node_usage("1", &j, &n, "a", &empty, &keys).unwrap();
    assert!(u.gpu.total == 0.0);

    // Not a GPU job, whatever the layout says
    let j = job(&[("a", &[0])], 0);
    let u = compute_node_usage("1", &j, &n, "a", &layout, &keys).unwrap();
    assert!(u.gpu.total == 0.0);
}

#[test]
fn test_empty_core_list_is_no_data() {
    let j = job(&[("a", &[])], 0);
    let n = node(&[[1.0, 0.0, 0.0, 0.0, 99.0]], &[]);
    assert!(compute_node_usage("1", &j, &n, "a", &GpuLayout::new(), &CpuKeys::default()).is_none());
}
