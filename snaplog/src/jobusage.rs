// Usage of a job across all the hosts it runs on.

use crate::nodeusage::{host_sums, HostSums};
use crate::snapshot::{CpuKeys, GpuLayout, JobRecord, NodeData};
use crate::usage::UsageRecord;

use std::collections::HashMap;
use tracing::{debug, trace};

/// Compute the utilization of job `job_id` across the hosts in its layout, given the nodes known
/// at the time.
///
/// Hosts in the layout that are not among `nodes` have not reported yet and are skipped, so that
/// they do not dilute the averages.  For the rest:
///
/// - CPU figures are averaged over all the job's cores on the reporting hosts, ie, each host's
///   average is weighted by its core count.
/// - Memory `used` and `total` are summed across hosts; `max` is the job's maximum.
/// - InfiniBand and Lustre are summed across hosts.  These are node figures, so the sum is the
///   traffic the job is exposed to, not traffic the job generated.
/// - The GPU figure is the sum of the per-host GPU averages divided by the number of hosts in the
///   layout (including non-reporting hosts).  This is not the average over the job's GPUs when
///   the hosts have different numbers of GPUs assigned, but it is the established definition.
///
/// Returns None if no host in the layout is reporting, or the reporting hosts have no cores
/// assigned to the job.  That is "no data", not zero usage.

pub fn compute_job_usage(
    job_id: &str,
    job: &JobRecord,
    nodes: &HashMap<String, NodeData>,
    gpu_layout: &GpuLayout,
    cpu_keys: &CpuKeys,
) -> Option<UsageRecord> {
    let summed = job
        .layout
        .iter()
        .filter_map(|(host, cores)| match nodes.get(host) {
            Some(node) => Some(host_sums(job_id, job, node, host, cores, gpu_layout, cpu_keys)),
            None => {
                debug!(job_id, host = host.as_str(), "host not reporting");
                None
            }
        })
        .fold(HostSums::default(), |acc, h| merge(acc, h, job.n_gpus > 0));

    if summed.cores == 0 {
        debug!(job_id, "no data for job");
        return None;
    }

    let mut usage = summed.usage;
    usage.cpu = summed.cpu.scaled(1.0 / summed.cores as f64);
    usage.mem.max = job.mem_max;
    usage.gpu.total /= job.layout.len() as f64;
    trace!(job_id, ?usage, "job usage");
    Some(usage)
}

// Fold one host's figures into the accumulator.  CPU counters are sums over cores already, so
// adding them weights each host by its core count.

fn merge(mut acc: HostSums, h: HostSums, gpu_job: bool) -> HostSums {
    acc.cores += h.cores;
    acc.cpu.add(&h.cpu);
    let (a, u) = (&mut acc.usage, &h.usage);
    a.mem.used += u.mem.used;
    a.mem.total += u.mem.total;
    a.infiniband.bytes_in += u.infiniband.bytes_in;
    a.infiniband.bytes_out += u.infiniband.bytes_out;
    a.lustre.read += u.lustre.read;
    a.lustre.write += u.lustre.write;
    if gpu_job {
        a.gpu.total += u.gpu.total;
    }
    acc
}

#[cfg(test)]
use crate::testutil::{gpu_layout, job, node};

#[cfg(test)]
fn nodes(ns: Vec<(&str, NodeData)>) -> HashMap<String, NodeData> {
    ns.into_iter().map(|(h, n)| (h.to_string(), n)).collect()
}

#[test]
fn test_weighted_by_cores() {
    let j = job(&[("a", &[0, 1]), ("b", &[0, 1])], 0);
    let ns = nodes(vec![
        ("a", node(&[[50.0, 0.0, 0.0, 0.0, 50.0]; 2], &[])),
        ("b", node(&[[30.0, 0.0, 0.0, 0.0, 70.0]; 2], &[])),
    ]);
    let u = compute_job_usage("1", &j, &ns, &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.cpu.user == 40.0);
    assert!(u.cpu.idle == 60.0);
}

#[test]
fn test_uneven_core_counts() {
    // 3 cores at 60 on a, 1 core at 20 on b: (180 + 20) / 4
    let j = job(&[("a", &[0, 1, 2]), ("b", &[3])], 0);
    let ns = nodes(vec![
        ("a", node(&[[60.0, 0.0, 0.0, 0.0, 40.0]; 4], &[])),
        ("b", node(&[[20.0, 0.0, 0.0, 0.0, 80.0]; 4], &[])),
    ]);
    let u = compute_job_usage("1", &j, &ns, &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.cpu.user == 50.0);
}

#[test]
fn test_unreported_host_skipped() {
    let mut j = job(&[("a", &[0, 1]), ("b", &[0, 1])], 0);
    j.mem.insert("a".to_string(), 100.0);
    j.mem.insert("b".to_string(), 300.0);
    j.mem_max = 500.0;
    let mut a = node(&[[50.0, 0.0, 0.0, 0.0, 50.0]; 2], &[]);
    a.mem.total = 1000.0;
    a.lustre.read = 5.0;
    let ns = nodes(vec![("a", a)]);
    let u = compute_job_usage("1", &j, &ns, &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.cpu.user == 50.0);
    assert!(u.mem.used == 100.0);
    assert!(u.mem.total == 1000.0);
    assert!(u.mem.max == 500.0);
    assert!(u.lustre.read == 5.0);
}

#[test]
fn test_memory_and_io_summed() {
    let mut j = job(&[("a", &[0]), ("b", &[0])], 0);
    j.mem.insert("a".to_string(), 100.0);
    j.mem.insert("b".to_string(), 300.0);
    let mut a = node(&[[50.0, 0.0, 0.0, 0.0, 50.0]], &[]);
    a.infiniband = Some(crate::snapshot::Infiniband {
        bytes_in: 10.0,
        bytes_out: 20.0,
        pkts_in: 0.0,
        pkts_out: 0.0,
    });
    a.lustre.write = 3.0;
    let mut b = node(&[[50.0, 0.0, 0.0, 0.0, 50.0]], &[]);
    b.lustre.write = 4.0;
    let ns = nodes(vec![("a", a), ("b", b)]);
    let u = compute_job_usage("1", &j, &ns, &GpuLayout::new(), &CpuKeys::default()).unwrap();
    assert!(u.mem.used == 400.0);
    assert!(u.infiniband.bytes_in == 10.0 && u.infiniband.bytes_out == 20.0);
    assert!(u.lustre.write == 7.0);
}

#[test]
fn test_no_reporting_host_is_no_data() {
    let j = job(&[("a", &[0, 1])], 0);
    let ns = nodes(vec![("z", node(&[[50.0, 0.0, 0.0, 0.0, 50.0]; 2], &[]))]);
    assert!(compute_job_usage("1", &j, &ns, &GpuLayout::new(), &CpuKeys::default()).is_none());

    let empty = job(&[], 0);
    assert!(compute_job_usage("1", &empty, &ns, &GpuLayout::new(), &CpuKeys::default()).is_none());
}

#[test]
fn test_gpu_zero_for_cpu_job() {
    let j = job(&[("a", &[0])], 0);
    let ns = nodes(vec![("a", node(&[[50.0, 0.0, 0.0, 0.0, 50.0]], &[80.0, 90.0]))]);
    let layout = gpu_layout(&[("1", "a", &[0, 1])]);
    let u = compute_job_usage("1", &j, &ns, &layout, &CpuKeys::default()).unwrap();
    assert!(u.gpu.total == 0.0);
}

#[test]
fn test_gpu_divides_by_host_count() {
    // Known quirk: the sum of the per-host GPU averages is divided by the number of hosts in the
    // layout, not by the number of GPUs.  Host a has GPUs 0 and 1 at 80 and 40 (average 60), host b
    // has no GPU mapping, so the job figure is 60 / 2 and not 60.
    let j = job(&[("a", &[0]), ("b", &[0])], 2);
    let ns = nodes(vec![
        ("a", node(&[[50.0, 0.0, 0.0, 0.0, 50.0]], &[80.0, 40.0])),
        ("b", node(&[[50.0, 0.0, 0.0, 0.0, 50.0]], &[100.0])),
    ]);
    let layout = gpu_layout(&[("1", "a", &[0, 1])]);
    let u = compute_job_usage("1", &j, &ns, &layout, &CpuKeys::default()).unwrap();
    assert!(u.gpu.total == 30.0);

    // The divisor includes hosts that are not reporting.
    let ns = nodes(vec![("a", node(&[[50.0, 0.0, 0.0, 0.0, 50.0]], &[80.0, 40.0]))]);
    let u = compute_job_usage("1", &j, &ns, &layout, &CpuKeys::default()).unwrap();
    assert!(u.gpu.total == 30.0);
}
