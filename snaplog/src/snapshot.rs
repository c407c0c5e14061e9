// The snapshot data model: raw per-node counters and per-job layouts at one instant, as delivered
// by the ingestion side.
//
// JSON field names follow the ingestion format, hence the renames.  Nothing here is validated
// beyond what serde checks; a snapshot that decodes is taken at face value.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Seconds since the Unix epoch.

pub type Timestamp = i64;

/// Map from job ID to a map from host name to the GPU indices assigned to the job on that host.  A
/// job or host that is missing from the map has an unknown GPU assignment.

pub type GpuLayout = HashMap<String, HashMap<String, Vec<u32>>>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Snapshot {
    pub timestamp: Timestamp,

    #[serde(default)]
    pub nodes: HashMap<String, NodeData>,

    /// Jobs known at the time of the snapshot.  A job that has not started running is not present.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub cpu: CpuData,
    pub mem: MemData,
    #[serde(default)]
    pub swap: SwapData,

    /// None if the node has no InfiniBand device.
    #[serde(default)]
    pub infiniband: Option<Infiniband>,

    #[serde(default)]
    pub lustre: IoCounters,
    #[serde(default)]
    pub jobfs: IoCounters,

    #[serde(default)]
    pub gpu_count: u32,

    /// Utilization percentage by GPU index.
    #[serde(default)]
    pub gpu_utilization: HashMap<u32, f64>,
}

/// Raw CPU counters.  The order of the counters within a row is platform-dependent and is
/// described by a `CpuKeys` value supplied by the caller.

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuData {
    /// One row per core, indexed by core number.
    pub core_rows: Vec<Vec<f64>>,

    /// Aggregate across all cores.
    pub total_row: Vec<f64>,
}

/// Main memory, in MB.

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct MemData {
    pub used: f64,
    pub total: f64,
}

/// Swap, in MB.

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct SwapData {
    pub used: f64,
    pub total: f64,
    pub free: f64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Infiniband {
    pub bytes_in: f64,
    pub bytes_out: f64,
    pub pkts_in: f64,
    pub pkts_out: f64,
}

/// Read and write traffic for a file system.  These are passed through without unit conversion.

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct IoCounters {
    pub read: f64,
    pub write: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Host name to the indices of the cores assigned to the job on that host.  Indices are unique
    /// and within the host's core count.
    #[serde(default)]
    pub layout: BTreeMap<String, Vec<usize>>,

    /// Host name to memory (MB) used by the job on that host.
    #[serde(default)]
    pub mem: HashMap<String, f64>,

    #[serde(default)]
    pub mem_max: f64,

    /// Requested memory, MB.
    #[serde(default)]
    pub mem_requested: f64,

    #[serde(default)]
    pub n_gpus: u32,

    #[serde(default)]
    pub has_mem_stats: bool,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub state: String,

    /// Total number of cores requested, across all hosts.
    #[serde(default)]
    pub n_cpus: u32,
}

/// Positions of the individual counters within a CPU counter row.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CpuKeys {
    pub user: usize,
    pub nice: usize,
    pub system: usize,
    pub wait: usize,
    pub idle: usize,
}

impl Default for CpuKeys {
    fn default() -> CpuKeys {
        CpuKeys {
            user: 0,
            nice: 1,
            system: 2,
            wait: 3,
            idle: 4,
        }
    }
}

/// One CPU counter row decoded through a `CpuKeys`.  `user` includes `nice`.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuCounters {
    pub user: f64,
    pub system: f64,
    pub wait: f64,
    pub idle: f64,
}

impl CpuKeys {
    /// Decode a counter row.  Counters missing from a short row read as zero.

    pub fn decode(&self, row: &[f64]) -> CpuCounters {
        let get = |ix: usize| row.get(ix).copied().unwrap_or(0.0);
        CpuCounters {
            user: get(self.user) + get(self.nice),
            system: get(self.system),
            wait: get(self.wait),
            idle: get(self.idle),
        }
    }
}

impl NodeData {
    /// Utilization of GPU `index`, zero if the node does not report it.

    pub fn gpu_util(&self, index: u32) -> f64 {
        self.gpu_utilization.get(&index).copied().unwrap_or(0.0)
    }

    pub fn num_cores(&self) -> usize {
        self.cpu.core_rows.len()
    }
}

impl JobRecord {
    /// Memory used by the job on `host`, zero if not known.

    pub fn mem_on(&self, host: &str) -> f64 {
        self.mem.get(host).copied().unwrap_or(0.0)
    }
}

#[test]
fn test_decode_snapshot() {
    let text = r#"{
        "timestamp": 1693000000,
        "nodes": {
            "n1": {
                "cpu": { "coreRows": [[10, 5, 3, 2, 80]], "totalRow": [10, 5, 3, 2, 80] },
                "mem": { "used": 100, "total": 1000 },
                "swap": { "used": 1, "total": 10, "free": 9 },
                "infiniband": null,
                "lustre": { "read": 1, "write": 2 },
                "jobfs": { "read": 3, "write": 4 },
                "gpuCount": 2,
                "gpuUtilization": { "0": 50, "1": 70 }
            }
        },
        "jobs": {
            "42": {
                "layout": { "n1": [0] },
                "mem": { "n1": 64 },
                "memMax": 80, "memRequested": 128, "nGpus": 1, "hasMemStats": true,
                "username": "alice", "name": "train", "state": "R", "nCpus": 1
            }
        }
    }"#;
    let s: Snapshot = serde_json::from_str(text).unwrap();
    assert!(s.timestamp == 1693000000);
    let n = &s.nodes["n1"];
    assert!(n.infiniband.is_none());
    assert!(n.gpu_util(1) == 70.0);
    assert!(n.gpu_util(5) == 0.0);
    assert!(n.num_cores() == 1);
    let j = &s.jobs["42"];
    assert!(j.layout["n1"] == vec![0]);
    assert!(j.mem_on("n1") == 64.0);
    assert!(j.mem_on("n2") == 0.0);
    assert!(j.n_gpus == 1 && j.n_cpus == 1 && j.has_mem_stats);
}

#[test]
fn test_decode_cpu_row() {
    let keys = CpuKeys { user: 4, nice: 3, system: 2, wait: 1, idle: 0 };
    let c = keys.decode(&[60.0, 5.0, 10.0, 5.0, 20.0]);
    assert!(c == CpuCounters { user: 25.0, system: 10.0, wait: 5.0, idle: 60.0 });

    // Short row
    let c = CpuKeys::default().decode(&[40.0]);
    assert!(c == CpuCounters { user: 40.0, system: 0.0, wait: 0.0, idle: 0.0 });
}
