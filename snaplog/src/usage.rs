// Normalized usage records, shared by the node and job computations.

use crate::snapshot::CpuCounters;

use serde::Serialize;

/// Utilization of a node or job across CPU, memory, GPU and I/O.
///
/// CPU and GPU fields are percentages in [0,100] provided the inputs are.  Memory is in the unit of
/// the snapshot (MB).  InfiniBand and Lustre are node-level quantities; for a job they are the
/// traffic of the nodes the job runs on, not of the job itself.

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageRecord {
    pub cpu: CpuUsage,
    pub mem: MemUsage,
    pub gpu: GpuUsage,
    pub infiniband: IbUsage,
    pub lustre: LustreUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CpuUsage {
    pub user: f64,
    pub system: f64,
    pub wait: f64,
    pub idle: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemUsage {
    pub used: f64,
    pub max: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GpuUsage {
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IbUsage {
    pub bytes_in: f64,
    pub bytes_out: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LustreUsage {
    pub read: f64,
    pub write: f64,
}

impl CpuUsage {
    pub(crate) fn scaled(&self, k: f64) -> CpuUsage {
        CpuUsage {
            user: self.user * k,
            system: self.system * k,
            wait: self.wait * k,
            idle: self.idle * k,
        }
    }

    pub(crate) fn add(&mut self, other: &CpuUsage) {
        self.user += other.user;
        self.system += other.system;
        self.wait += other.wait;
        self.idle += other.idle;
    }
}

impl From<CpuCounters> for CpuUsage {
    fn from(c: CpuCounters) -> CpuUsage {
        CpuUsage {
            user: c.user,
            system: c.system,
            wait: c.wait,
            idle: c.idle,
        }
    }
}
