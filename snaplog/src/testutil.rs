// Builders for synthetic snapshot data in tests.  Counter rows are in the default `CpuKeys` order,
// ie [user, nice, system, wait, idle].

use crate::snapshot::{CpuData, GpuLayout, JobRecord, MemData, NodeData, Snapshot};
use std::collections::HashMap;

pub fn job(layout: &[(&str, &[usize])], n_gpus: u32) -> JobRecord {
    JobRecord {
        layout: layout
            .iter()
            .map(|(host, cores)| (host.to_string(), cores.to_vec()))
            .collect(),
        n_gpus,
        n_cpus: layout.iter().map(|(_, cores)| cores.len() as u32).sum(),
        username: "user".to_string(),
        name: "job".to_string(),
        state: "R".to_string(),
        ..Default::default()
    }
}

pub fn node(cores: &[[f64; 5]], gpus: &[f64]) -> NodeData {
    let n = cores.len().max(1) as f64;
    let mut total_row = vec![0.0; 5];
    for row in cores {
        for (t, v) in total_row.iter_mut().zip(row.iter()) {
            *t += v / n;
        }
    }
    NodeData {
        cpu: CpuData {
            core_rows: cores.iter().map(|row| row.to_vec()).collect(),
            total_row,
        },
        mem: MemData {
            used: 0.0,
            total: 0.0,
        },
        gpu_count: gpus.len() as u32,
        gpu_utilization: gpus
            .iter()
            .enumerate()
            .map(|(i, &u)| (i as u32, u))
            .collect(),
        ..Default::default()
    }
}

pub fn gpu_layout(entries: &[(&str, &str, &[u32])]) -> GpuLayout {
    let mut layout = GpuLayout::new();
    for (job_id, host, gpus) in entries {
        layout
            .entry(job_id.to_string())
            .or_insert_with(HashMap::new)
            .insert(host.to_string(), gpus.to_vec());
    }
    layout
}

pub fn snapshot(timestamp: i64, nodes: Vec<(&str, NodeData)>, jobs: Vec<(&str, JobRecord)>) -> Snapshot {
    Snapshot {
        timestamp,
        nodes: nodes.into_iter().map(|(h, n)| (h.to_string(), n)).collect(),
        jobs: jobs.into_iter().map(|(j, r)| (j.to_string(), r)).collect(),
    }
}
