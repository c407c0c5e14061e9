// Warnings derived from flags computed elsewhere.
//
// Threshold evaluation happens upstream; it produces, per host, a set of node flags and a set of
// flags for each job on the host that has something to report.  This module only orders the flags
// and gives them names and text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFlags {
    pub swap_use: bool,
    pub cpu_wait: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobFlags {
    pub cpu_util: bool,
    pub cpu_wait: bool,
    pub mem_util: bool,
}

/// The flags for one host: the node's own, and those of the jobs that have any.

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HostFlags {
    pub node: NodeFlags,
    pub jobs: HashMap<String, JobFlags>,
}

/// Map from host name to the flags for the host.

pub type WarningFlags = HashMap<String, HostFlags>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Node,
    Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    SwapUse,
    NodeCpuWait,
    CpuUtil,
    JobCpuWait,
    MemUtil,
}

impl WarningKind {
    pub fn scope(&self) -> Scope {
        match self {
            WarningKind::SwapUse | WarningKind::NodeCpuWait => Scope::Node,
            WarningKind::CpuUtil | WarningKind::JobCpuWait | WarningKind::MemUtil => Scope::Job,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            WarningKind::SwapUse => "Node is using disk swap",
            WarningKind::NodeCpuWait => "Node spends significant CPU time waiting for IO",
            WarningKind::CpuUtil => "Job underutilizes requested CPUs",
            WarningKind::JobCpuWait => "Job spends significant time waiting",
            WarningKind::MemUtil => "Job underutilizes requested memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub scope: Scope,
    pub kind: WarningKind,
    pub text: String,
}

impl Warning {
    fn new(kind: WarningKind) -> Warning {
        Warning {
            scope: kind.scope(),
            kind,
            text: kind.text().to_string(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning: {}", self.text)
    }
}

/// Return the warnings for the set flags, node warnings first.  The order within each group is
/// fixed and does not depend on the order in which the flags were discovered.

pub fn derive_warnings(node: &NodeFlags, job: Option<&JobFlags>) -> Vec<Warning> {
    let node_kinds = [
        (node.swap_use, WarningKind::SwapUse),
        (node.cpu_wait, WarningKind::NodeCpuWait),
    ];
    let job = job.copied().unwrap_or_default();
    let job_kinds = [
        (job.cpu_util, WarningKind::CpuUtil),
        (job.cpu_wait, WarningKind::JobCpuWait),
        (job.mem_util, WarningKind::MemUtil),
    ];
    node_kinds
        .iter()
        .chain(job_kinds.iter())
        .filter(|(set, _)| *set)
        .map(|&(_, kind)| Warning::new(kind))
        .collect()
}

/// The warnings for `host`, including those of `selected_job` on the host if there is a selected
/// job.  A host without flags has no warnings.

pub fn host_warnings(flags: &WarningFlags, host: &str, selected_job: Option<&str>) -> Vec<Warning> {
    match flags.get(host) {
        Some(hf) => derive_warnings(&hf.node, selected_job.and_then(|j| hf.jobs.get(j))),
        None => vec![],
    }
}

/// True if `job_id` has any flags on `host`.

pub fn has_job_warning(flags: &WarningFlags, host: &str, job_id: &str) -> bool {
    flags
        .get(host)
        .map(|hf| hf.jobs.contains_key(job_id))
        .unwrap_or(false)
}

#[test]
fn test_no_flags_no_warnings() {
    assert!(derive_warnings(&NodeFlags::default(), None).is_empty());
    assert!(derive_warnings(&NodeFlags::default(), Some(&JobFlags::default())).is_empty());
}

#[test]
fn test_node_before_job() {
    let node = NodeFlags { swap_use: true, cpu_wait: false };
    let job = JobFlags { cpu_util: true, cpu_wait: true, mem_util: true };
    let ws = derive_warnings(&node, Some(&job));
    let kinds = ws.iter().map(|w| w.kind).collect::<Vec<_>>();
    assert!(
        kinds
            == vec![
                WarningKind::SwapUse,
                WarningKind::CpuUtil,
                WarningKind::JobCpuWait,
                WarningKind::MemUtil
            ]
    );
    assert!(ws[0].scope == Scope::Node);
    assert!(ws[1..].iter().all(|w| w.scope == Scope::Job));
    assert!(ws[0].to_string() == "Warning: Node is using disk swap");
}

#[test]
fn test_fixed_priority() {
    let node = NodeFlags { swap_use: true, cpu_wait: true };
    let job = JobFlags { cpu_util: false, cpu_wait: true, mem_util: true };
    let kinds = derive_warnings(&node, Some(&job)).iter().map(|w| w.kind).collect::<Vec<_>>();
    assert!(
        kinds
            == vec![
                WarningKind::SwapUse,
                WarningKind::NodeCpuWait,
                WarningKind::JobCpuWait,
                WarningKind::MemUtil
            ]
    );
}

#[test]
fn test_host_warnings() {
    let flags: WarningFlags = serde_json::from_str(
        r#"{ "n1": { "node": { "swapUse": true },
                     "jobs": { "7": { "memUtil": true } } } }"#,
    )
    .unwrap();
    assert!(host_warnings(&flags, "n2", Some("7")).is_empty());
    assert!(host_warnings(&flags, "n1", None).len() == 1);
    let ws = host_warnings(&flags, "n1", Some("7"));
    assert!(ws.len() == 2 && ws[1].kind == WarningKind::MemUtil);
    assert!(has_job_warning(&flags, "n1", "7"));
    assert!(!has_job_warning(&flags, "n1", "8"));
    assert!(!has_job_warning(&flags, "n2", "7"));
}
