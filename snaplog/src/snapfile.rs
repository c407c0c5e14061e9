// Reading snapshot files and their companions.
//
// A snapshot file holds JSON: either a single snapshot object or an array of snapshot objects,
// the latter typically being a stretch of history.  GPU layouts and warning flags come in their own
// files, as they are produced by different parts of the ingestion machinery.

use crate::snapshot::{GpuLayout, Snapshot};
use crate::warnings::WarningFlags;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::BufReader;
use std::path;
use tracing::debug;

/// Read all the snapshots in `files`, in the order of the files and the order within each file.
///
/// This returns an error if a file can't be opened or does not hold valid snapshot data.

pub fn read_snapshots(files: &[String]) -> Result<Vec<Snapshot>> {
    let mut snapshots = vec![];
    for file_name in files {
        let text = fs::read_to_string(file_name)
            .with_context(|| format!("Could not read {file_name}"))?;
        // Sniff the first token rather than going via an untagged enum: the buffering that implies
        // would not decode the integer keys of the GPU utilization maps.
        if text.trim_start().starts_with('[') {
            let mut many: Vec<Snapshot> = serde_json::from_str(&text)
                .with_context(|| format!("Could not parse {file_name}"))?;
            debug!(file = file_name.as_str(), count = many.len(), "read snapshots");
            snapshots.append(&mut many);
        } else {
            let one: Snapshot = serde_json::from_str(&text)
                .with_context(|| format!("Could not parse {file_name}"))?;
            debug!(file = file_name.as_str(), count = 1, "read snapshots");
            snapshots.push(one);
        }
    }
    Ok(snapshots)
}

pub fn read_gpu_layout(file_name: &str) -> Result<GpuLayout> {
    read_json(file_name)
}

pub fn read_warning_flags(file_name: &str) -> Result<WarningFlags> {
    read_json(file_name)
}

/// Return the names of the `.json` files directly within `data_path`, sorted.
///
/// This returns an error if `data_path` does not name a directory or can't be read.  Directory
/// entries that can't be read and file names that are not UTF8 are ignored.

pub fn find_snapshot_files(data_path: &str) -> Result<Vec<String>> {
    let p = path::Path::new(data_path);
    if !p.is_dir() {
        bail!("No viable snapshot directory: {data_path}");
    }

    let mut filenames = vec![];
    for entry in p.read_dir()?.flatten() {
        let p = entry.path();
        if p.extension().map(|ext| ext != "json").unwrap_or(true) || !p.is_file() {
            continue;
        }
        if let Some(pstr) = p.to_str() {
            filenames.push(pstr.to_string());
        }
    }
    filenames.sort();
    Ok(filenames)
}

fn read_json<T: DeserializeOwned>(file_name: &str) -> Result<T> {
    let file = File::open(path::Path::new(file_name))
        .with_context(|| format!("Could not open {file_name}"))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("Could not parse {file_name}"))
}

#[test]
fn test_read_snapshots() {
    // One file with a single object, one with an array of two
    let x = read_snapshots(&vec![
        "test_data/single.json".to_string(),
        "test_data/history.json".to_string(),
    ])
    .unwrap();
    assert!(x.len() == 3);
    assert!(x[0].timestamp == 1692093600);
    assert!(x[1].timestamp == 1692093660);
    assert!(x[2].timestamp == 1692093540);
    assert!(x[0].nodes["c1"].infiniband.is_some());
    assert!(x[0].jobs["1001"].layout["c1"] == vec![0, 1]);
}

#[test]
fn test_read_snapshots_errors() {
    // No such file
    assert!(read_snapshots(&vec!["test_data/nonesuch.json".to_string()]).is_err());

    // Not snapshot data
    assert!(read_snapshots(&vec!["test_data/bad_snapshot.json".to_string()]).is_err());
}

#[test]
fn test_read_gpu_layout_and_flags() {
    let g = read_gpu_layout("test_data/gpus.json").unwrap();
    assert!(g["1002"]["c2"] == vec![0, 1]);
    let w = read_warning_flags("test_data/warnings.json").unwrap();
    assert!(w["c1"].node.swap_use);
    assert!(w["c2"].jobs["1002"].cpu_wait);
}

#[test]
fn test_find_snapshot_files() {
    assert!(find_snapshot_files("test_data/nonesuch").is_err());
    assert!(find_snapshot_files("test_data/single.json").is_err());
    let fs = find_snapshot_files("test_data").unwrap();
    assert!(fs.iter().all(|f| f.ends_with(".json")));
    assert!(fs.iter().any(|f| f.ends_with("single.json")));
    assert!(!fs.iter().any(|f| f.ends_with("README.txt")));
    let mut sorted = fs.clone();
    sorted.sort();
    assert!(fs == sorted);
}
