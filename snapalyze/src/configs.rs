// Read analysis configuration from a json file.
//
// The file holds a single object { ... } with the following named fields, all optional:
//
//   cpu_keys - object with integer fields user, nice, system, wait, idle: the positions of those
//              counters within the CPU counter rows of the snapshots.  All five must be present if
//              the object is.
//   window_secs - integer, the default length of the history window in seconds
//
// See ../snap-config.json for an example.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use snaplog::CpuKeys;
use std::fs::File;
use std::io::BufReader;
use std::path;

pub const DEFAULT_WINDOW_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cpu_keys: CpuKeys,
    pub window_secs: i64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            cpu_keys: CpuKeys::default(),
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

// The file is written by hand and the counter order is the thing most likely to be wrong, so the
// fields are decoded explicitly from the generic JSON value to give precise error messages.

pub fn read_from_json(filename: &str) -> Result<Config> {
    let file = File::open(path::Path::new(filename))
        .with_context(|| format!("Could not open config file {filename}"))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    decode_config(&v)
}

fn decode_config(v: &Value) -> Result<Config> {
    let mut config: Config = Default::default();
    if let Value::Object(fields) = v {
        if let Some(keys) = fields.get("cpu_keys") {
            if let Value::Object(kf) = keys {
                config.cpu_keys = CpuKeys {
                    user: grab_usize(kf, "user")?,
                    nice: grab_usize(kf, "nice")?,
                    system: grab_usize(kf, "system")?,
                    wait: grab_usize(kf, "wait")?,
                    idle: grab_usize(kf, "idle")?,
                };
            } else {
                bail!("Field 'cpu_keys' must have an object value");
            }
        }
        if fields.contains_key("window_secs") {
            let secs = grab_usize(fields, "window_secs")?;
            if secs == 0 {
                bail!("Field 'window_secs' must be positive");
            }
            config.window_secs = secs as i64;
        }
    } else {
        bail!("Expected an object value")
    }
    Ok(config)
}

fn grab_usize(fields: &serde_json::Map<String, Value>, name: &str) -> Result<usize> {
    if let Some(Value::Number(n)) = fields.get(name) {
        if let Some(n) = n.as_u64() {
            Ok(n as usize)
        } else {
            bail!("Field '{name}' must have unsigned integer value")
        }
    } else {
        bail!("Field '{name}' must be present and have an integer value")
    }
}

#[test]
fn test_decode_config() {
    let v = serde_json::json!({
        "cpu_keys": { "user": 4, "nice": 3, "system": 2, "wait": 1, "idle": 0 },
        "window_secs": 600
    });
    let c = decode_config(&v).unwrap();
    assert!(c.cpu_keys == CpuKeys { user: 4, nice: 3, system: 2, wait: 1, idle: 0 });
    assert!(c.window_secs == 600);

    // Everything is optional
    assert!(decode_config(&serde_json::json!({})).unwrap() == Config::default());
}

#[test]
fn test_decode_config_errors() {
    assert!(decode_config(&serde_json::json!([])).is_err());
    assert!(decode_config(&serde_json::json!({ "cpu_keys": 3 })).is_err());
    assert!(decode_config(&serde_json::json!({ "cpu_keys": { "user": 0 } })).is_err());
    assert!(decode_config(&serde_json::json!({ "cpu_keys": {
        "user": -1, "nice": 1, "system": 2, "wait": 3, "idle": 4 } }))
    .is_err());
    assert!(decode_config(&serde_json::json!({ "window_secs": 0 })).is_err());
    assert!(decode_config(&serde_json::json!({ "window_secs": "1h" })).is_err());
}

#[test]
fn test_read_from_json() {
    let c = read_from_json("../snap-config.json").unwrap();
    assert!(c.cpu_keys == CpuKeys::default());
    assert!(c.window_secs == 7200);
    assert!(read_from_json("../no-such-config.json").is_err());
}
