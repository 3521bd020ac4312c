//! Host checks that run before anything is built.

use crate::error::{BenchError, BenchResult};
use crate::process::{find_on_path, run_program};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

const SIMCTL_TIMEOUT: Duration = Duration::from_secs(15);

/// Fail with every missing tool at once.
pub fn check_tools<S: AsRef<str>>(tools: &[S]) -> BenchResult<()> {
    let mut missing: Vec<String> = Vec::new();
    for tool in tools {
        let tool = tool.as_ref();
        if find_on_path(tool).is_none() && !missing.iter().any(|m| m == tool) {
            missing.push(tool.to_string());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BenchError::PrerequisiteMissing { tools: missing })
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: BTreeMap<String, Vec<Device>>,
}

#[derive(Debug, Deserialize)]
struct Device {
    udid: String,
    #[serde(default)]
    state: String,
}

/// First booted device in `xcrun simctl list devices -j` output.
pub fn first_booted(json: &str) -> BenchResult<Option<String>> {
    let list: DeviceList = serde_json::from_str(json)?;
    Ok(list
        .devices
        .into_values()
        .flatten()
        .find(|d| d.state == "Booted")
        .map(|d| d.udid))
}

/// Resolve the simulator to target: the explicit id, or the first booted one.
pub async fn resolve_device(explicit: Option<&str>) -> BenchResult<String> {
    if let Some(udid) = explicit {
        return Ok(udid.to_string());
    }
    let outcome = run_program(
        "xcrun",
        ["simctl", "list", "devices", "-j"],
        None,
        SIMCTL_TIMEOUT,
    )
    .await;
    let outcome = match outcome {
        Ok(outcome) if outcome.success() => outcome,
        Ok(outcome) => {
            debug!("simctl list failed: {}", outcome.failure_message(SIMCTL_TIMEOUT));
            return Err(BenchError::DeviceNotFound);
        }
        Err(e) => {
            debug!("simctl unavailable: {e}");
            return Err(BenchError::DeviceNotFound);
        }
    };
    let udid = first_booted(&outcome.stdout())?.ok_or(BenchError::DeviceNotFound)?;
    info!(udid = %udid, "Detected booted simulator");
    Ok(udid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_booted() {
        let json = r#"{
            "devices": {
                "com.apple.CoreSimulator.SimRuntime.iOS-17-0": [
                    {"udid": "AAAA", "state": "Shutdown", "name": "iPhone 15"},
                    {"udid": "BBBB", "state": "Booted", "name": "iPhone 15 Pro"}
                ],
                "com.apple.CoreSimulator.SimRuntime.iOS-18-0": [
                    {"udid": "CCCC", "state": "Booted", "name": "iPhone 16"}
                ]
            }
        }"#;
        assert_eq!(first_booted(json).unwrap(), Some("BBBB".to_string()));
    }

    #[test]
    fn test_no_booted_device() {
        let json = r#"{"devices": {"rt": [{"udid": "AAAA", "state": "Shutdown"}]}}"#;
        assert_eq!(first_booted(json).unwrap(), None);
        assert_eq!(first_booted(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn test_check_tools_reports_missing_once() {
        let err = check_tools(&["sh", "definitely-not-a-tool-xyz", "definitely-not-a-tool-xyz"])
            .unwrap_err();
        match err {
            BenchError::PrerequisiteMissing { tools } => {
                assert_eq!(tools, vec!["definitely-not-a-tool-xyz"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_device_skips_detection() {
        assert_eq!(resolve_device(Some("ABCD-1234")).await.unwrap(), "ABCD-1234");
    }
}
