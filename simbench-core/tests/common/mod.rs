//! Shared fixtures: a recording version-control backend and shell-script
//! stand-ins for external tools.

#![allow(dead_code)]

use async_trait::async_trait;
use simbench_core::{BenchError, BenchResult, RevisionRef, VersionControl};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Version-control backend that records every call and touches the
/// filesystem the way a real backend would.
#[derive(Default)]
pub struct MockVcs {
    pub calls: Mutex<Vec<String>>,
    /// Id reported as the developer's current revision.
    pub current: String,
    pub fail_resolve: bool,
    pub fail_rebind: bool,
    pub fail_add: bool,
}

impl MockVcs {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl VersionControl for MockVcs {
    fn program(&self) -> &str {
        "sh"
    }

    async fn resolve(&self, spec: &str) -> BenchResult<RevisionRef> {
        self.record(format!("resolve {spec}"));
        if self.fail_resolve {
            return Err(BenchError::RevisionResolution {
                spec: spec.to_string(),
                message: "revision doesn't exist".into(),
            });
        }
        Ok(RevisionRef {
            spec: spec.to_string(),
            stable_id: format!("{spec}0000000000"),
            description: Some("Fix tap latency".into()),
        })
    }

    async fn current_id(&self) -> BenchResult<String> {
        self.record("current");
        Ok(self.current.clone())
    }

    async fn add_workspace(&self, dir: &Path, name: &str, rev: &RevisionRef) -> BenchResult<()> {
        self.record(format!("add {name} {}", rev.stable_id));
        if self.fail_add {
            return Err(BenchError::vcs("workspace add", "workspace already exists"));
        }
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join("REVISION"), &rev.stable_id)?;
        Ok(())
    }

    async fn rebind_workspace(&self, dir: &Path, rev: &RevisionRef) -> BenchResult<()> {
        self.record(format!("rebind {}", rev.stable_id));
        if self.fail_rebind {
            return Err(BenchError::vcs("rebase", "conflict"));
        }
        std::fs::write(dir.join("REVISION"), &rev.stable_id)?;
        Ok(())
    }

    async fn forget_workspace(&self, _dir: &Path, name: &str) -> BenchResult<()> {
        self.record(format!("forget {name}"));
        Ok(())
    }
}

/// Write an executable shell script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Stand-in for the measurement tool: writes a JSON export with means
/// 0.010s, 0.020s, ... in command order, and a one-line markdown report.
pub const FAKE_HYPERFINE: &str = r#"
names=""
while [ $# -gt 0 ]; do
  case "$1" in
    --command-name) shift; names="$names$1|" ;;
    --export-json) shift; json="$1" ;;
    --export-markdown) shift; md="$1" ;;
    --warmup|--min-runs) shift ;;
  esac
  shift
done
i=0
entries=""
IFS='|'
for name in $names; do
  i=$((i + 1))
  entry="{\"command\": \"$name\", \"mean\": 0.0${i}0}"
  if [ -z "$entries" ]; then entries="$entry"; else entries="$entries, $entry"; fi
done
printf '{"results": [%s]}\n' "$entries" > "$json"
printf '| Command | Mean |\n|---|---|\n' > "$md"
"#;
