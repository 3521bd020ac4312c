//! Command builder: operation + parameters + candidate → shell invocation.
//!
//! Pure and deterministic. Every value interpolated into a command line is
//! shell-quoted, and parameter keys are validated here, before any process
//! sees them.

use crate::error::{BenchError, BenchResult};
use crate::params::{Operation, Params};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wall-clock bound for a single benchmarked invocation.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the hidden subcommand that enforces the invocation deadline.
pub const DEADLINE_SUBCOMMAND: &str = "deadline";

/// Wraps commands so a hung candidate is killed at a fixed deadline.
///
/// The launcher is a binary that understands
/// `deadline --secs N -- <command...>` (the `simbench` binary itself), so no
/// host timeout utility is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineWrapper {
    launcher: PathBuf,
    timeout: Duration,
}

impl DeadlineWrapper {
    pub fn new(launcher: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            launcher: launcher.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Prefix `command` with the deadline launcher.
    pub fn wrap(&self, command: &str) -> String {
        format!(
            "{} {} --secs {} -- {}",
            quote_path(&self.launcher),
            DEADLINE_SUBCOMMAND,
            self.timeout.as_secs().max(1),
            command
        )
    }
}

/// A command line in both forms: bare (for smoke tests, which run under our
/// own timeout) and deadline-wrapped (for the measurement tool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub wrapped: String,
}

/// Builds invocations for one run's target device.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    target_id: String,
    protocol_client: String,
    wrapper: DeadlineWrapper,
}

impl CommandBuilder {
    pub fn new(
        target_id: impl Into<String>,
        protocol_client: impl Into<String>,
        wrapper: DeadlineWrapper,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            protocol_client: protocol_client.into(),
            wrapper,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Protocol-level call: `mcp call <tool> [-p '<json>'] <server...>`.
    ///
    /// `server` is the shell fragment that launches the server and is used
    /// verbatim.
    pub fn protocol_invocation(&self, op: &Operation, server: &str) -> BenchResult<Invocation> {
        let params = self.params_for(op)?;
        let mut command = format!(
            "{} call {}",
            quote(&self.protocol_client, op, "client")?,
            quote(&op.name, op, "name")?
        );
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            let json = serde_json::to_string(&params)?;
            command.push_str(" -p ");
            command.push_str(&quote(&json, op, "params")?);
        }
        command.push(' ');
        command.push_str(server);
        Ok(self.finish(command))
    }

    /// Direct call: `<binary> <subcommand> --key value ...`.
    pub fn direct_invocation(
        &self,
        op: &Operation,
        binary: &Path,
        subcommand: &str,
    ) -> BenchResult<Invocation> {
        let mut parts = vec![quote_path(binary), quote(subcommand, op, "subcommand")?.into_owned()];
        if let Some(params) = self.params_for(op)? {
            for (key, value) in &params {
                parts.push(format!("--{key}"));
                parts.push(quote(&value.to_string(), op, key)?.into_owned());
            }
        }
        Ok(self.finish(parts.join(" ")))
    }

    /// External tool call rendered from a template with `{udid}` and `{idb}`
    /// placeholders.
    pub fn external_invocation(
        &self,
        op: &Operation,
        template: &str,
        idb: &Path,
    ) -> BenchResult<Invocation> {
        if template.trim().is_empty() {
            return Err(BenchError::InvalidParameter {
                operation: op.name.clone(),
                key: "external".into(),
                message: "empty command template".into(),
            });
        }
        let command = template
            .replace("{udid}", &quote(&self.target_id, op, "udid")?)
            .replace("{idb}", &quote_path(idb));
        Ok(self.finish(command))
    }

    /// Shell fragment launching a binary's protocol server.
    pub fn server_command(binary: &Path) -> String {
        format!("{} mcp", quote_path(binary))
    }

    fn params_for(&self, op: &Operation) -> BenchResult<Option<Params>> {
        let merged = op.merged_params(&self.target_id);
        if let Some(params) = &merged {
            for key in params.keys() {
                validate_key(op, key)?;
            }
        }
        Ok(merged)
    }

    fn finish(&self, command: String) -> Invocation {
        let wrapped = self.wrapper.wrap(&command);
        Invocation { command, wrapped }
    }
}

fn validate_key(op: &Operation, key: &str) -> BenchResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(BenchError::InvalidParameter {
            operation: op.name.clone(),
            key: key.to_string(),
            message: "keys must be non-empty and use [A-Za-z0-9_-]".into(),
        })
    }
}

fn quote<'a>(value: &'a str, op: &Operation, key: &str) -> BenchResult<Cow<'a, str>> {
    shlex::try_quote(value).map_err(|e| BenchError::InvalidParameter {
        operation: op.name.clone(),
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn quote_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    shlex::try_quote(&text)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| format!("'{}'", text.replace('\'', r"'\''")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UDID: &str = "0C7A-SIM-UDID";

    fn builder() -> CommandBuilder {
        CommandBuilder::new(
            UDID,
            "mcp",
            DeadlineWrapper::new("/opt/simbench", DEFAULT_INVOCATION_TIMEOUT),
        )
    }

    #[test]
    fn test_protocol_with_params() {
        let op = Operation::new("tap").with_param("x", 165).with_param("y", 269);
        let inv = builder().protocol_invocation(&op, "node server.js").unwrap();
        assert_eq!(
            shlex::split(&inv.command).unwrap(),
            vec![
                "mcp",
                "call",
                "tap",
                "-p",
                r#"{"udid":"0C7A-SIM-UDID","x":165,"y":269}"#,
                "node",
                "server.js",
            ]
        );
        assert_eq!(
            inv.wrapped,
            format!("/opt/simbench deadline --secs 5 -- {}", inv.command)
        );
    }

    #[test]
    fn test_protocol_synthesizes_target() {
        let inv = builder()
            .protocol_invocation(&Operation::new("view"), "node server.js")
            .unwrap();
        let words = shlex::split(&inv.command).unwrap();
        assert_eq!(words[..3], ["mcp", "call", "view"]);
        assert_eq!(words[3..5], ["-p", r#"{"udid":"0C7A-SIM-UDID"}"#]);
    }

    #[test]
    fn test_protocol_without_target() {
        let op = Operation::new("get_booted_sim_id").without_target();
        let inv = builder().protocol_invocation(&op, "node server.js").unwrap();
        assert_eq!(inv.command, "mcp call get_booted_sim_id node server.js");
    }

    #[test]
    fn test_target_embedded_exactly_once() {
        let ops = [
            Operation::new("view"),
            Operation::new("tap").with_param("x", 1).with_param("y", 2),
            Operation::new("tap").with_param("udid", "other"),
        ];
        let b = builder();
        for op in &ops {
            let proto = b.protocol_invocation(op, "srv").unwrap();
            assert_eq!(proto.command.matches(UDID).count(), 1, "{}", proto.command);
            let direct = b
                .direct_invocation(op, Path::new("/bin/iosef"), &op.name)
                .unwrap();
            assert_eq!(direct.command.matches(UDID).count(), 1, "{}", direct.command);
        }
    }

    #[test]
    fn test_direct_flags() {
        let op = Operation::new("tap").with_param("x", 165).with_param("y", 269);
        let inv = builder()
            .direct_invocation(&op, Path::new(".build/release/iosef"), "tap")
            .unwrap();
        assert_eq!(
            inv.command,
            ".build/release/iosef tap --udid 0C7A-SIM-UDID --x 165 --y 269"
        );
    }

    #[test]
    fn test_direct_quotes_paths_and_values() {
        let op = Operation::new("type_text").with_param("text", "hello world");
        let inv = builder()
            .direct_invocation(&op, Path::new("/tmp/my bench/iosef"), "type_text")
            .unwrap();
        assert_eq!(
            shlex::split(&inv.command).unwrap(),
            vec![
                "/tmp/my bench/iosef",
                "type_text",
                "--text",
                "hello world",
                "--udid",
                UDID,
            ]
        );
    }

    #[test]
    fn test_invalid_key_rejected() {
        let op = Operation::new("tap").with_param("x; rm -rf /", 1);
        let err = builder().protocol_invocation(&op, "srv").unwrap_err();
        assert!(matches!(err, BenchError::InvalidParameter { .. }));
    }

    #[test]
    fn test_nul_value_rejected() {
        let op = Operation::new("type_text").with_param("text", "a\0b");
        assert!(builder()
            .direct_invocation(&op, Path::new("iosef"), "type_text")
            .is_err());
    }

    #[test]
    fn test_external_template() {
        let op = Operation::new("tap");
        let inv = builder()
            .external_invocation(
                &op,
                "{idb} ui tap --udid {udid} --json -- 165 269",
                Path::new("../idb"),
            )
            .unwrap();
        assert_eq!(inv.command, "../idb ui tap --udid 0C7A-SIM-UDID --json -- 165 269");
    }

    #[test]
    fn test_external_empty_template() {
        let op = Operation::new("tap");
        assert!(builder()
            .external_invocation(&op, "  ", Path::new("idb"))
            .is_err());
    }

    #[test]
    fn test_server_command() {
        assert_eq!(
            CommandBuilder::server_command(Path::new("/ws/.build/release/iosef")),
            "/ws/.build/release/iosef mcp"
        );
    }

    #[test]
    fn test_wrapper_never_uses_zero_seconds() {
        let wrapper = DeadlineWrapper::new("sb", Duration::from_millis(10));
        assert_eq!(wrapper.wrap("true"), "sb deadline --secs 1 -- true");
    }
}
