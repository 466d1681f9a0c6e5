//! Mise adapter -- expose the `mise` version manager as tools.
//!
//! Every tool maps to a fixed argument list for the `mise` binary.  Before
//! each invocation the adapter asks mise for its environment exports
//! (`mise env -s bash`) and overlays them on the inherited process
//! environment so tool-managed paths resolve.  Process failures never surface
//! as errors: they are folded into a [`CommandOutcome`] and rendered as text.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, AdapterType, HealthStatus, ToolDefinition, flag, opt_str};

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum output size in bytes (100 KB).  Stdout and stderr are each
/// independently truncated to this limit.
const MAX_OUTPUT_BYTES: usize = 100 * 1024;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for the mise adapter.
#[derive(Debug, Clone)]
pub struct MiseConfig {
    /// The mise executable (default `mise`).
    pub program: String,
    /// Working directory for invocations; inherits the server's when `None`.
    pub working_dir: Option<PathBuf>,
    /// Per-invocation timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MiseConfig {
    fn default() -> Self {
        Self {
            program: "mise".to_owned(),
            working_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Invocations and outcomes
// ---------------------------------------------------------------------------

/// What a tool call asks the runner to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `mise <args...>`
    Mise(Vec<String>),
    /// `sh -c <command>` with the mise environment loaded.
    Shell(String),
}

/// Normalized result of one external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutcome {
    /// A failed outcome that never reached a running process.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: -1,
        }
    }
}

/// Executes invocations on behalf of [`MiseAdapter`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion, error, or timeout.
    async fn run(&self, invocation: &Invocation) -> CommandOutcome;
}

// ---------------------------------------------------------------------------
// Process runner
// ---------------------------------------------------------------------------

/// [`CommandRunner`] backed by real child processes.
pub struct ProcessRunner {
    config: MiseConfig,
}

impl ProcessRunner {
    pub fn new(config: MiseConfig) -> Self {
        Self { config }
    }

    fn command(&self, program: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(program);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Ask mise for its environment exports.  Any failure yields an empty
    /// overlay so the invocation still runs with the inherited environment.
    async fn mise_env(&self) -> HashMap<String, String> {
        let mut cmd = self.command(&self.config.program);
        cmd.args(["env", "-s", "bash"]);
        let outcome = self.spawn(cmd, "env").await;
        if !outcome.success {
            debug!(stderr = %outcome.stderr.trim(), "mise env unavailable, using process environment");
            return HashMap::new();
        }
        parse_env_exports(&outcome.stdout).into_iter().collect()
    }

    /// Spawn a prepared command and wait for it with the configured timeout.
    async fn spawn(&self, mut cmd: tokio::process::Command, label: &str) -> CommandOutcome {
        let timeout_secs = self.config.timeout_secs;
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let program = cmd.as_std().get_program().to_string_lossy().into_owned();
                warn!(%program, label, "program not found");
                return CommandOutcome::failed(format!(
                    "{program} command not found. Please ensure {program} is installed and in PATH."
                ));
            }
            Err(e) => return CommandOutcome::failed(format!("Error running command: {e}")),
        };

        // On timeout the child is dropped and killed via `kill_on_drop(true)`.
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let (stdout, stdout_truncated) = truncate_output(&output.stdout);
                let (stderr, stderr_truncated) = truncate_output(&output.stderr);
                debug!(
                    label,
                    exit_code, stdout_truncated, stderr_truncated, "command completed"
                );
                CommandOutcome {
                    success: output.status.success(),
                    stdout,
                    stderr,
                    exit_code,
                }
            }
            Ok(Err(e)) => CommandOutcome::failed(format!("Error running command: {e}")),
            Err(_) => {
                warn!(label, timeout_secs, "command timed out");
                CommandOutcome::failed(format!(
                    "Command timed out after {timeout_secs} seconds"
                ))
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> CommandOutcome {
        let env = self.mise_env().await;
        let mut cmd = match invocation {
            Invocation::Mise(args) => {
                let mut cmd = self.command(&self.config.program);
                cmd.args(args);
                cmd
            }
            Invocation::Shell(command) => {
                let mut cmd = self.command("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
        };
        cmd.envs(&env);
        debug!(?invocation, env_vars = env.len(), "running invocation");
        let label = match invocation {
            Invocation::Mise(args) => args.first().map(String::as_str).unwrap_or("mise"),
            Invocation::Shell(_) => "run",
        };
        self.spawn(cmd, label).await
    }
}

/// Parse `export KEY=value` lines from `mise env -s bash` output.
///
/// A value wrapped in matching double or single quotes is unwrapped; other
/// lines are ignored.
pub fn parse_env_exports(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("export "))
        .filter_map(|rest| rest.split_once('='))
        .map(|(key, value)| {
            let value = ['"', '\'']
                .iter()
                .find_map(|q| {
                    value
                        .strip_prefix(*q)
                        .and_then(|v| v.strip_suffix(*q))
                })
                .unwrap_or(value);
            (key.trim().to_owned(), value.to_owned())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Truncate raw command output to [`MAX_OUTPUT_BYTES`], converting to a
/// lossy UTF-8 string.  Returns `(output_string, was_truncated)`.
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

/// Render an outcome as the single text block returned to the caller.
pub fn format_outcome(outcome: &CommandOutcome) -> String {
    let stderr = outcome.stderr.trim();
    if outcome.success {
        let mut text = outcome.stdout.trim().to_owned();
        if !stderr.is_empty() {
            text.push_str("\n\nWarnings/Info:\n");
            text.push_str(stderr);
        }
        if text.is_empty() {
            "Command completed successfully".to_owned()
        } else {
            text
        }
    } else if stderr.is_empty() {
        "Error: Command failed".to_owned()
    } else {
        format!("Error: {stderr}")
    }
}

// ---------------------------------------------------------------------------
// Argument mapping
// ---------------------------------------------------------------------------

fn required<'a>(params: &'a Value, tool: &str, field: &str) -> Result<&'a str> {
    opt_str(params, field).ok_or_else(|| AdapterError::missing_param(tool, field, "string"))
}

/// Map a tool call to the invocation it performs.
pub fn build_invocation(tool: &str, params: &Value) -> Result<Invocation> {
    let mut args: Vec<String> = Vec::new();
    match tool {
        "mise_install" | "mise_use" => {
            let target = required(params, tool, "tool")?;
            args.push(tool.trim_start_matches("mise_").to_owned());
            if flag(params, "global") {
                args.push("-g".into());
            }
            args.push(target.to_owned());
        }
        "mise_uninstall" => {
            args.extend(["uninstall".into(), required(params, tool, "tool")?.to_owned()]);
        }
        "mise_list" => {
            args.push("list".into());
            if flag(params, "all") {
                args.push("-a".into());
            }
            if flag(params, "current") {
                args.push("-c".into());
            }
        }
        "mise_outdated" => args.push("outdated".into()),
        "mise_current" => args.push("current".into()),
        "mise_upgrade" => {
            args.push("upgrade".into());
            if let Some(target) = opt_str(params, "tool") {
                args.push(target.to_owned());
            }
        }
        "mise_exec" => {
            let command = required(params, tool, "command")?;
            args.push("exec".into());
            if let Some(target) = opt_str(params, "tool") {
                args.extend(["--".into(), target.to_owned()]);
            }
            args.extend(["--".into(), "sh".into(), "-c".into(), command.to_owned()]);
        }
        "mise_which" => {
            args.extend(["which".into(), required(params, tool, "command")?.to_owned()]);
        }
        "mise_env" => {
            let shell = opt_str(params, "shell").unwrap_or("bash");
            args.extend(["env".into(), "-s".into(), shell.to_owned()]);
        }
        "mise_run" => {
            return Ok(Invocation::Shell(required(params, tool, "command")?.to_owned()));
        }
        _ => {
            return Err(AdapterError::ToolNotFound {
                adapter_id: "mise".into(),
                tool_name: tool.to_owned(),
            });
        }
    }
    Ok(Invocation::Mise(args))
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Mise service adapter.
pub struct MiseAdapter {
    /// Unique identifier for this adapter instance.
    id: String,
    /// Executes the mapped invocations.
    runner: Arc<dyn CommandRunner>,
    /// Whether the adapter has been connected.
    connected: bool,
}

impl MiseAdapter {
    /// Create a mise adapter that spawns real processes.
    pub fn new(id: impl Into<String>, config: MiseConfig) -> Self {
        Self::with_runner(id, Arc::new(ProcessRunner::new(config)))
    }

    /// Create a mise adapter with a custom runner.
    pub fn with_runner(id: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            id: id.into(),
            runner,
            connected: false,
        }
    }
}

#[async_trait]
impl Adapter for MiseAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::DevTools
    }

    async fn connect(&mut self) -> Result<()> {
        info!(id = %self.id, "mise adapter connected");
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!(id = %self.id, "mise adapter disconnected");
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if !self.connected {
            return Ok(HealthStatus::Unhealthy);
        }
        let outcome = self
            .runner
            .run(&Invocation::Mise(vec!["--version".into()]))
            .await;
        Ok(if outcome.success {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        })
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        build_tool_definitions()
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        if !self.connected {
            return Err(AdapterError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("adapter `{}` is not connected", self.id),
            });
        }
        let invocation = build_invocation(name, &params).map_err(|e| match e {
            AdapterError::ToolNotFound { tool_name, .. } => AdapterError::ToolNotFound {
                adapter_id: self.id.clone(),
                tool_name,
            },
            other => other,
        })?;
        let outcome = self.runner.run(&invocation).await;
        Ok(Value::String(format_outcome(&outcome)))
    }
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.into(),
        description: description.into(),
        parameters,
    }
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "mise_install",
            "Install a tool or runtime using mise",
            json!({
                "type": "object",
                "properties": {
                    "tool": {
                        "type": "string",
                        "description": "Tool/runtime to install (e.g. 'python@3.11', 'node@20', 'go@latest')"
                    },
                    "global": {
                        "type": "boolean",
                        "description": "Install globally (default: false)",
                        "default": false
                    }
                },
                "required": ["tool"]
            }),
        ),
        tool(
            "mise_uninstall",
            "Uninstall a tool or runtime using mise",
            json!({
                "type": "object",
                "properties": {
                    "tool": {
                        "type": "string",
                        "description": "Tool/runtime to uninstall (e.g. 'python@3.11')"
                    }
                },
                "required": ["tool"]
            }),
        ),
        tool(
            "mise_use",
            "Set tool version for current directory or globally",
            json!({
                "type": "object",
                "properties": {
                    "tool": {
                        "type": "string",
                        "description": "Tool and version to use (e.g. 'python@3.11', 'node@20')"
                    },
                    "global": {
                        "type": "boolean",
                        "description": "Set globally (default: false)",
                        "default": false
                    }
                },
                "required": ["tool"]
            }),
        ),
        tool(
            "mise_list",
            "List installed tools and their versions",
            json!({
                "type": "object",
                "properties": {
                    "all": {
                        "type": "boolean",
                        "description": "Show all available versions (default: false)",
                        "default": false
                    },
                    "current": {
                        "type": "boolean",
                        "description": "Show only current/active versions (default: false)",
                        "default": false
                    }
                }
            }),
        ),
        tool("mise_outdated", "Show outdated tool versions", no_params()),
        tool(
            "mise_upgrade",
            "Upgrade tools to their latest versions",
            json!({
                "type": "object",
                "properties": {
                    "tool": {
                        "type": "string",
                        "description": "Specific tool to upgrade (upgrades all if omitted)"
                    }
                }
            }),
        ),
        tool("mise_current", "Show current tool versions in use", no_params()),
        tool(
            "mise_exec",
            "Execute a command with mise-managed tools in PATH",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command to execute" },
                    "tool": {
                        "type": "string",
                        "description": "Specific tool version to use (optional)"
                    }
                },
                "required": ["command"]
            }),
        ),
        tool(
            "mise_which",
            "Show path to a binary managed by mise",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command/binary name to locate" }
                },
                "required": ["command"]
            }),
        ),
        tool(
            "mise_env",
            "Show or export environment variables for mise tools",
            json!({
                "type": "object",
                "properties": {
                    "shell": {
                        "type": "string",
                        "description": "Shell format (bash, zsh, fish, etc.)",
                        "default": "bash"
                    }
                }
            }),
        ),
        tool(
            "mise_run",
            "Run a command with mise environment variables loaded",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Command to execute with mise environment"
                    }
                },
                "required": ["command"]
            }),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
