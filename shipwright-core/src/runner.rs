//! Command runner abstraction for guards, hooks and resource handlers.
//!
//! `CommandRunner` is the seam every external process goes through.
//! `ShellRunner` is the production implementation (`sh -c` on a tokio
//! current-thread runtime, bounded by a per-call timeout).
//! `ScriptedRunner` is the test double that records calls and answers with
//! scripted outcomes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::RunnerError;

// ---------------------------------------------------------------------------
// Spec / output
// ---------------------------------------------------------------------------

/// One external command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Shell line passed to `sh -c`.
    pub command: String,
    /// Effective user; `None` runs as the current user.
    pub user: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn user_opt(mut self, user: Option<&str>) -> Self {
        self.user = user.map(str::to_owned);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr joined, trimmed, for error reports.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Single-quote `value` for `sh`, escaping embedded single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Trait for executing external commands.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

// ---------------------------------------------------------------------------
// ShellRunner
// ---------------------------------------------------------------------------

/// Production runner: `sh -c <command>`, or
/// `su -m -s /bin/sh -c <command> <user>` when an effective user is set.
pub struct ShellRunner {
    runtime: tokio::runtime::Runtime,
    default_timeout: Option<Duration>,
}

impl ShellRunner {
    pub fn new(default_timeout: Option<Duration>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            default_timeout,
        })
    }

    fn build(spec: &CommandSpec) -> tokio::process::Command {
        let mut cmd = match spec.user.as_deref() {
            Some(user) => {
                let mut c = tokio::process::Command::new("su");
                c.args(["-m", "-s", "/bin/sh", "-c", &spec.command, user]);
                c
            }
            None => {
                let mut c = tokio::process::Command::new("sh");
                c.args(["-c", &spec.command]);
                c
            }
        };
        if let Some(cwd) = spec.cwd.as_ref() {
            cmd.current_dir(cwd);
        }
        cmd.envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let timeout = spec.timeout.or(self.default_timeout);
        tracing::debug!(command = %spec.command, user = ?spec.user, "running command");
        let mut cmd = Self::build(spec);
        let spawn_err = |source: std::io::Error| RunnerError::Spawn {
            command: spec.command.clone(),
            source,
        };

        let output = self.runtime.block_on(async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                    Ok(result) => result.map_err(&spawn_err),
                    // Dropping the future kills the child (kill_on_drop).
                    Err(_) => Err(RunnerError::Timeout {
                        command: spec.command.clone(),
                        seconds: limit.as_secs(),
                    }),
                },
                None => cmd.output().await.map_err(&spawn_err),
            }
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    Timeout,
    SpawnFailure,
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    response: Scripted,
    remaining: Option<usize>,
}

/// Test double: records every command and answers with the first scripted
/// rule whose pattern is a substring of the command line. Unmatched commands
/// succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, pattern: &str, response: Scripted, remaining: Option<usize>) -> Self {
        if let Ok(rules) = self.rules.get_mut() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                response,
                remaining,
            });
        }
        self
    }

    /// Every matching command exits 0 with `stdout`.
    pub fn succeed(self, pattern: &str, stdout: &str) -> Self {
        self.push(pattern, Scripted::Output(CommandOutput::ok(stdout)), None)
    }

    /// Every matching command exits `code`.
    pub fn fail(self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.push(pattern, Scripted::Output(CommandOutput::failed(code, stderr)), None)
    }

    /// The next matching command exits `code`; later ones fall through.
    pub fn fail_once(self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.push(
            pattern,
            Scripted::Output(CommandOutput::failed(code, stderr)),
            Some(1),
        )
    }

    pub fn time_out(self, pattern: &str) -> Self {
        self.push(pattern, Scripted::Timeout, None)
    }

    pub fn spawn_failure(self, pattern: &str) -> Self {
        self.push(pattern, Scripted::SpawnFailure, None)
    }

    /// All recorded invocations, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Number of recorded commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let response = self.rules.lock().ok().and_then(|mut rules| {
            let rule = rules.iter_mut().find(|r| {
                spec.command.contains(&r.pattern) && r.remaining.map_or(true, |n| n > 0)
            })?;
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            Some(rule.response.clone())
        });
        match response {
            None => Ok(CommandOutput::ok("")),
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::Timeout) => Err(RunnerError::Timeout {
                command: spec.command.clone(),
                seconds: spec.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            }),
            Some(Scripted::SpawnFailure) => Err(RunnerError::Spawn {
                command: spec.command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
        }
    }
}
