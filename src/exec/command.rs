// src/exec/command.rs

//! Built-in task that runs a shell command.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RequirementConfig;
use crate::task::dependency::from_requirement;
use crate::task::{BoxFuture, Context, Dependency, Task};
use crate::types::SequenceNumber;

/// Runs `cmd` through the platform shell.
///
/// The child sees `CADENCE_TASK`, `CADENCE_SEQUENCE_NUMBER`,
/// `CADENCE_ADHOC` and one `CADENCE_ARG_<KEY>` per argument. A non-zero exit
/// is a task failure. The child is killed when the exec future is dropped.
#[derive(Debug, Clone)]
pub struct CommandTask {
    cmd: String,
    requires: Vec<Arc<dyn Dependency>>,
}

impl CommandTask {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            requires: Vec::new(),
        }
    }

    pub fn with_requirements(cmd: impl Into<String>, requires: &[RequirementConfig]) -> Self {
        Self {
            cmd: cmd.into(),
            requires: requires.iter().filter_map(from_requirement).collect(),
        }
    }

    async fn run(&self, ctx: &Context) -> Result<()> {
        info!(
            task = %ctx.task_name(),
            sequence_number = ctx.sequence_number(),
            cmd = %self.cmd,
            "starting task process"
        );

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("CADENCE_TASK", ctx.task_name())
            .env("CADENCE_SEQUENCE_NUMBER", ctx.sequence_number().to_string())
            .env("CADENCE_ADHOC", ctx.is_adhoc().to_string());
        for (key, value) in ctx.args() {
            cmd.env(arg_env_name(key), value);
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", ctx.task_name()))?;

        if let Some(stdout) = child.stdout.take() {
            spawn_line_logger(ctx, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_logger(ctx, "stderr", stderr);
        }

        let status = child.wait().await.with_context(|| {
            format!("waiting for process of task '{}'", ctx.task_name())
        })?;

        let code = status.code().unwrap_or(-1);
        info!(
            task = %ctx.task_name(),
            sequence_number = ctx.sequence_number(),
            exit_code = code,
            success = status.success(),
            "task process exited"
        );

        if !status.success() {
            bail!("command exited with code {code}");
        }
        Ok(())
    }
}

impl Task for CommandTask {
    fn exec<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.run(ctx))
    }

    fn dependencies(&self, _sequence_number: SequenceNumber) -> Vec<Arc<dyn Dependency>> {
        self.requires.clone()
    }
}

/// `CADENCE_ARG_<KEY>` with the key upper-cased and non-alphanumerics
/// replaced by `_`.
fn arg_env_name(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("CADENCE_ARG_{key}")
}

fn spawn_line_logger<R>(ctx: &Context, stream: &'static str, reader: R)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let task_name = ctx.task_name().to_string();
    let seq = ctx.sequence_number();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task_name, sequence_number = seq, stream, "{}", line);
        }
    });
}
