//! Session adapter backed by a long-lived local shell.
//!
//! Opening a session spawns the configured program once, with piped stdin and
//! stdout, and sends it the `open` template. From then on a worker task owns
//! the child and serves one request at a time: the rendered template is
//! written as a single line, and output is collected up to the
//! `{marker} OK|ERR` line that ends it. Closing sends the `close` template,
//! ends stdin and waits for the child to exit.
//!
//! Dropping the session aborts the worker, and `kill_on_drop` takes the child
//! with it, so a hung remote call never outlives its host pipeline.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use fleetcheck_common::config::TransportConfig;
use fleetcheck_common::debug;
use fleetcheck_common::host::Host;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use super::{RemoteSession, SessionFactory};
use crate::signal::AbortOnDrop;

const HOST_PLACEHOLDER: &str = "{host}";
const SCRIPT_PLACEHOLDER: &str = "{script}";
const MARKER_PLACEHOLDER: &str = "{marker}";
const MARKER_PREFIX: &str = "__fleetcheck_done_";
const OUTPUT_EXCERPT: usize = 512;

#[derive(Debug, Clone)]
pub struct CommandTransport {
    config: Arc<TransportConfig>,
}

impl CommandTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl SessionFactory for CommandTransport {
    async fn open(&self, host: &Host) -> anyhow::Result<Arc<dyn RemoteSession>> {
        let target = validate_target(host.connect_addr())?;
        let mut shell = Shell::spawn(&self.config, target)?;
        shell
            .run(&self.config.open, "")
            .await
            .with_context(|| format!("establishing session with {}", host.name))?;
        debug!(host = %host.name, "session established");
        Ok(Arc::new(CommandSession::start(
            shell,
            self.config.clone(),
            host.name.clone(),
        )))
    }
}

/// Targets end up inside shell commands, so only characters found in DNS
/// names and IP literals (zone ids included) are accepted.
fn validate_target(target: &str) -> anyhow::Result<&str> {
    let valid = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | ':' | '%'));
    if !valid {
        bail!("refusing to open a session with {target:?}: not a host name or address");
    }
    Ok(target)
}

/// The child process and its pipes.
struct Shell {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    target: String,
    sequence: u64,
}

impl Shell {
    fn spawn(config: &TransportConfig, target: &str) -> anyhow::Result<Self> {
        let mut child = Command::new(&config.program)
            .args(config.args.iter().map(|arg| arg.replace(HOST_PLACEHOLDER, target)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", config.program))?;

        let stdin = child.stdin.take().context("shell stdin is not piped")?;
        let stdout = child.stdout.take().context("shell stdout is not piped")?;
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            target: target.to_string(),
            sequence: 0,
        })
    }

    /// Sends one rendered template and reads its output up to the marker.
    async fn run(&mut self, template: &str, script: &str) -> anyhow::Result<Value> {
        self.sequence += 1;
        let marker = format!("{MARKER_PREFIX}{}", self.sequence);
        let line = render(template, &self.target, &marker, script);

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        let mut output = Vec::new();
        while let Some(line) = self.stdout.next_line().await? {
            match marker_status(&line, &marker) {
                Some(true) => return Ok(parse_output(&output.join("\n"))),
                Some(false) => bail!("{}", excerpt(&output.join("\n"))),
                None => output.push(line),
            }
        }
        bail!("shell exited before finishing the request")
    }

    /// Releases the remote session, then lets the shell exit on end of input.
    async fn shutdown(mut self, close: &str) -> anyhow::Result<()> {
        let released = self.run(close, "").await.map(drop);
        let Shell { mut child, stdin, .. } = self;
        drop(stdin);
        child.wait().await.context("waiting for the shell to exit")?;
        released
    }
}

/// `Some(true)` for `{marker} OK`, `Some(false)` for any other status, `None` for output.
fn marker_status(line: &str, marker: &str) -> Option<bool> {
    let (tag, status) = line.trim_end().rsplit_once(' ')?;
    (tag == marker).then_some(status == "OK")
}

/// Templates go to the shell one line at a time, so script lines are joined with `; `.
/// The script is substituted last, leaving placeholders inside it untouched.
fn render(template: &str, target: &str, marker: &str, script: &str) -> String {
    let script = script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    template
        .replace(HOST_PLACEHOLDER, target)
        .replace(MARKER_PLACEHOLDER, marker)
        .replace(SCRIPT_PLACEHOLDER, &script)
}

enum Request {
    Invoke {
        script: String,
        reply: oneshot::Sender<anyhow::Result<Value>>,
    },
    Close {
        reply: oneshot::Sender<anyhow::Result<()>>,
    },
}

struct CommandSession {
    host: String,
    requests: mpsc::Sender<Request>,
    _worker: AbortOnDrop,
}

impl CommandSession {
    fn start(shell: Shell, config: Arc<TransportConfig>, host: String) -> Self {
        let (requests, mut inbox) = mpsc::channel(1);
        let worker = tokio::spawn(async move {
            let mut shell = shell;
            while let Some(request) = inbox.recv().await {
                match request {
                    Request::Invoke { script, reply } => {
                        let _ = reply.send(shell.run(&config.invoke, &script).await);
                    }
                    Request::Close { reply } => {
                        inbox.close();
                        let _ = reply.send(shell.shutdown(&config.close).await);
                        break;
                    }
                }
            }
        });
        Self {
            host,
            requests,
            _worker: AbortOnDrop::new(worker.abort_handle()),
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<anyhow::Result<T>>) -> Request,
    ) -> anyhow::Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| anyhow!("session with {} is closed", self.host))?;
        response
            .await
            .map_err(|_| anyhow!("session with {} ended unexpectedly", self.host))?
    }
}

#[async_trait]
impl RemoteSession for CommandSession {
    async fn invoke(&self, script: &str) -> anyhow::Result<Value> {
        let script = script.to_string();
        self.request(|reply| Request::Invoke { script, reply }).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        let closed = self.request(|reply| Request::Close { reply }).await;
        debug!(host = %self.host, "session closed");
        closed
    }
}

/// JSON when possible, a plain string otherwise, `null` for no output.
fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn excerpt(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return "remote command failed without output".to_string();
    }
    trimmed.chars().take(OUTPUT_EXCERPT).collect()
}
