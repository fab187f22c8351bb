//! One engine subprocess, start to reap.
//!
//! Lifecycle: spawn with the configured argv, deliver the single request line
//! on stdin, then consume stdout and stderr concurrently while a watchdog
//! runs. Stdout chunks feed the protocol decoder (tagged events are forwarded
//! to the caller's sink in real time, everything else accumulates as the
//! terminal payload). The first stderr byte is fatal: input is closed, the
//! process is killed, and all diagnostic bytes are kept for the error message.
//! The watchdog firing does the same with a synthesized message. Every path
//! converges on `wait()`, so the subprocess is reaped before the outcome is
//! delivered. Exactly one outcome per run.

use std::{
    process::Stdio,
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
    time::{sleep, timeout, timeout_at},
};
use tracing::{debug, info, warn};

use torchio_wire::{OutputAccumulator, TerminalResult};

use crate::{config::ResolvedEngine, error::EngineError, session::EventSink};

pub(crate) const TIMEOUT_MESSAGE: &str = "render timed out before completion";

/// Post-exit budget for draining buffered stream output. Bounded so an
/// orphaned grandchild holding the pipe write-end cannot wedge the session.
const EXIT_DRAIN_GRACE: Duration = Duration::from_secs(2);
/// Tighter drain budget after a kill; only buffered diagnostics matter then.
const KILLED_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Terminal state of one engine run. Exactly one is produced per session and
/// it is the sole thing the caller ever sees.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The engine exited zero with no diagnostics and a parseable terminal
    /// payload.
    Completed(TerminalResult),
    /// Spawn failure, diagnostic output, non-zero exit, or an unparseable
    /// terminal payload.
    Failed(EngineError),
    /// The watchdog fired before the engine finished.
    TimedOut { message: String },
}

impl ProcessOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn into_result(self) -> Result<TerminalResult, EngineError> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Failed(error) => Err(error),
            Self::TimedOut { message } => Err(EngineError::TimedOut { message }),
        }
    }
}

pub(crate) async fn run(
    engine: &ResolvedEngine,
    request_line: &str,
    sink: &dyn EventSink,
) -> ProcessOutcome {
    let started_at = Instant::now();

    let mut child = match Command::new(&engine.engine_path)
        .args(&engine.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(
                target = "torchio::engine",
                op = "engine::run",
                result = "error",
                error_code = "spawn",
                engine_path = %engine.engine_path.display(),
                error = %err,
                "Failed to spawn engine process"
            );
            return ProcessOutcome::Failed(EngineError::Spawn(err));
        }
    };

    let mut stdin = child.stdin.take();
    let mut stdout = child.stdout.take().expect("engine stdout is piped");
    let mut stderr = child.stderr.take().expect("engine stderr is piped");

    // The entire outbound protocol: one request line, written once at
    // startup. A write failure means the engine died before reading it; the
    // exit handling below will say why.
    if let Some(handle) = stdin.as_mut() {
        let delivery = async {
            handle.write_all(request_line.as_bytes()).await?;
            handle.flush().await
        };
        if let Err(err) = delivery.await {
            debug!(
                target = "torchio::engine",
                op = "engine::run",
                error = %err,
                "Engine closed stdin before accepting the request"
            );
        }
    }

    let mut accumulator = OutputAccumulator::new();
    let mut diagnostics: Vec<u8> = Vec::new();
    let mut timed_out = false;
    let mut killed = false;
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];

    let deadline = sleep(engine.timeout);
    tokio::pin!(deadline);

    // Both output streams are consumed concurrently; reading them in sequence
    // could deadlock against a full pipe buffer. The loop ends when both hit
    // EOF or when the engine is being torn down.
    while (stdout_open || stderr_open) && !killed {
        tokio::select! {
            read = stdout.read(&mut out_buf), if stdout_open => match read {
                Ok(0) => stdout_open = false,
                Ok(n) => forward_events(&mut accumulator, &out_buf[..n], sink),
                Err(err) => {
                    warn!(
                        target = "torchio::engine",
                        op = "engine::run",
                        error = %err,
                        "Failed to read engine stdout"
                    );
                    stdout_open = false;
                }
            },
            read = stderr.read(&mut err_buf), if stderr_open => match read {
                Ok(0) => stderr_open = false,
                Ok(n) => {
                    if diagnostics.is_empty() {
                        // First diagnostic byte is fatal: close input and
                        // bring the engine down. There is no warning path.
                        stdin.take();
                        let _ = child.start_kill();
                        killed = true;
                    }
                    diagnostics.extend_from_slice(&err_buf[..n]);
                }
                Err(err) => {
                    warn!(
                        target = "torchio::engine",
                        op = "engine::run",
                        error = %err,
                        "Failed to read engine stderr"
                    );
                    stderr_open = false;
                }
            },
            _ = &mut deadline, if !timed_out => {
                timed_out = true;
                stdin.take();
                let _ = child.start_kill();
                killed = true;
            }
        }
    }
    drop(stdin);

    // Reap unconditionally; no subprocess may outlive the outcome. After a
    // kill the exit is imminent. On the natural-EOF path the remaining
    // watchdog budget still applies to an engine that closed its streams but
    // refuses to exit.
    let wait_result = if killed {
        child.wait().await
    } else {
        match timeout_at(deadline.deadline(), child.wait()).await {
            Ok(result) => result,
            Err(_elapsed) => {
                timed_out = true;
                let _ = child.start_kill();
                child.wait().await
            }
        }
    };
    let status = match wait_result {
        Ok(status) => status,
        Err(err) => return ProcessOutcome::Failed(EngineError::Io(err)),
    };

    // The pipes can still hold output written just before exit, including the
    // terminal payload itself. Drain to EOF under a grace budget.
    let grace = if killed { KILLED_DRAIN_GRACE } else { EXIT_DRAIN_GRACE };
    let _ = timeout(grace, async {
        if stdout_open {
            loop {
                match stdout.read(&mut out_buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => forward_events(&mut accumulator, &out_buf[..n], sink),
                }
            }
        }
        if stderr_open {
            loop {
                match stderr.read(&mut err_buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => diagnostics.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    })
    .await;

    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    let diagnostic_text = String::from_utf8_lossy(&diagnostics).trim().to_string();

    if timed_out {
        let message = if diagnostic_text.is_empty() {
            TIMEOUT_MESSAGE.to_string()
        } else {
            diagnostic_text
        };
        warn!(
            target = "torchio::engine",
            op = "engine::run",
            result = "timeout",
            elapsed_ms,
            "Engine render timed out"
        );
        return ProcessOutcome::TimedOut { message };
    }

    if !status.success() || !diagnostics.is_empty() {
        // Diagnostic text always wins over a generic exit-code message.
        let error = if !diagnostic_text.is_empty() {
            EngineError::Diagnostic {
                message: diagnostic_text,
            }
        } else if let Some(code) = status.code() {
            EngineError::NonZeroExit { code }
        } else {
            EngineError::diagnostic("unknown engine error")
        };
        warn!(
            target = "torchio::engine",
            op = "engine::run",
            result = "error",
            exit_code = ?status.code(),
            elapsed_ms,
            error = %error,
            "Engine render failed"
        );
        return ProcessOutcome::Failed(error);
    }

    match accumulator.finish(engine.filename.as_deref()) {
        Ok(result) => {
            info!(
                target = "torchio::engine",
                op = "engine::run",
                result = "ok",
                elapsed_ms,
                filename = %result.filename,
                "Engine render completed"
            );
            ProcessOutcome::Completed(result)
        }
        Err(failure) => {
            warn!(
                target = "torchio::engine",
                op = "engine::run",
                result = "error",
                error_code = "terminal_parse",
                elapsed_ms,
                error = %failure,
                "Engine terminal payload did not parse"
            );
            ProcessOutcome::Failed(EngineError::parse(
                failure.message,
                failure.filename.as_deref(),
            ))
        }
    }
}

fn forward_events(accumulator: &mut OutputAccumulator, chunk: &[u8], sink: &dyn EventSink) {
    for event in accumulator.push_chunk(chunk) {
        sink.event(event);
    }
}
