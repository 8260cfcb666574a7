//! Child-process plumbing for command-backed collaborators.
//!
//! A model call writes the prompt to the child's stdin and reads the
//! completion from stdout under a wall-clock deadline. Both output pipes are
//! drained on their own threads so a chatty child cannot stall on a full
//! pipe while we are still writing the prompt.

use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// How the child stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Finished(ExitStatus),
    /// Killed at the deadline.
    DeadlineExceeded,
}

/// Bytes kept from one output stream, plus how many were dropped past the cap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Last non-empty line, used in error messages.
    pub fn last_line(&self) -> String {
        String::from_utf8_lossy(&self.bytes)
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug)]
pub struct ChildRun {
    pub exit: Exit,
    pub stdout: Captured,
    pub stderr: Captured,
}

impl ChildRun {
    pub fn succeeded(&self) -> bool {
        matches!(self.exit, Exit::Finished(status) if status.success())
    }
}

/// Spawn `program args...`, feed it `input`, and wait at most `deadline`.
///
/// Spawn and pipe failures are errors. A non-zero exit or a deadline kill is
/// reported through [`ChildRun::exit`].
#[instrument(skip(args, input), fields(deadline_secs = deadline.as_secs_f32()))]
pub fn run_with_deadline(
    program: &str,
    args: &[String],
    input: &[u8],
    deadline: Duration,
    output_cap: usize,
) -> Result<ChildRun> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {program}"))?;

    let (stdout, stderr) = drain_outputs(&mut child, output_cap)?;
    feed_stdin(&mut child, input)?;

    let exit = match child.wait_timeout(deadline).context("wait for child")? {
        Some(status) => Exit::Finished(status),
        None => {
            warn!(program, "deadline exceeded, killing child");
            child.kill().context("kill child")?;
            child.wait().context("reap killed child")?;
            Exit::DeadlineExceeded
        }
    };

    let run = ChildRun {
        exit,
        stdout: collect(stdout).context("collect stdout")?,
        stderr: collect(stderr).context("collect stderr")?,
    };
    if run.stdout.dropped > 0 || run.stderr.dropped > 0 {
        warn!(
            stdout_dropped = run.stdout.dropped,
            stderr_dropped = run.stderr.dropped,
            "child output exceeded cap"
        );
    }
    debug!(exit = ?run.exit, "child finished");
    Ok(run)
}

type Drain = JoinHandle<Result<Captured>>;

fn drain_outputs(child: &mut Child, cap: usize) -> Result<(Drain, Drain)> {
    let stdout: ChildStdout = child.stdout.take().ok_or_else(|| anyhow!("stdout not piped"))?;
    let stderr: ChildStderr = child.stderr.take().ok_or_else(|| anyhow!("stderr not piped"))?;
    Ok((
        thread::spawn(move || read_capped(stdout, cap)),
        thread::spawn(move || read_capped(stderr, cap)),
    ))
}

/// Write the prompt and close stdin so the child sees EOF.
fn feed_stdin(child: &mut Child, input: &[u8]) -> Result<()> {
    let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("stdin not piped"))?;
    // A child that exits before reading everything shows up in its exit status.
    if let Err(err) = stdin.write_all(input) {
        warn!(error = %err, "child closed stdin early");
    }
    Ok(())
}

fn collect(handle: Drain) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader panicked"))?
}

fn read_capped(mut reader: impl Read, cap: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read child output")?;
        if n == 0 {
            return Ok(captured);
        }
        let keep = n.min(cap.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }
}
