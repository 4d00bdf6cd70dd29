//src/executor/run.rs
//
// Runs one child process with stdin payload, captured output and a
// wall-clock deadline.

use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const OUTPUT_LIMIT: usize = 10_000;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the deadline expired and the child was killed.
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }
}

pub fn run_with_input(
    mut cmd: Command,
    input: &[u8],
    timeout: Duration,
) -> Result<ProcessOutput, String> {
    let started = Instant::now();
    let program = cmd.get_program().to_string_lossy().into_owned();

    // Own process group, so a timeout also takes down anything the child spawned.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {program}: {e}"))?;

    // Drain both pipes on their own threads so a chatty child cannot block.
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    if let Some(mut stdin) = child.stdin.take() {
        // A child that dies before reading reports through its exit status.
        let _ = stdin.write_all(input);
        let _ = stdin.flush();
    }

    let status = wait_with_deadline(&mut child, timeout)?;

    // Leftover descendants hold the pipes open; the readers only finish once they are gone.
    kill_group(&child);

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        duration_ms: started.elapsed().as_millis(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<ExitStatus>, String> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait().map_err(|e| e.to_string())? {
            return Ok(Some(status));
        }

        if Instant::now() >= deadline {
            kill_group(child);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Keeps the tail, which is where tracebacks end.
pub fn truncate_output(s: &str) -> String {
    if s.chars().count() <= OUTPUT_LIMIT {
        return s.to_string();
    }

    let tail: String = s
        .chars()
        .rev()
        .take(OUTPUT_LIMIT)
        .collect::<String>()
        .chars()
        .rev()
        .collect();

    format!("...truncated...\n{}", tail)
}
