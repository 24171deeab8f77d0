use anyhow::Result;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Collapse whitespace runs to single spaces and cap the result at
/// `max_chars` characters, marking a cut with `…`.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &collapsed[..cut]),
        None => collapsed,
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error only truncates captured output.
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run `cmd` to completion, killing it once `deadline` has passed.
/// Both pipes are drained while the child runs, so chatty children never stall.
pub fn output_within(cmd: &mut Command, deadline: Duration) -> Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("command exceeded its {}s deadline", deadline.as_secs());
        }
        thread::sleep(CHILD_POLL_INTERVAL);
    };

    let join = |handle: JoinHandle<Vec<u8>>| {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("output reader thread panicked"))
    };
    Ok(Output {
        status,
        stdout: join(stdout)?,
        stderr: join(stderr)?,
    })
}
