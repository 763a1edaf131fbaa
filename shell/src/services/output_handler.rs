//! Forwarding of backend stdout/stderr into the shell's log
//!
//! Each stream is read line by line on its own task so a chatty backend never
//! blocks on a full pipe. stdout lands at info, stderr at warn, both tagged
//! with the backend process id.

use shared::{process_info, process_warn, ProcessId};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Take the child's piped streams and spawn one forwarding task per stream.
///
/// The returned handles complete with the number of forwarded lines once the
/// corresponding stream hits EOF.
pub fn forward_output(child: &mut Child) -> Vec<JoinHandle<usize>> {
    let mut readers = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, StreamKind::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, StreamKind::Stderr)));
    }

    readers
}

/// Log every line of `stream`; read errors end forwarding silently
pub async fn forward_lines<R>(stream: R, kind: StreamKind) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut forwarded = 0;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        match kind {
            StreamKind::Stdout => {
                process_info!(ProcessId::Backend, "{}", line);
            }
            StreamKind::Stderr => {
                process_warn!(ProcessId::Backend, "{}", line);
            }
        }
        forwarded += 1;
    }

    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forward_lines_counts_non_empty_lines() {
        let input: &[u8] = b"Uvicorn running on http://127.0.0.1:8000\n\n  \nApplication startup complete.\n";
        assert_eq!(forward_lines(input, StreamKind::Stdout).await, 2);
    }

    #[tokio::test]
    async fn test_forward_lines_handles_missing_trailing_newline() {
        let input: &[u8] = b"Traceback (most recent call last):\nValueError: bad port";
        assert_eq!(forward_lines(input, StreamKind::Stderr).await, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_forward_output_drains_both_streams() {
        let mut child = tokio::process::Command::new("/bin/sh")
            .args(["-c", "echo listening; echo warming up >&2; echo ready"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let readers = forward_output(&mut child);
        assert_eq!(readers.len(), 2);
        child.wait().await.unwrap();

        let mut total = 0;
        for reader in readers {
            total += reader.await.unwrap();
        }
        assert_eq!(total, 3);
    }
}
