//! Hook-command execution.
//!
//! After a refresh the daemon can run an external program (typically a
//! "reload HAProxy" script) with the raw DER response on its standard
//! input. Standard output and error pass straight through.

use std::io;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs `hook_cmd` with `raw` on stdin; an error is returned when the
/// program cannot be spawned, stdin cannot be written, or the exit
/// status is non-zero.
pub async fn run_hook_cmd(hook_cmd: &str, raw: &[u8]) -> io::Result<()> {
    let mut child = Command::new(hook_cmd)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("stdin was piped");
    stdin.write_all(raw).await?;
    drop(stdin);

    let status = child.wait().await?;
    if !status.success() {
        return Err(io::Error::other(format!("hook exited with {status}")));
    }
    Ok(())
}
