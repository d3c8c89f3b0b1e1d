//! Helpers intended for [`std::process::Command`].

use std::io::Read;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Maximum number of bytes of stderr we capture into an error message.
const MAX_STDERR_BYTES: usize = 4096;

fn render_cmd(cmd: &Command) -> String {
    let mut r = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        r.push(' ');
        r.push_str(&arg.to_string_lossy());
    }
    r
}

/// Given a process exit status, turn it into an error if it was unsuccessful,
/// including the captured stderr (if any) in the message.
fn check_status(cmd: &Command, st: std::process::ExitStatus, stderr: &[u8]) -> Result<()> {
    if st.success() {
        return Ok(());
    }
    let cmdline = render_cmd(cmd);
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        anyhow::bail!("{cmdline}: {st}");
    }
    anyhow::bail!("{cmdline}: {st}: {stderr}")
}

/// Extension methods on [`Command`] that run the process to completion
/// and turn failure exit statuses into structured errors.
pub trait CommandRunExt {
    /// Log (at debug level) the command we are about to execute.
    fn log_debug(&mut self) -> &mut Self;

    /// Run the command, requiring a successful exit; stderr is captured
    /// and included in the error on failure.
    fn run_capture_stderr(&mut self) -> Result<()>;

    /// Run the command, requiring success, returning trimmed stdout as a string.
    fn run_get_string(&mut self) -> Result<String>;

    /// Run the command, requiring success, returning raw stdout.
    fn run_get_output(&mut self) -> Result<Vec<u8>>;

    /// Run the command, requiring success, deserializing stdout as JSON.
    fn run_and_parse_json<T: DeserializeOwned>(&mut self) -> Result<T>;
}

impl CommandRunExt for Command {
    fn log_debug(&mut self) -> &mut Self {
        tracing::debug!("exec: {}", render_cmd(self));
        self
    }

    fn run_capture_stderr(&mut self) -> Result<()> {
        let output = self
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning {}", render_cmd(self)))?;
        let mut stderr = output.stderr;
        stderr.truncate(MAX_STDERR_BYTES);
        check_status(self, output.status, &stderr)
    }

    fn run_get_output(&mut self) -> Result<Vec<u8>> {
        let output = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawning {}", render_cmd(self)))?;
        let mut stderr = output.stderr;
        stderr.truncate(MAX_STDERR_BYTES);
        check_status(self, output.status, &stderr)?;
        Ok(output.stdout)
    }

    fn run_get_string(&mut self) -> Result<String> {
        let out = self.run_get_output()?;
        let mut s = String::new();
        out.as_slice().read_to_string(&mut s)?;
        Ok(s.trim_end().to_owned())
    }

    fn run_and_parse_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let out = self.run_get_output()?;
        serde_json::from_slice(&out).with_context(|| format!("parsing {} output", render_cmd(self)))
    }
}
