//! External renderer backed by an operator-configured program.
//!
//! The program gets the target surface id as its last argument and the
//! serialized state on stdin. Whatever it prints on stdout becomes the
//! surface content.

use crate::render::{ExternalRenderer, LocalBoxFuture};
use std::io;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandRenderer {
    program: String,
    arguments: Vec<String>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            arguments: Vec::new(),
        }
    }

    /// Parse a whitespace separated command line such as `node render.js`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            arguments: parts.collect(),
        })
    }

    async fn run(&self, serialized_state: &str, target_id: &str) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(&self.arguments)
            .arg(target_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| format!("failed to start `{}`: {error}", self.program))?;

        // Feed stdin while output is collected, the program may write before it reads.
        let stdin = child.stdin.take();
        let send = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(serialized_state.as_bytes()).await {
                Err(error) if error.kind() != io::ErrorKind::BrokenPipe => Err(error),
                _ => Ok(()),
            }
        };
        let (sent, output) = tokio::join!(send, child.wait_with_output());
        let output =
            output.map_err(|error| format!("failed to wait for `{}`: {error}", self.program))?;
        sent.map_err(|error| format!("failed to send state: {error}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("`{}` exited with {}: {}", self.program, output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ExternalRenderer for CommandRenderer {
    fn render_into<'a>(
        &'a mut self,
        serialized_state: &'a str,
        target_id: &'a str,
    ) -> LocalBoxFuture<'a, Result<String, String>> {
        Box::pin(async move {
            log::debug!("Running `{}` for `{}`", self.program, target_id);
            self.run(serialized_state, target_id).await
        })
    }
}
