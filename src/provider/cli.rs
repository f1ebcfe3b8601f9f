//! Thin async wrapper around a cloud vendor's command-line tool.

use std::process::Stdio;

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use serde::de::DeserializeOwned;
use tokio::process::Command;

/// Runs one CLI program with a fixed set of trailing global arguments
/// (region, profile, output format).
#[derive(Debug, Clone)]
pub struct CliRunner {
    program: String,
    global_args: Vec<String>,
}

impl CliRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_global_arg(mut self, arg: impl Into<String>) -> Self {
        self.global_args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run and return stdout. A non-zero exit becomes an error carrying stderr.
    ///
    /// The child is killed if the returned future is dropped.
    pub async fn output(&self, args: &[&str]) -> Result<String> {
        let label = self.label(args);
        tracing::debug!(command = %label, "Running CLI command");

        let output = Command::new(&self.program)
            .args(args)
            .args(&self.global_args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .wrap_err_with(|| format!("Failed to run `{}`; is it installed?", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            tracing::warn!(command = %label, status = %output.status, stderr, "CLI command failed");
            return Err(eyre!(
                "{label} failed: {}",
                if stderr.is_empty() { "no error output" } else { stderr }
            ));
        }

        String::from_utf8(output.stdout).wrap_err_with(|| format!("{label} produced non-UTF-8 output"))
    }

    /// Run and deserialize stdout as JSON.
    pub async fn json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let stdout = self.output(args).await?;
        serde_json::from_str(&stdout)
            .wrap_err_with(|| format!("Unexpected output from {}", self.label(args)))
    }

    /// Program plus its subcommand words, for logs and error messages.
    fn label(&self, args: &[&str]) -> String {
        let words: Vec<&str> = args
            .iter()
            .take_while(|a| !a.starts_with('-'))
            .take(3)
            .copied()
            .collect();
        format!("{} {}", self.program, words.join(" "))
    }
}
