use std::fmt;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

/// Output of an external invocation whose stdout is consumed by us.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Blocking process boundary. Every call waits for the child to exit.
pub trait Runner {
    /// Run with stdout and stderr captured.
    fn capture(&mut self, args: &[String]) -> Result<Captured>;
    /// Run with the streams inherited from this process. Returns whether the child succeeded.
    fn inherit(&mut self, args: &[String]) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: resolve_program(program.into()),
        }
    }
}

/// The Azure CLI ships as `az.cmd` on Windows, which `Command` does not find by its bare name.
fn resolve_program(program: String) -> String {
    if cfg!(windows) && program == "az" {
        "az.cmd".to_string()
    } else {
        program
    }
}

impl Runner for ProcessRunner {
    fn capture(&mut self, args: &[String]) -> Result<Captured> {
        debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to start '{}'", self.program))?;

        Ok(Captured {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn inherit(&mut self, args: &[String]) -> Result<bool> {
        debug!("Running {} {}", self.program, args.join(" "));
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to start '{}'", self.program))?;
        Ok(status.success())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub digest: String,
    /// Kept raw, anything other than a non-empty array counts as untagged.
    #[serde(default)]
    pub tags: Option<Value>,
}

impl Manifest {
    pub fn is_untagged(&self) -> bool {
        !matches!(&self.tags, Some(Value::Array(tags)) if !tags.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub current_value: i64,
    pub limit: i64,
}

impl fmt::Display for UsageSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} GB ({:.3} MB) out of {:.0} GB",
            to_gigabytes(self.current_value),
            to_megabytes(self.current_value),
            to_gigabytes(self.limit)
        )
    }
}

pub fn to_megabytes(bytes: i64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

pub fn to_gigabytes(bytes: i64) -> f64 {
    to_megabytes(bytes) / 1024.0
}

/// The `az acr` commands for a single registry.
pub struct AzCli<R> {
    runner: R,
    resource_group: String,
    registry: String,
}

impl<R: Runner> AzCli<R> {
    pub fn new(runner: R, resource_group: &str, registry: &str) -> Self {
        Self {
            runner,
            resource_group: resource_group.to_string(),
            registry: registry.to_string(),
        }
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn args(&self, command: &[&str], extra: &[&str]) -> Vec<String> {
        let mut args = vec!["acr".to_string()];
        args.extend(command.iter().map(|x| x.to_string()));
        args.extend([
            "--resource-group".to_string(),
            self.resource_group.clone(),
            "--name".to_string(),
            self.registry.clone(),
        ]);
        args.extend(extra.iter().map(|x| x.to_string()));
        args
    }

    #[instrument(skip(self))]
    pub fn show_usage(&mut self) -> Result<UsageSnapshot> {
        #[derive(Debug, Deserialize)]
        struct Response {
            value: Vec<UsageSnapshot>,
        }

        let args = self.args(&["show-usage"], &[]);
        let output = self.runner.capture(&args)?;
        if !output.success {
            debug!("show-usage failed: {}", output.stderr.trim());
            bail!("The call to get the usage of the ACR failed.");
        }

        let response: Response =
            serde_json::from_str(&output.stdout).context("Parsing the ACR usage")?;
        response
            .value
            .into_iter()
            .next()
            .context("The ACR usage response contained no values")
    }

    #[instrument(skip(self))]
    pub fn show_manifests(&mut self, repository: &str) -> Result<Vec<Manifest>> {
        let args = self.args(
            &["repository", "show-manifests"],
            &["--repository", repository],
        );
        let output = self.runner.capture(&args)?;
        if !output.success {
            debug!("show-manifests failed: {}", output.stderr.trim());
            bail!("The call to get the manifests from the ACR failed.");
        }

        serde_json::from_str(&output.stdout)
            .with_context(|| format!("Parsing the manifests of repository '{repository}'"))
    }

    #[instrument(skip(self))]
    pub fn delete_image(&mut self, repository: &str, digest: &str) -> Result<()> {
        let image = format!("{repository}@{digest}");
        let args = self.args(
            &["repository", "delete"],
            &["--image", &image, "--yes"],
        );
        if !self.runner.inherit(&args)? {
            bail!("The call to remove the untagged image from the ACR failed.");
        }
        Ok(())
    }
}
