//! Fitting-engine subprocess invocation.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use log::{debug, info};

use crate::error::PipelineError;

/// Placeholder replaced by the config file path in engine arguments.
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// An external program plus its argument template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Captured result of one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Arguments with the config placeholder substituted.
    pub fn resolved_args(&self, config_file: &Path) -> Vec<String> {
        let config = config_file.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(CONFIG_PLACEHOLDER, &config))
            .collect()
    }

    /// Run the program in `working_dir` and wait for it to exit.
    ///
    /// A non-zero exit is returned as a normal `EngineOutput`; only a failure
    /// to start the program is an error here.
    pub fn run(&self, config_file: &Path, working_dir: &Path) -> Result<EngineOutput, PipelineError> {
        let args = self.resolved_args(config_file);
        info!(
            "Running {} {} (cwd '{}')",
            self.program.display(),
            args.join(" "),
            working_dir.display()
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(working_dir)
            .output()
            .map_err(|e| PipelineError::io(format!("Failed to start '{}'", self.program.display()), e))?;

        let out = EngineOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            "{} exited with {} ({} bytes stdout, {} bytes stderr)",
            self.program.display(),
            out.status,
            out.stdout.len(),
            out.stderr.len()
        );
        Ok(out)
    }
}
