//! Run lifecycle: write inputs, optionally pause for a manual edit, run the
//! engine, collect its outputs.
//!
//! ```text
//! PREPARING -> (WAITING_FOR_EDIT) -> RUNNING -> COLLECTING -> DONE
//!      \________________\_______________\___________\______-> FAILED
//! ```
//!
//! The pause is a value, not a blocking prompt: `prepare` hands back a
//! `PausedRun` and nothing else happens until the caller calls `resume` or
//! `abort` on it.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::domain::{ArtifactMissingWarning, Artifacts, InputRecord, RunConfig};
use crate::engine::config::{absolute, config_dir};
use crate::engine::{EngineCommand, collect_artifacts, declared_bands, declared_paths, render_config};
use crate::error::PipelineError;
use crate::io::{band_columns, check_schema, read_table_columns, write_atomic, write_input_table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Preparing,
    WaitingForEdit,
    Running,
    Collecting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Preparing => "PREPARING",
            RunState::WaitingForEdit => "WAITING_FOR_EDIT",
            RunState::Running => "RUNNING",
            RunState::Collecting => "COLLECTING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Terminal summary of one run.
#[derive(Debug)]
pub struct RunResult {
    pub object_id: String,
    pub state: RunState,
    /// Every state the run passed through, in order.
    pub history: Vec<RunState>,
    pub data_file: PathBuf,
    pub config_file: PathBuf,
    pub output_dir: PathBuf,
    pub artifacts: Artifacts,
    pub warnings: Vec<ArtifactMissingWarning>,
    pub stdout: String,
    /// Engine stderr, verbatim.
    pub stderr: String,
    pub error: Option<PipelineError>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Turn a failed run into its error.
    pub fn into_result(mut self) -> Result<RunResult, PipelineError> {
        match self.error.take() {
            Some(err) => Err(err),
            None if self.state == RunState::Failed => Err(PipelineError::Aborted {
                object_id: self.object_id,
            }),
            None => Ok(self),
        }
    }
}

/// Where a run stands after `prepare` (or `resume`).
#[derive(Debug)]
pub enum Prepared<'a> {
    Ready(ReadyRun<'a>),
    AwaitingConfirmation(PausedRun<'a>),
    Failed(RunResult),
}

/// Runs the engine (and the optional plot step) for prepared runs.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    engine: EngineCommand,
    plotter: Option<EngineCommand>,
}

impl Orchestrator {
    pub fn new(engine: EngineCommand) -> Self {
        Self { engine, plotter: None }
    }

    /// Command run after a successful fit when the `plot` flag is set.
    pub fn with_plotter(mut self, plotter: EngineCommand) -> Self {
        self.plotter = Some(plotter);
        self
    }

    /// Write the data file and the config file for `config`.
    ///
    /// The config is rendered (and so validated) before anything touches disk.
    pub fn prepare(&self, config: RunConfig, records: &[InputRecord]) -> Prepared<'_> {
        let mut tracker = Tracker::new(&config.object_id);

        let written = render_config(&config).and_then(|text| {
            if records.is_empty() {
                return Err(PipelineError::SchemaMismatch {
                    detail: "no input records to write".to_string(),
                });
            }
            write_input_table(&config.data_file, records, &config.bands)?;
            write_atomic(&config.config_file, |w| w.write_all(text.as_bytes()))?;
            info!("Wrote engine config to '{}'", config.config_file.display());
            Ok(())
        });
        if let Err(err) = written {
            return Prepared::Failed(tracker.fail(&config, err));
        }

        if config.flags.wait_for_input {
            tracker.enter(RunState::WaitingForEdit);
            info!(
                "Paused: edit '{}' if needed, then resume the run",
                config.config_file.display()
            );
            Prepared::AwaitingConfirmation(PausedRun {
                orchestrator: self,
                config,
                tracker,
            })
        } else {
            Prepared::Ready(ReadyRun {
                orchestrator: self,
                config,
                tracker,
            })
        }
    }

    /// Prepare and execute in one go, asking `confirm` at the pause point.
    pub fn run<F>(&self, config: RunConfig, records: &[InputRecord], confirm: F) -> RunResult
    where
        F: FnOnce(&PausedRun<'_>) -> bool,
    {
        let ready = match self.prepare(config, records) {
            Prepared::Ready(ready) => ready,
            Prepared::Failed(result) => return result,
            Prepared::AwaitingConfirmation(paused) => {
                if !confirm(&paused) {
                    return paused.abort();
                }
                match paused.resume() {
                    Prepared::Ready(ready) => ready,
                    Prepared::Failed(result) => return result,
                    Prepared::AwaitingConfirmation(again) => return again.abort(),
                }
            }
        };
        ready.execute()
    }
}

/// A run suspended after its files were written.
///
/// The files stay untouched until `resume` or `abort`.
#[derive(Debug)]
pub struct PausedRun<'a> {
    orchestrator: &'a Orchestrator,
    config: RunConfig,
    tracker: Tracker,
}

impl<'a> PausedRun<'a> {
    pub fn config_file(&self) -> &Path {
        &self.config.config_file
    }

    pub fn data_file(&self) -> &Path {
        &self.config.data_file
    }

    pub fn object_id(&self) -> &str {
        &self.config.object_id
    }

    /// Continue the run, re-checking the (possibly edited) config against the data file.
    ///
    /// `data_file` and `output_dir` are re-read from the config so outputs are
    /// collected where the engine will write them.
    pub fn resume(mut self) -> Prepared<'a> {
        info!("Resuming run for '{}'", self.config.object_id);
        match self.reload_edited_config() {
            Ok(()) => Prepared::Ready(ReadyRun {
                orchestrator: self.orchestrator,
                config: self.config,
                tracker: self.tracker,
            }),
            Err(err) => Prepared::Failed(self.tracker.fail(&self.config, err)),
        }
    }

    /// Abandon the run; written files are left in place.
    pub fn abort(mut self) -> RunResult {
        warn!("Run for '{}' aborted while waiting for edit", self.config.object_id);
        self.tracker.enter(RunState::Failed);
        self.tracker.finish(&self.config)
    }

    fn reload_edited_config(&mut self) -> Result<(), PipelineError> {
        let path = &self.config.config_file;
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("Failed to read config '{}'", path.display()), e))?;
        let declared = declared_bands(&text)?;
        let (data_file, output_dir) = declared_paths(&text, path)?;

        let columns = read_table_columns(&data_file)?;
        check_schema(&columns, &declared)?;

        if declared != band_columns(&self.config.bands) {
            info!("Config bands were edited; {} column(s) now declared", declared.len());
        }
        if absolute(&data_file)? != absolute(&self.config.data_file)? {
            info!("Config now reads data from '{}'", data_file.display());
            self.config.data_file = data_file;
        }
        if absolute(&output_dir)? != absolute(&self.config.output_dir)? {
            info!("Config now writes outputs to '{}'", output_dir.display());
            self.config.output_dir = output_dir;
        }
        Ok(())
    }
}

/// A run whose files are written and checked.
#[derive(Debug)]
pub struct ReadyRun<'a> {
    orchestrator: &'a Orchestrator,
    config: RunConfig,
    tracker: Tracker,
}

impl ReadyRun<'_> {
    /// Run the engine to completion and collect its outputs.
    pub fn execute(mut self) -> RunResult {
        let config = &self.config;
        self.tracker.enter(RunState::Running);

        let workdir = config_dir(&config.config_file);
        let config_arg = config
            .config_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| config.config_file.clone());

        let output = match self.orchestrator.engine.run(&config_arg, &workdir) {
            Ok(output) => output,
            Err(err) => return self.tracker.fail(config, err),
        };
        self.tracker.stdout = output.stdout.clone();
        self.tracker.stderr = output.stderr.clone();

        if !output.success() {
            let err = PipelineError::EngineExecution {
                status: output.status.to_string(),
                stderr: output.stderr,
            };
            return self.tracker.fail(config, err);
        }

        self.tracker.enter(RunState::Collecting);
        if config.flags.plot {
            if let Some(plotter) = &self.orchestrator.plotter {
                match plotter.run(&config_arg, &workdir) {
                    Ok(out) if out.success() => {}
                    Ok(out) => warn!("Plot step exited with {}: {}", out.status, out.stderr.trim()),
                    Err(err) => warn!("Plot step failed: {err}"),
                }
            }
        }

        let (artifacts, warnings) = collect_artifacts(&config.output_dir, &config.flags);
        self.tracker.artifacts = artifacts;
        self.tracker.warnings = warnings;
        self.tracker.enter(RunState::Done);
        self.tracker.finish(config)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

/// State history plus whatever the run has gathered so far.
#[derive(Debug)]
struct Tracker {
    object_id: String,
    history: Vec<RunState>,
    artifacts: Artifacts,
    warnings: Vec<ArtifactMissingWarning>,
    stdout: String,
    stderr: String,
    error: Option<PipelineError>,
}

impl Tracker {
    fn new(object_id: &str) -> Self {
        info!("[{object_id}] {}", RunState::Preparing);
        Self {
            object_id: object_id.to_string(),
            history: vec![RunState::Preparing],
            artifacts: Artifacts::default(),
            warnings: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            error: None,
        }
    }

    fn current(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Preparing)
    }

    fn enter(&mut self, state: RunState) {
        info!("[{}] {} -> {}", self.object_id, self.current(), state);
        self.history.push(state);
    }

    fn fail(&mut self, config: &RunConfig, err: PipelineError) -> RunResult {
        warn!("[{}] failed in {}: {err}", self.object_id, self.current());
        self.enter(RunState::Failed);
        self.error = Some(err);
        self.finish(config)
    }

    fn finish(&mut self, config: &RunConfig) -> RunResult {
        RunResult {
            object_id: self.object_id.clone(),
            state: self.current(),
            history: std::mem::take(&mut self.history),
            data_file: config.data_file.clone(),
            config_file: config.config_file.clone(),
            output_dir: config.output_dir.clone(),
            artifacts: std::mem::take(&mut self.artifacts),
            warnings: std::mem::take(&mut self.warnings),
            stdout: std::mem::take(&mut self.stdout),
            stderr: std::mem::take(&mut self.stderr),
            error: self.error.take(),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{Band, FluxValue, RunFlags};
    use crate::engine::{DEFAULT_VARIABLES, default_modules};

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn bands() -> Vec<Band> {
        vec![Band::SdssG, Band::SdssR]
    }

    fn record() -> InputRecord {
        InputRecord {
            id: "NGC 5548".to_string(),
            redshift: 0.0172,
            fluxes: vec![
                (
                    Band::SdssG,
                    FluxValue::Measured {
                        flux_mjy: 4.2,
                        error_mjy: 0.1,
                    },
                ),
                (Band::SdssR, FluxValue::NoData),
            ],
        }
    }

    fn config(dir: &Path, flags: RunFlags) -> RunConfig {
        RunConfig {
            object_id: "NGC 5548".to_string(),
            modules: default_modules(),
            bands: bands(),
            data_file: dir.join("input.txt"),
            config_file: dir.join("pcigale.ini"),
            output_dir: dir.join("out"),
            redshift_column: "redshift".to_string(),
            variables: DEFAULT_VARIABLES.iter().map(|s| s.to_string()).collect(),
            additional_error: 0.1,
            cores: 1,
            flags,
        }
    }

    fn sh(script: &str) -> EngineCommand {
        EngineCommand::new("sh", &["-c", script])
    }

    #[test]
    fn successful_run_walks_every_state() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(sh("mkdir -p out && echo '# id' > out/results.txt"));

        let result = orchestrator.run(config(dir.path(), RunFlags::default()), &[record()], |_| true);
        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(
            result.history,
            vec![RunState::Preparing, RunState::Running, RunState::Collecting, RunState::Done]
        );
        assert_eq!(result.artifacts.parameter_table, Some(dir.path().join("out/results.txt")));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn engine_runs_in_config_directory_with_config_argument() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(EngineCommand::new(
            "sh",
            &["-c", "test -f \"$0\" && mkdir -p out && cp \"$0\" out/results.txt", "{config}"],
        ));
        let result = orchestrator.run(config(dir.path(), RunFlags::default()), &[record()], |_| true);
        assert!(result.is_success(), "{:?}", result.error);
    }

    /// Reads `data_file` and `output_dir` back from the config it is given.
    fn path_reading_engine() -> EngineCommand {
        EngineCommand::new(
            "sh",
            &[
                "-c",
                "d=$(sed -n 's/^data_file = //p' \"$0\"); o=$(sed -n 's/^output_dir = //p' \"$0\"); \
                 test -f \"$d\" || { echo \"no data file at $d from $(pwd)\" >&2; exit 7; }; \
                 mkdir -p \"$o\" && touch \"$o/results.txt\"",
                "{config}",
            ],
        )
    }

    #[test]
    fn relative_paths_outside_config_dir_reach_the_engine() {
        init_logs();
        // Relative to the test process working directory.
        let dir = tempfile::tempdir_in(".").unwrap();
        let root = dir.path().strip_prefix(".").unwrap_or(dir.path()).to_path_buf();
        assert!(root.is_relative());

        let mut cfg = config(&root.join("cfg"), RunFlags::default());
        cfg.data_file = root.join("data/input.txt");
        cfg.output_dir = root.join("results");

        let result = Orchestrator::new(path_reading_engine()).run(cfg, &[record()], |_| true);
        assert!(result.is_success(), "{:?} {}", result.error, result.stderr);
        assert_eq!(result.artifacts.parameter_table, Some(root.join("results/results.txt")));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn output_dir_edited_during_pause_is_collected() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let flags = RunFlags {
            wait_for_input: true,
            ..RunFlags::default()
        };
        let orchestrator = Orchestrator::new(path_reading_engine());

        let result = orchestrator.run(config(dir.path(), flags), &[record()], |paused| {
            let path = paused.config_file();
            let text = std::fs::read_to_string(path).unwrap();
            std::fs::write(path, text.replace("\noutput_dir = out\n", "\noutput_dir = elsewhere\n")).unwrap();
            true
        });
        assert!(result.is_success(), "{:?} {}", result.error, result.stderr);
        assert_eq!(result.output_dir, dir.path().join("elsewhere"));
        assert_eq!(
            result.artifacts.parameter_table,
            Some(dir.path().join("elsewhere/results.txt"))
        );
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn nonzero_exit_fails_with_stderr() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(sh("echo 'KeyError: bands' >&2; exit 1"));
        let result = orchestrator.run(config(dir.path(), RunFlags::default()), &[record()], |_| true);

        assert_eq!(result.state, RunState::Failed);
        assert_eq!(result.stderr.trim(), "KeyError: bands");
        match result.error {
            Some(PipelineError::EngineExecution { stderr, .. }) => assert_eq!(stderr.trim(), "KeyError: bands"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pause_leaves_files_alone_until_resume() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let flags = RunFlags {
            wait_for_input: true,
            ..RunFlags::default()
        };
        let orchestrator = Orchestrator::new(sh("mkdir -p out && touch out/results.txt"));

        let paused = match orchestrator.prepare(config(dir.path(), flags), &[record()]) {
            Prepared::AwaitingConfirmation(paused) => paused,
            other => panic!("expected a paused run, got {other:?}"),
        };
        let before = std::fs::read_to_string(paused.config_file()).unwrap();
        assert!(!dir.path().join("out").exists());

        let ready = match paused.resume() {
            Prepared::Ready(ready) => ready,
            other => panic!("expected a ready run, got {other:?}"),
        };
        assert_eq!(std::fs::read_to_string(&ready.config().config_file).unwrap(), before);

        let result = ready.execute();
        assert!(result.is_success());
        assert_eq!(result.history[1], RunState::WaitingForEdit);
    }

    #[test]
    fn edited_config_with_unknown_band_fails_on_resume() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let flags = RunFlags {
            wait_for_input: true,
            ..RunFlags::default()
        };
        let orchestrator = Orchestrator::new(sh("exit 0"));

        let result = orchestrator.run(config(dir.path(), flags), &[record()], |paused| {
            let path = paused.config_file();
            let text = std::fs::read_to_string(path).unwrap();
            let edited = text.replace("bands = ", "bands = wise.W1, wise.W1_err, ");
            std::fs::write(path, edited).unwrap();
            true
        });
        assert_eq!(result.state, RunState::Failed);
        assert!(matches!(result.error, Some(PipelineError::SchemaMismatch { .. })));
    }

    #[test]
    fn declining_the_pause_aborts_without_running() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let flags = RunFlags {
            wait_for_input: true,
            ..RunFlags::default()
        };
        let orchestrator = Orchestrator::new(sh("touch ran"));
        let result = orchestrator.run(config(dir.path(), flags), &[record()], |_| false);

        assert_eq!(result.state, RunState::Failed);
        assert!(!dir.path().join("ran").exists());
        assert!(result.into_result().is_err());
    }

    #[test]
    fn malformed_config_writes_nothing() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), RunFlags::default());
        cfg.modules.clear();
        let orchestrator = Orchestrator::new(sh("exit 0"));

        let result = orchestrator.run(cfg, &[record()], |_| true);
        assert!(matches!(result.error, Some(PipelineError::MalformedConfig(_))));
        assert!(!dir.path().join("input.txt").exists());
        assert!(!dir.path().join("pcigale.ini").exists());
    }

    #[test]
    fn failing_plot_step_is_only_a_warning() {
        init_logs();
        let dir = tempfile::tempdir().unwrap();
        let flags = RunFlags {
            plot: true,
            ..RunFlags::default()
        };
        let orchestrator = Orchestrator::new(sh("mkdir -p out && touch out/results.txt")).with_plotter(sh("exit 2"));
        let result = orchestrator.run(config(dir.path(), flags), &[record()], |_| true);

        assert!(result.is_success());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, crate::domain::ArtifactKind::SedPlot);
    }
}
