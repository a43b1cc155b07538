//! Command-line parsing for the `sed` binary.
//!
//! Parsing and dispatch stay here and in `app`; the photometry and engine
//! modules never see clap types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Band, ReddeningMap, SurveyCategory};
use crate::photometry::aggregate::DEFAULT_MATCH_TOLERANCE_ARCSEC;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "sed",
    version,
    about = "Multi-survey photometry for SED fitting: aggregate, correct, normalize, run the engine"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve an object name to ICRS coordinates.
    Resolve(ResolveArgs),
    /// Aggregate, correct and normalize photometry around a target and print it.
    Photometry(TargetArgs),
    /// Write the engine data file and config without running the engine.
    Config(RunArgs),
    /// Write inputs, optionally pause for manual edits, run the engine and collect outputs.
    Run(RunArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// Object name (e.g. "NGC 4151").
    pub name: String,
}

/// How to find the target and its photometry.
#[derive(Debug, Args, Clone)]
pub struct TargetArgs {
    /// Object name; resolved unless --ra/--dec are given, then used as the id.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Right ascension (deg, ICRS).
    #[arg(long, requires = "dec", allow_negative_numbers = true)]
    pub ra: Option<f64>,

    /// Declination (deg, ICRS).
    #[arg(long, requires = "ra", allow_negative_numbers = true)]
    pub dec: Option<f64>,

    /// Search radius (arcsec).
    #[arg(short = 'r', long, default_value_t = 5.0)]
    pub radius: f64,

    /// Survey categories to leave out (comma separated).
    #[arg(long, value_enum, value_delimiter = ',')]
    pub exclude: Vec<SurveyCategory>,

    /// Cross-match tolerance between surveys (arcsec).
    #[arg(long, default_value_t = DEFAULT_MATCH_TOLERANCE_ARCSEC)]
    pub match_tolerance: f64,

    /// Dust map used for E(B-V).
    #[arg(long, value_enum, default_value_t = ReddeningMap::Sf2011)]
    pub reddening_map: ReddeningMap,

    /// Do not correct for Galactic extinction.
    #[arg(long)]
    pub no_extinction: bool,

    /// Relative flux-error floor (e.g. 0.05 for 5%).
    #[arg(long)]
    pub error_floor: Option<f64>,
}

/// Options for writing engine inputs and running the engine.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Redshift of the object.
    #[arg(short = 'z', long)]
    pub redshift: f64,

    /// Engine band columns (comma separated, e.g. sloan.sdss.gband,2mass.Ks).
    /// Defaults to every band of the included surveys.
    #[arg(long, value_delimiter = ',')]
    pub bands: Vec<Band>,

    /// Run directory (default: sed_runs/<object id>).
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Pause after writing files so the config can be edited by hand.
    #[arg(long)]
    pub wait: bool,

    /// Ask the engine to save the best-fit SED.
    #[arg(long)]
    pub save_sed: bool,

    /// Produce SED plots after fitting.
    #[arg(long)]
    pub plot: bool,

    /// Extra relative uncertainty the engine adds in quadrature.
    #[arg(long, default_value_t = 0.1)]
    pub additional_error: f64,

    /// Engine worker processes.
    #[arg(long, default_value_t = 1)]
    pub cores: usize,

    /// Also write a JSON run manifest.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}
