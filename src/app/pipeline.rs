//! Shared photometry workflow used by every subcommand.
//!
//! resolve -> aggregate -> (extinction) -> normalize -> input record -> run config
//!
//! The collaborators come in as trait objects so the same code runs against
//! the HTTP clients and against in-memory fakes.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::data::{NameResolver, ReddeningLookup, SurveySearch};
use crate::domain::{Band, InputRecord, PhotometryTable, RunConfig, RunFlags, SkyPosition, SurveyCategory};
use crate::engine::{DEFAULT_VARIABLES, default_modules, render_config, write_config};
use crate::error::PipelineError;
use crate::io::{REDSHIFT_COLUMN, build_input_record, write_input_table};
use crate::photometry::{AggregatorConfig, ExtinctionCorrector, Normalizer, PhotometryAggregator};

/// How the target is given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetQuery {
    Name(String),
    Position { name: Option<String>, position: SkyPosition },
}

/// Resolve a query to `(object id, position)`.
///
/// Explicit coordinates never touch the resolver.
pub fn resolve_target(resolver: &dyn NameResolver, query: &TargetQuery) -> Result<(String, SkyPosition), PipelineError> {
    match query {
        TargetQuery::Name(name) => {
            let position = resolver.resolve(name)?;
            Ok((name.trim().to_string(), position))
        }
        TargetQuery::Position { name, position } => {
            let id = name.clone().unwrap_or_else(|| coordinate_name(position));
            Ok((id, *position))
        }
    }
}

/// `J` + RA/Dec in degrees, for targets given only by coordinates.
pub fn coordinate_name(position: &SkyPosition) -> String {
    format!("J{:.5}{:+.5}", position.ra_deg(), position.dec_deg())
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotometryOptions {
    pub radius_arcsec: f64,
    pub aggregator: AggregatorConfig,
    pub error_floor: Option<f64>,
}

/// Aggregate, extinction-correct and normalize the photometry around `position`.
///
/// An empty search result is returned as an empty table without a reddening
/// lookup. With `reddening = None` the table stays uncorrected.
pub fn assemble_photometry<S: SurveySearch>(
    search: S,
    reddening: Option<&dyn ReddeningLookup>,
    position: &SkyPosition,
    object_name: &str,
    options: &PhotometryOptions,
) -> Result<PhotometryTable, PipelineError> {
    let aggregator = PhotometryAggregator::new(search, options.aggregator.clone());
    let mut table = aggregator.collect(position, options.radius_arcsec, object_name)?;
    if table.is_empty() {
        return Ok(table);
    }

    match reddening {
        Some(lookup) => {
            let corrector = ExtinctionCorrector::fetch(lookup, position)?;
            corrector.apply(&mut table)?;
        }
        None => warn!("Skipping extinction correction for '{object_name}'"),
    }

    Normalizer::new(options.error_floor).apply(&mut table);
    Ok(table)
}

/// Bands of every survey not excluded, in registry order.
pub fn default_bands(exclude: &[SurveyCategory]) -> Vec<Band> {
    Band::ALL
        .into_iter()
        .filter(|b| !exclude.contains(&b.survey().category()))
        .collect()
}

/// Target record for the engine data file.
pub fn target_record(table: &PhotometryTable, redshift: f64, bands: &[Band]) -> Result<InputRecord, PipelineError> {
    let record = build_input_record(table, redshift, bands)?;
    info!(
        "Input record '{}': z={}, {}/{} band(s) measured",
        record.id,
        record.redshift,
        record.measured_bands(),
        bands.len()
    );
    Ok(record)
}

/// File layout of one run below its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub workdir: PathBuf,
    pub data_file: PathBuf,
    pub config_file: PathBuf,
    pub output_dir: PathBuf,
}

impl RunPaths {
    pub fn in_dir(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            data_file: workdir.join("input.txt"),
            config_file: workdir.join("pcigale.ini"),
            output_dir: workdir.join("out"),
        }
    }

    /// `<root>/<object id>` with whitespace and path separators replaced.
    pub fn for_object(root: &Path, object_id: &str) -> Self {
        let dir: String = object_id
            .trim()
            .chars()
            .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
            .collect();
        Self::in_dir(&root.join(dir))
    }
}

/// Engine settings that do not depend on the object.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub additional_error: f64,
    pub cores: usize,
    pub flags: RunFlags,
}

/// Run config with the default module preset.
pub fn build_run_config(object_id: &str, bands: &[Band], paths: &RunPaths, options: &EngineOptions) -> RunConfig {
    RunConfig {
        object_id: object_id.to_string(),
        modules: default_modules(),
        bands: bands.to_vec(),
        data_file: paths.data_file.clone(),
        config_file: paths.config_file.clone(),
        output_dir: paths.output_dir.clone(),
        redshift_column: REDSHIFT_COLUMN.to_string(),
        variables: DEFAULT_VARIABLES.iter().map(|s| s.to_string()).collect(),
        additional_error: options.additional_error,
        cores: options.cores,
        flags: options.flags,
    }
}

/// Target record plus the engine config that will read it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub record: InputRecord,
    pub config: RunConfig,
}

/// Plan one run for the target of `table`.
///
/// An empty table fails with `NoPhotometryFound` before anything is written.
pub fn plan_run(
    table: &PhotometryTable,
    object_id: &str,
    redshift: f64,
    bands: &[Band],
    paths: &RunPaths,
    options: &EngineOptions,
) -> Result<RunPlan, PipelineError> {
    let record = target_record(table, redshift, bands)?;
    let config = build_run_config(object_id, bands, paths, options);
    Ok(RunPlan { record, config })
}

/// Write the data file, then the config that references it.
///
/// The config is rendered first so a malformed one writes nothing.
pub fn write_run_inputs(plan: &RunPlan) -> Result<(), PipelineError> {
    render_config(&plan.config)?;
    write_input_table(&plan.config.data_file, std::slice::from_ref(&plan.record), &plan.config.bands)?;
    write_config(&plan.config)?;
    Ok(())
}
