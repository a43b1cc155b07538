//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and loads settings
//! - resolves the target and assembles its photometry
//! - writes the engine inputs and drives the run
//! - prints reports and writes optional exports

use std::io::{BufRead, Write};
use std::path::Path;

use clap::Parser;
use log::info;

use crate::cli::{Command, ResolveArgs, RunArgs, TargetArgs};
use crate::data::{DustClient, NameResolver, ReddeningLookup, SesameClient, VizierClient};
use crate::domain::{PhotometryTable, RunFlags, SkyPosition};
use crate::error::AppError;
use crate::photometry::AggregatorConfig;
use crate::settings::Settings;

use self::orchestrator::{Orchestrator, PausedRun};
use self::pipeline::{EngineOptions, PhotometryOptions, RunPaths, TargetQuery};

pub mod orchestrator;
pub mod pipeline;

const DEFAULT_RUN_ROOT: &str = "sed_runs";

/// Entry point for the `sed` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Command::Resolve(args) => handle_resolve(&settings, args),
        Command::Photometry(args) => handle_photometry(&settings, args),
        Command::Config(args) => handle_run(&settings, args, RunMode::WriteOnly),
        Command::Run(args) => handle_run(&settings, args, RunMode::Execute),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    WriteOnly,
    Execute,
}

fn handle_resolve(settings: &Settings, args: ResolveArgs) -> Result<(), AppError> {
    let resolver = SesameClient::new(settings.sesame())?;
    let position = resolver.resolve(&args.name)?;
    println!("{}\t{:.6}\t{:+.6}", args.name, position.ra_deg(), position.dec_deg());
    Ok(())
}

fn handle_photometry(settings: &Settings, args: TargetArgs) -> Result<(), AppError> {
    let (_, table) = photometry_for(settings, &args)?;
    println!("{}", crate::report::format_photometry_table(&table));
    Ok(())
}

fn handle_run(settings: &Settings, args: RunArgs, mode: RunMode) -> Result<(), AppError> {
    let (object_id, table) = photometry_for(settings, &args.target)?;

    let bands = if args.bands.is_empty() {
        pipeline::default_bands(&args.target.exclude)
    } else {
        args.bands.clone()
    };
    let paths = match &args.workdir {
        Some(dir) => RunPaths::in_dir(dir),
        None => RunPaths::for_object(Path::new(DEFAULT_RUN_ROOT), &object_id),
    };
    let options = EngineOptions {
        additional_error: args.additional_error,
        cores: args.cores,
        flags: RunFlags {
            wait_for_input: args.wait && mode == RunMode::Execute,
            save_sed: args.save_sed,
            plot: args.plot,
        },
    };
    let plan = pipeline::plan_run(&table, &object_id, args.redshift, &bands, &paths, &options)?;
    println!("{}", crate::report::format_record(&plan.record));

    if let Some(path) = &args.export_json {
        let manifest = crate::io::RunManifest::new(&table, &plan.record, &bands);
        crate::io::write_manifest_json(path, &manifest)?;
        info!("Wrote run manifest to '{}'", path.display());
    }

    match mode {
        RunMode::WriteOnly => {
            pipeline::write_run_inputs(&plan)?;
            println!("Data file: {}", plan.config.data_file.display());
            println!("Config: {}", plan.config.config_file.display());
            Ok(())
        }
        RunMode::Execute => {
            let mut orchestrator = Orchestrator::new(settings.engine.clone());
            if let Some(plotter) = &settings.plotter {
                orchestrator = orchestrator.with_plotter(plotter.clone());
            }
            let result = orchestrator.run(plan.config, std::slice::from_ref(&plan.record), confirm_on_stdin);
            println!("{}", crate::report::format_run_summary(&result));
            result.into_result()?;
            Ok(())
        }
    }
}

/// Resolve the target and assemble its corrected, normalized photometry.
fn photometry_for(settings: &Settings, args: &TargetArgs) -> Result<(String, PhotometryTable), AppError> {
    let query = target_query(args)?;
    let resolver = SesameClient::new(settings.sesame())?;
    let (object_id, position) = pipeline::resolve_target(&resolver, &query)?;

    let search = VizierClient::new(settings.vizier())?;
    let dust = if args.no_extinction {
        None
    } else {
        Some(DustClient::new(settings.dust(args.reddening_map))?)
    };
    let reddening = dust.as_ref().map(|d| d as &dyn ReddeningLookup);

    let options = PhotometryOptions {
        radius_arcsec: args.radius,
        aggregator: AggregatorConfig {
            match_tolerance_arcsec: args.match_tolerance,
            exclude: args.exclude.clone(),
        },
        error_floor: args.error_floor,
    };
    let table = pipeline::assemble_photometry(search, reddening, &position, &object_id, &options)?;
    Ok((object_id, table))
}

fn target_query(args: &TargetArgs) -> Result<TargetQuery, AppError> {
    match (args.ra, args.dec, &args.name) {
        (Some(ra), Some(dec), name) => Ok(TargetQuery::Position {
            name: name.clone(),
            position: SkyPosition::new(ra, dec)?,
        }),
        (_, _, Some(name)) => Ok(TargetQuery::Name(name.clone())),
        _ => Err(AppError::new(2, "Give either --name or both --ra and --dec.")),
    }
}

/// Block on stdin until the user is done editing the config.
fn confirm_on_stdin(paused: &PausedRun<'_>) -> bool {
    println!("Data file: {}", paused.data_file().display());
    println!("Config:    {}", paused.config_file().display());
    print!("Edit the config if needed, then press Enter to run (q to abort): ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => !matches!(line.trim(), "q" | "Q" | "quit"),
    }
}
