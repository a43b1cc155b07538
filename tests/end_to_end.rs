//! Whole-pipeline scenarios with in-memory survey/reddening fakes and `sh`
//! standing in for the fitting engine.

#![cfg(unix)]

use std::cell::Cell;
use std::path::Path;

use sed_prep::app::orchestrator::{Orchestrator, Prepared, RunState};
use sed_prep::app::pipeline::{self, EngineOptions, PhotometryOptions, RunPaths};
use sed_prep::data::{ReddeningLookup, SearchRequest, SurveySearch};
use sed_prep::domain::{
    Band, ExtinctionValue, FluxValue, Measurement, ObjectLabel, ReddeningMap, RunFlags, SkyPosition, Survey,
    SurveyDetection,
};
use sed_prep::engine::EngineCommand;
use sed_prep::error::PipelineError;
use sed_prep::io::{NO_DATA, write_input_table};
use sed_prep::photometry::AggregatorConfig;

const REDSHIFT: f64 = 0.2411;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FakeSurveys(Vec<SurveyDetection>);

impl SurveySearch for FakeSurveys {
    fn search(&self, request: &SearchRequest) -> Result<Vec<SurveyDetection>, PipelineError> {
        Ok(self
            .0
            .iter()
            .filter(|d| request.includes(d.survey.category()))
            .cloned()
            .collect())
    }
}

struct FakeDust {
    ebv: f64,
    calls: Cell<usize>,
}

impl ReddeningLookup for FakeDust {
    fn lookup(&self, position: &SkyPosition) -> Result<ExtinctionValue, PipelineError> {
        self.calls.set(self.calls.get() + 1);
        Ok(ExtinctionValue {
            position: *position,
            ebv: self.ebv,
            map: ReddeningMap::Sf2011,
        })
    }
}

fn target() -> SkyPosition {
    SkyPosition::new(194.05903, -5.78928).unwrap()
}

fn offset(center: &SkyPosition, ddec_arcsec: f64) -> SkyPosition {
    SkyPosition::new(center.ra_deg(), center.dec_deg() + ddec_arcsec / 3600.0).unwrap()
}

fn detection(survey: Survey, id: &str, ddec_arcsec: f64, mags: &[(Band, f64)]) -> SurveyDetection {
    let c = target();
    let position = offset(&c, ddec_arcsec);
    SurveyDetection {
        survey,
        source_id: id.to_string(),
        separation_arcsec: c.separation_arcsec(&position),
        position,
        measurements: mags
            .iter()
            .map(|&(band, mag)| (band, Measurement::Magnitude { mag, error: Some(0.04) }))
            .collect(),
    }
}

/// Four of the five requested bands have detections; SDSS i does not.
fn quasar_detections() -> Vec<SurveyDetection> {
    vec![
        detection(Survey::Sdss, "sdss-q", 0.2, &[(Band::SdssG, 18.9), (Band::SdssR, 18.6)]),
        detection(Survey::TwoMass, "2mass-q", 0.5, &[(Band::TwoMassKs, 15.2)]),
        detection(Survey::Wise, "wise-q", 0.4, &[(Band::WiseW1, 14.1)]),
        detection(Survey::Sdss, "sdss-neighbour", 3.5, &[(Band::SdssG, 21.0), (Band::SdssI, 20.4)]),
    ]
}

fn bands() -> Vec<Band> {
    vec![Band::SdssG, Band::SdssR, Band::SdssI, Band::TwoMassKs, Band::WiseW1]
}

fn photometry_options() -> PhotometryOptions {
    PhotometryOptions {
        radius_arcsec: 5.0,
        aggregator: AggregatorConfig::default(),
        error_floor: None,
    }
}

fn engine_options(flags: RunFlags) -> EngineOptions {
    EngineOptions {
        additional_error: 0.1,
        cores: 1,
        flags,
    }
}

fn sh(script: &str) -> EngineCommand {
    EngineCommand::new("sh", &["-c", script])
}

fn file_count(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

#[test]
fn empty_search_is_no_photometry_found_and_writes_nothing() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::in_dir(&dir.path().join("3C_279"));
    let dust = FakeDust {
        ebv: 0.03,
        calls: Cell::new(0),
    };

    let table = pipeline::assemble_photometry(
        FakeSurveys(Vec::new()),
        Some(&dust),
        &target(),
        "3C 279",
        &photometry_options(),
    )
    .unwrap();
    assert!(table.is_empty());
    assert_eq!(dust.calls.get(), 0);

    let written = pipeline::plan_run(
        &table,
        "3C 279",
        REDSHIFT,
        &bands(),
        &paths,
        &engine_options(RunFlags::default()),
    )
    .and_then(|plan| pipeline::write_run_inputs(&plan));
    match written {
        Err(PipelineError::NoPhotometryFound { position, radius_arcsec }) => {
            assert_eq!(position, target());
            assert_eq!(radius_arcsec, 5.0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!paths.data_file.exists());
    assert!(!paths.config_file.exists());
    assert_eq!(file_count(dir.path()), 0);
}

#[test]
fn planned_inputs_land_in_the_run_directory() {
    init_logs();
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::in_dir(&dir.path().join("3C_279"));
    let dust = FakeDust {
        ebv: 0.03,
        calls: Cell::new(0),
    };
    let table = pipeline::assemble_photometry(
        FakeSurveys(quasar_detections()),
        Some(&dust),
        &target(),
        "3C 279",
        &photometry_options(),
    )
    .unwrap();

    let plan = pipeline::plan_run(
        &table,
        "3C 279",
        REDSHIFT,
        &bands(),
        &paths,
        &engine_options(RunFlags::default()),
    )
    .unwrap();
    pipeline::write_run_inputs(&plan).unwrap();
    assert!(paths.data_file.exists());
    assert!(paths.config_file.exists());
    assert_eq!(file_count(dir.path()), 2);
}

#[test]
fn missing_band_is_serialized_as_no_data() {
    init_logs();
    let dust = FakeDust {
        ebv: 0.03,
        calls: Cell::new(0),
    };
    let table = pipeline::assemble_photometry(
        FakeSurveys(quasar_detections()),
        Some(&dust),
        &target(),
        "3C 279",
        &photometry_options(),
    )
    .unwrap();
    assert_eq!(dust.calls.get(), 1);

    let targets: Vec<_> = table.rows().iter().filter(|r| r.label == ObjectLabel::Target).collect();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "3C 279");
    assert!(table.rows().iter().all(|r| r.applied_ebv == Some(0.03)));

    let record = pipeline::target_record(&table, REDSHIFT, &bands()).unwrap();
    assert_eq!(record.redshift, REDSHIFT);
    assert_eq!(record.fluxes.len(), 5);
    let no_data: Vec<Band> = record
        .fluxes
        .iter()
        .filter(|(_, f)| *f == FluxValue::NoData)
        .map(|(b, _)| *b)
        .collect();
    assert_eq!(no_data, vec![Band::SdssI]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.txt");
    write_input_table(&path, &[record], &bands()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let row: Vec<&str> = text.lines().nth(1).unwrap().split_whitespace().collect();

    // id, redshift, then 5 (flux, error) pairs
    assert_eq!(row.len(), 2 + 10);
    assert_eq!(row[0], "3C_279");
    assert_eq!(row[1], "0.2411");
    assert_eq!(&row[6..8], &[NO_DATA, NO_DATA]);
    for value in row[2..].iter().filter(|v| **v != NO_DATA) {
        assert!(value.parse::<f64>().unwrap() > 0.0, "{value}");
    }
}

#[test]
fn engine_failure_is_reported_with_stderr() {
    init_logs();
    let dust = FakeDust {
        ebv: 0.03,
        calls: Cell::new(0),
    };
    let table = pipeline::assemble_photometry(
        FakeSurveys(quasar_detections()),
        Some(&dust),
        &target(),
        "3C 279",
        &photometry_options(),
    )
    .unwrap();
    let record = pipeline::target_record(&table, REDSHIFT, &bands()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::in_dir(dir.path());
    let config = pipeline::build_run_config(&record.id, &bands(), &paths, &engine_options(RunFlags::default()));

    let orchestrator = Orchestrator::new(sh("echo 'ValueError: redshift grid is empty' >&2; exit 1"));
    let result = orchestrator.run(config, &[record], |_| true);

    assert_eq!(result.state, RunState::Failed);
    assert_eq!(result.history.last(), Some(&RunState::Failed));
    assert!(!result.stderr.is_empty());
    assert!(matches!(result.error, Some(PipelineError::EngineExecution { .. })));
    assert!(paths.data_file.exists());
    assert!(paths.config_file.exists());
}

#[test]
fn wait_for_input_halts_until_resumed() {
    init_logs();
    let dust = FakeDust {
        ebv: 0.03,
        calls: Cell::new(0),
    };
    let table = pipeline::assemble_photometry(
        FakeSurveys(quasar_detections()),
        Some(&dust),
        &target(),
        "3C 279",
        &photometry_options(),
    )
    .unwrap();
    let record = pipeline::target_record(&table, REDSHIFT, &bands()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::in_dir(dir.path());
    let flags = RunFlags {
        wait_for_input: true,
        save_sed: true,
        plot: false,
    };
    let config = pipeline::build_run_config(&record.id, &bands(), &paths, &engine_options(flags));
    let orchestrator = Orchestrator::new(sh(
        "touch engine-ran && mkdir -p out && touch out/results.txt out/3C_279_best_model.fits",
    ));

    let paused = match orchestrator.prepare(config, &[record]) {
        Prepared::AwaitingConfirmation(paused) => paused,
        other => panic!("expected a pause, got {other:?}"),
    };
    let written = std::fs::read(paused.config_file()).unwrap();
    let modified = std::fs::metadata(paused.config_file()).unwrap().modified().unwrap();
    assert!(!dir.path().join("engine-ran").exists());

    let ready = match paused.resume() {
        Prepared::Ready(ready) => ready,
        other => panic!("expected a ready run, got {other:?}"),
    };
    assert_eq!(std::fs::read(&paths.config_file).unwrap(), written);
    assert_eq!(std::fs::metadata(&paths.config_file).unwrap().modified().unwrap(), modified);
    assert!(!dir.path().join("engine-ran").exists());

    let result = ready.execute();
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(
        result.history,
        vec![
            RunState::Preparing,
            RunState::WaitingForEdit,
            RunState::Running,
            RunState::Collecting,
            RunState::Done
        ]
    );
    assert!(dir.path().join("engine-ran").exists());
    assert_eq!(result.artifacts.sed_fits.len(), 1);
    assert!(result.warnings.is_empty());
}
