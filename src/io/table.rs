//! Fitting-engine data file.
//!
//! Layout (whitespace separated, one header comment line):
//!
//! ```text
//! # id redshift galex.FUV galex.FUV_err sloan.sdss.gband sloan.sdss.gband_err ...
//! NGC_4151 0.003319 1.234560e-1 1.137000e-2 nan nan ...
//! ```
//!
//! Every declared band always gets its two columns. Bands without a usable
//! measurement are written as `nan`, which the engine treats as "no data"
//! (zero would be fitted as a real, very faint point).

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::{info, warn};

use crate::domain::{Band, FluxValue, InputRecord, PhotometryTable};
use crate::error::PipelineError;
use crate::io::write_atomic;

/// Sentinel written for a missing flux or flux error.
pub const NO_DATA: &str = "nan";

pub const ID_COLUMN: &str = "id";
pub const REDSHIFT_COLUMN: &str = "redshift";

/// Data-file column names for `bands`, in file order.
pub fn table_columns(bands: &[Band]) -> Vec<String> {
    let mut cols = vec![ID_COLUMN.to_string(), REDSHIFT_COLUMN.to_string()];
    cols.extend(band_columns(bands));
    cols
}

/// Flux and flux-error column names for `bands` (what the engine config declares).
pub fn band_columns(bands: &[Band]) -> Vec<String> {
    bands
        .iter()
        .flat_map(|b| [b.column().to_string(), b.error_column()])
        .collect()
}

/// Assemble the target's record from a corrected, normalized table.
pub fn build_input_record(table: &PhotometryTable, redshift: f64, bands: &[Band]) -> Result<InputRecord, PipelineError> {
    let no_photometry = || PipelineError::NoPhotometryFound {
        position: table.position(),
        radius_arcsec: table.radius_arcsec(),
    };

    if !(redshift.is_finite() && redshift >= 0.0) {
        return Err(PipelineError::MalformedConfig(format!(
            "redshift must be finite and >= 0 (got {redshift})"
        )));
    }
    if bands.is_empty() {
        return Err(PipelineError::MalformedConfig("no bands declared".to_string()));
    }

    let target = table.target().ok_or_else(no_photometry)?;
    if table.extinction().is_none() {
        warn!("Building input record for '{}' without extinction correction", target.name);
    }

    let mut fluxes = Vec::with_capacity(bands.len());
    for &band in bands {
        let flux = match target.photometry.get(&band) {
            None => FluxValue::NoData,
            Some(phot) => phot.flux.ok_or_else(|| PipelineError::SchemaMismatch {
                detail: format!("band {band} has a measurement but no normalized flux"),
            })?,
        };
        fluxes.push((band, flux));
    }

    let record = InputRecord {
        id: target.name.clone(),
        redshift,
        fluxes,
    };
    if record.measured_bands() == 0 {
        return Err(no_photometry());
    }

    let ignored: Vec<String> = target
        .photometry
        .keys()
        .filter(|b| !bands.contains(b))
        .map(|b| b.to_string())
        .collect();
    if !ignored.is_empty() {
        info!("Bands measured but not declared (ignored): {}", ignored.join(", "));
    }

    Ok(record)
}

/// Write `records` as the engine data file at `path`.
///
/// Every record must carry exactly `bands`, in order.
pub fn write_input_table(path: &Path, records: &[InputRecord], bands: &[Band]) -> Result<(), PipelineError> {
    for record in records {
        let record_bands: Vec<Band> = record.fluxes.iter().map(|(b, _)| *b).collect();
        if record_bands != bands {
            return Err(PipelineError::SchemaMismatch {
                detail: format!("record '{}' does not carry the declared band columns", record.id),
            });
        }
    }

    let header = table_columns(bands).join(" ");
    write_atomic(path, |w| {
        writeln!(w, "# {header}")?;
        for record in records {
            write!(w, "{} {}", sanitize_id(&record.id), record.redshift)?;
            for (_, flux) in &record.fluxes {
                match flux {
                    FluxValue::Measured { flux_mjy, error_mjy } => write!(w, " {flux_mjy:.6e} {error_mjy:.6e}")?,
                    FluxValue::NoData => write!(w, " {NO_DATA} {NO_DATA}")?,
                }
            }
            writeln!(w)?;
        }
        Ok(())
    })?;

    info!("Wrote {} record(s) to '{}'", records.len(), path.display());
    Ok(())
}

/// Read the column names from a data file's header line.
pub fn read_table_columns(path: &Path) -> Result<Vec<String>, PipelineError> {
    let file =
        File::open(path).map_err(|e| PipelineError::io(format!("Failed to open data file '{}'", path.display()), e))?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|e| PipelineError::io(format!("Failed to read data file '{}'", path.display()), e))?;

    let header = first.trim().trim_start_matches('#');
    Ok(header.split_whitespace().map(str::to_string).collect())
}

/// Check that the data-file columns and the config's declared band columns agree.
pub fn check_schema(table_columns: &[String], declared: &[String]) -> Result<(), PipelineError> {
    let fixed = [ID_COLUMN, REDSHIFT_COLUMN];
    if table_columns.len() < 2 || table_columns[..2] != fixed {
        return Err(PipelineError::SchemaMismatch {
            detail: format!("data file must start with `{ID_COLUMN} {REDSHIFT_COLUMN}`"),
        });
    }

    let in_table: BTreeSet<&str> = table_columns[2..].iter().map(String::as_str).collect();
    let in_config: BTreeSet<&str> = declared.iter().map(String::as_str).collect();

    let missing: Vec<&str> = in_config.difference(&in_table).copied().collect();
    let extra: Vec<&str> = in_table.difference(&in_config).copied().collect();
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }

    let mut detail = Vec::new();
    if !missing.is_empty() {
        detail.push(format!("declared in config but absent from data file: {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        detail.push(format!("in data file but not declared in config: {}", extra.join(", ")));
    }
    Err(PipelineError::SchemaMismatch {
        detail: detail.join("; "),
    })
}

/// Ids are whitespace-delimited in the data file.
fn sanitize_id(id: &str) -> String {
    id.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Measurement, SkyPosition, Survey, SurveyDetection};
    use crate::photometry::{Normalizer, merge_detections};

    fn normalized_table(bands: &[(Band, f64)]) -> PhotometryTable {
        let c = SkyPosition::new(200.0, 30.0).unwrap();
        let mut by_survey: Vec<SurveyDetection> = Vec::new();
        for &(band, mag) in bands {
            let m = (band, Measurement::Magnitude { mag, error: Some(0.03) });
            match by_survey.iter_mut().find(|d| d.survey == band.survey()) {
                Some(d) => d.measurements.push(m),
                None => by_survey.push(SurveyDetection {
                    survey: band.survey(),
                    source_id: format!("{:?}-src", band.survey()),
                    position: c,
                    separation_arcsec: 0.0,
                    measurements: vec![m],
                }),
            }
        }
        let mut table = merge_detections(&c, 5.0, by_survey, 1.5, "NGC 4151");
        Normalizer::default().apply(&mut table);
        table
    }

    #[test]
    fn missing_declared_band_is_no_data_not_zero() {
        let table = normalized_table(&[(Band::SdssG, 15.0), (Band::SdssR, 14.5), (Band::TwoMassJ, 13.0)]);
        let bands = [Band::SdssG, Band::SdssR, Band::SdssI, Band::TwoMassJ];
        let record = build_input_record(&table, 0.0033, &bands).unwrap();

        assert_eq!(record.id, "NGC 4151");
        assert_eq!(record.fluxes.len(), 4);
        assert_eq!(record.fluxes[2], (Band::SdssI, FluxValue::NoData));
        assert_eq!(record.measured_bands(), 3);
    }

    #[test]
    fn written_file_has_stable_columns_and_nan_sentinel() {
        let table = normalized_table(&[(Band::SdssG, 15.0)]);
        let bands = [Band::SdssG, Band::WiseW1];
        let record = build_input_record(&table, 0.1, &bands).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        write_input_table(&path, &[record], &bands).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "# id redshift sloan.sdss.gband sloan.sdss.gband_err wise.W1 wise.W1_err"
        );
        let fields: Vec<&str> = lines[1].split_whitespace().collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(fields[0], "NGC_4151");
        assert_eq!(fields[1], "0.1");
        assert_eq!(&fields[4..], &["nan", "nan"]);
        assert!(fields[2].parse::<f64>().unwrap() > 0.0);

        assert_eq!(read_table_columns(&path).unwrap(), table_columns(&bands));
    }

    #[test]
    fn empty_table_is_no_photometry_found() {
        let c = SkyPosition::new(1.0, 2.0).unwrap();
        let table = merge_detections(&c, 2.0, Vec::new(), 1.5, "ghost");
        let err = build_input_record(&table, 0.1, &[Band::SdssG]).unwrap_err();
        assert!(matches!(err, PipelineError::NoPhotometryFound { .. }));
    }

    #[test]
    fn unnormalized_table_is_rejected() {
        let c = SkyPosition::new(1.0, 2.0).unwrap();
        let det = SurveyDetection {
            survey: Survey::Sdss,
            source_id: "x".to_string(),
            position: c,
            separation_arcsec: 0.0,
            measurements: vec![(Band::SdssG, Measurement::Magnitude { mag: 15.0, error: Some(0.1) })],
        };
        let table = merge_detections(&c, 2.0, vec![det], 1.5, "raw");
        let err = build_input_record(&table, 0.1, &[Band::SdssG]).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn schema_check_names_both_sides() {
        let table = table_columns(&[Band::SdssG, Band::SdssR]);
        let declared = band_columns(&[Band::SdssG, Band::WiseW1]);
        let err = check_schema(&table, &declared).unwrap_err().to_string();
        assert!(err.contains("wise.W1"), "{err}");
        assert!(err.contains("sloan.sdss.rband"), "{err}");

        let same = band_columns(&[Band::SdssR, Band::SdssG]);
        assert!(check_schema(&table, &same).is_ok());
    }
}
