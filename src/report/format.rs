//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline stays free of presentation
//! details and output changes stay localized.

use crate::app::orchestrator::RunResult;
use crate::domain::{Band, FluxValue, InputRecord, Measurement, ObjectLabel, PhotometryTable};

/// Photometry table: one block per object, one line per band.
pub fn format_photometry_table(table: &PhotometryTable) -> String {
    let mut out = String::new();

    out.push_str("=== sed - photometry ===\n");
    out.push_str(&format!(
        "Position: {} | radius={}\"\n",
        table.position(),
        table.radius_arcsec()
    ));
    match table.extinction() {
        Some(e) => out.push_str(&format!("E(B-V): {:.4} ({:?})\n", e.ebv, e.map)),
        None => out.push_str("E(B-V): not applied\n"),
    }
    out.push_str(&format!("Objects: {}\n", table.len()));

    for row in table.rows() {
        let tag = match row.label {
            ObjectLabel::Target => "*",
            ObjectLabel::Other => " ",
        };
        let surveys: Vec<&str> = row.surveys().iter().map(|s| s.display_name()).collect();
        out.push('\n');
        out.push_str(&format!(
            "{tag} {} sep={:.2}\" [{}]\n",
            truncate(&row.name, 32),
            row.separation_arcsec,
            surveys.join(", ")
        ));

        out.push_str(
            format!(
                "  {:<20} {:>10} {:>8} {:>14} {:>14}\n",
                "band", "mag", "mag_err", "flux_mJy", "flux_err_mJy"
            )
            .trim_end(),
        );
        out.push('\n');
        for phot in row.photometry.values() {
            let (mag, mag_err) = match phot.measurement {
                Measurement::Magnitude { mag, error } => (fmt_num(mag, 3), error.map_or("-".to_string(), |e| fmt_num(e, 3))),
                Measurement::Flux { .. } => ("-".to_string(), "-".to_string()),
            };
            let (flux, flux_err) = match phot.flux {
                Some(FluxValue::Measured { flux_mjy, error_mjy }) => (fmt_sci(flux_mjy), fmt_sci(error_mjy)),
                Some(FluxValue::NoData) => ("no data".to_string(), "-".to_string()),
                None => ("-".to_string(), "-".to_string()),
            };
            out.push_str(
                format!(
                    "  {:<20} {:>10} {:>8} {:>14} {:>14}\n",
                    phot.band.column(),
                    mag,
                    mag_err,
                    flux,
                    flux_err
                )
                .trim_end(),
            );
            out.push('\n');
        }
    }

    out
}

/// The engine input record, one line per declared band.
pub fn format_record(record: &InputRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Input record: {} | z={} | {}/{} bands measured\n",
        record.id,
        record.redshift,
        record.measured_bands(),
        record.fluxes.len()
    ));
    for (band, flux) in &record.fluxes {
        out.push_str(&format!("  {}\n", fmt_flux_line(*band, flux)));
    }
    out
}

/// Final state, artifacts, warnings and (for failures) engine stderr.
pub fn format_run_summary(result: &RunResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== sed - run: {} ===\n", result.object_id));
    let path: Vec<String> = result.history.iter().map(|s| s.to_string()).collect();
    out.push_str(&format!("State: {} ({})\n", result.state, path.join(" -> ")));
    out.push_str(&format!("Data file: {}\n", result.data_file.display()));
    out.push_str(&format!("Config: {}\n", result.config_file.display()));
    out.push_str(&format!("Output dir: {}\n", result.output_dir.display()));

    let a = &result.artifacts;
    if let Some(table) = &a.parameter_table {
        out.push_str(&format!("- parameters: {}\n", table.display()));
    }
    for p in &a.sed_fits {
        out.push_str(&format!("- SED FITS  : {}\n", p.display()));
    }
    for p in &a.sed_plots {
        out.push_str(&format!("- SED plot  : {}\n", p.display()));
    }

    if !result.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for w in &result.warnings {
            out.push_str(&format!("  {w}\n"));
        }
    }

    if let Some(err) = &result.error {
        out.push_str(&format!("\nError: {err}\n"));
    }

    out
}

fn fmt_flux_line(band: Band, flux: &FluxValue) -> String {
    match flux {
        FluxValue::Measured { flux_mjy, error_mjy } => format!(
            "{:<20} {:>14} +/- {:<14}",
            band.column(),
            fmt_sci(*flux_mjy),
            fmt_sci(*error_mjy)
        )
        .trim_end()
        .to_string(),
        FluxValue::NoData => format!("{:<20} {:>14}", band.column(), "no data"),
    }
}

fn fmt_num(v: f64, decimals: usize) -> String {
    if v.is_finite() {
        format!("{v:.decimals$}")
    } else {
        "-".to_string()
    }
}

fn fmt_sci(v: f64) -> String {
    format!("{v:.4e}")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SkyPosition, SurveyDetection};
    use crate::photometry::{Normalizer, merge_detections};

    #[test]
    fn table_marks_target_and_shows_fluxes() {
        let c = SkyPosition::new(83.63, 22.01).unwrap();
        let near = SurveyDetection {
            survey: Band::TwoMassJ.survey(),
            source_id: "05343+2200".to_string(),
            position: c,
            separation_arcsec: 0.1,
            measurements: vec![(Band::TwoMassJ, Measurement::Magnitude { mag: 12.0, error: Some(0.02) })],
        };
        let far_pos = SkyPosition::new(83.63, 22.01 + 4.0 / 3600.0).unwrap();
        let far = SurveyDetection {
            survey: Band::TwoMassJ.survey(),
            source_id: "neighbour".to_string(),
            position: far_pos,
            separation_arcsec: c.separation_arcsec(&far_pos),
            measurements: vec![(Band::TwoMassJ, Measurement::Magnitude { mag: 99.0, error: None })],
        };
        let mut table = merge_detections(&c, 60.0, vec![far, near], 1.5, "Crab");
        Normalizer::default().apply(&mut table);

        let text = format_photometry_table(&table);
        assert!(text.contains("* Crab"), "{text}");
        assert!(text.contains("  neighbour"), "{text}");
        assert!(text.contains("E(B-V): not applied"));
        assert!(text.contains("no data"));
    }

    #[test]
    fn record_lists_every_band() {
        let record = InputRecord {
            id: "x".to_string(),
            redshift: 0.5,
            fluxes: vec![
                (
                    Band::SdssR,
                    FluxValue::Measured {
                        flux_mjy: 0.0123,
                        error_mjy: 0.0004,
                    },
                ),
                (Band::WiseW2, FluxValue::NoData),
            ],
        };
        let text = format_record(&record);
        assert!(text.contains("1/2 bands measured"));
        assert!(text.contains("1.2300e-2"));
        assert!(text.lines().any(|l| l.contains("wise.W2") && l.contains("no data")));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
