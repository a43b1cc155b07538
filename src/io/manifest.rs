//! Read/write the JSON run manifest.
//!
//! The manifest is a side document for reproducibility: it records what the
//! data file was built from (object, redshift, coordinates, reddening) and is
//! independent of the engine's own inputs.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Band, ExtinctionValue, InputRecord, PhotometryTable, ReddeningMap};
use crate::error::PipelineError;
use crate::io::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub object: String,
    pub redshift: f64,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub search_radius_arcsec: f64,
    pub ebv: Option<f64>,
    pub reddening_map: Option<ReddeningMap>,
    /// Declared engine columns (flux bands).
    pub bands: Vec<String>,
    pub measured_bands: usize,
}

impl RunManifest {
    pub fn new(table: &PhotometryTable, record: &InputRecord, bands: &[Band]) -> Self {
        let extinction: Option<&ExtinctionValue> = table.extinction();
        Self {
            tool: format!("sed-prep {}", env!("CARGO_PKG_VERSION")),
            created_at: Utc::now(),
            object: record.id.clone(),
            redshift: record.redshift,
            ra_deg: table.position().ra_deg(),
            dec_deg: table.position().dec_deg(),
            search_radius_arcsec: table.radius_arcsec(),
            ebv: extinction.map(|e| e.ebv),
            reddening_map: extinction.map(|e| e.map),
            bands: bands.iter().map(|b| b.column().to_string()).collect(),
            measured_bands: record.measured_bands(),
        }
    }
}

/// Write a manifest JSON file.
pub fn write_manifest_json(path: &Path, manifest: &RunManifest) -> Result<(), PipelineError> {
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, manifest).map_err(std::io::Error::other)?;
        writeln!(w)
    })
}

/// Read a manifest JSON file.
pub fn read_manifest_json(path: &Path) -> Result<RunManifest, PipelineError> {
    let file =
        File::open(path).map_err(|e| PipelineError::io(format!("Failed to open manifest '{}'", path.display()), e))?;
    serde_json::from_reader(file).map_err(|e| {
        PipelineError::io(
            format!("Invalid manifest JSON '{}'", path.display()),
            std::io::Error::other(e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Measurement, SkyPosition, SurveyDetection};
    use crate::photometry::{ExtinctionCorrector, Normalizer, merge_detections};
    use crate::io::build_input_record;

    #[test]
    fn manifest_records_position_and_reddening() {
        let c = SkyPosition::new(187.70593, 12.39112).unwrap();
        let det = SurveyDetection {
            survey: Band::SdssR.survey(),
            source_id: "1237".to_string(),
            position: c,
            separation_arcsec: 0.0,
            measurements: vec![(Band::SdssR, Measurement::Magnitude { mag: 9.5, error: Some(0.01) })],
        };
        let mut table = merge_detections(&c, 3.0, vec![det], 1.5, "M87");
        ExtinctionCorrector::from_value(ExtinctionValue {
            position: c,
            ebv: 0.019,
            map: ReddeningMap::Sf2011,
        })
        .apply(&mut table)
        .unwrap();
        Normalizer::default().apply(&mut table);

        let bands = [Band::SdssR, Band::TwoMassKs];
        let record = build_input_record(&table, 0.00428, &bands).unwrap();
        let manifest = RunManifest::new(&table, &record, &bands);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("M87.json");
        write_manifest_json(&path, &manifest).unwrap();
        let back = read_manifest_json(&path).unwrap();

        assert_eq!(back.object, "M87");
        assert_eq!(back.ebv, Some(0.019));
        assert_eq!(back.reddening_map, Some(ReddeningMap::Sf2011));
        assert_eq!(back.bands, vec!["sloan.sdss.rband", "2mass.Ks"]);
        assert_eq!(back.measured_bands, 1);
        assert!((back.ra_deg - 187.70593).abs() < 1e-9);
    }
}
