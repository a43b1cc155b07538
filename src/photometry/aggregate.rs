//! Multi-survey aggregation into one row per object.
//!
//! Detections are merged nearest-first. A detection joins an existing row when
//! it lies within the cross-match tolerance of that row's anchor position and
//! the row has nothing from the same survey yet; otherwise it starts a new row.
//! The nearest row becomes the `Target`, everything else is `Other`.

use std::collections::BTreeMap;

use log::{info, warn};

use crate::data::{SearchRequest, SurveySearch};
use crate::domain::{
    BandPhotometry, ObjectLabel, PhotometryRow, PhotometryTable, SkyPosition, SurveyCategory, SurveyDetection,
};
use crate::error::PipelineError;

pub const DEFAULT_MATCH_TOLERANCE_ARCSEC: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Max distance between detections merged into one object.
    pub match_tolerance_arcsec: f64,
    /// Survey categories left out of every search.
    pub exclude: Vec<SurveyCategory>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            match_tolerance_arcsec: DEFAULT_MATCH_TOLERANCE_ARCSEC,
            exclude: Vec::new(),
        }
    }
}

pub struct PhotometryAggregator<S: SurveySearch> {
    search: S,
    config: AggregatorConfig,
}

impl<S: SurveySearch> PhotometryAggregator<S> {
    pub fn new(search: S, config: AggregatorConfig) -> Self {
        Self { search, config }
    }

    /// Search all included surveys around `position` and merge the result.
    ///
    /// Finding nothing yields an empty table.
    pub fn collect(
        &self,
        position: &SkyPosition,
        radius_arcsec: f64,
        object_name: &str,
    ) -> Result<PhotometryTable, PipelineError> {
        if !(radius_arcsec.is_finite() && radius_arcsec > 0.0) {
            return Err(PipelineError::SurveySearch {
                position: *position,
                radius_arcsec,
                reason: "search radius must be finite and > 0".to_string(),
            });
        }

        let request = SearchRequest {
            position: *position,
            radius_arcsec,
            exclude: self.config.exclude.clone(),
        };
        let detections = self.search.search(&request)?;
        let n_detections = detections.len();

        let table = merge_detections(
            position,
            radius_arcsec,
            detections,
            self.config.match_tolerance_arcsec,
            object_name,
        );

        if table.is_empty() {
            warn!("No photometry within {radius_arcsec}\" of {position}");
        } else {
            info!(
                "Merged {n_detections} detection(s) into {} object(s); target at {:.2}\"",
                table.len(),
                table.rows[0].separation_arcsec
            );
        }
        Ok(table)
    }
}

/// Merge raw detections into a labeled, separation-ordered table.
pub fn merge_detections(
    position: &SkyPosition,
    radius_arcsec: f64,
    mut detections: Vec<SurveyDetection>,
    tolerance_arcsec: f64,
    object_name: &str,
) -> PhotometryTable {
    detections.retain(|d| d.separation_arcsec.is_finite() && d.separation_arcsec <= radius_arcsec);
    detections.sort_by(|a, b| {
        a.separation_arcsec
            .total_cmp(&b.separation_arcsec)
            .then_with(|| a.survey.cmp(&b.survey))
            .then_with(|| a.source_id.cmp(&b.source_id))
    });

    let mut rows: Vec<PhotometryRow> = Vec::new();
    for det in detections {
        let home = rows.iter_mut().find(|row| {
            row.position.separation_arcsec(&det.position) <= tolerance_arcsec && !row.surveys().contains(&det.survey)
        });

        match home {
            Some(row) => {
                add_measurements(row, &det);
                row.source_ids.push(det.source_id);
            }
            None => {
                let mut row = PhotometryRow {
                    label: ObjectLabel::Other,
                    name: det.source_id.clone(),
                    source_ids: vec![det.source_id.clone()],
                    position: det.position,
                    separation_arcsec: det.separation_arcsec,
                    photometry: BTreeMap::new(),
                    applied_ebv: None,
                };
                add_measurements(&mut row, &det);
                rows.push(row);
            }
        }
    }

    // Rows are created nearest-first, so this is already ordered; keep it explicit.
    rows.sort_by(|a, b| a.separation_arcsec.total_cmp(&b.separation_arcsec));

    if let Some(first) = rows.first_mut() {
        first.label = ObjectLabel::Target;
        first.name = object_name.to_string();
    }

    PhotometryTable {
        position: *position,
        radius_arcsec,
        rows,
        extinction: None,
    }
}

fn add_measurements(row: &mut PhotometryRow, det: &SurveyDetection) {
    for &(band, measurement) in &det.measurements {
        row.photometry.entry(band).or_insert(BandPhotometry {
            survey: det.survey,
            band,
            measurement,
            flux: None,
        });
    }
}
