//! Multi-survey cone search against VizieR (`asu-tsv` output).
//!
//! One catalog is queried per survey. Rows come back as tab-separated text:
//!
//! ```text
//! #  comment lines ...
//! _RAJ	_DEJ	objID	gmag	e_gmag ...
//! deg	deg		mag	mag ...
//! ----	----	----	----	---- ...
//! 187.705930	+12.391123	1234	14.512	0.003 ...
//! ```
//!
//! Blank magnitude cells mean "not measured" and simply drop that band from the
//! detection.

use std::collections::HashMap;
use std::time::Duration;

use csv::StringRecord;
use log::{debug, info};
use reqwest::blocking::Client;

use crate::data::{SearchRequest, SurveySearch, build_http_client};
use crate::domain::{Band, Measurement, SkyPosition, Survey, SurveyDetection};
use crate::error::PipelineError;

pub const DEFAULT_VIZIER_URL: &str = "https://vizier.cds.unistra.fr/viz-bin/asu-tsv";

const RA_COLUMN: &str = "_RAJ";
const DEC_COLUMN: &str = "_DEJ";

#[derive(Debug, Clone)]
pub struct VizierConfig {
    pub url: String,
    pub timeout: Duration,
    /// Row cap per catalog query.
    pub max_rows: usize,
}

pub struct VizierClient {
    client: Client,
    config: VizierConfig,
}

impl VizierClient {
    pub fn new(config: VizierConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client(config.timeout)?,
            config,
        })
    }

    fn query_catalog(&self, survey: Survey, request: &SearchRequest) -> Result<Vec<SurveyDetection>, PipelineError> {
        let fail = |reason: String| PipelineError::SurveySearch {
            position: request.position,
            radius_arcsec: request.radius_arcsec,
            reason: format!("{}: {reason}", survey.display_name()),
        };

        let mut out_cols = vec![survey.id_column()];
        for band in Band::of_survey(survey) {
            out_cols.push(band.info().catalog_column);
            out_cols.push(band.info().catalog_error_column);
        }

        let center = format!("{:.6} {:+.6}", request.position.ra_deg(), request.position.dec_deg());
        let radius = format!("{:.3}", request.radius_arcsec);
        let max_rows = self.config.max_rows.to_string();
        let out = out_cols.join(",");

        debug!("VizieR {} cone {center} r={radius}\"", survey.vizier_catalog());
        let resp = self
            .client
            .get(&self.config.url)
            .query(&[
                ("-source", survey.vizier_catalog()),
                ("-c", center.as_str()),
                ("-c.rs", radius.as_str()),
                ("-out.max", max_rows.as_str()),
                ("-out", out.as_str()),
                ("-out.add", "_RAJ,_DEJ"),
                ("-oc.form", "d"),
            ])
            .send()
            .map_err(|e| fail(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(fail(format!("request failed with status {}", resp.status())));
        }
        let body = resp.text().map_err(|e| fail(format!("unreadable response: {e}")))?;

        parse_tsv(survey, &body, &request.position).map_err(fail)
    }
}

impl SurveySearch for VizierClient {
    fn search(&self, request: &SearchRequest) -> Result<Vec<SurveyDetection>, PipelineError> {
        let mut detections = Vec::new();
        for survey in Survey::ALL {
            if !request.includes(survey.category()) {
                debug!("Skipping {} (category {:?} excluded)", survey.display_name(), survey.category());
                continue;
            }
            let found = self.query_catalog(survey, request)?;
            info!("{}: {} detection(s)", survey.display_name(), found.len());
            detections.extend(found);
        }
        Ok(detections)
    }
}

/// Parse one catalog's TSV answer into detections around `center`.
pub(crate) fn parse_tsv(survey: Survey, body: &str, center: &SkyPosition) -> Result<Vec<SurveyDetection>, String> {
    let lines: Vec<&str> = body
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .collect();
    let Some((header_line, rest)) = lines.split_first() else {
        return Ok(Vec::new());
    };

    // The header is followed by an optional units line and a dashes line.
    let data_start = rest.iter().take(2).position(|l| is_dash_line(l)).map_or(0, |i| i + 1);
    let data = rest[data_start..].join("\n");

    let headers = StringRecord::from(header_line.split('\t').collect::<Vec<_>>());
    let header_map = build_header_map(&headers);
    for required in [RA_COLUMN, DEC_COLUMN] {
        if !header_map.contains_key(required) {
            return Err(format!("response is missing column `{required}`"));
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let mut out = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("TSV parse error on data row {}: {e}", idx + 1))?;

        let ra = get_f64(&record, &header_map, RA_COLUMN).ok_or_else(|| format!("row {}: bad `{RA_COLUMN}`", idx + 1))?;
        let dec = get_f64(&record, &header_map, DEC_COLUMN).ok_or_else(|| format!("row {}: bad `{DEC_COLUMN}`", idx + 1))?;
        let position = SkyPosition::new(ra, dec).map_err(|e| format!("row {}: {e}", idx + 1))?;

        let measurements: Vec<(Band, Measurement)> = Band::of_survey(survey)
            .filter_map(|band| {
                let info = band.info();
                let mag = get_f64(&record, &header_map, info.catalog_column)?;
                let error = get_f64(&record, &header_map, info.catalog_error_column);
                Some((band, Measurement::Magnitude { mag, error }))
            })
            .collect();
        if measurements.is_empty() {
            continue;
        }

        let source_id = get_str(&record, &header_map, survey.id_column())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}#{}", survey.display_name(), idx + 1));

        out.push(SurveyDetection {
            survey,
            source_id,
            separation_arcsec: center.separation_arcsec(&position),
            position,
            measurements,
        });
    }
    Ok(out)
}

fn is_dash_line(line: &str) -> bool {
    let mut any = false;
    for field in line.split('\t') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        if !field.chars().all(|c| c == '-') {
            return false;
        }
        any = true;
    }
    any
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_string(), idx))
        .collect()
}

fn get_str<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn get_f64(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<f64> {
    let v = get_str(record, header_map, name)?.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}
