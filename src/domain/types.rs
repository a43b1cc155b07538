//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages in-memory
//! - rendered into the fitting engine's data/config files
//! - exported to the JSON run manifest

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::Band;
use crate::error::PipelineError;

const ARCSEC_PER_DEG: f64 = 3600.0;

/// ICRS sky position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    ra_deg: f64,
    dec_deg: f64,
}

impl SkyPosition {
    /// Build a position from explicit coordinates.
    ///
    /// RA is wrapped into `[0, 360)`; Dec must lie in `[-90, 90]`.
    pub fn new(ra_deg: f64, dec_deg: f64) -> Result<Self, PipelineError> {
        if !(ra_deg.is_finite() && dec_deg.is_finite()) || !(-90.0..=90.0).contains(&dec_deg) {
            return Err(PipelineError::Resolution {
                query: format!("{ra_deg} {dec_deg}"),
                reason: "coordinates out of range (need finite RA, -90 <= Dec <= 90)".to_string(),
            });
        }
        Ok(Self {
            ra_deg: ra_deg.rem_euclid(360.0),
            dec_deg,
        })
    }

    pub fn ra_deg(&self) -> f64 {
        self.ra_deg
    }

    pub fn dec_deg(&self) -> f64 {
        self.dec_deg
    }

    /// Great-circle separation in arcseconds (haversine form).
    pub fn separation_arcsec(&self, other: &SkyPosition) -> f64 {
        let (ra1, dec1) = (self.ra_deg.to_radians(), self.dec_deg.to_radians());
        let (ra2, dec2) = (other.ra_deg.to_radians(), other.dec_deg.to_radians());
        let sin_ddec = ((dec2 - dec1) / 2.0).sin();
        let sin_dra = ((ra2 - ra1) / 2.0).sin();
        let h = sin_ddec * sin_ddec + dec1.cos() * dec2.cos() * sin_dra * sin_dra;
        2.0 * h.sqrt().min(1.0).asin().to_degrees() * ARCSEC_PER_DEG
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(RA={:.6}, Dec={:+.6})", self.ra_deg, self.dec_deg)
    }
}

/// Coarse wavelength regime of a survey (used to include/exclude surveys).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SurveyCategory {
    Ultraviolet,
    Optical,
    NearInfrared,
    MidInfrared,
}

/// Surveys the aggregator can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Survey {
    Galex,
    Sdss,
    PanStarrs,
    TwoMass,
    Wise,
}

impl Survey {
    pub const ALL: [Survey; 5] = [
        Survey::Galex,
        Survey::Sdss,
        Survey::PanStarrs,
        Survey::TwoMass,
        Survey::Wise,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Survey::Galex => "GALEX",
            Survey::Sdss => "SDSS",
            Survey::PanStarrs => "Pan-STARRS1",
            Survey::TwoMass => "2MASS",
            Survey::Wise => "AllWISE",
        }
    }

    pub fn category(self) -> SurveyCategory {
        match self {
            Survey::Galex => SurveyCategory::Ultraviolet,
            Survey::Sdss | Survey::PanStarrs => SurveyCategory::Optical,
            Survey::TwoMass => SurveyCategory::NearInfrared,
            Survey::Wise => SurveyCategory::MidInfrared,
        }
    }

    /// VizieR catalog identifier.
    pub fn vizier_catalog(self) -> &'static str {
        match self {
            Survey::Galex => "II/335/galex_ais",
            Survey::Sdss => "V/147/sdss12",
            Survey::PanStarrs => "II/349/ps1",
            Survey::TwoMass => "II/246/out",
            Survey::Wise => "II/328/allwise",
        }
    }

    /// Column carrying the catalog's source identifier.
    pub fn id_column(self) -> &'static str {
        match self {
            Survey::Galex => "objid",
            Survey::Sdss => "objID",
            Survey::PanStarrs => "objID",
            Survey::TwoMass => "2MASS",
            Survey::Wise => "AllWISE",
        }
    }
}

/// Flux unit of a catalog flux measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FluxUnit {
    Jansky,
    MilliJansky,
}

impl FluxUnit {
    pub fn to_mjy(self) -> f64 {
        match self {
            FluxUnit::Jansky => 1000.0,
            FluxUnit::MilliJansky => 1.0,
        }
    }
}

/// A raw catalog measurement, as published by the survey.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Magnitude { mag: f64, error: Option<f64> },
    Flux { value: f64, error: Option<f64>, unit: FluxUnit },
}

/// Flux density in mJy, or the explicit absence of one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FluxValue {
    Measured { flux_mjy: f64, error_mjy: f64 },
    NoData,
}

impl FluxValue {
    pub fn is_measured(&self) -> bool {
        matches!(self, FluxValue::Measured { .. })
    }
}

/// One band's photometry within an object row.
#[derive(Debug, Clone, PartialEq)]
pub struct BandPhotometry {
    pub survey: Survey,
    pub band: Band,
    /// Catalog measurement; extinction correction rewrites it in place.
    pub measurement: Measurement,
    /// Filled by the normalizer.
    pub flux: Option<FluxValue>,
}

/// A single survey detection returned by the survey-search collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyDetection {
    pub survey: Survey,
    pub source_id: String,
    pub position: SkyPosition,
    pub separation_arcsec: f64,
    pub measurements: Vec<(Band, Measurement)>,
}

/// Row tag: the requested object, or a neighbour within the search radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectLabel {
    Target,
    Other,
}

/// One cross-matched object: detections from several surveys merged together.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotometryRow {
    pub label: ObjectLabel,
    /// Caller-supplied object name for the target, nearest catalog source id otherwise.
    pub name: String,
    /// Catalog identifiers of every merged detection, nearest first.
    pub source_ids: Vec<String>,
    /// Position of the nearest contributing detection.
    pub position: SkyPosition,
    pub separation_arcsec: f64,
    pub photometry: BTreeMap<Band, BandPhotometry>,
    /// E(B-V) applied to this row, once corrected.
    pub applied_ebv: Option<f64>,
}

impl PhotometryRow {
    pub fn surveys(&self) -> Vec<Survey> {
        let mut surveys: Vec<Survey> = self.photometry.values().map(|p| p.survey).collect();
        surveys.sort_unstable();
        surveys.dedup();
        surveys
    }
}

/// Object rows ordered by ascending separation from the search position.
///
/// Built by the aggregator, which guarantees exactly one `Target` row (the
/// nearest) whenever the table is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotometryTable {
    pub(crate) position: SkyPosition,
    pub(crate) radius_arcsec: f64,
    pub(crate) rows: Vec<PhotometryRow>,
    pub(crate) extinction: Option<ExtinctionValue>,
}

impl PhotometryTable {
    pub fn position(&self) -> SkyPosition {
        self.position
    }

    pub fn radius_arcsec(&self) -> f64 {
        self.radius_arcsec
    }

    pub fn rows(&self) -> &[PhotometryRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn target(&self) -> Option<&PhotometryRow> {
        self.rows.iter().find(|r| r.label == ObjectLabel::Target)
    }

    pub fn extinction(&self) -> Option<&ExtinctionValue> {
        self.extinction.as_ref()
    }
}

/// Source map for the reddening value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReddeningMap {
    /// Schlafly & Finkbeiner (2011) recalibration of SFD.
    Sf2011,
    /// Schlegel, Finkbeiner & Davis (1998).
    Sfd1998,
}

/// One E(B-V) value bound to one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtinctionValue {
    pub position: SkyPosition,
    pub ebv: f64,
    pub map: ReddeningMap,
}

/// One assembled row of the engine data file.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub id: String,
    pub redshift: f64,
    /// One entry per declared band, in declared order.
    pub fluxes: Vec<(Band, FluxValue)>,
}

impl InputRecord {
    pub fn measured_bands(&self) -> usize {
        self.fluxes.iter().filter(|(_, f)| f.is_measured()).count()
    }
}

/// A single engine parameter and the grid of values to explore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub name: String,
    pub values: Vec<String>,
}

impl ParamGrid {
    pub fn new(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// An engine module and its parameter grids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleChoice {
    pub name: String,
    pub params: Vec<ParamGrid>,
}

/// Behavioural switches for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunFlags {
    /// Stop after writing files until the caller confirms.
    pub wait_for_input: bool,
    /// Ask the engine to save the best-fit SED.
    pub save_sed: bool,
    /// Produce SED plots after fitting.
    pub plot: bool,
}

/// Everything needed to render the engine config and run it once.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub object_id: String,
    pub modules: Vec<ModuleChoice>,
    /// Bands declared to the engine; must match the data-file columns.
    pub bands: Vec<Band>,
    pub data_file: PathBuf,
    pub config_file: PathBuf,
    pub output_dir: PathBuf,
    pub redshift_column: String,
    /// Physical properties saved alongside the fit (engine `variables`).
    pub variables: Vec<String>,
    /// Extra relative uncertainty the engine adds in quadrature.
    pub additional_error: f64,
    pub cores: usize,
    pub flags: RunFlags,
}

/// Expected output artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    ParameterTable,
    SedFits,
    SedPlot,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::ParameterTable => "best-fit parameter table",
            ArtifactKind::SedFits => "SED FITS file",
            ArtifactKind::SedPlot => "SED plot",
        };
        f.write_str(name)
    }
}

/// An expected artifact was not produced even though the engine exited cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMissingWarning {
    pub kind: ArtifactKind,
    pub output_dir: PathBuf,
    pub detail: String,
}

impl fmt::Display for ArtifactMissingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing {} in '{}': {}",
            self.kind,
            self.output_dir.display(),
            self.detail
        )
    }
}

/// Artifacts found in the output directory after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub parameter_table: Option<PathBuf>,
    pub sed_fits: Vec<PathBuf>,
    pub sed_plots: Vec<PathBuf>,
}
