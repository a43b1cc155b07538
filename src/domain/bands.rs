//! Photometric band registry.
//!
//! Every band the pipeline knows about is listed here with:
//!
//! - the survey it belongs to and the VizieR column carrying its magnitude
//! - the fitting engine's filter name (used as the data-file column name)
//! - the zero point in Jansky for its magnitude system
//! - `R_band = A_band / E(B-V)` for an `R_V = 3.1` Milky Way extinction curve
//!
//! Extinction coefficients follow Schlafly & Finkbeiner (2011) for the optical
//! and near-infrared bands, Wyder et al. (2007) for GALEX and Yuan et al. (2013)
//! for WISE W1/W2. W3/W4 are small and evaluated from the same curve.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Survey;

/// AB magnitude zero point (Jy).
pub const AB_ZERO_POINT_JY: f64 = 3631.0;

/// Magnitude system a band's catalog magnitudes are quoted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagSystem {
    Ab,
    Vega,
}

/// Static per-band calibration data.
#[derive(Debug, Clone, Copy)]
pub struct BandInfo {
    pub survey: Survey,
    /// Column holding the magnitude in the survey's VizieR catalog.
    pub catalog_column: &'static str,
    /// Column holding the magnitude error in the survey's VizieR catalog.
    pub catalog_error_column: &'static str,
    /// Filter name understood by the fitting engine.
    pub engine_filter: &'static str,
    pub system: MagSystem,
    pub zero_point_jy: f64,
    /// `A_band / E(B-V)`.
    pub extinction_coeff: f64,
    /// Effective wavelength in microns (informational, used for ordering output).
    pub wavelength_um: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    GalexFuv,
    GalexNuv,
    SdssU,
    SdssG,
    SdssR,
    SdssI,
    SdssZ,
    Ps1G,
    Ps1R,
    Ps1I,
    Ps1Z,
    Ps1Y,
    TwoMassJ,
    TwoMassH,
    TwoMassKs,
    WiseW1,
    WiseW2,
    WiseW3,
    WiseW4,
}

const fn ab(
    survey: Survey,
    catalog_column: &'static str,
    catalog_error_column: &'static str,
    engine_filter: &'static str,
    extinction_coeff: f64,
    wavelength_um: f64,
) -> BandInfo {
    BandInfo {
        survey,
        catalog_column,
        catalog_error_column,
        engine_filter,
        system: MagSystem::Ab,
        zero_point_jy: AB_ZERO_POINT_JY,
        extinction_coeff,
        wavelength_um,
    }
}

const fn vega(
    survey: Survey,
    catalog_column: &'static str,
    catalog_error_column: &'static str,
    engine_filter: &'static str,
    zero_point_jy: f64,
    extinction_coeff: f64,
    wavelength_um: f64,
) -> BandInfo {
    BandInfo {
        survey,
        catalog_column,
        catalog_error_column,
        engine_filter,
        system: MagSystem::Vega,
        zero_point_jy,
        extinction_coeff,
        wavelength_um,
    }
}

const GALEX_FUV: BandInfo = ab(Survey::Galex, "FUVmag", "e_FUVmag", "galex.FUV", 8.24, 0.1528);
const GALEX_NUV: BandInfo = ab(Survey::Galex, "NUVmag", "e_NUVmag", "galex.NUV", 8.20, 0.2271);
const SDSS_U: BandInfo = ab(Survey::Sdss, "umag", "e_umag", "sloan.sdss.uband", 4.239, 0.3551);
const SDSS_G: BandInfo = ab(Survey::Sdss, "gmag", "e_gmag", "sloan.sdss.gband", 3.303, 0.4686);
const SDSS_R: BandInfo = ab(Survey::Sdss, "rmag", "e_rmag", "sloan.sdss.rband", 2.285, 0.6166);
const SDSS_I: BandInfo = ab(Survey::Sdss, "imag", "e_imag", "sloan.sdss.iband", 1.698, 0.7480);
const SDSS_Z: BandInfo = ab(Survey::Sdss, "zmag", "e_zmag", "sloan.sdss.zband", 1.263, 0.8932);
const PS1_G: BandInfo = ab(Survey::PanStarrs, "gmag", "e_gmag", "panstarrs.ps1.g", 3.172, 0.4810);
const PS1_R: BandInfo = ab(Survey::PanStarrs, "rmag", "e_rmag", "panstarrs.ps1.r", 2.271, 0.6170);
const PS1_I: BandInfo = ab(Survey::PanStarrs, "imag", "e_imag", "panstarrs.ps1.i", 1.682, 0.7520);
const PS1_Z: BandInfo = ab(Survey::PanStarrs, "zmag", "e_zmag", "panstarrs.ps1.z", 1.322, 0.8660);
const PS1_Y: BandInfo = ab(Survey::PanStarrs, "ymag", "e_ymag", "panstarrs.ps1.y", 1.087, 0.9620);
const TMASS_J: BandInfo = vega(Survey::TwoMass, "Jmag", "e_Jmag", "2mass.J", 1594.0, 0.709, 1.235);
const TMASS_H: BandInfo = vega(Survey::TwoMass, "Hmag", "e_Hmag", "2mass.H", 1024.0, 0.449, 1.662);
const TMASS_KS: BandInfo = vega(Survey::TwoMass, "Kmag", "e_Kmag", "2mass.Ks", 666.8, 0.302, 2.159);
const WISE_W1: BandInfo = vega(Survey::Wise, "W1mag", "e_W1mag", "wise.W1", 309.540, 0.180, 3.368);
const WISE_W2: BandInfo = vega(Survey::Wise, "W2mag", "e_W2mag", "wise.W2", 171.787, 0.160, 4.618);
const WISE_W3: BandInfo = vega(Survey::Wise, "W3mag", "e_W3mag", "wise.W3", 31.674, 0.090, 12.082);
const WISE_W4: BandInfo = vega(Survey::Wise, "W4mag", "e_W4mag", "wise.W4", 8.363, 0.040, 22.194);

impl Band {
    /// All known bands, ordered by survey then wavelength.
    pub const ALL: [Band; 19] = [
        Band::GalexFuv,
        Band::GalexNuv,
        Band::SdssU,
        Band::SdssG,
        Band::SdssR,
        Band::SdssI,
        Band::SdssZ,
        Band::Ps1G,
        Band::Ps1R,
        Band::Ps1I,
        Band::Ps1Z,
        Band::Ps1Y,
        Band::TwoMassJ,
        Band::TwoMassH,
        Band::TwoMassKs,
        Band::WiseW1,
        Band::WiseW2,
        Band::WiseW3,
        Band::WiseW4,
    ];

    pub fn info(self) -> &'static BandInfo {
        match self {
            Band::GalexFuv => &GALEX_FUV,
            Band::GalexNuv => &GALEX_NUV,
            Band::SdssU => &SDSS_U,
            Band::SdssG => &SDSS_G,
            Band::SdssR => &SDSS_R,
            Band::SdssI => &SDSS_I,
            Band::SdssZ => &SDSS_Z,
            Band::Ps1G => &PS1_G,
            Band::Ps1R => &PS1_R,
            Band::Ps1I => &PS1_I,
            Band::Ps1Z => &PS1_Z,
            Band::Ps1Y => &PS1_Y,
            Band::TwoMassJ => &TMASS_J,
            Band::TwoMassH => &TMASS_H,
            Band::TwoMassKs => &TMASS_KS,
            Band::WiseW1 => &WISE_W1,
            Band::WiseW2 => &WISE_W2,
            Band::WiseW3 => &WISE_W3,
            Band::WiseW4 => &WISE_W4,
        }
    }

    pub fn survey(self) -> Survey {
        self.info().survey
    }

    /// Flux column name in the engine data file.
    pub fn column(self) -> &'static str {
        self.info().engine_filter
    }

    /// Flux-error column name in the engine data file.
    pub fn error_column(self) -> String {
        format!("{}_err", self.info().engine_filter)
    }

    /// Look up a band by its engine filter name (e.g. `2mass.Ks`).
    pub fn from_column(name: &str) -> Option<Band> {
        Band::ALL.into_iter().find(|b| b.column() == name)
    }

    /// Bands measured by a survey, in wavelength order.
    pub fn of_survey(survey: Survey) -> impl Iterator<Item = Band> {
        Band::ALL.into_iter().filter(move |b| b.survey() == survey)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl std::str::FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Band::from_column(s.trim()).ok_or_else(|| {
            let known: Vec<&str> = Band::ALL.iter().map(|b| b.column()).collect();
            format!("unknown band '{s}' (known: {})", known.join(", "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_columns_are_unique_and_round_trip() {
        for band in Band::ALL {
            assert_eq!(Band::from_column(band.column()), Some(band));
            assert_eq!(band.error_column(), format!("{}_err", band.column()));
        }
        let mut names: Vec<&str> = Band::ALL.iter().map(|b| b.column()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Band::ALL.len());
    }

    #[test]
    fn extinction_falls_with_wavelength_within_a_survey() {
        for survey in Survey::ALL {
            let coeffs: Vec<f64> = Band::of_survey(survey).map(|b| b.info().extinction_coeff).collect();
            assert!(
                coeffs.windows(2).all(|w| w[0] >= w[1]),
                "{survey:?} coefficients not monotone: {coeffs:?}"
            );
        }
    }

    #[test]
    fn parse_reports_known_bands() {
        let err = "sdss.q".parse::<Band>().unwrap_err();
        assert!(err.contains("2mass.Ks"));
        assert_eq!("wise.W2".parse::<Band>().unwrap(), Band::WiseW2);
    }
}
