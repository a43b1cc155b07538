//! Magnitude → flux-density conversion.
//!
//! All fluxes leave this module in mJy:
//!
//! ```text
//! flux      = zp_Jy · 1000 · 10^(-0.4 · mag)
//! flux_err  = flux · ln(10) / 2.5 · mag_err
//! ```
//!
//! Placeholder magnitudes (99, -99, -9999, NaN, ...) are non-detections and
//! become `FluxValue::NoData` instead of a tiny, fake flux.

use std::f64::consts::LN_10;

use log::debug;

use crate::domain::{Band, FluxValue, Measurement, PhotometryTable};

/// Any magnitude at or beyond this absolute value is a catalog placeholder.
pub const NON_DETECTION_LIMIT: f64 = 90.0;

/// `ln(10) / 2.5`: d(flux)/flux per unit magnitude.
const MAG_TO_REL_FLUX: f64 = LN_10 / 2.5;

pub fn is_non_detection(mag: f64) -> bool {
    !mag.is_finite() || mag.abs() >= NON_DETECTION_LIMIT
}

pub fn mag_to_flux_mjy(mag: f64, zero_point_jy: f64) -> f64 {
    zero_point_jy * 1000.0 * 10f64.powf(-0.4 * mag)
}

/// Inverse of [`mag_to_flux_mjy`].
pub fn flux_mjy_to_mag(flux_mjy: f64, zero_point_jy: f64) -> f64 {
    -2.5 * (flux_mjy / (zero_point_jy * 1000.0)).log10()
}

pub fn mag_error_to_flux_error(flux_mjy: f64, mag_error: f64) -> f64 {
    flux_mjy * MAG_TO_REL_FLUX * mag_error
}

/// Converts catalog measurements to mJy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Normalizer {
    /// Minimum relative flux error. `None` keeps propagated errors as-is and
    /// turns measurements without an error into no-data.
    pub error_floor: Option<f64>,
}

impl Normalizer {
    pub fn new(error_floor: Option<f64>) -> Self {
        Self { error_floor }
    }

    pub fn normalize(&self, band: Band, measurement: &Measurement) -> FluxValue {
        let (flux_mjy, error_mjy) = match *measurement {
            Measurement::Magnitude { mag, error } => {
                if is_non_detection(mag) {
                    return FluxValue::NoData;
                }
                let flux = mag_to_flux_mjy(mag, band.info().zero_point_jy);
                let err = error
                    .filter(|e| e.is_finite() && *e >= 0.0)
                    .map(|e| mag_error_to_flux_error(flux, e));
                (flux, err)
            }
            Measurement::Flux { value, error, unit } => {
                if !value.is_finite() {
                    return FluxValue::NoData;
                }
                let scale = unit.to_mjy();
                let err = error.filter(|e| e.is_finite() && *e >= 0.0).map(|e| e * scale);
                (value * scale, err)
            }
        };

        let floor = self.error_floor.map(|f| f * flux_mjy.abs());
        let error_mjy = match (error_mjy, floor) {
            (Some(e), Some(f)) => e.max(f),
            (Some(e), None) => e,
            (None, Some(f)) => f,
            (None, None) => return FluxValue::NoData,
        };

        FluxValue::Measured { flux_mjy, error_mjy }
    }

    /// Append flux values to every band of every row.
    pub fn apply(&self, table: &mut PhotometryTable) {
        let mut no_data = 0usize;
        for row in &mut table.rows {
            for phot in row.photometry.values_mut() {
                let flux = self.normalize(phot.band, &phot.measurement);
                if !flux.is_measured() {
                    no_data += 1;
                }
                phot.flux = Some(flux);
            }
        }
        debug!("Normalized {} row(s) to mJy ({no_data} no-data value(s))", table.rows.len());
    }
}
