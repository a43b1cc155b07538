//! Foreground (Milky Way) extinction correction.
//!
//! One E(B-V) is looked up per run and applied to every band of every row:
//!
//! ```text
//! A_band   = R_band · E(B-V)
//! mag_corr = mag - A_band
//! flux_corr = flux · 10^(0.4 · A_band)
//! ```

use log::info;

use crate::data::ReddeningLookup;
use crate::domain::{Band, ExtinctionValue, FluxValue, Measurement, PhotometryTable, SkyPosition};
use crate::error::PipelineError;
use crate::photometry::normalize::is_non_detection;

/// Maximum offset between the table's search position and the position the
/// reddening value was computed for.
const POSITION_TOLERANCE_ARCSEC: f64 = 1.0;

/// Holds the run's single reddening value.
#[derive(Debug, Clone, Copy)]
pub struct ExtinctionCorrector {
    value: ExtinctionValue,
}

impl ExtinctionCorrector {
    /// Query the reddening collaborator once for `position`.
    pub fn fetch(lookup: &dyn ReddeningLookup, position: &SkyPosition) -> Result<Self, PipelineError> {
        let value = lookup.lookup(position)?;
        Ok(Self { value })
    }

    pub fn from_value(value: ExtinctionValue) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &ExtinctionValue {
        &self.value
    }

    /// `A_band` in magnitudes.
    pub fn attenuation(&self, band: Band) -> f64 {
        band.info().extinction_coeff * self.value.ebv
    }

    /// Correct every row of `table` in place.
    ///
    /// Fails if the table was already corrected or belongs to another position.
    pub fn apply(&self, table: &mut PhotometryTable) -> Result<(), PipelineError> {
        if let Some(applied) = &table.extinction {
            return Err(PipelineError::ExtinctionAlreadyApplied { applied: applied.ebv });
        }
        let offset = table.position.separation_arcsec(&self.value.position);
        if offset > POSITION_TOLERANCE_ARCSEC {
            return Err(PipelineError::ExtinctionLookup {
                position: table.position,
                reason: format!(
                    "reddening value was computed for {} ({offset:.1}\" away)",
                    self.value.position
                ),
            });
        }

        for row in &mut table.rows {
            for phot in row.photometry.values_mut() {
                let a = self.attenuation(phot.band);
                let gain = 10f64.powf(0.4 * a);
                phot.measurement = match phot.measurement {
                    Measurement::Magnitude { mag, error } if !is_non_detection(mag) => {
                        Measurement::Magnitude { mag: mag - a, error }
                    }
                    Measurement::Flux { value, error, unit } if value.is_finite() => Measurement::Flux {
                        value: value * gain,
                        error: error.map(|e| e * gain),
                        unit,
                    },
                    other => other,
                };
                if let Some(FluxValue::Measured { flux_mjy, error_mjy }) = phot.flux {
                    phot.flux = Some(FluxValue::Measured {
                        flux_mjy: flux_mjy * gain,
                        error_mjy: error_mjy * gain,
                    });
                }
            }
            row.applied_ebv = Some(self.value.ebv);
        }
        table.extinction = Some(self.value);

        info!(
            "Applied E(B-V)={:.4} to {} row(s)",
            self.value.ebv,
            table.rows.len()
        );
        Ok(())
    }
}
