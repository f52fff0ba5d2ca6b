//! Availability and reliability formulas
//!
//! ```text
//! availability = up / (1 + ε − unknown) × 100
//! reliability  = up / ((1 + ε − unknown) − down) × 100
//! ```
//!
//! ε keeps the denominator off exactly zero when a bucket is entirely
//! unknown. Results are not clamped to [0, 100].

use thiserror::Error;

/// Offset added to the unit constant in both denominators.
pub const EPSILON: f64 = 1e-8;

const UNIT: f64 = 1.000_000_01;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FormulaError {
    #[error("availability is not finite (up={up}, unknown={unknown})")]
    Availability { up: f64, unknown: f64 },

    #[error("reliability is not finite (up={up}, unknown={unknown}, down={down})")]
    Reliability { up: f64, unknown: f64, down: f64 },
}

/// Availability and reliability for one bucket, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratios {
    pub availability: f64,
    pub reliability: f64,
}

pub fn availability(up: f64, unknown: f64) -> Result<f64, FormulaError> {
    let value = up / (UNIT - unknown) * 100.0;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::Availability { up, unknown })
    }
}

pub fn reliability(up: f64, unknown: f64, down: f64) -> Result<f64, FormulaError> {
    let value = up / ((UNIT - unknown) - down) * 100.0;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::Reliability { up, unknown, down })
    }
}

/// Compute both ratios from averaged up / unknown / down fractions.
pub fn compute(up: f64, unknown: f64, down: f64) -> Result<Ratios, FormulaError> {
    Ok(Ratios {
        availability: availability(up, unknown)?,
        reliability: reliability(up, unknown, down)?,
    })
}
