use serde::{Serialize, Serializer};

use super::error::ConfigError;
use super::types::Money;

/// A pool value range with its per-session hit probability.
///
/// `min` is inclusive. `max` is exclusive unless it is `+inf`, in which case
/// the band is unbounded above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinBand {
    pub min: Money,
    #[serde(serialize_with = "unbounded_as_null")]
    pub max: Money,
    pub probability: f64,
}

impl WinBand {
    pub fn new(min: Money, max: Money, probability: f64) -> Self {
        Self {
            min,
            max,
            probability,
        }
    }

    pub fn unbounded(min: Money, probability: f64) -> Self {
        Self::new(min, f64::INFINITY, probability)
    }

    fn contains(&self, value: Money) -> bool {
        value >= self.min && (value < self.max || self.max == f64::INFINITY)
    }
}

/// Ordered band list resolved by first match.
///
/// Bands may overlap or leave gaps; a value outside every band has
/// probability 0. Use [`WinProbabilityTable::coverage_gaps`] to surface gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct WinProbabilityTable {
    bands: Vec<WinBand>,
}

impl WinProbabilityTable {
    pub fn new(bands: Vec<WinBand>) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::EmptyBands);
        }

        for (index, band) in bands.iter().enumerate() {
            let invalid = |reason: String| ConfigError::InvalidBand { index, reason };

            if !band.min.is_finite() {
                return Err(invalid(format!("min must be finite, got {}", band.min)));
            }
            if band.max.is_nan() {
                return Err(invalid("max must be a number or +inf".to_string()));
            }
            if band.max <= band.min {
                return Err(invalid(format!(
                    "max ({}) must be greater than min ({})",
                    band.max, band.min
                )));
            }
            if !band.probability.is_finite() || !(0.0..=1.0).contains(&band.probability) {
                return Err(invalid(format!(
                    "probability must be within 0..=1, got {}",
                    band.probability
                )));
            }
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[WinBand] {
        &self.bands
    }

    pub fn lookup(&self, pool_value: Money) -> f64 {
        self.bands
            .iter()
            .find(|band| band.contains(pool_value))
            .map(|band| band.probability)
            .unwrap_or(0.0)
    }

    /// Ranges of `[from, +inf)` that no band covers, as `(start, end)` pairs
    /// with exclusive `end` (`+inf` for an open tail).
    pub fn coverage_gaps(&self, from: Money) -> Vec<(Money, Money)> {
        let mut covered = self
            .bands
            .iter()
            .filter(|band| band.max > from)
            .map(|band| (band.min.max(from), band.max))
            .collect::<Vec<_>>();
        covered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut gaps = Vec::new();
        let mut cursor = from;
        for (start, end) in covered {
            if start > cursor {
                gaps.push((cursor, start));
            }
            if end > cursor {
                cursor = end;
            }
            if cursor == f64::INFINITY {
                return gaps;
            }
        }
        gaps.push((cursor, f64::INFINITY));
        gaps
    }
}

/// JSON has no infinity, so an unbounded `max` travels as `null`.
fn unbounded_as_null<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_infinite() && value.is_sign_positive() {
        serializer.serialize_none()
    } else {
        serializer.serialize_some(value)
    }
}
