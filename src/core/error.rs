use thiserror::Error;

/// Rejected simulation input. Raised before the first session runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be > {floor}, got {value}")]
    AtOrBelow {
        field: &'static str,
        value: f64,
        floor: f64,
    },

    #[error("{field} must be >= 1")]
    ZeroCount { field: &'static str },

    #[error("win band list must not be empty")]
    EmptyBands,

    #[error("win band {index}: {reason}")]
    InvalidBand { index: usize, reason: String },
}

pub(crate) fn ensure_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

pub(crate) fn ensure_within(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

pub(crate) fn ensure_above(field: &'static str, value: f64, floor: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > floor {
        Ok(())
    } else {
        Err(ConfigError::AtOrBelow {
            field,
            value,
            floor,
        })
    }
}

pub(crate) fn ensure_nonzero(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroCount { field })
    } else {
        Ok(())
    }
}
