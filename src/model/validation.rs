//! Validation helpers for request payloads.

use validator::ValidationError;

/// Validates that a latitude lies within the [-90, 90] degree range.
pub fn validate_latitude(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(-90.0..=90.0).contains(&value) {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some(format!("latitude must be between -90 and 90 (got {value})").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a longitude lies within the [-180, 180] degree range.
pub fn validate_longitude(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(-180.0..=180.0).contains(&value) {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some(format!("longitude must be between -180 and 180 (got {value})").into());
        return Err(err);
    }

    Ok(())
}
