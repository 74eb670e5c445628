use thiserror::Error;

/// Estimator error types
///
/// None of these are fatal: an operation that fails leaves the estimator
/// state exactly as it was, so the caller just sees no update for that tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Coordinate out of range: lat {latitude}, lon {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Time step must be positive, got {0}")]
    NonPositiveDt(f64),

    #[error("Estimator not initialized")]
    Uninitialized,

    #[error("Dead reckoning is not active")]
    Inactive,
}

/// Result type for estimator operations
pub type FusionResult<T> = Result<T, FusionError>;

/// Validate a tick interval. NaN and infinities are rejected along with zero
/// and negative steps.
pub fn check_dt(dt: f64) -> FusionResult<f64> {
    if dt.is_finite() && dt > 0.0 {
        Ok(dt)
    } else {
        Err(FusionError::NonPositiveDt(dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dt() {
        assert_eq!(check_dt(0.1), Ok(0.1));
        assert_eq!(check_dt(0.0), Err(FusionError::NonPositiveDt(0.0)));
        assert_eq!(check_dt(-1.0), Err(FusionError::NonPositiveDt(-1.0)));
        assert!(check_dt(f64::NAN).is_err());
        assert!(check_dt(f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = FusionError::InvalidCoordinate { latitude: 91.0, longitude: 0.0 };
        assert_eq!(err.to_string(), "Coordinate out of range: lat 91, lon 0");
        assert_eq!(FusionError::Uninitialized.to_string(), "Estimator not initialized");
    }
}
