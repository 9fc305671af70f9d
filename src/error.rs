use thiserror::Error;

/// Error type covering every fallible boundary of the crate.
///
/// All variants are configuration-class failures detected before any numeric
/// work starts. Numeric degeneracies (zero-variance columns, empty weight
/// rows) are not errors; they are absorbed into defined sentinel outputs and
/// reported through `log::warn!`.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A required parameter was not supplied.
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    /// A parameter was supplied with an unusable value.
    #[error("invalid value for `{name}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },

    /// The kernel name did not match any known kernel.
    #[error("unknown kernel `{0}`; expected one of: gaussian, misty_rbf, exponential, linear")]
    UnknownKernel(String),

    /// The significance method name did not match any known method.
    #[error("unknown significance method `{0}`; expected `analytical` or `permutation`")]
    UnknownSignificance(String),

    /// A feature name could not be resolved to a column.
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),

    /// Matrix shapes do not line up.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Anything else that makes the requested computation ill-posed.
    #[error("{0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpatialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SpatialError::MissingParameter("bandwidth");
        assert_eq!(e.to_string(), "missing required parameter `bandwidth`");

        let e = SpatialError::UnknownKernel("cosine".into());
        assert!(e.to_string().contains("cosine"));
        assert!(e.to_string().contains("misty_rbf"));

        let e = SpatialError::DimensionMismatch("x has 4 rows, weights have 5".into());
        assert!(e.to_string().starts_with("dimension mismatch"));
    }
}
