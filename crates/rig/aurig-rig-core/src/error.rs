//! Error types for profile loading.
//!
//! The runtime engine never fails: missing targets and out-of-range input
//! degrade to no-ops or clamped values. Only turning external configuration
//! into a [`MappingProfile`](crate::profile::MappingProfile) is fallible.

use crate::ids::AuId;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProfileError {
    /// JSON could not be parsed into the profile schema.
    #[error("profile parse error: {reason}")]
    Parse { reason: String },

    /// A bone binding scale must be finite and non-zero.
    #[error("AU {au}: bone binding on '{node}' has invalid scale {scale}")]
    InvalidScale { au: AuId, node: String, scale: f32 },

    /// maxDegrees / maxUnits must be finite.
    #[error("AU {au}: bone binding on '{node}' has a non-finite limit")]
    NonFiniteLimit { au: AuId, node: String },

    /// Mix weights live in [0, 1].
    #[error("AU {au}: mix weight {weight} is outside [0, 1]")]
    InvalidMixWeight { au: AuId, weight: f32 },

    /// A composite axis has no driving AU at all.
    #[error("composite axis {axis} on '{node}' has no driving AUs")]
    EmptyAxis { node: String, axis: String },
}

impl ProfileError {
    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::InvalidScale { .. }
            | Self::NonFiniteLimit { .. }
            | Self::InvalidMixWeight { .. }
            | Self::EmptyAxis { .. } => "validation",
        }
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            reason: err.to_string(),
        }
    }
}
