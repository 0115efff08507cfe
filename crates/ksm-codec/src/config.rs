//! Codec options.

use serde::{Deserialize, Serialize};

/// Knobs for [`crate::parse_with`] and [`crate::build_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Treat a function whose `Label` markers and label records disagree in
    /// number as malformed instead of logging a warning.
    pub strict_labels: bool,
}

impl CodecOptions {
    pub fn strict() -> Self {
        Self {
            strict_labels: true,
        }
    }
}
