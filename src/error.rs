use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

/// Fatal failures of a single pipeline run. Degraded input is reported
/// through [`crate::types::Notice`] instead.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Failed to read {what}: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse GeoJSON: {0}")]
    RegionParse(String),

    #[error("Failed to parse CSV: {0}")]
    CompanyParse(String),

    #[error("Delimiter must be a single ASCII character other than a quote or newline, got {0:?}")]
    InvalidDelimiter(char),

    #[error("CSV file must contain '{latitude}' and '{longitude}' columns.")]
    MissingCoordinates { latitude: String, longitude: String },

    #[error("No suitable identifier column found in GeoJSON; counting per feature is unavailable")]
    AggregationUnavailable,
}

impl From<csv::Error> for MatchError {
    fn from(e: csv::Error) -> Self {
        MatchError::CompanyParse(e.to_string())
    }
}
