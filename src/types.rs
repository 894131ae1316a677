use geo::{MultiPolygon, Point};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Region {
    // None when the chosen property is null on this feature
    pub identifier: Option<String>,
    pub geometry: MultiPolygon<f64>,
    // Position of the source feature in the GeoJSON file
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Company {
    // Position among the data rows that survived empty-row removal
    pub row: usize,
    pub values: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub point: Point<f64>,
    pub funding: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// A non-fatal message about degraded input, surfaced to whoever runs the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        let message = message.into();
        info!("{}", message);
        Notice {
            level: NoticeLevel::Info,
            message,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!("{}", message);
        Notice {
            level: NoticeLevel::Warning,
            message,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.level == NoticeLevel::Warning
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => write!(f, "info: {}", self.message),
            NoticeLevel::Warning => write!(f, "warning: {}", self.message),
        }
    }
}
