//! Match company locations from a CSV export to the features of a GeoJSON
//! file, then count companies and sum their funding per feature.

pub mod aggregate;
pub mod companies;
pub mod config;
pub mod data;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod regions;
pub mod types;

pub use aggregate::AggregateResult;
pub use error::{MatchError, Result};
pub use pipeline::Pipeline;
