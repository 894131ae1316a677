//! One call per user action: load both inputs, match, and optionally aggregate.
//!
//! Nothing is cached between calls. Every run buffers its inputs afresh, so
//! the same inputs always produce the same tables.

use crate::aggregate::{aggregate, AggregateResult};
use crate::companies::load_companies;
use crate::config::MatchingConfig;
use crate::data::InputBuffer;
use crate::error::Result;
use crate::processing::{match_companies, MatchResult};
use crate::regions::{load_regions, RegionSet};
use crate::types::Notice;
use std::io::Read;
use tracing::info_span;

#[derive(Debug, Clone)]
pub struct InspectOutcome {
    pub regions: RegionSet,
    pub notices: Vec<Notice>,
}

impl InspectOutcome {
    /// Per-feature counting needs real feature names.
    pub fn aggregation_available(&self) -> bool {
        self.regions.has_semantic_identifier
    }
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub matches: MatchResult,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub table: AggregateResult,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: MatchingConfig,
}

impl Pipeline {
    pub fn new(config: MatchingConfig) -> Self {
        Pipeline { config }
    }

    pub fn inspect(&self, regions: impl Read) -> Result<InspectOutcome> {
        let _span = info_span!("inspect").entered();
        let input = InputBuffer::from_reader("GeoJSON file", regions)?;
        let (regions, notices) = load_regions(&input, &self.config)?;
        Ok(InspectOutcome { regions, notices })
    }

    pub fn filter(&self, regions: impl Read, companies: impl Read) -> Result<FilterOutcome> {
        let _span = info_span!("filter").entered();
        self.run_filter(regions, companies)
    }

    pub fn aggregate(&self, regions: impl Read, companies: impl Read) -> Result<AggregateOutcome> {
        let _span = info_span!("aggregate").entered();
        let FilterOutcome { matches, notices } = self.run_filter(regions, companies)?;
        let table = aggregate(&matches)?;
        Ok(AggregateOutcome { table, notices })
    }

    fn run_filter(&self, regions: impl Read, companies: impl Read) -> Result<FilterOutcome> {
        let region_input = InputBuffer::from_reader("GeoJSON file", regions)?;
        let company_input = InputBuffer::from_reader("CSV file", companies)?;

        let (regions, mut notices) = load_regions(&region_input, &self.config)?;
        let (companies, company_notices) = load_companies(&company_input, &self.config)?;
        notices.extend(company_notices);

        let matches = match_companies(&regions, &companies, &self.config.identifier_column);
        Ok(FilterOutcome { matches, notices })
    }
}
