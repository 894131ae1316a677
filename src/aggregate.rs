use crate::error::{MatchError, Result};
use crate::processing::MatchResult;
use serde::Serialize;
use std::collections::HashMap;

pub const ENTIRE_AREA: &str = "Entire Area";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountRow {
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Company Count")]
    pub company_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingRow {
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Company Count")]
    pub company_count: usize,
    #[serde(rename = "Funding Amount")]
    pub funding_amount: f64,
}

/// Per-feature totals. The first row is always the "Entire Area" rollup.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    CountOnly(Vec<CountRow>),
    CountAndFunding(Vec<FundingRow>),
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        match self {
            AggregateResult::CountOnly(rows) => rows.len(),
            AggregateResult::CountAndFunding(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            AggregateResult::CountOnly(_) => &["Feature", "Company Count"],
            AggregateResult::CountAndFunding(_) => &["Feature", "Company Count", "Funding Amount"],
        }
    }
}

/// Groups matched rows by feature identifier in first-seen order.
///
/// The rollup row uses the matched row count, so a company that falls into
/// two overlapping features is counted twice there as well. Rows of unnamed
/// features only count toward the rollup.
pub fn aggregate(matches: &MatchResult) -> Result<AggregateResult> {
    if !matches.has_semantic_identifier {
        return Err(MatchError::AggregationUnavailable);
    }

    let mut order: Vec<&str> = Vec::new();
    let mut totals: HashMap<&str, (usize, f64)> = HashMap::new();

    for row in &matches.rows {
        let Some(identifier) = row.identifier.as_deref() else {
            continue;
        };
        let entry = totals.entry(identifier).or_insert_with(|| {
            order.push(identifier);
            (0, 0.0)
        });
        entry.0 += 1;
        entry.1 += row.funding.unwrap_or(0.0);
    }

    let result = if matches.funding_column.is_some() {
        let mut rows = vec![FundingRow {
            feature: ENTIRE_AREA.to_string(),
            company_count: matches.output_count,
            funding_amount: matches.total_funding(),
        }];
        rows.extend(order.iter().map(|id| {
            let (count, funding) = totals[id];
            FundingRow {
                feature: id.to_string(),
                company_count: count,
                funding_amount: funding,
            }
        }));
        AggregateResult::CountAndFunding(rows)
    } else {
        let mut rows = vec![CountRow {
            feature: ENTIRE_AREA.to_string(),
            company_count: matches.output_count,
        }];
        rows.extend(order.iter().map(|id| CountRow {
            feature: id.to_string(),
            company_count: totals[id].0,
        }));
        AggregateResult::CountOnly(rows)
    };

    Ok(result)
}
