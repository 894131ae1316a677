use crate::companies::CompanyTable;
use crate::regions::RegionSet;
use crate::types::{Company, Region};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::intersects::Intersects;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;
use tracing::debug;

// Wrapper for RTree indexing
struct RegionIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Bounding-box index over a region list, confirmed with an exact
/// `intersects` test so points on a boundary still match.
pub struct RegionLookup<'a> {
    regions: &'a [Region],
    tree: RTree<RegionIndex>,
}

impl<'a> RegionLookup<'a> {
    pub fn new(regions: &'a [Region]) -> Self {
        let items: Vec<RegionIndex> = regions
            .iter()
            .enumerate()
            .filter_map(|(i, region)| {
                let rect = region.geometry.bounding_rect()?;
                Some(RegionIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        RegionLookup {
            regions,
            tree: RTree::bulk_load(items),
        }
    }

    /// Regions intersecting the company's point, in region order.
    pub fn matching(&self, company: &Company) -> Vec<&'a Region> {
        let envelope = AABB::from_point([company.longitude, company.latitude]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .filter(|&i| self.regions[i].geometry.intersects(&company.point))
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.regions[i]).collect()
    }
}

/// One company joined with one region it falls into.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRow {
    pub company_row: usize,
    pub region_index: usize,
    pub identifier: Option<String>,
    pub values: Vec<String>,
    pub funding: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    // Company headers followed by the identifier column
    pub headers: Vec<String>,
    pub rows: Vec<MatchedRow>,
    pub input_count: usize,
    pub output_count: usize,
    pub funding_column: Option<String>,
    pub has_semantic_identifier: bool,
}

impl MatchResult {
    pub fn total_funding(&self) -> f64 {
        self.rows.iter().filter_map(|r| r.funding).sum()
    }
}

/// Inner spatial join of companies against regions.
///
/// With semantic identifiers every (company, region) pair is kept. Without
/// them the positional identifiers carry no meaning, so each company is
/// kept once, with the first region it falls into.
pub fn match_companies(
    regions: &RegionSet,
    companies: &CompanyTable,
    identifier_column: &str,
) -> MatchResult {
    debug!(
        regions = regions.regions.len(),
        companies = companies.companies.len(),
        crs = ?regions.crs,
        "Matching companies to regions"
    );

    let lookup = RegionLookup::new(&regions.regions);
    let dedup = !regions.has_semantic_identifier;
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for company in &companies.companies {
        for region in lookup.matching(company) {
            if dedup && !seen.insert(company.row) {
                continue;
            }
            rows.push(MatchedRow {
                company_row: company.row,
                region_index: region.index,
                identifier: region.identifier.clone(),
                values: company.values.clone(),
                funding: company.funding,
            });
        }
    }

    let mut headers = companies.headers.clone();
    headers.push(identifier_header(&companies.headers, identifier_column));

    let output_count = rows.len();
    debug!(input = companies.input_count, output = output_count, dedup, "Matched companies");

    MatchResult {
        headers,
        rows,
        input_count: companies.input_count,
        output_count,
        funding_column: companies.funding_column.clone(),
        has_semantic_identifier: regions.has_semantic_identifier,
    }
}

// Avoid clobbering a company column of the same name.
fn identifier_header(headers: &[String], identifier_column: &str) -> String {
    if headers.iter().any(|h| h == identifier_column) {
        format!("{}_right", identifier_column)
    } else {
        identifier_column.to_string()
    }
}
