//! Loads GeoJSON features into a normalized list of named regions.
//!
//! Identifiers come from the first resolver in the chain that produces one:
//! the `name` property, a nested `properties.hood` value, a fallback column,
//! and finally the feature position.

use crate::config::MatchingConfig;
use crate::data::InputBuffer;
use crate::error::{MatchError, Result};
use crate::types::{Notice, Region};
use geo::{MultiPolygon, Polygon};
use geojson::{GeoJson, JsonObject, JsonValue};
use std::fmt;
use tracing::debug;

const NAME_PROPERTY: &str = "name";
const NESTED_PROPERTIES: &str = "properties";
const NESTED_HOOD: &str = "hood";

/// One GeoJSON feature before identifier resolution.
#[derive(Debug, Clone, Default)]
pub struct FeatureRecord {
    pub properties: Option<JsonObject>,
    pub geometry: Option<geojson::Geometry>,
}

impl FeatureRecord {
    pub fn property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.as_ref().and_then(|props| props.get(key))
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.as_ref().is_some_and(|props| props.contains_key(key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierSource {
    Name,
    NestedHood,
    Fallback(String),
    Positional,
}

impl IdentifierSource {
    /// Fallback columns count as real names; only feature positions disable counting.
    pub fn is_semantic(&self) -> bool {
        !matches!(self, IdentifierSource::Positional)
    }
}

impl fmt::Display for IdentifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierSource::Name => write!(f, "'{}' property", NAME_PROPERTY),
            IdentifierSource::NestedHood => {
                write!(f, "nested '{}.{}' property", NESTED_PROPERTIES, NESTED_HOOD)
            }
            IdentifierSource::Fallback(column) => write!(f, "fallback column '{}'", column),
            IdentifierSource::Positional => write!(f, "feature position"),
        }
    }
}

/// Identifiers produced by one resolver, aligned with the feature list.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub values: Vec<Option<String>>,
    pub source: IdentifierSource,
    pub notice: Option<Notice>,
}

pub trait IdentifierResolver {
    fn name(&self) -> &'static str;
    fn resolve(&self, features: &[FeatureRecord]) -> Option<Resolution>;
}

pub struct NameProperty;

impl IdentifierResolver for NameProperty {
    fn name(&self) -> &'static str {
        "name-property"
    }

    fn resolve(&self, features: &[FeatureRecord]) -> Option<Resolution> {
        let values: Vec<Option<String>> = features
            .iter()
            .map(|f| f.property(NAME_PROPERTY).and_then(identifier_text))
            .collect();
        values.iter().any(Option::is_some).then(|| Resolution {
            values,
            source: IdentifierSource::Name,
            notice: None,
        })
    }
}

/// Lifts `properties.hood` when no feature carries a `name` key at all.
pub struct NestedHood;

impl IdentifierResolver for NestedHood {
    fn name(&self) -> &'static str {
        "nested-hood"
    }

    fn resolve(&self, features: &[FeatureRecord]) -> Option<Resolution> {
        if features.iter().any(|f| f.has_property(NAME_PROPERTY)) {
            return None;
        }
        if !features.iter().any(|f| f.has_property(NESTED_PROPERTIES)) {
            return None;
        }
        let values: Vec<Option<String>> = features
            .iter()
            .map(|f| {
                f.property(NESTED_PROPERTIES)
                    .and_then(JsonValue::as_object)
                    .and_then(|nested| nested.get(NESTED_HOOD))
                    .and_then(identifier_text)
            })
            .collect();
        values.iter().any(Option::is_some).then(|| Resolution {
            values,
            source: IdentifierSource::NestedHood,
            notice: None,
        })
    }
}

/// Uses the first listed column that exists on any feature, whatever its values.
pub struct FallbackColumns {
    pub columns: Vec<String>,
}

impl IdentifierResolver for FallbackColumns {
    fn name(&self) -> &'static str {
        "fallback-columns"
    }

    fn resolve(&self, features: &[FeatureRecord]) -> Option<Resolution> {
        let column = self
            .columns
            .iter()
            .find(|col| features.iter().any(|f| f.has_property(col)))?;
        let values = features
            .iter()
            .map(|f| f.property(column).and_then(identifier_text))
            .collect();
        Some(Resolution {
            values,
            source: IdentifierSource::Fallback(column.clone()),
            notice: Some(Notice::warning(format!(
                "'{}' column not found in GeoJSON. Using '{}' as a fallback.",
                NAME_PROPERTY, column
            ))),
        })
    }
}

pub struct PositionalIndex;

impl IdentifierResolver for PositionalIndex {
    fn name(&self) -> &'static str {
        "positional-index"
    }

    fn resolve(&self, features: &[FeatureRecord]) -> Option<Resolution> {
        Some(positional(features))
    }
}

fn positional(features: &[FeatureRecord]) -> Resolution {
    Resolution {
        values: (0..features.len()).map(|i| Some(i.to_string())).collect(),
        source: IdentifierSource::Positional,
        notice: Some(Notice::info(
            "No suitable identifier column found in GeoJSON for counting. Filtering will still work.",
        )),
    }
}

pub fn default_resolvers(config: &MatchingConfig) -> Vec<Box<dyn IdentifierResolver>> {
    vec![
        Box::new(NameProperty),
        Box::new(NestedHood),
        Box::new(FallbackColumns {
            columns: config.fallback_columns.clone(),
        }),
        Box::new(PositionalIndex),
    ]
}

/// Runs resolvers in order and returns the first result.
pub fn resolve_identifiers(
    resolvers: &[Box<dyn IdentifierResolver>],
    features: &[FeatureRecord],
) -> Resolution {
    for resolver in resolvers {
        if let Some(resolution) = resolver.resolve(features) {
            debug!(resolver = resolver.name(), source = %resolution.source, "Resolved feature identifiers");
            return resolution;
        }
    }
    // Custom chains may omit the positional resolver
    positional(features)
}

#[derive(Debug, Clone)]
pub struct RegionSet {
    pub regions: Vec<Region>,
    pub has_semantic_identifier: bool,
    pub identifier_source: IdentifierSource,
    pub crs: Option<String>,
    pub feature_count: usize,
}

pub fn load_regions(input: &InputBuffer, config: &MatchingConfig) -> Result<(RegionSet, Vec<Notice>)> {
    load_regions_with(input, &default_resolvers(config))
}

pub fn load_regions_with(
    input: &InputBuffer,
    resolvers: &[Box<dyn IdentifierResolver>],
) -> Result<(RegionSet, Vec<Notice>)> {
    let start = input
        .first_non_blank_line()
        .ok_or_else(|| MatchError::RegionParse(format!("{} is empty", input.what())))?;

    let geojson = GeoJson::from_reader(input.content_from(start.offset))
        .map_err(|e| MatchError::RegionParse(e.to_string()))?;
    let (features, crs) = feature_records(geojson);
    debug!(features = features.len(), crs = ?crs, "Parsed GeoJSON");

    let mut notices = Vec::new();
    let resolution = resolve_identifiers(resolvers, &features);
    let has_semantic_identifier = resolution.source.is_semantic();
    notices.extend(resolution.notice);

    let mut unnamed = 0;
    let mut skipped_geometry = 0;
    let mut regions = Vec::with_capacity(features.len());

    for (index, (feature, value)) in features.into_iter().zip(resolution.values).enumerate() {
        if value.is_none() {
            unnamed += 1;
        }

        let geometry = match feature.geometry {
            Some(geometry) => to_multi_polygon(geometry)?,
            None => None,
        };
        let Some(geometry) = geometry else {
            skipped_geometry += 1;
            continue;
        };

        regions.push(Region {
            identifier: value,
            geometry,
            index,
        });
    }

    if unnamed > 0 {
        notices.push(Notice::warning(format!(
            "{} feature(s) have no value for the {}; their companies only count toward the Entire Area.",
            unnamed, resolution.source
        )));
    }
    if skipped_geometry > 0 {
        notices.push(Notice::warning(format!(
            "{} feature(s) without polygon geometry were ignored.",
            skipped_geometry
        )));
    }

    let feature_count = regions.len() + skipped_geometry;
    debug!(regions = regions.len(), "Loaded regions");

    Ok((
        RegionSet {
            regions,
            has_semantic_identifier,
            identifier_source: resolution.source,
            crs,
            feature_count,
        },
        notices,
    ))
}

fn feature_records(geojson: GeoJson) -> (Vec<FeatureRecord>, Option<String>) {
    match geojson {
        GeoJson::FeatureCollection(fc) => {
            let crs = fc.foreign_members.as_ref().and_then(crs_name);
            let features = fc
                .features
                .into_iter()
                .map(|f| FeatureRecord {
                    properties: f.properties,
                    geometry: f.geometry,
                })
                .collect();
            (features, crs)
        }
        GeoJson::Feature(f) => {
            let crs = f.foreign_members.as_ref().and_then(crs_name);
            let record = FeatureRecord {
                properties: f.properties,
                geometry: f.geometry,
            };
            (vec![record], crs)
        }
        GeoJson::Geometry(geometry) => {
            let crs = geometry.foreign_members.as_ref().and_then(crs_name);
            let record = FeatureRecord {
                properties: None,
                geometry: Some(geometry),
            };
            (vec![record], crs)
        }
    }
}

// Legacy GeoJSON: "crs": {"type": "name", "properties": {"name": "EPSG:4326"}}
fn crs_name(members: &JsonObject) -> Option<String> {
    members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn identifier_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn to_multi_polygon(geometry: geojson::Geometry) -> Result<Option<MultiPolygon<f64>>> {
    let geometry: geo::Geometry<f64> = geometry
        .value
        .try_into()
        .map_err(|e| MatchError::RegionParse(format!("Failed to convert geometry: {:?}", e)))?;

    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons);
    if polygons.is_empty() {
        Ok(None)
    } else {
        Ok(Some(MultiPolygon::new(polygons)))
    }
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        geo::Geometry::Polygon(p) => out.push(p),
        geo::Geometry::MultiPolygon(mp) => out.extend(mp),
        geo::Geometry::Rect(r) => out.push(r.to_polygon()),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_polygons(g, out);
            }
        }
        _ => {} // Points and lines cannot contain companies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoticeLevel;

    fn load(json: &str) -> (RegionSet, Vec<Notice>) {
        let input = InputBuffer::from_bytes("regions", json);
        load_regions(&input, &MatchingConfig::default()).unwrap()
    }

    fn square(props: &str) -> String {
        format!(
            r#"{{"type":"Feature","properties":{},"geometry":{{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}}}"#,
            props
        )
    }

    fn collection(features: &[String]) -> String {
        format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
    }

    fn identifiers(set: &RegionSet) -> Vec<&str> {
        set.regions.iter().map(|r| r.identifier.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn uses_name_property() {
        let (set, notices) = load(&collection(&[
            square(r#"{"name":"Mitte"}"#),
            square(r#"{"name":"Wedding"}"#),
        ]));
        assert!(set.has_semantic_identifier);
        assert_eq!(set.identifier_source, IdentifierSource::Name);
        assert_eq!(identifiers(&set), vec!["Mitte", "Wedding"]);
        assert!(notices.is_empty());
    }

    #[test]
    fn lifts_nested_hood() {
        let (set, notices) = load(&collection(&[
            square(r#"{"properties":{"hood":"Mission"}}"#),
            square(r#"{"properties":{"hood":"SoMa"}}"#),
        ]));
        assert!(set.has_semantic_identifier);
        assert_eq!(set.identifier_source, IdentifierSource::NestedHood);
        assert_eq!(identifiers(&set), vec!["Mission", "SoMa"]);
        assert!(notices.is_empty());
    }

    #[test]
    fn null_names_fall_through_to_fallback_column() {
        let (set, notices) = load(&collection(&[
            square(r#"{"name":null,"OBJECTID":7}"#),
            square(r#"{"name":null,"OBJECTID":8}"#),
        ]));
        assert_eq!(set.identifier_source, IdentifierSource::Fallback("OBJECTID".into()));
        assert_eq!(identifiers(&set), vec!["7", "8"]);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(notices[0].message.contains("'OBJECTID'"));
    }

    #[test]
    fn fallback_priority_follows_config_order() {
        let (set, _) = load(&collection(&[square(r#"{"area":"north","id":"n-1"}"#)]));
        assert_eq!(set.identifier_source, IdentifierSource::Fallback("id".into()));
        assert_eq!(identifiers(&set), vec!["n-1"]);
    }

    #[test]
    fn positional_index_when_nothing_matches() {
        let (set, notices) = load(&collection(&[
            square(r#"{"color":"red"}"#),
            square("null"),
        ]));
        assert!(!set.has_semantic_identifier);
        assert_eq!(identifiers(&set), vec!["0", "1"]);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
    }

    #[test]
    fn only_positions_are_not_semantic() {
        assert!(IdentifierSource::Name.is_semantic());
        assert!(IdentifierSource::NestedHood.is_semantic());
        assert!(IdentifierSource::Fallback("OBJECTID".into()).is_semantic());
        assert!(!IdentifierSource::Positional.is_semantic());
    }

    #[test]
    fn null_names_stay_unnamed() {
        let (set, notices) = load(&collection(&[
            square(r#"{"name":"A"}"#),
            square(r#"{"name":null}"#),
            square(r#"{"other":1}"#),
        ]));
        assert!(set.has_semantic_identifier);
        assert_eq!(set.regions[0].identifier.as_deref(), Some("A"));
        assert_eq!(set.regions[1].identifier, None);
        assert_eq!(set.regions[2].identifier, None);
        assert!(notices.iter().any(|n| n.is_warning() && n.message.contains("2 feature(s)")));
    }

    #[test]
    fn skips_features_without_polygons_but_keeps_positions() {
        let point = r#"{"type":"Feature","properties":{"name":"pin"},"geometry":{"type":"Point","coordinates":[0.5,0.5]}}"#;
        let empty = r#"{"type":"Feature","properties":{"name":"void"},"geometry":null}"#;
        let (set, notices) = load(&collection(&[
            point.to_string(),
            empty.to_string(),
            square(r#"{}"#),
        ]));
        assert_eq!(set.regions.len(), 1);
        assert_eq!(set.regions[0].index, 2);
        assert_eq!(set.regions[0].identifier, None);
        assert_eq!(set.feature_count, 3);
        assert!(notices.iter().any(|n| n.message.contains("without polygon geometry")));
    }

    #[test]
    fn tolerates_leading_blank_lines_and_reads_crs() {
        let json = format!(
            "\n\n   \n{{\"type\":\"FeatureCollection\",\"crs\":{{\"type\":\"name\",\"properties\":{{\"name\":\"EPSG:4326\"}}}},\"features\":[{}]}}",
            square(r#"{"name":"A"}"#)
        );
        let (set, _) = load(&json);
        assert_eq!(set.crs.as_deref(), Some("EPSG:4326"));
        assert_eq!(identifiers(&set), vec!["A"]);
    }

    #[test]
    fn single_feature_document() {
        let (set, _) = load(&square(r#"{"name":"solo"}"#));
        assert_eq!(identifiers(&set), vec!["solo"]);
    }

    #[test]
    fn malformed_geojson_is_a_parse_error() {
        let input = InputBuffer::from_bytes("regions", "{\"type\": \"FeatureCollection\", \"features\": [");
        let err = load_regions(&input, &MatchingConfig::default()).unwrap_err();
        assert!(matches!(err, MatchError::RegionParse(_)));
    }

    #[test]
    fn empty_file_is_a_parse_error() {
        let input = InputBuffer::from_bytes("regions", "\n\n");
        let err = load_regions(&input, &MatchingConfig::default()).unwrap_err();
        assert!(matches!(err, MatchError::RegionParse(_)));
    }

    #[test]
    fn numeric_and_boolean_identifiers_are_stringified() {
        assert_eq!(identifier_text(&serde_json::json!(12)), Some("12".to_string()));
        assert_eq!(identifier_text(&serde_json::json!(1.5)), Some("1.5".to_string()));
        assert_eq!(identifier_text(&serde_json::json!(true)), Some("true".to_string()));
        assert_eq!(identifier_text(&serde_json::json!(null)), None);
    }
}
