//! Loads a delimited company export into point records.

use crate::config::MatchingConfig;
use crate::data::InputBuffer;
use crate::error::{MatchError, Result};
use crate::types::{Company, Notice};
use csv::ReaderBuilder;
use geo::Point;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CompanyTable {
    pub headers: Vec<String>,
    pub companies: Vec<Company>,
    pub funding_column: Option<String>,
    pub delimiter: u8,
    // Data rows left after dropping empty ones, including rows skipped below
    pub input_count: usize,
    // Rows without usable coordinates
    pub skipped: usize,
}

/// `;` wins whenever it appears in the header line, even next to commas.
pub fn detect_delimiter(line: &str) -> u8 {
    if line.contains(';') {
        b';'
    } else {
        b','
    }
}

// A line made only of separators and whitespace is treated as blank.
fn is_content_line(line: &str) -> bool {
    line.split(|c: char| c == ',' || c == ';')
        .any(|field| !field.trim().is_empty())
}

pub fn load_companies(input: &InputBuffer, config: &MatchingConfig) -> Result<(CompanyTable, Vec<Notice>)> {
    let header_line = input
        .first_line_where(is_content_line)
        .ok_or_else(|| MatchError::CompanyParse(format!("{} has no header row", input.what())))?;

    let delimiter = match config.delimiter {
        Some(d) => u8::try_from(d)
            .ok()
            .filter(|&b| b.is_ascii() && !matches!(b, b'"' | b'\n' | b'\r'))
            .ok_or(MatchError::InvalidDelimiter(d))?,
        None => detect_delimiter(&header_line.text),
    };
    debug!(delimiter = %(delimiter as char), "Using CSV delimiter");

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(input.content_from(header_line.offset));

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let position = |name: &str| headers.iter().position(|h| h == name);
    let (lat_idx, lon_idx) = match (
        position(&config.latitude_column),
        position(&config.longitude_column),
    ) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err(MatchError::MissingCoordinates {
                latitude: config.latitude_column.clone(),
                longitude: config.longitude_column.clone(),
            })
        }
    };

    let funding_idx = headers.iter().position(|h| h.starts_with(&config.funding_prefix));

    let mut notices = Vec::new();
    let mut companies = Vec::new();
    let mut input_count = 0;
    let mut skipped = 0;
    let mut bad_funding = 0;

    for result in rdr.records() {
        let record = result?;

        if record.len() > headers.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(MatchError::CompanyParse(format!(
                "Expected {} fields in line {}, saw {}",
                headers.len(),
                line,
                record.len()
            )));
        }

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let row = input_count;
        input_count += 1;

        let mut values: Vec<String> = record.iter().map(str::to_string).collect();
        values.resize(headers.len(), String::new());

        let (Some(latitude), Some(longitude)) = (
            parse_coordinate(&values[lat_idx]),
            parse_coordinate(&values[lon_idx]),
        ) else {
            skipped += 1;
            continue;
        };

        let funding = match funding_idx {
            Some(idx) => parse_amount(&values[idx]).unwrap_or_else(|| {
                bad_funding += 1;
                None
            }),
            None => None,
        };

        companies.push(Company {
            row,
            values,
            latitude,
            longitude,
            point: Point::new(longitude, latitude),
            funding,
        });
    }

    let funding_column = funding_idx.map(|idx| headers[idx].clone());
    if funding_column.is_none() {
        notices.push(Notice::info(format!(
            "No column starting with '{}' found in CSV; only company counts will be calculated.",
            config.funding_prefix
        )));
    }
    if skipped > 0 {
        notices.push(Notice::warning(format!(
            "{} row(s) without valid '{}'/'{}' values were ignored.",
            skipped, config.latitude_column, config.longitude_column
        )));
    }
    if bad_funding > 0 {
        notices.push(Notice::warning(format!(
            "{} value(s) in '{}' are not numbers and were counted as zero.",
            bad_funding,
            funding_column.as_deref().unwrap_or_default()
        )));
    }

    debug!(rows = input_count, companies = companies.len(), "Loaded companies");

    Ok((
        CompanyTable {
            headers,
            companies,
            funding_column,
            delimiter,
            input_count,
            skipped,
        },
        notices,
    ))
}

fn parse_coordinate(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a funding cell such as `1,250,000`, `1.000,50`, `$ 3.5e6` or `€750 000`.
/// Blank cells are `Some(None)`; anything else that is not a number is `None`.
fn parse_amount(value: &str) -> Option<Option<f64>> {
    let cleaned: String = value
        .chars()
        .filter(|&c| !c.is_whitespace() && !matches!(c, '_' | '$' | '€' | '£' | '¥'))
        .collect();
    if cleaned.is_empty() {
        return Some(None);
    }
    let amount = normalize_separators(&cleaned)?.parse::<f64>().ok()?;
    amount.is_finite().then_some(Some(amount))
}

// Rewrites `,`/`.` so that only a `.` decimal mark remains. The mark is
// whichever separator comes last; the other one has to group the integer
// part in threes. A lone comma that does not group three digits is a
// decimal comma.
fn normalize_separators(value: &str) -> Option<String> {
    match (value.rfind(','), value.rfind('.')) {
        (None, None) => Some(value.to_string()),
        (None, Some(_)) => {
            if value.matches('.').count() > 1 {
                is_grouped(value, '.').then(|| value.replace('.', ""))
            } else {
                Some(value.to_string())
            }
        }
        (Some(comma), Some(dot)) if comma > dot => {
            let (integer, fraction) = value.split_at(comma);
            is_grouped(integer, '.').then(|| format!("{}.{}", integer.replace('.', ""), &fraction[1..]))
        }
        (Some(_), Some(dot)) => is_grouped(&value[..dot], ',').then(|| value.replace(',', "")),
        (Some(_), None) => {
            if is_grouped(value, ',') {
                Some(value.replace(',', ""))
            } else if value.matches(',').count() == 1 {
                Some(value.replacen(',', ".", 1))
            } else {
                None
            }
        }
    }
}

fn is_grouped(integer: &str, separator: char) -> bool {
    let digits = |group: &str| group.bytes().all(|b| b.is_ascii_digit());
    let mut groups = integer.split(separator);
    let head = groups
        .next()
        .unwrap_or_default()
        .trim_start_matches(|c: char| c == '-' || c == '+');
    (1..=3).contains(&head.len()) && digits(head) && groups.all(|g| g.len() == 3 && digits(g))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NoticeLevel;

    fn load(csv: &str) -> Result<(CompanyTable, Vec<Notice>)> {
        let input = InputBuffer::from_bytes("companies", csv);
        load_companies(&input, &MatchingConfig::default())
    }

    #[test]
    fn detects_semicolon_even_with_commas() {
        assert_eq!(detect_delimiter("NAME;LATITUDE;\"TOTAL FUNDING (1,000 USD)\""), b';');
        assert_eq!(detect_delimiter("NAME,LATITUDE,LONGITUDE"), b',');
    }

    #[test]
    fn parses_semicolon_file_with_quoted_commas() {
        let (table, _) = load(
            "NAME;LATITUDE;LONGITUDE;TOTAL FUNDING (USD)\nAcme;52.5;13.4;\"1,500\"\n",
        )
        .unwrap();
        assert_eq!(table.delimiter, b';');
        assert_eq!(table.companies.len(), 1);
        assert_eq!(table.companies[0].funding, Some(1500.0));
        assert_eq!(table.funding_column.as_deref(), Some("TOTAL FUNDING (USD)"));
    }

    #[test]
    fn skips_leading_blank_and_comma_only_lines() {
        let (table, _) = load("\n,,,\n  \nNAME,LATITUDE,LONGITUDE\nAcme,1,2\n").unwrap();
        assert_eq!(table.headers, vec!["NAME", "LATITUDE", "LONGITUDE"]);
        assert_eq!(table.companies.len(), 1);
        let acme = &table.companies[0];
        assert_eq!((acme.latitude, acme.longitude), (1.0, 2.0));
        assert_eq!(acme.point, Point::new(2.0, 1.0));
    }

    #[test]
    fn semicolon_only_lines_are_blank_too() {
        let (table, _) = load(";;;\nNAME;LATITUDE;LONGITUDE\nAcme;1;2\n").unwrap();
        assert_eq!(table.delimiter, b';');
        assert_eq!(table.headers, vec!["NAME", "LATITUDE", "LONGITUDE"]);
    }

    #[test]
    fn drops_entirely_empty_rows() {
        let (table, _) = load("NAME,LATITUDE,LONGITUDE\nAcme,1,2\n,,\n\nBeta,3,4\n").unwrap();
        assert_eq!(table.input_count, 2);
        assert_eq!(table.companies.len(), 2);
        assert_eq!(table.companies[1].row, 1);
    }

    #[test]
    fn missing_latitude_is_a_schema_error() {
        let err = load("NAME,LONGITUDE\nAcme,2\n").unwrap_err();
        assert!(matches!(err, MatchError::MissingCoordinates { .. }));
        assert_eq!(
            err.to_string(),
            "CSV file must contain 'LATITUDE' and 'LONGITUDE' columns."
        );
    }

    #[test]
    fn coordinate_columns_are_case_sensitive() {
        let err = load("name,latitude,longitude\nAcme,1,2\n").unwrap_err();
        assert!(matches!(err, MatchError::MissingCoordinates { .. }));
    }

    #[test]
    fn missing_funding_column_is_reported_not_fatal() {
        let (table, notices) = load("NAME,LATITUDE,LONGITUDE,FUNDING\nAcme,1,2,100\n").unwrap();
        assert!(table.funding_column.is_none());
        assert_eq!(table.companies[0].funding, None);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
    }

    #[test]
    fn first_prefixed_column_wins() {
        let (table, _) = load(
            "TOTAL FUNDING (EUR M),LATITUDE,LONGITUDE,TOTAL FUNDING (USD M)\n5,1,2,6\n",
        )
        .unwrap();
        assert_eq!(table.funding_column.as_deref(), Some("TOTAL FUNDING (EUR M)"));
        assert_eq!(table.companies[0].funding, Some(5.0));
    }

    #[test]
    fn rows_with_bad_coordinates_are_counted_but_skipped() {
        let (table, notices) = load("NAME,LATITUDE,LONGITUDE\nAcme,,2\nBeta,x,1\nGamma,1,1\n").unwrap();
        assert_eq!(table.input_count, 3);
        assert_eq!(table.skipped, 2);
        assert_eq!(table.companies.len(), 1);
        assert_eq!(table.companies[0].row, 2);
        assert!(notices.iter().any(|n| n.is_warning()));
    }

    #[test]
    fn short_rows_are_padded() {
        let (table, _) = load("LATITUDE,LONGITUDE,NAME\n1,2\n").unwrap();
        assert_eq!(table.companies[0].values, vec!["1", "2", ""]);
    }

    #[test]
    fn long_rows_are_rejected() {
        let err = load("LATITUDE,LONGITUDE\n1,2,3\n").unwrap_err();
        assert!(matches!(err, MatchError::CompanyParse(_)));
    }

    #[test]
    fn explicit_delimiter_overrides_detection() {
        let input = InputBuffer::from_bytes("companies", "LATITUDE|LONGITUDE|NOTE\n1|2|a;b\n");
        let config = MatchingConfig {
            delimiter: Some('|'),
            ..MatchingConfig::default()
        };
        let (table, _) = load_companies(&input, &config).unwrap();
        assert_eq!(table.delimiter, b'|');
        assert_eq!(table.companies[0].values[2], "a;b");
    }

    #[test]
    fn parses_amounts_leniently() {
        assert_eq!(parse_amount("1,250,000"), Some(Some(1_250_000.0)));
        assert_eq!(parse_amount(" $ 3.5e6 "), Some(Some(3_500_000.0)));
        assert_eq!(parse_amount("€750 000"), Some(Some(750_000.0)));
        assert_eq!(parse_amount("   "), Some(None));
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn decimal_comma_is_not_a_thousands_separator() {
        assert_eq!(parse_amount("1.000,50"), Some(Some(1000.5)));
        assert_eq!(parse_amount("1,000.50"), Some(Some(1000.5)));
        assert_eq!(parse_amount("1,5"), Some(Some(1.5)));
        assert_eq!(parse_amount("-2,25"), Some(Some(-2.25)));
        assert_eq!(parse_amount("1.250.000"), Some(Some(1_250_000.0)));
        assert_eq!(parse_amount("1,000"), Some(Some(1000.0)));
    }

    #[test]
    fn ambiguous_separators_are_rejected() {
        assert_eq!(parse_amount("1,2,3"), None);
        assert_eq!(parse_amount("1.5,3"), None);
        assert_eq!(parse_amount("12,34.5"), None);
        assert_eq!(parse_amount("1.2.3"), None);
    }

    #[test]
    fn loads_decimal_comma_funding() {
        let (table, notices) =
            load("NAME;LATITUDE;LONGITUDE;TOTAL FUNDING\nX;0.5;0.5;1.000,50\n").unwrap();
        assert_eq!(table.companies[0].funding, Some(1000.5));
        assert!(!notices.iter().any(|n| n.message.contains("not numbers")));
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let input = InputBuffer::from_bytes("companies", "LATITUDE§LONGITUDE\n1§2\n");
        let config = MatchingConfig {
            delimiter: Some('§'),
            ..MatchingConfig::default()
        };
        let err = load_companies(&input, &config).unwrap_err();
        assert!(matches!(err, MatchError::InvalidDelimiter('§')));
    }

    #[test]
    fn unparseable_funding_counts_as_missing() {
        let (table, notices) =
            load("LATITUDE,LONGITUDE,TOTAL FUNDING\n1,2,lots\n1,2,10\n").unwrap();
        assert_eq!(table.companies[0].funding, None);
        assert_eq!(table.companies[1].funding, Some(10.0));
        assert!(notices.iter().any(|n| n.message.contains("not numbers")));
    }
}
