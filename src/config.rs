use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result, bail};

pub const DEFAULT_LATITUDE_COLUMN: &str = "LATITUDE";
pub const DEFAULT_LONGITUDE_COLUMN: &str = "LONGITUDE";
pub const DEFAULT_FUNDING_PREFIX: &str = "TOTAL FUNDING";
pub const DEFAULT_IDENTIFIER_COLUMN: &str = "name";
pub const DEFAULT_FALLBACK_COLUMNS: [&str; 4] = ["OBJECTID", "id", "neighborhood", "area"];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub matching: MatchingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct InputConfig {
    pub regions: Option<PathBuf>,
    pub companies: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    pub latitude_column: String,
    pub longitude_column: String,
    pub funding_prefix: String,
    pub identifier_column: String,
    pub fallback_columns: Vec<String>, // Tried in order when 'name' is missing
    pub delimiter: Option<char>,       // None = sniff from the header line
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            latitude_column: DEFAULT_LATITUDE_COLUMN.to_string(),
            longitude_column: DEFAULT_LONGITUDE_COLUMN.to_string(),
            funding_prefix: DEFAULT_FUNDING_PREFIX.to_string(),
            identifier_column: DEFAULT_IDENTIFIER_COLUMN.to_string(),
            fallback_columns: DEFAULT_FALLBACK_COLUMNS.iter().map(|c| c.to_string()).collect(),
            delimiter: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub path: Option<PathBuf>, // None = stdout
    pub format: OutputFormat,
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.matching.validate()?;
        Ok(config)
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.latitude_column.is_empty() || self.longitude_column.is_empty() {
            bail!("Latitude and longitude column names must not be empty");
        }
        if self.identifier_column.is_empty() {
            bail!("Identifier column name must not be empty");
        }
        if let Some(d) = self.delimiter {
            if !d.is_ascii() || d == '"' || d == '\n' || d == '\r' {
                bail!("Delimiter must be a single ASCII character other than a quote or newline, got {:?}", d);
            }
        }
        Ok(())
    }
}
