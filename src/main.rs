use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use feature_matcher::config::{AppConfig, OutputFormat};
use feature_matcher::output::{write_aggregate, write_filtered};
use feature_matcher::types::Notice;
use feature_matcher::Pipeline;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// CSV delimiter; detected from the header line when omitted
    #[arg(short, long, global = true)]
    delimiter: Option<char>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how features in a GeoJSON file are identified
    Inspect {
        /// GeoJSON file with the features
        #[arg(short, long, value_name = "FILE")]
        regions: Option<PathBuf>,
    },
    /// List the companies located within the GeoJSON features
    Filter(RunArgs),
    /// Count companies and sum their funding per feature
    Aggregate(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// GeoJSON file with the features
    #[arg(short, long, value_name = "FILE")]
    regions: Option<PathBuf>,

    /// CSV export with LATITUDE and LONGITUDE columns
    #[arg(short = 'p', long, value_name = "FILE")]
    companies: Option<PathBuf>,

    /// Write the table here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut app_config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(d) = cli.delimiter {
        app_config.matching.delimiter = Some(d);
        app_config.matching.validate()?;
    }

    match cli.command {
        Commands::Inspect { regions } => {
            let regions_path = pick_path(regions, &app_config.input.regions, "--regions")?;
            let pipeline = Pipeline::new(app_config.matching.clone());
            let outcome = pipeline.inspect(open_input(&regions_path)?)?;
            report(&outcome.notices);

            let set = &outcome.regions;
            println!("Features: {}", set.feature_count);
            println!("Polygons: {}", set.regions.len());
            println!("Identifier: {}", set.identifier_source);
            if let Some(crs) = &set.crs {
                println!("CRS: {}", crs);
            }
            if outcome.aggregation_available() {
                println!("Counting and funding per feature: available");
            } else {
                println!("Counting and funding per feature: disabled (no suitable identifier column found)");
            }
        }
        Commands::Filter(args) => {
            let (regions_path, companies_path) = input_paths(&args, &app_config)?;
            let pipeline = Pipeline::new(app_config.matching.clone());
            let outcome = pipeline.filter(open_input(&regions_path)?, open_input(&companies_path)?)?;
            report(&outcome.notices);

            let format = args.format.unwrap_or(app_config.output.format);
            let out = open_output(args.output.as_ref().or(app_config.output.path.as_ref()))?;
            write_filtered(&outcome.matches, format, out)?;
            eprintln!(
                "Input Rows: {}, Output Rows: {}",
                outcome.matches.input_count, outcome.matches.output_count
            );
        }
        Commands::Aggregate(args) => {
            let (regions_path, companies_path) = input_paths(&args, &app_config)?;
            let pipeline = Pipeline::new(app_config.matching.clone());
            let outcome = pipeline.aggregate(open_input(&regions_path)?, open_input(&companies_path)?)?;
            report(&outcome.notices);

            let format = args.format.unwrap_or(app_config.output.format);
            let out = open_output(args.output.as_ref().or(app_config.output.path.as_ref()))?;
            write_aggregate(&outcome.table, format, out)?;
        }
    }

    Ok(())
}

fn report(notices: &[Notice]) {
    for notice in notices {
        eprintln!("{}", notice);
    }
}

fn pick_path(flag: Option<PathBuf>, configured: &Option<PathBuf>, name: &str) -> Result<PathBuf> {
    flag.or_else(|| configured.clone())
        .ok_or_else(|| anyhow!("No input given: pass {} or set it in the config file", name))
}

fn input_paths(args: &RunArgs, config: &AppConfig) -> Result<(PathBuf, PathBuf)> {
    let regions = pick_path(args.regions.clone(), &config.input.regions, "--regions")?;
    let companies = pick_path(args.companies.clone(), &config.input.companies, "--companies")?;
    Ok((regions, companies))
}

fn open_input(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
    Ok(BufReader::new(file))
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}
