use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use reflgen::error::DriverError;
use reflgen::parser::{ParseOptions, TreeSitterParser};
use reflgen::{Driver, EntityExtractor, GenerationOutcome, GeneratorConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "C++ reflection registry generator", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate register_all.cpp if any marked header changed
    Generate(GenerateArgs),
    /// Parse one header and print the extracted registrations as JSON
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Directory scanned recursively for .h/.hpp headers
    #[arg(long)]
    source_root: PathBuf,

    /// Directory receiving register_all.cpp and register_all.h
    #[arg(long)]
    output_dir: PathBuf,

    /// Build cache log; a missing file means "regenerate"
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Include directory forwarded to the parser (repeatable)
    #[arg(short = 'I', long = "include")]
    include_paths: Vec<PathBuf>,

    /// Header declaring the registry API, included by the generated unit
    #[arg(long)]
    registry_header: Option<String>,

    /// Maximum number of headers parsed in parallel
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Header to parse
    file: PathBuf,

    /// Include directory forwarded to the parser (repeatable)
    #[arg(short = 'I', long = "include")]
    include_paths: Vec<PathBuf>,
}

#[derive(Serialize)]
struct InspectErrorOut {
    error: String,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "reflgen=warn",
        1 => "reflgen=info",
        2 => "reflgen=debug",
        _ => "reflgen=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = GeneratorConfig::new(args.source_root, args.output_dir)
        .with_include_paths(args.include_paths);
    if let Some(log) = args.log_path {
        config = config.with_log_path(log);
    }
    if let Some(header) = args.registry_header {
        config = config.with_registry_header(header);
    }
    if let Some(jobs) = args.jobs {
        config = config.with_jobs(jobs);
    }

    let parser = TreeSitterParser::new();
    let driver = Driver::new(config, &parser)?;
    match driver.run().context("generation failed")? {
        GenerationOutcome::Skipped => println!("reflgen: up to date"),
        GenerationOutcome::Regenerated(report) => {
            println!(
                "reflgen: {} types, {} enums from {}/{} headers",
                report.types, report.enums, report.parsed, report.candidates
            );
            for err in &report.failed {
                eprintln!("reflgen: skipped: {err}");
            }
        }
    }
    Ok(())
}

fn inspect(args: InspectArgs) -> ExitCode {
    let parser = TreeSitterParser::new();
    let root = args
        .file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let extractor = EntityExtractor::new(
        &parser,
        ParseOptions {
            include_paths: args.include_paths,
        },
        root,
    );
    match extractor.extract_file(&args.file) {
        Ok(entities) => match serde_json::to_string_pretty(&entities) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("reflgen inspect: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            // keep stdout JSON for callers piping into jq
            let out = InspectErrorOut {
                error: err.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&out) {
                println!("{json}");
            }
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate(args) => match generate(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("reflgen: {err:#}");
                match err.downcast_ref::<DriverError>() {
                    Some(DriverError::Config(_)) => ExitCode::from(2),
                    _ => ExitCode::FAILURE,
                }
            }
        },
        Commands::Inspect(args) => inspect(args),
    }
}
