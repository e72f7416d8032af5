//! binform: parse a binary file against a declarative format schema
//!
//! Data goes to stdout (or -o <file>); progress and diagnostics go to
//! stderr. Exit codes: 0 success, 1 general error, 2 usage error,
//! 3 schema validation error.

mod output;

use std::fs::File;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use format_lang::{Error, FormatEngine, ParseOptions, Value};
use memmap2::Mmap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

/// Parse binary files against declarative format schemas.
#[derive(Parser)]
#[command(
    name = "binform",
    version,
    disable_version_flag = true,
    about = "Parse binary files against declarative format schemas"
)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Path to the schema document
    schema: Option<PathBuf>,

    /// Path to the binary input file
    input: Option<PathBuf>,

    /// Output path (stdout when omitted)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Pretty-print the output (default when writing to stdout)
    #[arg(long = "pretty", overrides_with = "no_pretty")]
    pretty: bool,

    /// Force compact output
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "json")]
    format: OutputFormat,

    /// Extract a single subtree by dotted path (e.g. header.entries.0.name)
    #[arg(long = "field")]
    field: Option<String>,

    /// Skip schema validation
    #[arg(long = "no-validate")]
    no_validate: bool,

    /// Treat schema validation warnings as errors
    #[arg(long)]
    strict: bool,

    /// Suppress progress output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

struct RunError {
    code: i32,
    message: String,
}

impl RunError {
    fn general(message: impl ToString) -> Self {
        Self {
            code: 1,
            message: message.to_string(),
        }
    }
}

impl From<Error> for RunError {
    fn from(e: Error) -> Self {
        // the validation kind maps to its own exit code for tooling
        let code = match e {
            Error::Validation(_) => 3,
            _ => 1,
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("binform {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    let (schema_path, input_path) = match (cli.schema.clone(), cli.input.clone()) {
        (Some(schema), Some(input)) => (schema, input),
        _ => {
            eprintln!("error: expected <SCHEMA> and <INPUT> arguments; see --help");
            process::exit(2);
        }
    };

    let filter = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(&cli, &schema_path, &input_path) {
        if !e.message.is_empty() {
            eprintln!("error: {}", e.message);
        }
        process::exit(e.code);
    }
}

fn run(cli: &Cli, schema_path: &Path, input_path: &Path) -> Result<(), RunError> {
    let schema_source = std::fs::read_to_string(schema_path)
        .map_err(|e| RunError::general(format!("cannot read {}: {}", schema_path.display(), e)))?;

    let file = File::open(input_path)
        .map_err(|e| RunError::general(format!("cannot open {}: {}", input_path.display(), e)))?;
    let metadata = file
        .metadata()
        .map_err(|e| RunError::general(format!("cannot stat {}: {}", input_path.display(), e)))?;
    // an empty file cannot be mapped
    let mapped;
    let data: &[u8] = if metadata.len() == 0 {
        &[]
    } else {
        mapped = unsafe { Mmap::map(&file) }.map_err(|e| {
            RunError::general(format!("cannot map {}: {}", input_path.display(), e))
        })?;
        &mapped
    };

    let engine = FormatEngine::new();

    if !cli.no_validate {
        let report = engine.validate(&schema_source, cli.strict)?;
        for warning in &report.warnings {
            tracing::warn!("schema warning: {}", warning);
        }
        if !report.valid {
            for error in &report.errors {
                eprintln!("schema error: {}", error);
            }
            return Err(RunError {
                code: 3,
                message: format!(
                    "schema validation failed with {} error(s)",
                    report.errors.len()
                ),
            });
        }
        info!("schema validated: {}", schema_path.display());
    }

    info!("parsing {} ({} bytes)", input_path.display(), data.len());
    let options = ParseOptions {
        validate: false, // already validated above (or skipped on request)
        strict: cli.strict,
    };
    let tree = engine.parse(&schema_source, data, &options)?;

    let tree = match &cli.field {
        Some(path) => extract_field(tree, path)?,
        None => tree,
    };

    let rendered = render(&tree, cli)?;
    match &cli.output {
        Some(path) => {
            let mut out = File::create(path).map_err(|e| {
                RunError::general(format!("cannot create {}: {}", path.display(), e))
            })?;
            out.write_all(rendered.as_bytes())
                .and_then(|_| out.write_all(b"\n"))
                .map_err(|e| {
                    RunError::general(format!("cannot write {}: {}", path.display(), e))
                })?;
            info!("wrote {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Walk a dotted path: object members by name, sequence elements by index.
fn extract_field(tree: Value, path: &str) -> Result<Value, RunError> {
    let mut current = tree;
    for component in path.split('.') {
        current = match component.parse::<usize>() {
            Ok(index) => current.at(index),
            Err(_) => current.get(component),
        }
        .map_err(|e| RunError::general(format!("--field {}: {}", path, e)))?;
    }
    Ok(current)
}

fn render(tree: &Value, cli: &Cli) -> Result<String, RunError> {
    let json = output::to_json(tree)?;
    let pretty = !cli.no_pretty
        && (cli.pretty || (cli.output.is_none() && std::io::stdout().is_terminal()));
    match cli.format {
        OutputFormat::Json => {
            let rendered = if pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            rendered.map_err(|e| RunError::general(format!("cannot render JSON: {}", e)))
        }
        OutputFormat::Yaml => serde_yaml::to_string(&json)
            .map(|s| s.trim_end().to_string())
            .map_err(|e| RunError::general(format!("cannot render YAML: {}", e))),
    }
}
