use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use struct_layout::{LayoutReport, RecordMetadata, TypeRegistry};
use struct_types::LayoutFile;
use struct_view::{from_json, serialize, to_json, RecordView};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "structc")]
#[command(about = "Binary record layouts - analysis, decoding and encoding")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the computed layout of declared records
    Analyze {
        /// YAML files containing record declarations
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Only show this record
        #[arg(short = 't', long = "type-name")]
        type_name: Option<String>,

        /// Print layouts as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Decode binary data into JSON
    Decode {
        /// YAML files containing record declarations
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Record type to decode
        #[arg(short = 't', long = "type-name", required = true)]
        type_name: String,

        /// Binary data file
        #[arg(short = 'd', long = "data-file", required = true)]
        data_file: PathBuf,

        /// Byte offset of the record within the data file
        #[arg(long = "offset", default_value_t = 0)]
        offset: usize,

        /// Pretty print JSON output
        #[arg(short = 'p', long = "pretty")]
        pretty: bool,
    },

    /// Encode a JSON value into binary data
    Encode {
        /// YAML files containing record declarations
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Record type to encode
        #[arg(short = 't', long = "type-name", required = true)]
        type_name: String,

        /// JSON file holding the record value
        #[arg(short = 'j', long = "json-file", required = true)]
        json_file: PathBuf,

        /// Output file path
        #[arg(short = 'o', long = "output", required = true)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            files,
            type_name,
            json,
        } => {
            print!("{}", run_analyze(&files, type_name.as_deref(), json)?);
        }

        Commands::Decode {
            files,
            type_name,
            data_file,
            offset,
            pretty,
        } => {
            println!("{}", run_decode(&files, &type_name, &data_file, offset, pretty)?);
        }

        Commands::Encode {
            files,
            type_name,
            json_file,
            output,
        } => {
            let written = run_encode(&files, &type_name, &json_file, &output)?;
            println!("Wrote {written} bytes to {}", output.display());
        }
    }

    Ok(())
}

/* Loads every declaration file into one registry and resolves it */
fn load_registry(files: &[PathBuf]) -> anyhow::Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    for file in files {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let decls = LayoutFile::from_yaml_str(&text)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        debug!(file = %file.display(), records = decls.records.len(), "loaded declarations");
        registry
            .add_file(decls)
            .with_context(|| format!("Invalid declarations in {}", file.display()))?;
    }
    registry.resolve_all().context("Type resolution failed")?;
    Ok(registry)
}

fn find_record(registry: &TypeRegistry, type_name: &str) -> anyhow::Result<Arc<RecordMetadata>> {
    registry
        .record(type_name)
        .map(Arc::clone)
        .with_context(|| format!("Unknown record type '{type_name}'"))
}

fn run_analyze(files: &[PathBuf], type_name: Option<&str>, json: bool) -> anyhow::Result<String> {
    let registry = load_registry(files)?;
    let records = match type_name {
        Some(name) => vec![find_record(&registry, name)?],
        None => registry.records().cloned().collect(),
    };
    let reports: Vec<LayoutReport> = records
        .iter()
        .map(|meta| LayoutReport::from_metadata(meta))
        .collect();

    if json {
        return Ok(serde_json::to_string_pretty(&reports)? + "\n");
    }
    let mut out = String::new();
    for report in &reports {
        out.push_str(&report.to_string());
    }
    Ok(out)
}

fn run_decode(
    files: &[PathBuf],
    type_name: &str,
    data_file: &Path,
    offset: usize,
    pretty: bool,
) -> anyhow::Result<String> {
    let registry = load_registry(files)?;
    let meta = find_record(&registry, type_name)?;
    let data = std::fs::read(data_file)
        .with_context(|| format!("Failed to read {}", data_file.display()))?;

    let view = RecordView::at(meta, &data[..], offset)
        .with_context(|| format!("Failed to bind '{type_name}' at offset {offset}"))?;
    let value = view.to_value().context("Failed to decode record")?;
    info!(record = type_name, size = view.size()?, "decoded record");

    let json = to_json(&value);
    let text = if pretty {
        serde_json::to_string_pretty(&json)?
    } else {
        serde_json::to_string(&json)?
    };
    Ok(text)
}

fn run_encode(
    files: &[PathBuf],
    type_name: &str,
    json_file: &Path,
    output: &Path,
) -> anyhow::Result<usize> {
    let registry = load_registry(files)?;
    let meta = find_record(&registry, type_name)?;
    let text = std::fs::read_to_string(json_file)
        .with_context(|| format!("Failed to read {}", json_file.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", json_file.display()))?;

    let value = from_json(&meta, &json).context("JSON does not match the record layout")?;
    let bytes = serialize(&value).context("Failed to encode record")?;
    std::fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(record = type_name, size = bytes.len(), "encoded record");
    Ok(bytes.len())
}
