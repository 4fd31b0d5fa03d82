use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::info;
use tokio_util::sync::CancellationToken;

use hsdp_core::config::GlobalConfig;
use hsdp_core::diagnostics::{Diagnostics, Operation, Severity};
use hsdp_core::provider::{Catalogue, Context};
use hsdp_core::resource::{Record, Value};
use hsdp_core::schema::ResourceSchema;
use hsdp_provider::HsdpMeta;

#[derive(Parser)]
#[command(name = "hsdp")]
#[command(about = "Drive HSDP provider entry points from JSON files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resource and data source types
    Resources,
    /// Show the attribute schema of a type
    Schema {
        /// Resource or data source type (e.g., hsdp_iam_role)
        resource_type: String,
    },
    /// Create the remote entity described by the record
    Create(RecordArgs),
    /// Refresh the record from the remote entity
    Read(RecordArgs),
    /// Bring the remote entity in line with the record
    Update(RecordArgs),
    /// Destroy the remote entity
    Delete(RecordArgs),
    /// Adopt an existing remote entity into the record
    Import {
        /// Remote identifier
        id: String,

        #[command(flatten)]
        args: RecordArgs,
    },
    /// Read a data source
    Data {
        /// Data source type (e.g., hsdp_iam_introspect)
        data_type: String,

        /// Provider configuration file
        #[arg(long, default_value = "provider.json")]
        config: PathBuf,

        /// Data source arguments: {"attributes": {...}}
        #[arg(long)]
        record: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Provider configuration file (JSON object of provider attributes)
    #[arg(long, default_value = "provider.json")]
    config: PathBuf,

    /// Record file: {"type", "id", "prior", "attributes"}
    #[arg(long)]
    record: PathBuf,

    /// Write the resulting record back to the record file
    #[arg(long)]
    write: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let catalogue = hsdp_provider::provider();

    let result = match cli.command {
        Commands::Resources => {
            print_types(&catalogue);
            Ok(true)
        }
        Commands::Schema { resource_type } => run_schema(&catalogue, &resource_type),
        Commands::Create(args) => run_operation(&catalogue, Operation::Create, &args, None).await,
        Commands::Read(args) => run_operation(&catalogue, Operation::Read, &args, None).await,
        Commands::Update(args) => run_operation(&catalogue, Operation::Update, &args, None).await,
        Commands::Delete(args) => run_operation(&catalogue, Operation::Delete, &args, None).await,
        Commands::Import { id, args } => {
            run_operation(&catalogue, Operation::Import, &args, Some(&id)).await
        }
        Commands::Data {
            data_type,
            config,
            record,
        } => run_data(&catalogue, &data_type, &config, record.as_deref()).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn print_types(catalogue: &Catalogue<HsdpMeta>) {
    println!("{}", "Resources:".cyan().bold());
    for name in catalogue.resource_types() {
        println!("  • {}", name);
    }
    println!("{}", "Data sources:".cyan().bold());
    for name in catalogue.data_source_types() {
        println!("  • {}", name);
    }
}

fn run_schema(catalogue: &Catalogue<HsdpMeta>, resource_type: &str) -> Result<bool, String> {
    let schema = catalogue
        .schema(resource_type)
        .ok_or_else(|| format!("Unknown type '{}'", resource_type))?;
    print!("{}", format_schema(&schema));
    Ok(true)
}

fn format_schema(schema: &ResourceSchema) -> String {
    let mut out = schema.resource_type.bold().to_string();
    if let Some(description) = &schema.description {
        out.push_str(&format!(" - {}", description));
    }
    out.push('\n');

    let mut attributes: Vec<_> = schema.attributes.values().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    let width = attributes.iter().map(|a| a.name.len()).max().unwrap_or(0);

    for attr in attributes {
        let mut flags = vec![if attr.required {
            "required"
        } else if attr.computed {
            "computed"
        } else {
            "optional"
        }];
        if attr.force_new {
            flags.push("force_new");
        }
        if attr.sensitive {
            flags.push("sensitive");
        }
        out.push_str(&format!(
            "  {:width$}  {}  {}",
            attr.name,
            attr.attr_type.to_string().cyan(),
            flags.join(", ").dimmed(),
            width = width
        ));
        if !attr.conflicts_with.is_empty() {
            out.push_str(&format!(" (conflicts with {})", attr.conflicts_with.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// Provider attributes from a JSON object file
fn load_config(path: &Path) -> Result<GlobalConfig, String> {
    let json = read_json(path)?;
    let object = json
        .as_object()
        .ok_or_else(|| format!("{} must contain a JSON object", path.display()))?;
    let attributes: HashMap<String, Value> = object
        .iter()
        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
        .collect();
    GlobalConfig::from_attributes(&attributes).map_err(|e| format!("Invalid configuration: {}", e))
}

fn load_record(path: &Path, resource_type: Option<&str>) -> Result<Record, String> {
    let json = read_json(path)?;
    let resource_type = match resource_type {
        Some(t) => t.to_string(),
        None => json
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("{} has no \"type\"", path.display()))?
            .to_string(),
    };
    Ok(Record::from_json(resource_type, &json))
}

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

/// Send log output to the debug sink when configured, stderr otherwise
fn init_logging(debug_log: Option<&str>) -> Result<(), String> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.format_timestamp_millis();
    if let Some(path) = debug_log {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open debug log {}: {}", path, e))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .filter_level(log::LevelFilter::Debug);
    }
    builder.try_init().map_err(|e| e.to_string())
}

async fn connect(config: &Path) -> Result<HsdpMeta, String> {
    let config = load_config(config)?;
    init_logging(config.debug_log.as_deref())?;
    info!(
        "provider configured for {} / {}",
        config.region, config.environment
    );
    HsdpMeta::new(config).map_err(|e| e.to_string())
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    cancel
}

async fn run_operation(
    catalogue: &Catalogue<HsdpMeta>,
    op: Operation,
    args: &RecordArgs,
    import_id: Option<&str>,
) -> Result<bool, String> {
    let mut record = load_record(&args.record, None)?;
    let meta = connect(&args.config).await?;
    let cancel = interrupt_token();

    println!(
        "{}",
        format!("{:?} {}...", op, record.resource_type).cyan()
    );
    let diags = catalogue
        .apply(op, Context::new(&meta, &cancel), &mut record, import_id)
        .await;

    print_diagnostics(&diags);
    print_record(catalogue, &record)?;
    if args.write {
        let json = serde_json::to_string_pretty(&record.to_json()).map_err(|e| e.to_string())?;
        fs::write(&args.record, json + "\n")
            .map_err(|e| format!("Failed to write {}: {}", args.record.display(), e))?;
    }
    Ok(!diags.has_error())
}

async fn run_data(
    catalogue: &Catalogue<HsdpMeta>,
    data_type: &str,
    config: &Path,
    record: Option<&Path>,
) -> Result<bool, String> {
    let mut record = match record {
        Some(path) => load_record(path, Some(data_type))?,
        None => Record::new(data_type),
    };
    let meta = connect(config).await?;
    let cancel = interrupt_token();

    let diags = catalogue
        .read_data_source(Context::new(&meta, &cancel), &mut record)
        .await;

    print_diagnostics(&diags);
    print_record(catalogue, &record)?;
    Ok(!diags.has_error())
}

fn print_diagnostics(diags: &Diagnostics) {
    for diagnostic in diags {
        let label = match diagnostic.severity {
            Severity::Error => "Error:".red().bold(),
            Severity::Warning => "Warning:".yellow().bold(),
        };
        eprintln!("{} {}", label, diagnostic.summary);
        if let Some(detail) = &diagnostic.detail {
            eprintln!("  {}", detail.dimmed());
        }
    }
}

fn print_record(catalogue: &Catalogue<HsdpMeta>, record: &Record) -> Result<(), String> {
    let mut json = record.to_json();
    if let Some(schema) = catalogue.schema(&record.resource_type) {
        mask_sensitive(&schema, &mut json);
    }
    let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

/// Hide top-level sensitive attributes in a record's JSON form
fn mask_sensitive(schema: &ResourceSchema, json: &mut serde_json::Value) {
    for section in ["attributes", "prior"] {
        let Some(map) = json.get_mut(section).and_then(|v| v.as_object_mut()) else {
            continue;
        };
        for name in schema.sensitive_attributes() {
            if let Some(value) = map.get_mut(name) {
                *value = serde_json::Value::String("(sensitive value)".to_string());
            }
        }
    }
}
