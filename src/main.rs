//! xyzmaps - command-line client for a geospatial data hub

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xyzmaps::config::{resolve_hub_api, ConfigOptions, Settings};
use xyzmaps::payload::collate;
use xyzmaps::space::{SpaceClient, SpaceInfo, UploadOptions};
use xyzmaps::tags::{
    add_datetime_properties, add_datetime_tags, add_tags_to_list, apply_tags, create_unique_id,
    parse_datetime, DateTagSelection,
};
use xyzmaps::{Config, ExecuteError, UploadExecutor};

#[derive(Parser, Debug)]
#[command(name = "xyzmaps")]
#[command(about = "Work with geospatial data hub spaces", version)]
struct Cli {
    /// Hub API root URL (persisted to ~/.xyzcli)
    #[arg(long, global = true, env = "XYZ_HUB_API")]
    hub_api: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Work with Data Hub spaces
    #[command(subcommand, visible_alias = "xs")]
    Space(SpaceCommand),
}

#[derive(Subcommand, Debug)]
enum SpaceCommand {
    /// List spaces
    List,
    /// Create a new space
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Upload GeoJSON features to a space
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Target space id
    space: String,

    /// GeoJSON file (Feature or FeatureCollection)
    #[arg(short, long)]
    file: PathBuf,

    /// Features per request
    #[arg(long)]
    chunk: Option<usize>,

    /// Chunks uploaded in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Tags added to every feature
    #[arg(short, long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Properties whose values become `property@value` tags
    #[arg(long, value_delimiter = ',')]
    tag_props: Vec<String>,

    /// Properties combined into the feature id
    #[arg(long)]
    id: Option<String>,

    /// Date properties to derive tags/properties from
    #[arg(long, value_delimiter = ',')]
    date: Vec<String>,

    /// Date tags to add (year,month,year_month,week,year_week,weekday,hour); all when empty
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    datetag: Option<String>,

    /// Date properties to add; all when empty
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    dateprops: Option<String>,

    /// Retries for server errors per chunk
    #[arg(long)]
    retries: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, results to stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let cli = Cli::parse();

    let settings_path = Settings::default_path();
    let mut settings = settings_path
        .as_deref()
        .map(Settings::load)
        .unwrap_or_default();
    let hub_api = resolve_hub_api(cli.hub_api.as_deref(), &settings);
    if settings.hub_api.as_deref() != Some(hub_api.as_str()) {
        settings.hub_api = Some(hub_api.clone());
        if let Some(path) = &settings_path {
            if let Err(e) = settings.save(path) {
                warn!("{:#}", e);
            }
        }
    }

    let space_scoped = addresses_space(&cli.command);
    let result = match cli.command {
        Command::Space(command) => run_space(hub_api, command).await,
    };

    if let Err(e) = result {
        println!("{}", error_message(&e, space_scoped));
        std::process::exit(1);
    }

    Ok(())
}

/// `RUST_LOG` directives, falling back to `info` so split progress and
/// oversized-feature warnings reach the operator
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

/// Whether the command addresses an existing space by id
fn addresses_space(command: &Command) -> bool {
    matches!(command, Command::Space(SpaceCommand::Upload(_)))
}

fn error_message(error: &anyhow::Error, space_scoped: bool) -> String {
    match error
        .downcast_ref::<ExecuteError>()
        .and_then(ExecuteError::as_api)
    {
        Some(api_error) => api_error.describe(space_scoped),
        None => format!("OPERATION FAILED - {:#}", error),
    }
}

async fn run_space(hub_api: String, command: SpaceCommand) -> Result<()> {
    let options = match &command {
        SpaceCommand::Upload(args) => ConfigOptions {
            retry_budget: args.retries,
            upload_chunk_size: args.chunk,
            upload_concurrency: args.concurrency,
            ..Default::default()
        },
        _ => ConfigOptions::default(),
    };
    let config = Config::new(hub_api, options)?;
    let executor = Arc::new(UploadExecutor::new(config.clone())?);
    let client = SpaceClient::new(executor);

    match command {
        SpaceCommand::List => {
            let spaces = client.list_spaces().await?;
            print_spaces(&spaces);
        }
        SpaceCommand::Create { title, description } => {
            let space = client.create_space(&title, &description).await?;
            println!("xyzspace '{}' created successfully", space.id);
        }
        SpaceCommand::Upload(args) => {
            let features = load_features(&args)?;
            if features.is_empty() {
                return Err(anyhow!("No features found in {:?}", args.file));
            }

            let upload_options = UploadOptions {
                chunk_size: config.upload_chunk_size,
                concurrency: config.upload_concurrency,
            };
            let total = features.len();
            let summary = client
                .upload_features(&args.space, features, &upload_options)
                .await;

            println!(
                "{} of {} features uploaded to xyzspace '{}'",
                summary.uploaded, total, args.space
            );
            if !summary.failed.is_empty() {
                println!("{} features failed:", summary.failed.len());
                for feature in &summary.failed {
                    println!("  {}", feature);
                }
            }
            if summary.failed_chunks > 0 {
                return Err(anyhow!("{} chunks failed to upload", summary.failed_chunks));
            }
        }
    }

    Ok(())
}

/// Read the input file and derive ids and tags for every feature
fn load_features(args: &UploadArgs) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {:?}", args.file))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{:?} is not valid GeoJSON", args.file))?;
    let mut features = collate(vec![value]);
    info!("Loaded {} features from {:?}", features.len(), args.file);

    let date_tags = args
        .datetag
        .as_deref()
        .map(|v| DateTagSelection::parse(Some(v)));
    let date_props = args
        .dateprops
        .as_deref()
        .map(|v| DateTagSelection::parse(Some(v)));

    for feature in &mut features {
        if let Some(id_props) = &args.id {
            let id = create_unique_id(id_props, feature);
            if !id.is_empty() {
                feature["id"] = Value::String(id);
            }
        }

        let mut tags = args.tags.clone();
        for prop in &args.tag_props {
            if let Some(value) = property_string(feature, prop) {
                add_tags_to_list(&value, prop, &mut tags);
            }
        }

        for prop in &args.date {
            let Some(date) = property_string(feature, prop).and_then(|v| parse_datetime(&v))
            else {
                continue;
            };
            if let Some(selection) = &date_tags {
                add_datetime_tags(&date, prop, selection, &mut tags);
            }
            if let Some(selection) = &date_props {
                add_datetime_properties(&date, prop, selection, feature);
            }
        }

        apply_tags(feature, &tags);
    }

    Ok(features)
}

fn property_string(feature: &Value, prop: &str) -> Option<String> {
    match feature.get("properties")?.get(prop)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn print_spaces(spaces: &[SpaceInfo]) {
    if spaces.is_empty() {
        println!("No xyzspace found");
        return;
    }

    let id_width = spaces.iter().map(|s| s.id.len()).max().unwrap_or(0).max(2);
    let title_width = spaces.iter().map(|s| s.title.len()).max().unwrap_or(0).max(5);
    println!(
        "{:<id_width$}  {:<title_width$}  description",
        "id", "title"
    );
    for space in spaces {
        println!(
            "{:<id_width$}  {:<title_width$}  {}",
            space.id,
            space.title,
            space.description.as_deref().unwrap_or("")
        );
    }
}
