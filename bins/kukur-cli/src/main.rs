//! `kukur`: serve the Flight server, exercise a configured source from the
//! command line, and manage API keys. Grounded in `kukur/cli.py`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use kukur_app::Kukur;
use kukur_core::{KukurError, Metadata, Result, SearchResult, SeriesSelector};
use kukur_registry::{AdapterContext, BuiltSource, SourceRegistryBuilder};

#[derive(Parser)]
#[command(name = "kukur", about = "Start Kukur, or test a configured source")]
struct Cli {
    #[arg(long = "config-file", default_value = "Kukur.toml")]
    config_file: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Enable the Arrow Flight interface (the default).
    Serve,
    /// Test data source connectivity.
    Test {
        #[command(subcommand)]
        action: TestCommand,
    },
    /// Create, revoke, or list API keys for the Arrow Flight interface.
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyCommand,
    },
}

#[derive(Subcommand)]
enum TestCommand {
    /// List all time series in the source.
    Search {
        #[arg(long)]
        source: String,
    },
    /// Display metadata for one time series.
    Metadata {
        #[arg(long)]
        source: String,
        #[arg(long)]
        name: String,
    },
    /// Display data for one time series.
    Data {
        #[arg(long)]
        source: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
    },
    /// Display plot (interval-aggregated) data for one time series.
    Plot {
        #[arg(long)]
        source: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        start: DateTime<Utc>,
        #[arg(long)]
        end: DateTime<Utc>,
        #[arg(long = "interval-count")]
        interval_count: usize,
    },
}

#[derive(Subcommand)]
enum ApiKeyCommand {
    /// Create an api key.
    Create {
        #[arg(long)]
        name: String,
    },
    /// Revoke an api key.
    Revoke {
        #[arg(long)]
        name: String,
    },
    /// List all api keys.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = kukur_app::from_toml(&cli.config_file)?;
    let _logging_guard = kukur_app::configure_logging(&config);

    let app = Arc::new(Kukur::new(&config, &builtin_registry())?);

    match cli.command {
        Some(Command::Test { action }) => run_test(&app, action).await?,
        Some(Command::ApiKey { action }) => run_api_key(&app, action)?,
        Some(Command::Serve) | None => kukur_flight::serve(&config, app).await?,
    }

    Ok(())
}

/// The CLI's one built-in adapter factory: an in-memory fixture source
/// registered under type `"memory"`, for exercising the dispatcher and the
/// Flight surface without a real backend.
fn builtin_registry() -> SourceRegistryBuilder {
    let mut builder = SourceRegistryBuilder::new();
    builder.register_source_type(
        "memory",
        Arc::new(|_ctx: &AdapterContext| {
            let source = Arc::new(kukur_testsource::MemorySource::new());
            Ok(BuiltSource {
                data: source.clone(),
                metadata: source,
            })
        }),
    );
    builder
}

async fn run_test(app: &Kukur, action: TestCommand) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());

    match action {
        TestCommand::Search { source } => {
            tracing::info!(%source, "searching for time series");
            let selector = SeriesSelector::for_source(&source);
            let mut stream = app.search(&selector)?;
            let mut header_written = false;
            while let Some(result) = stream.next().await {
                match result? {
                    SearchResult::Selector(series) => {
                        if !header_written {
                            writer.write_record(["series name"])?;
                            header_written = true;
                        }
                        writer.write_record([series_name(&series)])?;
                    }
                    SearchResult::Metadata(metadata) => {
                        if !header_written {
                            writer.write_record(metadata_header(&metadata))?;
                            header_written = true;
                        }
                        writer.write_record(metadata_row(&metadata))?;
                    }
                }
            }
        }
        TestCommand::Metadata { source, name } => {
            tracing::info!(%source, %name, "requesting metadata");
            let selector = SeriesSelector::new(&source, &name);
            let metadata = app.get_metadata(&selector).await?;
            writer.write_record(metadata_header(&metadata))?;
            writer.write_record(metadata_row(&metadata))?;
        }
        TestCommand::Data { source, name, start, end } => {
            tracing::info!(%source, %name, %start, %end, "requesting data");
            let selector = SeriesSelector::new(&source, &name);
            let batch = app.get_data(&selector, start, end).await?;
            write_table(&mut writer, &batch)?;
        }
        TestCommand::Plot { source, name, start, end, interval_count } => {
            tracing::info!(%source, %name, %start, %end, interval_count, "requesting plot data");
            let selector = SeriesSelector::new(&source, &name);
            match app.get_plot_data(&selector, start, end, interval_count).await {
                Ok(batch) => write_table(&mut writer, &batch)?,
                Err(KukurError::NotSupported(msg)) => {
                    tracing::warn!(%source, %msg, "plot data not supported by source");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    writer.flush()?;
    Ok(())
}

fn run_api_key(app: &Kukur, action: ApiKeyCommand) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    let api_keys = app.api_keys();

    match action {
        ApiKeyCommand::Create { name } => {
            let key = api_keys.create(&name)?;
            writer.write_record([key])?;
        }
        ApiKeyCommand::Revoke { name } => {
            api_keys.revoke(&name)?;
        }
        ApiKeyCommand::List => {
            for record in api_keys.list()? {
                writer.write_record([record.name, record.creation_date.to_rfc3339()])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

fn series_name(selector: &SeriesSelector) -> String {
    selector
        .tags
        .get(kukur_core::SERIES_NAME_TAG)
        .cloned()
        .unwrap_or_default()
}

/// `["series name", <field>, ...]`, reusing the wire field order from
/// [`Metadata::to_data`] (dropping the `series` envelope, which the CSV
/// output replaces with the bare series name column).
fn metadata_header(metadata: &Metadata) -> Vec<String> {
    let mut header = vec!["series name".to_string()];
    if let serde_json::Value::Object(map) = metadata.to_data() {
        header.extend(map.keys().filter(|k| *k != "series").cloned());
    }
    header
}

fn metadata_row(metadata: &Metadata) -> Vec<String> {
    let mut row = vec![series_name(&metadata.series)];
    if let serde_json::Value::Object(map) = metadata.to_data() {
        for (key, value) in map {
            if key == "series" {
                continue;
            }
            row.push(json_cell(&value));
        }
    }
    row
}

fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => value.to_string(),
        other => other.to_string(),
    }
}

fn write_table(
    writer: &mut csv::Writer<std::io::Stdout>,
    batch: &arrow_array::RecordBatch,
) -> Result<()> {
    use arrow_array::cast::AsArray;
    use arrow_array::types::TimestampMicrosecondType;

    let with_quality = batch.schema().column_with_name("quality").is_some();
    let ts = batch
        .column_by_name("ts")
        .expect("data/plot batches always carry a ts column")
        .as_primitive::<TimestampMicrosecondType>();
    let value_column = batch
        .column_by_name("value")
        .expect("data/plot batches always carry a value column");

    for row in 0..batch.num_rows() {
        let timestamp = DateTime::<Utc>::from_timestamp_micros(ts.value(row))
            .unwrap_or_default()
            .to_rfc3339();
        let value = arrow_scalar_cell(value_column, row);
        if with_quality {
            let quality = batch
                .column_by_name("quality")
                .unwrap()
                .as_primitive::<arrow_array::types::Int8Type>()
                .value(row);
            writer
                .write_record([timestamp, value, quality.to_string()])
                .map_err(|e| KukurError::InvalidData(e.to_string()))?;
        } else {
            writer
                .write_record([timestamp, value])
                .map_err(|e| KukurError::InvalidData(e.to_string()))?;
        }
    }
    Ok(())
}

fn arrow_scalar_cell(column: &dyn arrow_array::Array, row: usize) -> String {
    use arrow_array::cast::AsArray;
    use arrow_schema::DataType;

    if column.is_null(row) {
        return String::new();
    }
    match column.data_type() {
        DataType::Float64 => column.as_primitive::<arrow_array::types::Float64Type>().value(row).to_string(),
        DataType::Float32 => column.as_primitive::<arrow_array::types::Float32Type>().value(row).to_string(),
        DataType::Int64 => column.as_primitive::<arrow_array::types::Int64Type>().value(row).to_string(),
        DataType::Utf8 => column.as_string::<i32>().value(row).to_string(),
        DataType::Boolean => column.as_boolean().value(row).to_string(),
        other => format!("<unsupported value type {other:?}>"),
    }
}
