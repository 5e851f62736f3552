//! query-probe - run read-only SQL against an IoT telemetry database.

use anyhow::Context;
use chrono::Utc;
use iot_query_probe::cli::{Cli, SqlSource};
use iot_query_probe::config::{Config, ConnectionConfig};
use iot_query_probe::db::{self, PgSession};
use iot_query_probe::export::{report_file_stem, timestamped_file_name};
use iot_query_probe::logging;
use iot_query_probe::output::{format_tables, format_values, OutputFormat, ResultOutput};
use iot_query_probe::query::{
    apply_filters, distinct_values, ColumnFilter, QueryProbe, Redactor, DISTINCT_VALUE_LIMIT,
};
use iot_query_probe::ProbeError;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};

fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    logging::init_stderr_logging();

    let cli = Cli::parse_args();
    if let Err(e) = run(&cli) {
        let category = e
            .downcast_ref::<ProbeError>()
            .map(ProbeError::category)
            .unwrap_or("Error");
        eprintln!("{category}: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    cli.validate()?;
    let format = cli.parse_output_format()?;

    // Load configuration file
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_limit_overrides(&mut config.limits);

    let connection = resolve_connection(cli, &config)?.ok_or_else(|| {
        ProbeError::config("No database connection configured. Use --help for usage information.")
    })?;
    let probe = QueryProbe::from_config(&config, Redactor::from_connection(&connection))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        info!("Connecting to {}", connection.display_string());
        let mut session = db::connect(&connection).await?;
        let outcome = execute(cli, &config, &probe, format, &mut session).await;
        if let Err(e) = session.close().await {
            warn!("{}", e);
        }
        outcome
    })
}

async fn execute(
    cli: &Cli,
    config: &Config,
    probe: &QueryProbe,
    format: OutputFormat,
    session: &mut PgSession,
) -> anyhow::Result<()> {
    if cli.tables {
        let tables = probe.list_tables(session).await?;
        info!("Found {} tables", tables.len());
        return write_output(cli.output_file.as_ref(), format_tables(&tables, format)?.as_bytes());
    }

    let sql = match cli.sql_source() {
        Some(source) => read_sql(source)?,
        None => return Err(ProbeError::config("No query given").into()),
    };

    let table = probe.run(&sql, session).await?;
    if let Some(warning) = table.truncation_warning() {
        warn!("{}", warning);
    }

    let filters = ColumnFilter::from_pairs(cli.filter_pairs()?);
    let filtered = apply_filters(&table, &filters)?;
    if filtered.filtered {
        info!("{} of {} rows match the filters", filtered.row_count(), table.row_count());
    }

    if let Some(column) = &cli.distinct {
        let values = distinct_values(&filtered.table, column, DISTINCT_VALUE_LIMIT)?;
        return write_output(cli.output_file.as_ref(), format_values(&values, format)?.as_bytes());
    }

    let output = ResultOutput::new(format, config.limits)
        .with_report(cli.report_name.clone(), cli.description.clone())
        .with_coordinates(cli.lat.clone(), cli.lon.clone())
        .with_chart(cli.chart_spec());
    let bytes = output.render(&filtered)?;

    let target = match (&cli.output_file, format) {
        (Some(path), _) => Some(path.clone()),
        (None, OutputFormat::Xlsx) => Some(PathBuf::from(timestamped_file_name(
            "data_export",
            "xlsx",
            Utc::now(),
        ))),
        (None, OutputFormat::Html) => Some(PathBuf::from(timestamped_file_name(
            &report_file_stem(&output.report().title),
            "html",
            Utc::now(),
        ))),
        (None, _) => None,
    };
    write_output(target.as_ref(), &bytes)
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
fn resolve_connection(cli: &Cli, config: &Config) -> iot_query_probe::Result<Option<ConnectionConfig>> {
    // Start with CLI connection config if provided
    let mut connection = cli.to_connection_config()?;

    // If no CLI connection, try named connection from config
    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(ProbeError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    // If still no connection, try default from config
    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    // Apply environment variable defaults; with nothing configured, the
    // environment alone may describe the connection
    let mut connection = connection.unwrap_or_default();
    connection.apply_env_defaults();

    if connection.database.is_none() && connection.host.is_none() {
        return Ok(None);
    }
    Ok(Some(connection))
}

fn read_sql(source: SqlSource) -> anyhow::Result<String> {
    match source {
        SqlSource::Inline(sql) => Ok(sql),
        SqlSource::Preview(table) => Ok(db::preview_query(&table)),
        SqlSource::File(path) if path == "-" => {
            let mut sql = String::new();
            std::io::stdin()
                .read_to_string(&mut sql)
                .context("Failed to read query from stdin")?;
            Ok(sql)
        }
        SqlSource::File(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read query file {path}"))
        }
    }
}

fn write_output(path: Option<&PathBuf>, bytes: &[u8]) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes).context("Failed to write output")?;
            stdout.flush().context("Failed to write output")?;
        }
    }
    Ok(())
}
