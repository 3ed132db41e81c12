//! dbhelper - Main entry point.
//!
//! Command line front end for the named-database access layer: lists the
//! configured databases, checks connectivity and runs atomic batch files.

use clap::Parser;
use dbhelper::config::{CliCommand, Config, DEFAULT_DETAIL_FILE};
use dbhelper::db::{SQLITE_PROVIDER, registry::DEFAULT_CONFIG_FILE};
use dbhelper::models::{
    BatchCommand, ConfigFileEntry, DatabaseEntry, DatabaseType, generate_config_file,
    generate_detail_file,
};
use dbhelper::{DbContext, DbError};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays parseable.
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    info!(
        config = %config.config.display(),
        "Starting dbhelper v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_configuration() {
                error!(error = %e, config = %config.config.display(), "Configuration error");
            } else {
                error!(error = %e, "Command failed");
            }
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), DbError> {
    if let CliCommand::Init { dir, force } = &config.command {
        return init(dir, *force);
    }

    let ctx = DbContext::new(config.context_options())?;
    match &config.command {
        CliCommand::List => list(&ctx),
        CliCommand::Check { name } => check(&ctx, name),
        CliCommand::Batch { name, file } => batch(&ctx, name, file),
        CliCommand::Init { .. } => Ok(()),
    }
}

fn list(ctx: &DbContext) -> Result<(), DbError> {
    let databases = ctx.databases()?;
    if let Ok(path) = ctx.config().detail_path() {
        println!("# {}", path.display());
    }
    if databases.is_empty() {
        println!("(no databases configured)");
        return Ok(());
    }

    let width = databases.iter().map(|d| d.name.len()).max().unwrap_or(4).max(4);
    println!("{:<width$}  {:<10}  {:<14}  CONNECTION", "NAME", "TYPE", "PROVIDER");
    for db in databases {
        println!(
            "{:<width$}  {:<10}  {:<14}  {}",
            db.name,
            db.database_type.to_string(),
            db.provider,
            db.masked_connection_string()
        );
        if !db.description.is_empty() {
            println!("{:<width$}  {}", "", db.description);
        }
    }
    Ok(())
}

fn check(ctx: &DbContext, name: &str) -> Result<(), DbError> {
    let start = Instant::now();
    let mut session = ctx.session(name)?;
    session.open()?;
    let value = session.execute_scalar("SELECT 1")?;
    session.close()?;

    let ok = value.and_then(|v| v.as_i64()) == Some(1);
    println!(
        "{}: {} ({} ms)",
        name,
        if ok { "ok" } else { "unexpected reply" },
        start.elapsed().as_millis()
    );
    if ok {
        Ok(())
    } else {
        Err(DbError::execution("SELECT 1 did not return 1", None))
    }
}

fn batch(ctx: &DbContext, name: &str, file: &Path) -> Result<(), DbError> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| DbError::invalid_config(file, format!("cannot read batch file: {}", e)))?;
    let mut commands: Vec<BatchCommand> =
        serde_json::from_str(&text).map_err(|e| DbError::invalid_config(file, e.to_string()))?;

    let summary = ctx.run_batch(name, &mut commands)?;
    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|e| DbError::execution(format!("cannot render summary: {}", e), None))?;
    println!("{}", rendered);
    Ok(())
}

fn init(dir: &Path, force: bool) -> Result<(), DbError> {
    let config_path = dir.join(DEFAULT_CONFIG_FILE);
    let detail_path = dir.join(DEFAULT_DETAIL_FILE);
    for path in [&config_path, &detail_path] {
        if path.exists() && !force {
            return Err(DbError::invalid_config(
                path,
                "file already exists (use --force to overwrite)",
            ));
        }
    }

    let config = generate_config_file(&[ConfigFileEntry::new(DEFAULT_DETAIL_FILE, true)
        .with_description("Active database list")])
    .map_err(|e| DbError::invalid_config(&config_path, e.to_string()))?;
    let detail = generate_detail_file(&[DatabaseEntry::new(
        "Main",
        DatabaseType::SQLite,
        SQLITE_PROVIDER,
        "sqlite:main.db",
    )
    .with_description("Local SQLite database")])
    .map_err(|e| DbError::invalid_config(&detail_path, e.to_string()))?;

    std::fs::create_dir_all(dir)
        .map_err(|e| DbError::invalid_config(dir, format!("cannot create directory: {}", e)))?;
    for (path, text) in [(&config_path, config), (&detail_path, detail)] {
        std::fs::write(path, text)
            .map_err(|e| DbError::invalid_config(path, format!("cannot write file: {}", e)))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
