//! odbc-client CLI Entry Point
//!
//! Subcommands:
//! - `drivers` - List installed drivers
//! - `dsn` - List, add, configure and remove data sources, or open the
//!   driver manager's administrator
//! - `browse` - Connect and print the catalog tree
//! - `query` - Connect and run one statement (or script)
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::io::{self, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use odbc_client::config::{self, ClientConfig};
use odbc_client::{
    CatalogTree, ClientError, ConnectedView, ConnectionDialog, ConnectionString, Connector,
    CredentialPolicy, DsnRegistry, ErrorEnvelope, Metadata, QueryExecutor, Result, Scope,
    ScopeFilter, SecretStore, Session, SuccessEnvelope, WindowHandle,
};

/// Driver-manager database client
#[derive(Parser)]
#[command(name = "odbc-client")]
#[command(about = "Connect to databases through the ODBC driver manager, browse catalogs and run SQL")]
#[command(version)]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed drivers
    Drivers,

    /// Manage data sources
    Dsn {
        #[command(subcommand)]
        action: DsnCommand,
    },

    /// Connect and print the catalog tree
    Browse {
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Connect and run a statement
    Query {
        #[command(flatten)]
        connect: ConnectArgs,

        /// Statement text; read from stdin when omitted
        #[arg(long)]
        sql: Option<String>,

        /// Treat the text as a script
        #[arg(long)]
        script: bool,
    },
}

#[derive(Subcommand)]
enum DsnCommand {
    /// List data sources (user before system)
    List {
        #[arg(long, value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,
    },

    /// Register a data source from a connection string
    Add {
        name: String,

        /// Connection string with a `Driver` property
        #[arg(short = 'c', long)]
        connection_string: String,

        /// Stored as `UID`; the password is never stored
        #[arg(short, long)]
        username: Option<String>,

        #[arg(long)]
        system: bool,
    },

    /// Open the driver's setup dialog for a data source
    Configure { name: String },

    /// Remove a data source and its stored credentials
    Remove { name: String },

    /// Open the driver manager's administrator
    Manage,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    User,
    System,
    All,
}

impl From<ScopeArg> for ScopeFilter {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::User => Self::User,
            ScopeArg::System => Self::System,
            ScopeArg::All => Self::All,
        }
    }
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum Backend {
    #[default]
    Odbc,
    Sqlite,
}

#[derive(Args)]
struct ConnectArgs {
    /// Connection string, e.g. `DSN=Sales` or `Driver={SQLite3};Database=app.db`
    #[arg(short = 'c', long)]
    connection_string: String,

    #[arg(long, value_enum, default_value_t)]
    backend: Backend,

    #[arg(short, long)]
    username: Option<String>,

    /// Prefer --prompt-password; command lines end up in shell history
    #[arg(long, conflicts_with = "prompt_password")]
    password: Option<String>,

    /// Ask for the password on the terminal
    #[arg(long)]
    prompt_password: bool,

    /// Register the connection as a user data source under this name
    #[arg(long)]
    save_as: Option<String>,

    /// Do not store the credentials in the OS secret store
    #[arg(long)]
    no_remember: bool,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Drivers => "drivers",
            Self::Dsn { .. } => "dsn",
            Self::Browse { .. } => "browse",
            Self::Query { .. } => "query",
        }
    }
}

/// Successful command result
struct Output {
    data: serde_json::Value,
    meta: Metadata,
}

impl Output {
    fn new(data: impl Serialize, started: Instant) -> Result<Self> {
        let data = serde_json::to_value(data)
            .map_err(|e| ClientError::invalid_input(format!("Could not encode output: {e}")))?;
        Ok(Self { data, meta: Metadata::new(elapsed_ms(started)) })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, config_error) = match config::load_client_config_with_precedence() {
        Ok(config) => (config, None),
        Err(e) => (ClientConfig::default(), Some(e)),
    };
    init_logging(cli.verbose, config.log_filter.as_deref());
    if let Some(e) = config_error {
        warn!(error = %e, "Using default configuration");
    }

    match try_main(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("odbc-client: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main(cli: Cli, config: ClientConfig) -> anyhow::Result<ExitCode> {
    let command = cli.command.name();

    // Prompt before moving to the blocking pool so the terminal stays usable
    let password = match &cli.command {
        Commands::Browse { connect } | Commands::Query { connect, .. }
            if connect.prompt_password =>
        {
            Some(
                dialoguer::Password::new()
                    .with_prompt("Password")
                    .allow_empty_password(true)
                    .interact()
                    .context("Could not read password")?,
            )
        }
        _ => None,
    };

    let outcome = tokio::task::spawn_blocking(move || run(cli.command, &config, password))
        .await
        .context("Command task failed")?;

    let (line, code) = match outcome {
        Ok(output) => (
            serde_json::to_string(&SuccessEnvelope::new(command, output.data, output.meta))?,
            ExitCode::SUCCESS,
        ),
        Err(e) => {
            (serde_json::to_string(&ErrorEnvelope::from_error(command, &e))?, ExitCode::FAILURE)
        }
    };
    println!("{line}");
    Ok(code)
}

fn init_logging(verbose: bool, configured: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("odbc_client=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("warn")))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn run(command: Commands, config: &ClientConfig, password: Option<String>) -> Result<Output> {
    let started = Instant::now();
    let registry = Arc::new(driver_registry());

    match command {
        Commands::Drivers => Output::new(json!({ "drivers": registry.list_drivers() }), started),
        Commands::Dsn { action } => run_dsn(action, registry, config, started),
        Commands::Browse { connect } => {
            let session = build_session(registry, config, connect.backend)?;
            let mut view = open(&session, &connect, config, password)?;

            let tree = CatalogTree::populate(view.connection.as_mut())?;

            let mut output = Output::new(
                json!({
                    "title": view.title,
                    "summary": view.summary,
                    "tree": tree.to_view(),
                    "warnings": view.warnings,
                }),
                started,
            )?;
            output.meta.backend = Some(view.connection.backend().to_string());
            Ok(output)
        }
        Commands::Query { connect, sql, script } => {
            let sql = match sql {
                Some(sql) => sql,
                None => read_stdin()?,
            };
            let session = build_session(registry, config, connect.backend)?;
            let mut view = open(&session, &connect, config, password)?;
            run_query(&mut view, &sql, script, started)
        }
    }
}

fn run_dsn(
    action: DsnCommand,
    registry: Arc<DsnRegistry>,
    config: &ClientConfig,
    started: Instant,
) -> Result<Output> {
    match action {
        DsnCommand::List { scope } => {
            let data_sources = registry.list_data_sources(scope.into());
            Output::new(json!({ "data_sources": data_sources }), started)
        }
        DsnCommand::Add { name, connection_string, username, system } => {
            let parsed = ConnectionString::parse(&connection_string)?;
            let entry = parsed.merge_for_persistence(&name, username.as_deref().unwrap_or(""))?;
            let scope = if system { Scope::System } else { Scope::User };
            registry.add_data_source(WindowHandle::NONE, scope, &entry)?;
            Output::new(
                json!({
                    "name": name,
                    "scope": scope,
                    "driver": entry.driver,
                    "attributes": entry.attributes,
                }),
                started,
            )
        }
        DsnCommand::Configure { name } => {
            build_session(registry, config, Backend::Odbc)?.configure_dsn(&name)?;
            Output::new(json!({ "name": name }), started)
        }
        DsnCommand::Remove { name } => {
            let report = build_session(registry, config, Backend::Odbc)?.remove_dsn(&name)?;
            Output::new(report, started)
        }
        DsnCommand::Manage => {
            let listing = build_session(registry, config, Backend::Odbc)?.open_manager();
            Output::new(listing, started)
        }
    }
}

fn run_query(view: &mut ConnectedView, sql: &str, script: bool, started: Instant) -> Result<Output> {
    let basename = view.settings_basename();
    let backend = view.connection.backend();

    let mut executor = QueryExecutor::new(view.connection.as_mut());
    let outcome = if script { executor.run_script(sql)? } else { executor.run_statement(sql) };

    let mut warnings = std::mem::take(&mut view.warnings);
    if !outcome.failed() {
        if let Err(e) = record_history(&basename, sql) {
            warn!(settings = %basename, error = %e, "History not saved");
            warnings.push(e.message());
        }
    }

    let meta = Metadata::with_rows(elapsed_ms(started), outcome.rows_returned(), outcome.truncated())
        .backend(backend);
    let data = json!({
        "title": view.title,
        "messages": outcome.messages,
        "result": outcome.result,
        "warnings": warnings,
    });
    Ok(Output { data, meta })
}

fn record_history(basename: &str, sql: &str) -> Result<()> {
    let mut settings = config::load_view_settings(basename)?;
    settings.record_statement(sql);
    config::save_view_settings(basename, &settings)
}

fn read_stdin() -> Result<String> {
    let mut sql = String::new();
    io::stdin()
        .read_to_string(&mut sql)
        .map_err(|e| ClientError::invalid_input(format!("Could not read statement from stdin: {e}")))?;
    Ok(sql)
}

/// Fill the connect window model from the arguments and connect
fn open(
    session: &Session,
    args: &ConnectArgs,
    config: &ClientConfig,
    password: Option<String>,
) -> Result<ConnectedView> {
    let parsed = ConnectionString::parse(&args.connection_string)?;
    let mut dialog = ConnectionDialog::new(Arc::clone(session.policy()), Arc::clone(session.store()));
    dialog.set_connection_string(args.connection_string.as_str());

    if let Some(dsn) = parsed.extract_dsn() {
        let listing = session.refresh();
        dialog.refresh_lists(listing.drivers.clone(), listing.data_source_names());
        if dialog.data_sources().iter().any(|name| name == dsn) {
            let effect = dialog.select_data_source(dsn)?;
            debug!(dsn, ?effect, "Data source selected");
        }
    }

    if let Some(username) = &args.username {
        dialog.set_username(username.as_str());
    }
    if let Some(password) = password.or_else(|| args.password.clone()) {
        dialog.set_password(password);
    }
    if let Some(name) = &args.save_as {
        dialog.set_data_source_name(name.as_str());
    }
    dialog.set_remember_credentials(config.remember_credentials && !args.no_remember);

    session.connect(&dialog.connect_request())
}

fn build_session(registry: Arc<DsnRegistry>, config: &ClientConfig, backend: Backend) -> Result<Session> {
    let policy = Arc::new(CredentialPolicy::new(config.credential_namespace.as_str()));
    Ok(Session::new(registry, secret_store(), policy, connector(backend)?))
}

fn connector(backend: Backend) -> Result<Box<dyn Connector>> {
    match backend {
        Backend::Odbc => odbc_connector(),
        Backend::Sqlite => sqlite_connector(),
    }
}

#[cfg(feature = "odbc")]
fn driver_registry() -> DsnRegistry {
    DsnRegistry::new(odbc_client::odbc::OdbcDriverManager)
}

#[cfg(not(feature = "odbc"))]
fn driver_registry() -> DsnRegistry {
    DsnRegistry::new(odbc_client::NoDriverManager)
}

#[cfg(feature = "odbc")]
fn odbc_connector() -> Result<Box<dyn Connector>> {
    Ok(Box::new(odbc_client::odbc::OdbcConnector::new()?))
}

#[cfg(not(feature = "odbc"))]
fn odbc_connector() -> Result<Box<dyn Connector>> {
    Err(ClientError::unsupported("driver manager access requires the 'odbc' feature"))
}

#[cfg(feature = "sqlite")]
fn sqlite_connector() -> Result<Box<dyn Connector>> {
    Ok(Box::new(odbc_client::engine::sqlite::SqliteConnector))
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_connector() -> Result<Box<dyn Connector>> {
    Err(ClientError::unsupported("built without the 'sqlite' feature"))
}

#[cfg(feature = "keyring")]
fn secret_store() -> Arc<dyn SecretStore> {
    Arc::new(odbc_client::credentials::KeyringSecretStore::new())
}

#[cfg(not(feature = "keyring"))]
fn secret_store() -> Arc<dyn SecretStore> {
    Arc::new(odbc_client::MemorySecretStore::new())
}
