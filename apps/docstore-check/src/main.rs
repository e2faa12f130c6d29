use anyhow::{Context, Result};
use clap::Parser;
use docstore::connection::redact_connection_string;
use docstore::{
    BootstrapOutcome, Bootstrapper, ConnectionSource, DocumentStore, HttpStoreFactory,
    PersistenceOptions, SessionFactory, UnitOfWork,
};
use hostkit::{AppConfig, ClientHub, section_or_default};
use std::path::PathBuf;

/// Endpoint name used when neither the CLI nor the config names one.
const DEFAULT_ENDPOINT: &str = "docstore-check";

/// Config section holding [`PersistenceOptions`].
const PERSISTENCE_SECTION: &str = "persistence";

/// Resolve, bootstrap and probe document-store persistence
#[derive(Parser)]
#[command(name = "docstore-check")]
#[command(about = "Resolve, bootstrap and probe document-store persistence")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use this connection string verbatim
    #[arg(long, conflicts_with = "connection_string_name")]
    connection_string: Option<String>,

    /// Look the connection string up by name in the configuration
    #[arg(long)]
    connection_string_name: Option<String>,

    /// Database to use, overriding the connection string
    #[arg(long)]
    database: Option<String>,

    /// Endpoint name; the default database name when no connection string is found
    #[arg(long)]
    endpoint: Option<String>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn connection_source(&self) -> ConnectionSource {
        match (&self.connection_string, &self.connection_string_name) {
            (Some(s), _) => ConnectionSource::Explicit(s.clone()),
            (None, Some(name)) => ConnectionSource::Named(name.clone()),
            (None, None) => ConnectionSource::Default,
        }
    }
}

/// Copy of `config` with connection-string passwords masked.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    for value in shown.connection_strings.values_mut() {
        *value = redact_connection_string(value);
    }
    shown
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layered config: defaults -> YAML (if provided) -> env (APP__*)
    let config = AppConfig::load(cli.config.as_deref())?;
    hostkit::init_logging(&config.logging, cli.verbose);

    if cli.print_config {
        println!("{}", redacted(&config).to_pretty_json()?);
        return Ok(());
    }

    let mut options: PersistenceOptions = section_or_default(&config, PERSISTENCE_SECTION)?;
    if let Some(endpoint) = &cli.endpoint {
        options.endpoint_name = Some(endpoint.clone());
    }
    let settings = options.into_settings(DEFAULT_ENDPOINT);
    tracing::debug!(?settings, "persistence settings");

    let hub = ClientHub::new();
    let outcome = Bootstrapper::new(&settings, &config, HttpStoreFactory::default())
        .configure(&hub, &cli.connection_source(), cli.database.as_deref())
        .context("persistence bootstrap failed")?;

    match outcome {
        BootstrapOutcome::Registered { store, reachable } => {
            println!("store:     {}", store.configuration());
            println!("reachable: {}", if reachable { "yes" } else { "no" });
        }
        BootstrapOutcome::AlreadyConfigured => println!("persistence already configured"),
    }

    hub.get::<dyn DocumentStore>()?;
    hub.get::<SessionFactory>()?;
    hub.get::<UnitOfWork>()?;
    println!("registered: DocumentStore (singleton), SessionFactory (singleton), UnitOfWork (per call)");
    Ok(())
}
