//! Millwright - machine and maintenance records behind a directory login

use anyhow::Context;
use clap::{Parser, Subcommand};
use millwright_auth::{LdapConfig, LdapDirectory};
use millwright_core::config::{LoggingConfig, MillwrightConfig};
use millwright_web::WebServer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "millwright")]
#[command(author = "Millwright Team")]
#[command(version = millwright_core::VERSION)]
#[command(about = "Equipment management with LDAP login", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MILLWRIGHT_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, global = true)]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Database URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve,

    /// Bind with the service account and print directory server info
    CheckLdap,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // File first, then MILLWRIGHT_* variables, then flags
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = MillwrightConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => MillwrightConfig::from_env(),
    };

    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Version => {
            println!("millwright {}", millwright_core::VERSION);
        }
        Commands::CheckLdap => {
            check_ldap(&config).await?;
        }
        Commands::Serve => {
            run_server(config).await?;
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn check_ldap(config: &MillwrightConfig) -> anyhow::Result<()> {
    let ldap = LdapConfig::from_section(&config.ldap).context("Invalid LDAP configuration")?;
    let server_url = ldap.server_url.clone();

    let info = LdapDirectory::new(ldap)
        .test_connection()
        .await
        .with_context(|| format!("Directory check against {} failed", server_url))?;

    println!("Connected to {}", server_url);
    println!(
        "Vendor: {} {}",
        info.vendor.as_deref().unwrap_or("unknown"),
        info.version.as_deref().unwrap_or("")
    );
    println!("Naming contexts: {}", info.naming_contexts.join(", "));
    println!("LDAP versions: {}", info.supported_ldap_version.join(", "));

    Ok(())
}

async fn run_server(config: MillwrightConfig) -> anyhow::Result<()> {
    info!("Starting Millwright {}", millwright_core::VERSION);
    info!("Database: {}", config.database.url);

    let server = WebServer::new(config);
    server.run().await?;

    Ok(())
}
