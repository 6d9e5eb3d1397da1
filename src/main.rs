mod cli;

use agora_core::config::Config;
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tracing_subscriber::EnvFilter;

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    // CLI flags win over the file.
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        "Starting agora {} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.host,
        config.server.port
    );

    agora_server::start(config).await?;
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Session timeout: {}h", config.auth.session_timeout_hours);
    println!("  CORS origins: {}", config.cors.allowed_origins.join(", "));

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid");
    } else {
        println!("Configuration is valid with {} warning(s):", warnings.len());
        for w in &warnings {
            println!("  - {w}");
        }
    }
    Ok(())
}

fn purge_sessions(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db_path = config.server.db_path.to_string_lossy();
    let db = agora_db::pool::init_pool(&db_path)?;
    let removed = agora_server::sweeper::purge_expired_sessions(&db)?;
    println!("Removed {removed} expired session(s) from {db_path}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug for agora crates with --verbose.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("agora=debug,agora_server=debug,agora_db=debug,agora_core=debug,tower_http=debug")
        } else {
            EnvFilter::new("agora=info,agora_server=info,agora_db=info,tower_http=info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::PurgeSessions => purge_sessions(cli.config.as_deref()),
        Commands::Version => {
            println!("agora {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
