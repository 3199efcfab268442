//! bookvault server entry point.

use bookvault::{
    config::{Cli, Command, Config},
    crypto,
    db::Database,
    server,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let mut config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.apply_env();

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(&config, Path::new("config.toml"), force),
        Some(Command::Keygen) => {
            println!("{}", crypto::generate_key());
            Ok(())
        }
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => {
            // Default: start server
            cmd_serve(config, None).await
        }
    }
}

/// Write a config file with fresh secrets and create the database the
/// loaded configuration points at.
fn cmd_init(config: &Config, config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let jwt_secret = crypto::generate_key();
    let encryption_key = crypto::generate_key();
    std::fs::write(
        config_path,
        Config::generate_default(&jwt_secret, &encryption_key),
    )?;
    println!("Created config file: {}", config_path.display());

    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nKeep config.toml private: it holds the token secret and file key.");
    println!("Then run: bookvault serve");

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    // Override bind address if specified
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookvault=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    let db = Database::open(&config.database.path)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        files = %config.storage.files_dir.display(),
        covers = %config.storage.covers_dir.display(),
        "Starting bookvault server"
    );

    let bind = config.server.bind;
    let state = server::AppState::new(config, db)?;
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    // Peer addresses feed the per-client rate limits
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_configured_database() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");

        let mut config = Config::default();
        config.apply_overrides(|key| {
            (key == "DATABASE_URL").then(|| format!("sqlite://{}", tmp.path().join("db/vault.db").display()))
        });

        cmd_init(&config, &config_path, false).unwrap();
        assert!(tmp.path().join("db/vault.db").exists());

        let written = Config::load(&config_path).unwrap();
        assert!(written.validate().is_ok());

        assert!(cmd_init(&config, &config_path, false).is_err());
        assert!(cmd_init(&config, &config_path, true).is_ok());
    }
}
