//! Admissions CRM daemon
//!
//! Serves the tenant-scoped parents API over HTTP, backed by SQLite.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (data under the platform data dir, port 8000)
//! admissions-crm
//!
//! # Start with custom config
//! admissions-crm --config /path/to/config.toml
//!
//! # Override database location and port
//! CRM_DATABASE_PATH=/data/crm.db CRM_HTTP_PORT=8091 admissions-crm
//! ```

use clap::Parser;
use admissions_crm::services::events::spawn_logging_listener;
use admissions_crm::{Config, HttpServer, ParentDb, Services};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "admissions-crm")]
#[command(about = "Multi-tenant admissions CRM backend")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "CRM_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides data_dir/database_file)
    #[arg(long, env = "CRM_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "CRM_HTTP_PORT")]
    http_port: Option<u16>,

    /// Maximum pooled database connections
    #[arg(long, env = "CRM_POOL_SIZE")]
    pool_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("admissions_crm=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(path) = args.database_path {
        config.database_file = path;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(size) = args.pool_size {
        config.pool_size = size;
    }

    let database_path = config.database_path();
    info!(
        database = %database_path.display(),
        http_port = config.http_port,
        pool_size = config.pool_size,
        "Starting admissions-crm"
    );

    if args.config.is_none() {
        let config_path = config.config_path();
        if !config_path.exists() {
            tokio::fs::create_dir_all(&config.data_dir).await?;
            config.save(&config_path)?;
            info!(path = %config_path.display(), "Created default config");
        }
    }

    let db = Arc::new(ParentDb::open(
        &database_path,
        config.pool_size,
        config.connection_timeout(),
    )?);
    let services = Arc::new(Services::new(db.clone()));
    let listener = spawn_logging_listener(services.events.clone());

    let http_addr = config.bind_addr()?;
    let http_server = Arc::new(HttpServer::new(services, http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("  GET    /health");
    info!("  GET    /api/parents/search?customer_id=..");
    info!("  GET    /api/parents/stats?customer_id=..");
    info!("  POST   /api/parents?customer_id=..");
    info!("  GET|PUT|DELETE /api/parents/{{parent_id}}?customer_id=..");
    info!("  GET|POST /api/parents/{{parent_id}}/children?customer_id=..");
    info!("  GET|POST /api/parents/{{parent_id}}/notes?customer_id=..&user_id=..");
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    let pool = db.pool_state();
    info!(
        connections = pool.connections,
        idle = pool.idle_connections,
        "Database pool at shutdown"
    );

    Ok(())
}
