//! Wicket - session, permission and presence service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wicket::{
    audit::{AuditLogger, AuditSink, JsonlSink, MongoSink, TracingSink},
    auth::Argon2Hasher,
    config::Args,
    db::{MongoClient, MongoStore},
    server::{self, AppState},
    store::CredentialStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wicket={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Wicket - sessions and presence");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!(
        "Token lifetimes: access {}, refresh {} / {} (remember me)",
        args.access_token_ttl, args.refresh_token_ttl_short, args.refresh_token_ttl_long
    );
    info!("Store timeout: {} ms", args.store_timeout_ms);
    if !args.dev_mode {
        info!("MongoDB: {} (db {})", args.mongodb_uri, args.mongodb_db);
    }
    info!("======================================");

    let mongo = if args.dev_mode {
        None
    } else {
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                Some(client)
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let sink = audit_sink(&args, mongo.as_ref()).await;
    let (audit, _audit_writer) = AuditLogger::spawn_with_timeout(sink, args.store_timeout());

    let state = match mongo {
        Some(client) => {
            let store = Arc::new(MongoStore::new(&client).await?);
            AppState::new(
                args,
                Arc::clone(&store) as Arc<dyn CredentialStore>,
                store,
                Arc::new(Argon2Hasher),
                audit,
            )?
        }
        None => AppState::in_memory(args, audit).await?,
    };

    server::run(Arc::new(state)).await?;
    Ok(())
}

/// JSONL file when configured, else MongoDB, else log lines only
async fn audit_sink(args: &Args, mongo: Option<&MongoClient>) -> Arc<dyn AuditSink> {
    if let Some(path) = &args.audit_log_path {
        match JsonlSink::open(path).await {
            Ok(sink) => {
                info!("Audit trail: {}", path.display());
                return Arc::new(sink);
            }
            Err(e) => warn!("Cannot open audit log {}: {}", path.display(), e),
        }
    }

    if let Some(client) = mongo {
        match MongoSink::new(client).await {
            Ok(sink) => {
                info!("Audit trail: MongoDB audit_logs");
                return Arc::new(sink);
            }
            Err(e) => warn!("MongoDB audit sink unavailable: {}", e),
        }
    }

    info!("Audit trail: log output only");
    Arc::new(TracingSink)
}
