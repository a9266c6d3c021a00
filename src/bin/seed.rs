//! Wicket Seed - reset a MongoDB database to the default roles and principals
//!
//! Clears every Wicket collection, then inserts the Admin and User roles,
//! the `user.*` and `role.*` permissions and the two demo principals.
//!
//! Usage:
//!   wicket-seed --mongodb-uri mongodb://localhost:27017 --mongodb-db wicket
//!
//! Environment variables:
//!   MONGODB_URI - MongoDB connection URI (default: mongodb://localhost:27017)
//!   MONGODB_DB - Database name (default: wicket)

use bson::oid::ObjectId;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wicket::auth::Argon2Hasher;
use wicket::db::{MongoClient, MongoStore};
use wicket::store::seed::SeedData;

#[derive(Parser, Debug)]
#[command(name = "wicket-seed")]
#[command(about = "Reset a Wicket database to its default seed data")]
#[command(version)]
struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "wicket")]
    mongodb_db: String,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wicket=debug")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Err(e) = seed(&args).await {
        error!("Seeding failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn seed(args: &Args) -> anyhow::Result<()> {
    let client = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
    info!("Connected to {} (db {})", args.mongodb_uri, client.db_name());

    let store = MongoStore::new(&client).await?;
    let data = SeedData::build(&Argon2Hasher, || ObjectId::new().to_hex())?;
    let (roles, permissions, principals) =
        (data.roles.len(), data.permissions.len(), data.principals.len());

    store.reseed(data).await?;

    info!(
        "Seeded {} roles, {} permissions, {} principals",
        roles, permissions, principals
    );
    Ok(())
}
