//! Standalone migration runner for chat-api.
//!
//! Usage:
//!   cargo run -p chat-api --bin chat-migrate
//!   cargo run -p chat-api --bin chat-migrate -- --revert
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy). Only the
//! `chat_messages` table is managed here; user and friendship tables belong to
//! the web application.

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL env var is required")?;
    let revert = std::env::args().any(|arg| arg == "--revert");

    println!("Connecting to database...");
    let mut conn = PgConnection::establish(&database_url)?;

    if revert {
        let reverted = conn.revert_last_migration(MIGRATIONS)?;
        println!("  Reverted: {reverted}");
        return Ok(());
    }

    println!("Running pending migrations...");
    let applied = conn.run_pending_migrations(MIGRATIONS)?;

    if applied.is_empty() {
        println!("No pending migrations.");
    } else {
        for migration in &applied {
            println!("  Applied: {migration}");
        }
        println!("{} migration(s) applied.", applied.len());
    }
    Ok(())
}
