pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::messages::{MessageStore, PgMessageStore};
use db::pool::DbPool;
use db::users::{PgUserDirectory, UserDirectory};
use gateway::registry::RoomRegistry;

/// Shared application state available to all route handlers and chat sessions.
#[derive(Clone)]
pub struct AppState {
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserDirectory>,
    pub rooms: Arc<RoomRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// State backed by PostgreSQL.
    pub fn postgres(pool: DbPool, config: Config) -> Self {
        Self {
            messages: Arc::new(PgMessageStore::new(pool.clone(), config.worker_id)),
            users: Arc::new(PgUserDirectory::new(pool)),
            rooms: Arc::new(RoomRegistry::new()),
            config: Arc::new(config),
        }
    }
}
