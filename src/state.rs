use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::db;
use crate::feed::FeedHub;
use crate::storage::{BlobStore, LocalBlobStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub blobs: Arc<dyn BlobStore>,
    pub feed: FeedHub,
}

impl AppState {
    /// Open the database, apply migrations and prepare blob storage.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;

        let blobs = LocalBlobStore::open(config.media_path())?;
        let feed = FeedHub::new(config.feed.channel_capacity);

        Ok(Self {
            db: pool,
            config,
            blobs: Arc::new(blobs),
            feed,
        })
    }
}
