use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::market::repository::{
    AdRepository, CommentRepository, SqliteAdRepository, SqliteCommentRepository,
    SqliteUserRepository, UserRepository,
};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub ads: Arc<dyn AdRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        Self {
            ads: Arc::new(SqliteAdRepository::new(db.clone())),
            comments: Arc::new(SqliteCommentRepository::new(db.clone())),
            users: Arc::new(SqliteUserRepository::new(db.clone())),
            db,
            config,
        }
    }
}
