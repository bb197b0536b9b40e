use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use redb::Database;

use crate::services::analytics::AnalyticsService;
use crate::services::auth::AuthService;
use crate::services::clock::Clock;
use crate::services::i18n::Language;
use crate::services::post_management::PostManager;
use crate::services::stores::{RedbDraftStore, RedbPostStore};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Everything the handlers share, built once at startup.
pub struct AppState {
    pub posts_db: Arc<Database>,
    pub pool: DbPool,
    pub clock: Arc<dyn Clock>,
    pub post_manager: Arc<PostManager>,
    pub auth: AuthService,
    pub analytics: AnalyticsService,
    pub default_language: Language,
}

impl AppState {
    pub fn new(
        posts_db: Arc<Database>,
        pool: DbPool,
        clock: Arc<dyn Clock>,
        hash_cost: u32,
        default_language: Language,
    ) -> Self {
        let post_manager = Arc::new(PostManager::new(
            Arc::new(RedbDraftStore::new(posts_db.clone())),
            Arc::new(RedbPostStore::new(posts_db.clone())),
            clock.clone(),
        ));
        AppState {
            auth: AuthService::new(pool.clone(), hash_cost, clock.clone()),
            analytics: AnalyticsService::new(posts_db.clone(), pool.clone(), clock.clone()),
            posts_db,
            pool,
            clock,
            post_manager,
            default_language,
        }
    }
}

pub mod autosave;
pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod setup;
