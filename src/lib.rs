pub mod analytics;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod database;
pub mod error;
pub mod features;
pub mod forms;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod prediction;
pub mod views;

use crate::auth::{PasswordHasher, SessionStore};
use crate::config::Config;
use crate::database::Database;
use crate::prediction::PredictionService;

pub use crate::error::{AppError, AppResult};
pub use crate::handlers::configure;

/// Shared by every worker; handlers receive it as `web::Data<AppState>`.
#[derive(Debug)]
pub struct AppState {
    pub db: Database,
    pub predictor: PredictionService,
    pub sessions: SessionStore,
    pub hasher: PasswordHasher,
}

impl AppState {
    pub fn new(db: Database, predictor: PredictionService, config: &Config) -> Self {
        Self {
            db,
            predictor,
            sessions: SessionStore::new(config.session_cookie_secure),
            hasher: PasswordHasher::new(config.bcrypt_cost),
        }
    }
}
