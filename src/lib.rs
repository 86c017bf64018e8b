pub mod api;
pub mod db;
pub mod docs;
pub mod models;
pub mod reconcile;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub mp_access_token: String,
    pub mp_webhook_secret: String,
}
