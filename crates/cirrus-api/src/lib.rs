pub mod auth;
pub mod error;
pub mod files;
pub mod middleware;
pub mod users;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};

use cirrus_core::auth::AuthService;
use cirrus_core::ledger::FileLedger;

pub struct AppStateInner {
    pub auth: AuthService,
    pub ledger: FileLedger,
    pub cookie_secure: bool,
}

pub type AppState = Arc<AppStateInner>;

/// Full API surface. The binary layers CORS/trace on top.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/verify", post(auth::verify))
        .route("/api/v1/auth/confirm/{code}", get(auth::confirm))
        .route("/api/v1/auth/resend", post(auth::resend))
        .route("/api/v1/auth/init", post(auth::init))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/verify-session", get(auth::verify_session))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/verify-password", post(auth::verify_password))
        .route("/api/v1/auth/update-password", post(auth::update_password))
        .route("/health", get(health));

    let protected = Router::new()
        .route("/api/v1/files/upload", post(files::upload))
        .route("/api/v1/files/upload/content/{file_id}", post(files::upload_content))
        .route("/api/v1/files", get(files::list))
        .route("/api/v1/files/{file_id}", get(files::details))
        .route("/api/v1/files/{file_id}/content", get(files::download))
        .route("/api/v1/files/{file_id}", delete(files::delete))
        .route("/api/v1/files/transfer", post(files::transfer))
        .route("/api/v1/users/profile", get(users::profile))
        .route("/api/v1/users/public-key/email/{email}", get(users::public_key_by_email))
        .route("/api/v1/users/public-key/name/{name}", get(users::public_key_by_name))
        .route("/api/v1/users/delete-files", post(users::delete_files))
        .route("/api/v1/users/delete-account", post(users::delete_account))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
