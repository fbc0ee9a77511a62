//! DeployKit HTTP API
//!
//! Accepts `tar.zst` site bundles, stores them as immutable deployments and
//! switches which one is live. Storage is handled by `deploykit-store`.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (no authentication)
//! - `GET /projects/{project}/deployments` - List deployments, newest first
//! - `POST /projects/{project}/deployments?commit_hash=` - Upload a bundle
//! - `DELETE /projects/{project}/deployments/{deployment_id}` - Delete a deployment
//! - `GET /projects/{project}/commits` - List commit aliases
//! - `DELETE /projects/{project}/commits/{commit_hash}` - Delete an alias and its deployment
//! - `PATCH /projects/{project}/current?deployment_id=` - Switch the live deployment
//! - `GET /projects/{project}/current` - Show the live deployment

pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get},
    Router,
};
use deploykit_store::{DeploymentStore, Layout, PointerManager};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Application state shared across handlers
pub struct AppState {
    pub deployments: DeploymentStore,
    pub pointers: PointerManager,

    /// Key clients authenticate with
    pub api_key: String,

    /// Cap on listing sizes
    pub max_deployments: usize,

    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Create application state rooted at the configured storage path
    pub fn new(config: &Config) -> Self {
        let layout = Layout::new(&config.app_path);
        Self {
            deployments: DeploymentStore::new(layout.clone()),
            pointers: PointerManager::new(layout),
            api_key: config.api_key.clone(),
            max_deployments: config.max_deployments,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let projects = Router::new()
        .route(
            "/projects/{project}/deployments",
            get(handlers::list_deployments_handler).post(handlers::create_deployment_handler),
        )
        .route(
            "/projects/{project}/deployments/{deployment_id}",
            delete(handlers::delete_deployment_handler),
        )
        .route("/projects/{project}/commits", get(handlers::list_commits_handler))
        .route(
            "/projects/{project}/commits/{commit_hash}",
            delete(handlers::delete_commit_handler),
        )
        .route(
            "/projects/{project}/current",
            get(handlers::get_current_handler).patch(handlers::switch_current_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_handler))
        .merge(projects)
        // Middleware
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
