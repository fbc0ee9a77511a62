//! API request handlers for DeployKit
//!
//! Path and query parameters are validated into typed identifiers before any
//! storage call. Storage calls block, so they run on tokio's blocking pool.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deploykit_store::{AliasTarget, CommitHash, DeploymentId, Error as StoreError, ProjectName};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::AppState;
use crate::models::{
    CommitDeletedResponse, CommitsListResponse, CreateDeploymentParams, CreateDeploymentResponse,
    CurrentResponse, DeploymentDeletedResponse, DeploymentsListResponse, SwitchCurrentParams,
};

/// Multipart field carrying the compressed archive
const UPLOAD_FIELD: &str = "upload";

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal() -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "detail": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

/// Validation failures are echoed to the caller. Archive and filesystem
/// failures are logged in full and reported without internal detail.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_client_error() {
            warn!(error = %err, "rejected request");
        } else {
            error!(error = ?err, "storage operation failed");
        }

        match err {
            StoreError::Validation { .. } => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: err.to_string(),
            },
            StoreError::Archive(_) => ApiError {
                status: StatusCode::BAD_REQUEST,
                message: "Invalid archive".to_string(),
            },
            StoreError::Extraction { .. } | StoreError::Io(_) => ApiError::internal(),
        }
    }
}

/// Run a blocking storage call off the async executor
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> deploykit_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!(error = %e, "storage task panicked");
            Err(ApiError::internal())
        }
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true
    }))
}

/// List the newest deployments of a project
pub async fn list_deployments_handler(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<DeploymentsListResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;

    let store = state.deployments.clone();
    let limit = state.max_deployments;
    let name = project.clone();
    let deployments = blocking(move || store.list(&project, limit)).await?;

    Ok(Json(DeploymentsListResponse { name, deployments }))
}

/// Upload a new deployment, optionally aliased under a commit hash
pub async fn create_deployment_handler(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<CreateDeploymentParams>,
    mut multipart: Multipart,
) -> Result<Json<CreateDeploymentResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;
    let commit_hash = params
        .commit_hash
        .as_deref()
        .filter(|hash| !hash.is_empty())
        .map(CommitHash::parse)
        .transpose()?;

    let upload = read_upload(&mut multipart).await?;
    info!(project = %project, size = upload.len(), "receiving deployment");

    let deployments = state.deployments.clone();
    let pointers = state.pointers.clone();
    let name = project.clone();
    let record = blocking(move || {
        let record = deployments.create(&project, &upload[..], commit_hash)?;
        if let Some(hash) = &record.commit_hash {
            pointers.alias_commit(&project, hash, &record.deployment_id)?;
        }
        Ok(record)
    })
    .await?;

    for skipped in &record.skipped {
        warn!(
            project = %name,
            deployment_id = %record.deployment_id,
            path = %skipped.path.display(),
            reason = %skipped.reason,
            "archive entry skipped"
        );
    }

    Ok(Json(CreateDeploymentResponse {
        name,
        deployment_id: record.deployment_id,
        commit_hash: record.commit_hash,
        upload_size: record.compressed_size,
        extracted_size: record.extracted_size,
    }))
}

/// Pull the archive bytes out of the multipart body
async fn read_upload(multipart: &mut Multipart) -> Result<axum::body::Bytes, ApiError> {
    let multipart_error = |e: axum::extract::multipart::MultipartError| ApiError {
        status: e.status(),
        message: e.body_text(),
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(UPLOAD_FIELD) {
            return field.bytes().await.map_err(multipart_error);
        }
    }

    Err(ApiError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        message: format!("Missing '{UPLOAD_FIELD}' file field"),
    })
}

/// Delete a single deployment
pub async fn delete_deployment_handler(
    State(state): State<Arc<AppState>>,
    Path((project, deployment_id)): Path<(String, String)>,
) -> Result<Json<DeploymentDeletedResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;
    let deployment_id = DeploymentId::parse(&deployment_id)?;
    info!(project = %project, deployment_id = %deployment_id, "deleting deployment");

    let store = state.deployments.clone();
    let (name, id) = (project.clone(), deployment_id.clone());
    let deleted = blocking(move || store.delete(&project, &deployment_id)).await?;

    if deleted {
        Ok(Json(DeploymentDeletedResponse {
            name,
            deployment_id: id,
        }))
    } else {
        Err(ApiError::not_found("Deployment not found"))
    }
}

/// List commit aliases, most recently aliased first
pub async fn list_commits_handler(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<CommitsListResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;

    let pointers = state.pointers.clone();
    let limit = state.max_deployments;
    let name = project.clone();
    let commits = blocking(move || pointers.list_commits(&project, limit)).await?;

    Ok(Json(CommitsListResponse { name, commits }))
}

/// Delete a commit alias and the deployment it points at
pub async fn delete_commit_handler(
    State(state): State<Arc<AppState>>,
    Path((project, commit_hash)): Path<(String, String)>,
) -> Result<Json<CommitDeletedResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;
    let commit_hash = CommitHash::parse(&commit_hash)?;
    info!(project = %project, commit_hash = %commit_hash, "deleting commit");

    let pointers = state.pointers.clone();
    let (name, hash) = (project.clone(), commit_hash.clone());
    let deleted = blocking(move || pointers.delete_commit(&project, &commit_hash)).await?;

    if deleted {
        Ok(Json(CommitDeletedResponse {
            name,
            commit_hash: hash,
        }))
    } else {
        Err(ApiError::not_found("Commit not found"))
    }
}

/// Point `current` at a deployment
pub async fn switch_current_handler(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<SwitchCurrentParams>,
) -> Result<Json<CurrentResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;
    let deployment_id = DeploymentId::parse(&params.deployment_id)?;
    info!(project = %project, deployment_id = %deployment_id, "switching current deployment");

    let pointers = state.pointers.clone();
    let (name, id) = (project.clone(), deployment_id.clone());
    let switched = blocking(move || pointers.switch_current(&project, &deployment_id)).await?;

    if switched {
        Ok(Json(CurrentResponse {
            name,
            deployment_id: id,
            dangling: false,
        }))
    } else {
        Err(ApiError::not_found("Deployment not found"))
    }
}

/// Report which deployment `current` points at
pub async fn get_current_handler(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<CurrentResponse>, ApiError> {
    let project = ProjectName::parse(&project)?;

    let pointers = state.pointers.clone();
    let name = project.clone();
    let target = blocking(move || pointers.resolve_current(&project)).await?;

    let dangling = matches!(target, AliasTarget::Dangling(_));
    let Some(deployment_id) = target.deployment_id().cloned() else {
        return Err(ApiError::not_found("Current deployment not set"));
    };
    if dangling {
        warn!(project = %name, deployment_id = %deployment_id, "current points at a deleted deployment");
    }

    Ok(Json(CurrentResponse {
        name,
        deployment_id,
        dangling,
    }))
}
