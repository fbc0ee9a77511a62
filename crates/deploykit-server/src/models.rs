//! Request and response bodies for the DeployKit API

use deploykit_store::{CommitAlias, CommitHash, DeploymentEntry, DeploymentId, ProjectName};
use serde::{Deserialize, Serialize};

/// Query string of an upload
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentParams {
    /// Commit to alias the new deployment under
    pub commit_hash: Option<String>,
}

/// Query string of a switch
#[derive(Debug, Deserialize)]
pub struct SwitchCurrentParams {
    pub deployment_id: String,
}

/// Response from an upload
#[derive(Debug, Serialize)]
pub struct CreateDeploymentResponse {
    pub name: ProjectName,
    pub deployment_id: DeploymentId,
    pub commit_hash: Option<CommitHash>,

    /// Compressed bytes received
    pub upload_size: u64,

    /// Decompressed archive bytes
    pub extracted_size: u64,
}

#[derive(Debug, Serialize)]
pub struct DeploymentsListResponse {
    pub name: ProjectName,
    pub deployments: Vec<DeploymentEntry>,
}

#[derive(Debug, Serialize)]
pub struct CommitsListResponse {
    pub name: ProjectName,
    pub commits: Vec<CommitAlias>,
}

/// The live deployment of a project
#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    pub name: ProjectName,
    pub deployment_id: DeploymentId,

    /// Set when the pointer refers to a deleted deployment
    pub dangling: bool,
}

#[derive(Debug, Serialize)]
pub struct DeploymentDeletedResponse {
    pub name: ProjectName,
    pub deployment_id: DeploymentId,
}

#[derive(Debug, Serialize)]
pub struct CommitDeletedResponse {
    pub name: ProjectName,
    pub commit_hash: CommitHash,
}
