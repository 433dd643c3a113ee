//! Actor kinds and their documented minimal action sets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who is acting against the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// The CI pipeline driving build and deploy.
    Pipeline,
    /// The build agent producing artifacts.
    Build,
    /// The deployment service acting for the stack.
    Deploy,
    /// The running workload on a compute target.
    Compute,
}

impl ActorKind {
    pub const ALL: [ActorKind; 4] = [
        ActorKind::Pipeline,
        ActorKind::Build,
        ActorKind::Deploy,
        ActorKind::Compute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Pipeline => "pipeline",
            ActorKind::Build => "build",
            ActorKind::Deploy => "deploy",
            ActorKind::Compute => "compute",
        }
    }

    /// Resource kind segment for this actor's role name.
    pub fn role_kind(&self) -> &'static str {
        match self {
            ActorKind::Pipeline => "pipeline-role",
            ActorKind::Build => "build-role",
            ActorKind::Deploy => "deploy-role",
            ActorKind::Compute => "compute-role",
        }
    }

    /// Service principal allowed to assume the role.
    pub fn service_principal(&self) -> &'static str {
        match self {
            ActorKind::Pipeline => "codepipeline.amazonaws.com",
            ActorKind::Build => "codebuild.amazonaws.com",
            ActorKind::Deploy => "codedeploy.amazonaws.com",
            ActorKind::Compute => "ec2.amazonaws.com",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActorKind::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown actor kind {s:?} (expected pipeline, build, deploy or compute)"))
    }
}

pub const S3_GET_OBJECT: &str = "s3:GetObject";
pub const S3_GET_OBJECT_VERSION: &str = "s3:GetObjectVersion";
pub const S3_PUT_OBJECT: &str = "s3:PutObject";
pub const S3_LIST_BUCKET: &str = "s3:ListBucket";
pub const S3_GET_BUCKET_VERSIONING: &str = "s3:GetBucketVersioning";

pub const CODEBUILD_START_BUILD: &str = "codebuild:StartBuild";
pub const CODEBUILD_BATCH_GET_BUILDS: &str = "codebuild:BatchGetBuilds";

pub const CODEDEPLOY_CREATE_DEPLOYMENT: &str = "codedeploy:CreateDeployment";
pub const CODEDEPLOY_GET_DEPLOYMENT: &str = "codedeploy:GetDeployment";
pub const CODEDEPLOY_LIST_DEPLOYMENTS: &str = "codedeploy:ListDeployments";
pub const CODEDEPLOY_GET_DEPLOYMENT_CONFIG: &str = "codedeploy:GetDeploymentConfig";
pub const CODEDEPLOY_GET_APPLICATION_REVISION: &str = "codedeploy:GetApplicationRevision";
pub const CODEDEPLOY_REGISTER_APPLICATION_REVISION: &str = "codedeploy:RegisterApplicationRevision";

pub const LOGS_CREATE_LOG_GROUP: &str = "logs:CreateLogGroup";
pub const LOGS_CREATE_LOG_STREAM: &str = "logs:CreateLogStream";
pub const LOGS_PUT_LOG_EVENTS: &str = "logs:PutLogEvents";

pub const AGENT_GET_DEPLOYMENT_SPECIFICATION: &str =
    "codedeploy-commands-secure:GetDeploymentSpecification";
pub const AGENT_POLL_HOST_COMMAND: &str = "codedeploy-commands-secure:PollHostCommand";
pub const AGENT_PUT_HOST_COMMAND_ACKNOWLEDGEMENT: &str =
    "codedeploy-commands-secure:PutHostCommandAcknowledgement";
pub const AGENT_PUT_HOST_COMMAND_COMPLETE: &str =
    "codedeploy-commands-secure:PutHostCommandComplete";

/// Every action an actor may ever be granted.
pub fn minimal_actions(actor: ActorKind) -> &'static [&'static str] {
    match actor {
        ActorKind::Pipeline => &[
            S3_GET_OBJECT,
            S3_GET_OBJECT_VERSION,
            S3_PUT_OBJECT,
            S3_LIST_BUCKET,
            S3_GET_BUCKET_VERSIONING,
            CODEBUILD_START_BUILD,
            CODEBUILD_BATCH_GET_BUILDS,
            CODEDEPLOY_CREATE_DEPLOYMENT,
            CODEDEPLOY_GET_DEPLOYMENT,
            CODEDEPLOY_GET_DEPLOYMENT_CONFIG,
            CODEDEPLOY_GET_APPLICATION_REVISION,
            CODEDEPLOY_REGISTER_APPLICATION_REVISION,
        ],
        ActorKind::Build => &[
            S3_GET_OBJECT,
            S3_GET_OBJECT_VERSION,
            S3_PUT_OBJECT,
            LOGS_CREATE_LOG_GROUP,
            LOGS_CREATE_LOG_STREAM,
            LOGS_PUT_LOG_EVENTS,
        ],
        ActorKind::Deploy => &[
            CODEDEPLOY_CREATE_DEPLOYMENT,
            CODEDEPLOY_GET_DEPLOYMENT,
            CODEDEPLOY_LIST_DEPLOYMENTS,
        ],
        ActorKind::Compute => &[
            S3_GET_OBJECT,
            S3_GET_OBJECT_VERSION,
            S3_LIST_BUCKET,
            S3_PUT_OBJECT,
            AGENT_GET_DEPLOYMENT_SPECIFICATION,
            AGENT_POLL_HOST_COMMAND,
            AGENT_PUT_HOST_COMMAND_ACKNOWLEDGEMENT,
            AGENT_PUT_HOST_COMMAND_COMPLETE,
        ],
    }
}

/// Whether an action mutates objects in a bucket.
pub fn is_store_write(action: &str) -> bool {
    action == "*"
        || action == "s3:*"
        || action.starts_with("s3:Put")
        || action.starts_with("s3:Delete")
        || action.starts_with("s3:Restore")
}
