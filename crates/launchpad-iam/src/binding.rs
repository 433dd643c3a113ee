//! Least-privilege trust bindings.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use launchpad_core::{CoreError, StackIdentity};

use crate::actor::*;
use crate::error::{IamError, IamResult};

/// IAM role names are capped at 64 characters.
pub const ROLE_NAME_LIMIT: usize = 64;

/// Kind segments for the build project and pipeline resources.
pub const BUILD_PROJECT_KIND: &str = "build";
pub const PIPELINE_KIND: &str = "pipeline";

/// Object prefix the compute actor may write to, below the bucket root.
pub const INSTANCE_PREFIX: &str = "instances";

const POLICY_VERSION: &str = "2012-10-17";

/// One allow statement: every listed action on every listed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub actions: BTreeSet<String>,
    pub resources: BTreeSet<String>,
}

impl Statement {
    fn new(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: resources.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn allows(&self, action: &str, resource: &str) -> bool {
        self.actions.iter().any(|a| glob_match(a, action))
            && self.resources.iter().any(|r| glob_match(r, resource))
    }
}

/// A scoped grant of capabilities to one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustBinding {
    pub actor_kind: ActorKind,
    pub role_name: String,
    pub role_arn: String,
    pub statements: Vec<Statement>,
}

impl TrustBinding {
    pub fn allowed_actions(&self) -> BTreeSet<&str> {
        self.statements
            .iter()
            .flat_map(|s| s.actions.iter().map(String::as_str))
            .collect()
    }

    pub fn allowed_resources(&self) -> BTreeSet<&str> {
        self.statements
            .iter()
            .flat_map(|s| s.resources.iter().map(String::as_str))
            .collect()
    }

    /// Check that some statement allows `action` on `resource`.
    pub fn authorize(&self, action: &str, resource: &str) -> IamResult<()> {
        if self.statements.iter().any(|s| s.allows(action, resource)) {
            return Ok(());
        }
        let reason = if self.allowed_actions().contains(action) {
            "resource is outside the granted scope"
        } else {
            "action is not granted"
        };
        Err(IamError::TrustDenied {
            actor: self.actor_kind.to_string(),
            role: self.role_name.clone(),
            action: action.to_string(),
            resource: resource.to_string(),
            reason: reason.to_string(),
        })
    }

    /// The permission policy attached to the role.
    pub fn policy_document(&self) -> Value {
        let statements: Vec<Value> = self
            .statements
            .iter()
            .map(|s| {
                json!({
                    "Effect": "Allow",
                    "Action": s.actions,
                    "Resource": s.resources,
                })
            })
            .collect();
        json!({ "Version": POLICY_VERSION, "Statement": statements })
    }

    /// Who may assume the role: the actor's service principal.
    pub fn trust_policy(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.actor_kind.service_principal() },
                "Action": "sts:AssumeRole",
            }],
        })
    }
}

/// ARNs of the stack's resources, as seen from IAM.
#[derive(Debug, Clone)]
pub struct StackArns {
    pub bucket: String,
    pub objects: String,
    pub deploy_application: String,
    pub deployment_group: String,
    pub deployment_configs: String,
    pub build_project: String,
    pub build_logs: String,
    region: String,
    account_id: String,
}

impl StackArns {
    pub fn new(stack: &StackIdentity) -> IamResult<Self> {
        let bucket_name = stack.bucket_name()?;
        let regional = |service: &str, resource: &str| {
            format!(
                "arn:aws:{service}:{}:{}:{resource}",
                stack.region(),
                stack.account_id()
            )
        };
        let app = stack.deploy_application_name();
        let build = stack.resource_name(BUILD_PROJECT_KIND)?;

        Ok(Self {
            bucket: format!("arn:aws:s3:::{bucket_name}"),
            objects: format!("arn:aws:s3:::{bucket_name}/*"),
            deployment_group: regional(
                "codedeploy",
                &format!("deploymentgroup:{app}/{}", stack.deployment_group_name()),
            ),
            deploy_application: regional("codedeploy", &format!("application:{app}")),
            deployment_configs: regional("codedeploy", "deploymentconfig:*"),
            build_project: regional("codebuild", &format!("project/{build}")),
            build_logs: regional("logs", &format!("log-group:/aws/codebuild/{build}*")),
            region: stack.region().to_string(),
            account_id: stack.account_id().to_string(),
        })
    }

    /// ARN of a deployment group `group` inside deploy application
    /// `application`, in this stack's region and account.
    pub fn deployment_group_in(&self, application: &str, group: &str) -> String {
        format!(
            "arn:aws:codedeploy:{}:{}:deploymentgroup:{application}/{group}",
            self.region, self.account_id
        )
    }

    /// ARN of one object in the artifact bucket.
    pub fn object(&self, key: &str) -> String {
        format!("{}/{key}", self.bucket)
    }
}

/// Derive the least-privilege binding for `actor` on this stack.
///
/// `application` scopes the build actor's output prefix and the compute
/// actor's writable prefix.
pub fn grant(actor: ActorKind, stack: &StackIdentity, application: &str) -> IamResult<TrustBinding> {
    grant_as(actor, actor.role_kind(), stack, application)
}

pub(crate) fn grant_as(
    actor: ActorKind,
    role_kind: &str,
    stack: &StackIdentity,
    application: &str,
) -> IamResult<TrustBinding> {
    if application.is_empty() || application.contains(['/', '*']) {
        return Err(CoreError::InvalidConfig(format!(
            "application {application:?} cannot scope an object prefix"
        ))
        .into());
    }

    let role_name = stack.resource_name(role_kind)?;
    if role_name.len() > ROLE_NAME_LIMIT {
        return Err(CoreError::NameTooLong {
            name: role_name,
            limit: ROLE_NAME_LIMIT,
        }
        .into());
    }
    let role_arn = format!("arn:aws:iam::{}:role/{role_name}", stack.account_id());
    let arns = StackArns::new(stack)?;

    let statements = match actor {
        ActorKind::Pipeline => vec![
            Statement::new(
                &[S3_GET_OBJECT, S3_GET_OBJECT_VERSION, S3_PUT_OBJECT],
                &[&arns.objects],
            ),
            Statement::new(&[S3_LIST_BUCKET, S3_GET_BUCKET_VERSIONING], &[&arns.bucket]),
            Statement::new(
                &[CODEBUILD_START_BUILD, CODEBUILD_BATCH_GET_BUILDS],
                &[&arns.build_project],
            ),
            Statement::new(
                &[CODEDEPLOY_CREATE_DEPLOYMENT, CODEDEPLOY_GET_DEPLOYMENT],
                &[&arns.deployment_group],
            ),
            Statement::new(&[CODEDEPLOY_GET_DEPLOYMENT_CONFIG], &[&arns.deployment_configs]),
            Statement::new(
                &[
                    CODEDEPLOY_GET_APPLICATION_REVISION,
                    CODEDEPLOY_REGISTER_APPLICATION_REVISION,
                ],
                &[&arns.deploy_application],
            ),
        ],
        ActorKind::Build => vec![
            Statement::new(
                &[S3_GET_OBJECT, S3_GET_OBJECT_VERSION, S3_PUT_OBJECT],
                &[&arns.object(&format!("{application}/*"))],
            ),
            Statement::new(
                &[LOGS_CREATE_LOG_GROUP, LOGS_CREATE_LOG_STREAM, LOGS_PUT_LOG_EVENTS],
                &[&arns.build_logs],
            ),
        ],
        ActorKind::Deploy => vec![Statement::new(
            &[
                CODEDEPLOY_CREATE_DEPLOYMENT,
                CODEDEPLOY_GET_DEPLOYMENT,
                CODEDEPLOY_LIST_DEPLOYMENTS,
            ],
            &[&arns.deployment_group],
        )],
        ActorKind::Compute => vec![
            Statement::new(&[S3_GET_OBJECT, S3_GET_OBJECT_VERSION], &[&arns.objects]),
            Statement::new(&[S3_LIST_BUCKET], &[&arns.bucket]),
            Statement::new(
                &[S3_PUT_OBJECT],
                &[&arns.object(&format!("{INSTANCE_PREFIX}/{application}/*"))],
            ),
            // Agent check-in APIs take no resource-level scoping.
            Statement::new(
                &[
                    AGENT_GET_DEPLOYMENT_SPECIFICATION,
                    AGENT_POLL_HOST_COMMAND,
                    AGENT_PUT_HOST_COMMAND_ACKNOWLEDGEMENT,
                    AGENT_PUT_HOST_COMMAND_COMPLETE,
                ],
                &["*"],
            ),
        ],
    };

    debug!(
        actor = %actor,
        role = %role_name,
        statements = statements.len(),
        "derived trust binding"
    );

    Ok(TrustBinding {
        actor_kind: actor,
        role_name,
        role_arn,
        statements,
    })
}

/// Match `value` against an IAM-style pattern where `*` spans any run of
/// characters.
pub(crate) fn glob_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == value;
    }
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}
