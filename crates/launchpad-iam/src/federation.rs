//! Web-identity federation for CI.
//!
//! A CI job presents an OIDC token whose `sub` claim names the repository
//! and the branch (or environment) it runs for. The trust condition pins
//! that claim with `StringEquals` to one exact subject, so a token minted
//! for any other repository, branch or environment is refused. Patterns
//! such as `repo:org/repo:*` are rejected at configuration time.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use launchpad_core::config::FederationConfig;
use launchpad_core::{StackIdentity, parse_duration};

use crate::actor::ActorKind;
use crate::binding::{TrustBinding, grant_as};
use crate::error::{IamError, IamResult};

pub const TOKEN_ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const TOKEN_PROVIDER_HOST: &str = "token.actions.githubusercontent.com";
pub const DEFAULT_AUDIENCE: &str = "sts.amazonaws.com";
pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";

/// Kind segment of the federated CI role.
pub const CI_ROLE_KIND: &str = "ci-role";

const MIN_SESSION: Duration = Duration::from_secs(15 * 60);
const MAX_SESSION: Duration = Duration::from_secs(12 * 60 * 60);
const DEFAULT_SESSION: Duration = Duration::from_secs(60 * 60);

static REPOSITORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("static regex")
});

static REF_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_./-]+$").expect("static regex"));

/// What the subject claim is pinned to, besides the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectScope {
    Branch(String),
    Environment(String),
}

/// Claims of a presented web-identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebIdentityClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Trust relationship between the CI identity provider and the stack's CI role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedTrust {
    pub provider_arn: String,
    pub repository: String,
    pub scope: SubjectScope,
    pub audience: String,
    pub session_duration: Duration,
}

/// Short-lived credentials handed out for a verified token.
#[derive(Debug, Clone)]
pub struct FederatedSession {
    pub binding: TrustBinding,
    pub subject: String,
    pub expires_at: u64,
}

impl FederatedTrust {
    pub fn new(
        stack: &StackIdentity,
        repository: &str,
        scope: SubjectScope,
        audience: Option<&str>,
        session_duration: Option<Duration>,
    ) -> IamResult<Self> {
        if !REPOSITORY.is_match(repository) {
            return Err(IamError::InvalidFederation(format!(
                "repository {repository:?} must be an exact `owner/name` identifier"
            )));
        }
        let (label, value) = match &scope {
            SubjectScope::Branch(b) => ("branch", b),
            SubjectScope::Environment(e) => ("environment", e),
        };
        if !REF_NAME.is_match(value) {
            return Err(IamError::InvalidFederation(format!(
                "{label} {value:?} must be an exact name; wildcards are not accepted"
            )));
        }

        let session_duration = session_duration.unwrap_or(DEFAULT_SESSION);
        if !(MIN_SESSION..=MAX_SESSION).contains(&session_duration) {
            return Err(IamError::InvalidFederation(format!(
                "session duration {}s outside {}s..={}s",
                session_duration.as_secs(),
                MIN_SESSION.as_secs(),
                MAX_SESSION.as_secs()
            )));
        }

        Ok(Self {
            provider_arn: format!(
                "arn:aws:iam::{}:oidc-provider/{TOKEN_PROVIDER_HOST}",
                stack.account_id()
            ),
            repository: repository.to_string(),
            scope,
            audience: audience.unwrap_or(DEFAULT_AUDIENCE).to_string(),
            session_duration,
        })
    }

    /// Build from the `[federation]` table. `fallback_repository` is the
    /// application's repository, used when the table names none.
    pub fn from_config(
        stack: &StackIdentity,
        config: &FederationConfig,
        fallback_repository: Option<&str>,
    ) -> IamResult<Self> {
        let repository = config
            .repository
            .as_deref()
            .or(fallback_repository)
            .ok_or_else(|| IamError::InvalidFederation("no repository configured".into()))?;

        let scope = match (&config.branch, &config.environment) {
            (Some(branch), None) => SubjectScope::Branch(branch.clone()),
            (None, Some(env)) => SubjectScope::Environment(env.clone()),
            (None, None) => SubjectScope::Branch("main".to_string()),
            (Some(_), Some(_)) => {
                return Err(IamError::InvalidFederation(
                    "set either branch or environment, not both".into(),
                ));
            }
        };

        let session_duration = config
            .session_duration
            .as_deref()
            .map(parse_duration)
            .transpose()?;

        Self::new(stack, repository, scope, config.audience.as_deref(), session_duration)
    }

    /// The exact `sub` value a token must carry.
    pub fn subject_condition(&self) -> String {
        match &self.scope {
            SubjectScope::Branch(branch) => {
                format!("repo:{}:ref:refs/heads/{branch}", self.repository)
            }
            SubjectScope::Environment(env) => {
                format!("repo:{}:environment:{env}", self.repository)
            }
        }
    }

    /// Trust policy for the CI role.
    pub fn trust_policy(&self) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Federated": self.provider_arn },
                "Action": ASSUME_ROLE_WITH_WEB_IDENTITY,
                "Condition": {
                    "StringEquals": {
                        (format!("{TOKEN_PROVIDER_HOST}:aud")): self.audience,
                        (format!("{TOKEN_PROVIDER_HOST}:sub")): self.subject_condition(),
                    }
                },
            }],
        })
    }

    /// The CI role's binding: pipeline permissions under the CI role name.
    pub fn ci_binding(&self, stack: &StackIdentity, application: &str) -> IamResult<TrustBinding> {
        grant_as(ActorKind::Pipeline, CI_ROLE_KIND, stack, application)
    }

    /// Exchange a verified token for a short-lived session.
    ///
    /// `now` is seconds since the epoch. The session never outlives the token.
    pub fn exchange(
        &self,
        claims: &WebIdentityClaims,
        stack: &StackIdentity,
        application: &str,
        now: u64,
    ) -> IamResult<FederatedSession> {
        let binding = self.ci_binding(stack, application)?;
        let deny = |reason: String| {
            warn!(subject = %claims.sub, %reason, "rejected web identity token");
            IamError::TrustDenied {
                actor: "ci".to_string(),
                role: binding.role_name.clone(),
                action: ASSUME_ROLE_WITH_WEB_IDENTITY.to_string(),
                resource: binding.role_arn.clone(),
                reason,
            }
        };

        if claims.iss != TOKEN_ISSUER {
            return Err(deny(format!("issuer {:?} is not trusted", claims.iss)));
        }
        if claims.aud != self.audience {
            return Err(deny(format!("audience {:?} does not match", claims.aud)));
        }
        let expected = self.subject_condition();
        if claims.sub != expected {
            return Err(deny(format!(
                "subject {:?} does not equal {expected:?}",
                claims.sub
            )));
        }
        if claims.exp <= now {
            return Err(deny("token has expired".to_string()));
        }

        let expires_at = (now + self.session_duration.as_secs()).min(claims.exp);
        info!(subject = %claims.sub, role = %binding.role_name, expires_at, "issued CI session");
        Ok(FederatedSession {
            binding,
            subject: claims.sub.clone(),
            expires_at,
        })
    }
}
