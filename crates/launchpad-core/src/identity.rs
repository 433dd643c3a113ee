//! Stack identity and deterministic resource naming.
//!
//! Every resource name is a pure function of the four identity fields plus a
//! resource kind. The layout is
//!
//! ```text
//! {stack}-{environment}-{region}-{kind}-{account}
//! ```
//!
//! `stack` and `environment` may not contain hyphens, every `kind` segment
//! starts with a letter, the region ends in a numeric segment, and the account
//! is all digits. That makes the layout decodable, so two distinct tuples can
//! never produce the same name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]{0,15}$").expect("static regex"));

static REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]?)?-[a-z]+-[0-9]{1,2}$").expect("static regex"));

static ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,12}$").expect("static regex"));

static KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z][a-z0-9]*)*$").expect("static regex"));

/// S3 bucket names are capped at 63 characters.
pub const BUCKET_NAME_LIMIT: usize = 63;

/// Kind suffix used for the artifact bucket.
pub const ARTIFACTS_KIND: &str = "artifacts";

/// Kind suffixes for the deployment-service application and its group.
pub const DEPLOY_APPLICATION_KIND: &str = "app";
pub const DEPLOYMENT_GROUP_KIND: &str = "dg";

/// The namespace a deployable unit lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawStackIdentity", into = "RawStackIdentity")]
pub struct StackIdentity {
    stack_name: String,
    environment: String,
    region: String,
    account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStackIdentity {
    stack_name: String,
    environment: String,
    region: String,
    account_id: String,
}

impl TryFrom<RawStackIdentity> for StackIdentity {
    type Error = CoreError;

    fn try_from(raw: RawStackIdentity) -> CoreResult<Self> {
        Self::new(&raw.stack_name, &raw.environment, &raw.region, &raw.account_id)
    }
}

impl From<StackIdentity> for RawStackIdentity {
    fn from(id: StackIdentity) -> Self {
        Self {
            stack_name: id.stack_name,
            environment: id.environment,
            region: id.region,
            account_id: id.account_id,
        }
    }
}

impl StackIdentity {
    /// Validate and build a stack identity.
    pub fn new(
        stack_name: &str,
        environment: &str,
        region: &str,
        account_id: &str,
    ) -> CoreResult<Self> {
        check(&SEGMENT, "stack_name", stack_name, "lowercase alphanumeric, no hyphens, at most 16 chars")?;
        check(&SEGMENT, "environment", environment, "lowercase alphanumeric, no hyphens, at most 16 chars")?;
        check(&REGION, "region", region, "expected a region such as ap-southeast-1")?;
        check(&ACCOUNT, "account_id", account_id, "expected up to 12 digits")?;

        Ok(Self {
            stack_name: stack_name.to_string(),
            environment: environment.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
        })
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Derive the name for a resource of the given kind.
    pub fn resource_name(&self, kind: &str) -> CoreResult<String> {
        if !KIND.is_match(kind) {
            return Err(CoreError::InvalidResourceKind(kind.to_string()));
        }
        Ok(format!(
            "{}-{}-{}-{}-{}",
            self.stack_name, self.environment, self.region, kind, self.account_id
        ))
    }

    /// Name of the artifact bucket, e.g. `srv-staging-ap-southeast-1-artifacts-123`.
    pub fn bucket_name(&self) -> CoreResult<String> {
        let name = self.resource_name(ARTIFACTS_KIND)?;
        if name.len() > BUCKET_NAME_LIMIT {
            return Err(CoreError::NameTooLong {
                name,
                limit: BUCKET_NAME_LIMIT,
            });
        }
        Ok(name)
    }

    /// Name of the deployment-service application for this stack.
    pub fn deploy_application_name(&self) -> String {
        self.fixed_name(DEPLOY_APPLICATION_KIND)
    }

    /// Name of the deployment group inside [`Self::deploy_application_name`].
    pub fn deployment_group_name(&self) -> String {
        self.fixed_name(DEPLOYMENT_GROUP_KIND)
    }

    fn fixed_name(&self, kind: &'static str) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.stack_name, self.environment, self.region, kind, self.account_id
        )
    }

    /// Ownership key recorded in the resource ledger.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.stack_name, self.environment, self.region, self.account_id
        )
    }

    /// Tags stamped on every resource this stack owns.
    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("launchpad:stack".to_string(), self.stack_name.clone()),
            ("launchpad:environment".to_string(), self.environment.clone()),
            ("managed-by".to_string(), "launchpad".to_string()),
        ])
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({}, account {})",
            self.stack_name, self.environment, self.region, self.account_id
        )
    }
}

fn check(re: &Regex, field: &'static str, value: &str, reason: &'static str) -> CoreResult<()> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentity {
            field,
            value: value.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn staging() -> StackIdentity {
        StackIdentity::new("srv", "staging", "ap-southeast-1", "123").unwrap()
    }

    #[test]
    fn bucket_name_layout() {
        assert_eq!(
            staging().bucket_name().unwrap(),
            "srv-staging-ap-southeast-1-artifacts-123"
        );
    }

    #[test]
    fn naming_is_deterministic() {
        let a = staging();
        let b = staging();
        assert_eq!(a.resource_name("web-sg").unwrap(), b.resource_name("web-sg").unwrap());
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn naming_is_collision_free_across_tuples() {
        let stacks = ["srv", "api", "srvstaging", "a1"];
        let envs = ["staging", "prod", "dev", "stagingap"];
        let regions = ["ap-southeast-1", "us-east-1", "us-gov-west-1", "eu-west-2"];
        let accounts = ["123", "1234", "123456789012", "1"];
        let kinds = ["artifacts", "web-sg", "lb", "web1"];

        let mut seen = HashSet::new();
        let mut count = 0;
        for s in stacks {
            for e in envs {
                for r in regions {
                    for a in accounts {
                        let id = StackIdentity::new(s, e, r, a).unwrap();
                        for k in kinds {
                            seen.insert(id.resource_name(k).unwrap());
                            count += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), count);
    }

    #[test]
    fn deployment_names_share_the_layout() {
        let id = staging();
        assert_eq!(id.deploy_application_name(), id.resource_name("app").unwrap());
        assert_eq!(id.deployment_group_name(), "srv-staging-ap-southeast-1-dg-123");
    }

    #[test]
    fn rejects_hyphenated_stack_name() {
        let err = StackIdentity::new("my-srv", "staging", "us-east-1", "123").unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentity { field: "stack_name", .. }));
    }

    #[test]
    fn rejects_malformed_region_and_account() {
        assert!(StackIdentity::new("srv", "prod", "mars", "123").is_err());
        assert!(StackIdentity::new("srv", "prod", "us-east-1", "12a").is_err());
        assert!(StackIdentity::new("srv", "prod", "us-east-1", "1234567890123").is_err());
    }

    #[test]
    fn rejects_kind_starting_with_digit() {
        let err = staging().resource_name("1-web").unwrap_err();
        assert!(matches!(err, CoreError::InvalidResourceKind(_)));
    }

    #[test]
    fn bucket_name_length_is_enforced() {
        let id = StackIdentity::new(
            "abcdefghijklmnop",
            "abcdefghijklmnop",
            "ap-southeast-1",
            "123456789012",
        )
        .unwrap();
        assert!(matches!(id.bucket_name(), Err(CoreError::NameTooLong { .. })));
    }

    #[test]
    fn deserialization_validates() {
        let ok: StackIdentity = serde_json::from_str(
            r#"{"stack_name":"srv","environment":"prod","region":"us-east-1","account_id":"42"}"#,
        )
        .unwrap();
        assert_eq!(ok.environment(), "prod");

        let bad = serde_json::from_str::<StackIdentity>(
            r#"{"stack_name":"SRV","environment":"prod","region":"us-east-1","account_id":"42"}"#,
        );
        assert!(bad.is_err());
    }
}
