//! Resource graph model.
//!
//! A plan is a flat list of named resources with explicit dependencies.
//! Each resource's `fingerprint` is the SHA-256 of its canonical JSON, which
//! is what the ledger compares to decide whether a resource changed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{DeploymentTarget, HealthCheckSpec};

/// Broad resource category, used for listings and ledger records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    Role,
    InstanceProfile,
    SecurityGroup,
    Instance,
    LoadBalancer,
    TargetGroup,
    Listener,
    TargetAttachment,
    LaunchTemplate,
    AutoScalingGroup,
    DeployApplication,
    DeploymentGroup,
    BuildProject,
    Pipeline,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::Role => "role",
            ResourceKind::InstanceProfile => "instance_profile",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::Instance => "instance",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::TargetGroup => "target_group",
            ResourceKind::Listener => "listener",
            ResourceKind::TargetAttachment => "target_attachment",
            ResourceKind::LaunchTemplate => "launch_template",
            ResourceKind::AutoScalingGroup => "auto_scaling_group",
            ResourceKind::DeployApplication => "deploy_application",
            ResourceKind::DeploymentGroup => "deployment_group",
            ResourceKind::BuildProject => "build_project",
            ResourceKind::Pipeline => "pipeline",
        }
    }
}

/// Server-side encryption applied to stored objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Encryption {
    #[default]
    Aes256,
    Kms { key_id: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    All,
}

/// Where permitted traffic may come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficSource {
    Cidr(String),
    SecurityGroup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub protocol: Protocol,
    /// `None` means every port.
    pub port: Option<u16>,
    pub peer: TrafficSource,
    pub description: String,
}

impl FirewallRule {
    pub fn tcp(port: u16, peer: TrafficSource, description: &str) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port: Some(port),
            peer,
            description: description.to_string(),
        }
    }

    pub fn allow_all_egress() -> Self {
        Self {
            protocol: Protocol::All,
            port: None,
            peer: TrafficSource::Cidr("0.0.0.0/0".to_string()),
            description: "all egress".to_string(),
        }
    }
}

/// Typed description of a single resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Bucket {
        versioning: bool,
        encryption: Encryption,
        block_public_access: bool,
        noncurrent_version_expiration_days: u32,
        tags: BTreeMap<String, String>,
    },
    Role {
        trust_policy: serde_json::Value,
        policy: serde_json::Value,
    },
    InstanceProfile {
        role: String,
    },
    SecurityGroup {
        ingress: Vec<FirewallRule>,
        egress: Vec<FirewallRule>,
    },
    Instance {
        image: String,
        instance_type: String,
        security_group: String,
        instance_profile: String,
        user_data: Option<String>,
        tags: BTreeMap<String, String>,
    },
    LoadBalancer {
        security_group: String,
        internet_facing: bool,
    },
    TargetGroup {
        port: u16,
        health_check: HealthCheckSpec,
    },
    Listener {
        load_balancer: String,
        target_group: String,
        port: u16,
    },
    TargetAttachment {
        target_group: String,
        instance: String,
        port: u16,
    },
    LaunchTemplate {
        image: String,
        instance_type: String,
        security_group: String,
        instance_profile: String,
        bootstrap_script: String,
        tags: BTreeMap<String, String>,
    },
    AutoScalingGroup {
        launch_template: String,
        min: u32,
        max: u32,
        desired: u32,
        target_groups: Vec<String>,
    },
    DeployApplication {
        application: String,
    },
    DeploymentGroup {
        application: String,
        service_role: String,
        target: DeploymentTarget,
        deployment_config: String,
        traffic_control: bool,
        target_group: Option<String>,
    },
    BuildProject {
        service_role: String,
        artifact_bucket: String,
    },
    Pipeline {
        service_role: String,
        artifact_bucket: String,
        build_project: String,
        deploy_application: String,
        deployment_group: String,
        repository: Option<String>,
    },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Bucket { .. } => ResourceKind::Bucket,
            ResourceSpec::Role { .. } => ResourceKind::Role,
            ResourceSpec::InstanceProfile { .. } => ResourceKind::InstanceProfile,
            ResourceSpec::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            ResourceSpec::Instance { .. } => ResourceKind::Instance,
            ResourceSpec::LoadBalancer { .. } => ResourceKind::LoadBalancer,
            ResourceSpec::TargetGroup { .. } => ResourceKind::TargetGroup,
            ResourceSpec::Listener { .. } => ResourceKind::Listener,
            ResourceSpec::TargetAttachment { .. } => ResourceKind::TargetAttachment,
            ResourceSpec::LaunchTemplate { .. } => ResourceKind::LaunchTemplate,
            ResourceSpec::AutoScalingGroup { .. } => ResourceKind::AutoScalingGroup,
            ResourceSpec::DeployApplication { .. } => ResourceKind::DeployApplication,
            ResourceSpec::DeploymentGroup { .. } => ResourceKind::DeploymentGroup,
            ResourceSpec::BuildProject { .. } => ResourceKind::BuildProject,
            ResourceSpec::Pipeline { .. } => ResourceKind::Pipeline,
        }
    }
}

/// A named resource and the resources it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub spec: ResourceSpec,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(name: String, spec: ResourceSpec) -> Self {
        Self {
            name,
            spec,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.depends_on
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// SHA-256 of the canonical JSON encoding of this resource.
    pub fn fingerprint(&self) -> String {
        // Struct fields serialize in declaration order and maps are BTreeMaps,
        // so the encoding is stable for equal values.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// An ordered set of resources with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. Returns false (and leaves the graph unchanged) if the
    /// name is already taken.
    pub fn insert(&mut self, resource: Resource) -> bool {
        if self.get(&resource.name).is_some() {
            return false;
        }
        self.resources.push(resource);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    /// References that point at no resource in the graph.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let names = self.names();
        self.resources
            .iter()
            .flat_map(|r| {
                r.depends_on
                    .iter()
                    .filter(|d| !names.contains(d.as_str()))
                    .map(|d| (r.name.clone(), d.clone()))
            })
            .collect()
    }

    /// Merge another graph in. Returns the names that were already present.
    pub fn extend(&mut self, other: ResourceGraph) -> Vec<String> {
        let mut duplicates = Vec::new();
        for resource in other.resources {
            let name = resource.name.clone();
            if !self.insert(resource) {
                duplicates.push(name);
            }
        }
        duplicates
    }
}

impl IntoIterator for ResourceGraph {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, role: &str) -> Resource {
        Resource::new(
            name.to_string(),
            ResourceSpec::InstanceProfile {
                role: role.to_string(),
            },
        )
        .depends_on(&[role])
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = profile("p", "r1");
        assert_eq!(a.fingerprint(), profile("p", "r1").fingerprint());
        assert_ne!(a.fingerprint(), profile("p", "r2").fingerprint());
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let mut graph = ResourceGraph::new();
        assert!(graph.insert(profile("p", "r")));
        assert!(!graph.insert(profile("p", "other")));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn dangling_references_are_reported() {
        let mut graph = ResourceGraph::new();
        graph.insert(profile("p", "missing-role"));
        assert_eq!(
            graph.dangling_references(),
            vec![("p".to_string(), "missing-role".to_string())]
        );
    }

    #[test]
    fn spec_serializes_with_kind_tag() {
        let json = serde_json::to_value(&profile("p", "r").spec).unwrap();
        assert_eq!(json["kind"], "instance_profile");
    }
}
