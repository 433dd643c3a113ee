//! Topology materialization.

use std::collections::BTreeMap;

use tracing::debug;

use launchpad_core::{
    DeploymentTarget, FirewallRule, HealthCheckSpec, LaunchpadConfig, Resource, ResourceGraph,
    ResourceKind, ResourceSpec, StackIdentity, Topology, TrafficSource,
};

use crate::error::{TopologyError, TopologyResult};

/// Tag carried by every compute target; its value is the deployment group name.
pub const TARGET_TAG: &str = "launchpad:deployment-group";

const PUBLIC: &str = "0.0.0.0/0";
const LISTENER_PORT: u16 = 80;

/// Everything a compute target needs besides its topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeProfile {
    pub image: String,
    pub instance_type: String,
    /// Instance profile carrying the compute role.
    pub instance_profile: String,
    pub bootstrap_script: String,
    pub app_port: u16,
    pub management_port: u16,
    pub management_cidr: String,
    pub health_check: HealthCheckSpec,
}

impl ComputeProfile {
    pub fn from_config(config: &LaunchpadConfig, instance_profile: &str) -> TopologyResult<Self> {
        Ok(Self {
            image: config.compute.image.clone(),
            instance_type: config
                .compute
                .instance_type
                .clone()
                .unwrap_or_else(|| "t3.micro".to_string()),
            instance_profile: instance_profile.to_string(),
            bootstrap_script: config
                .compute
                .bootstrap_script
                .clone()
                .unwrap_or_else(|| "scripts/bootstrap.sh".to_string()),
            app_port: config.app_port(),
            management_port: config.management_port(),
            management_cidr: config
                .application
                .management_cidr
                .clone()
                .unwrap_or_else(|| PUBLIC.to_string()),
            health_check: config.health_check()?,
        })
    }
}

/// A materialized topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    pub graph: ResourceGraph,
    pub target: DeploymentTarget,
    pub load_balancer: Option<String>,
    pub target_group: Option<String>,
}

/// Emit the complete resource graph for `topology`.
///
/// Capacity and health-check settings are validated first; an invalid shape
/// yields an error and no graph at all.
pub fn materialize(
    topology: &Topology,
    stack: &StackIdentity,
    profile: &ComputeProfile,
) -> TopologyResult<Materialized> {
    topology.validate()?;
    profile.health_check.validate()?;

    let builder = Builder::new(stack, profile);
    let materialized = match *topology {
        Topology::SingleInstance => builder.single_instance()?,
        Topology::FixedFleetBehindLb { instance_count } => builder.fixed_fleet(instance_count)?,
        Topology::AutoScaledBehindLb { min, max, desired } => {
            builder.auto_scaled(min, max, desired)?
        }
    };

    if let Some((resource, reference)) = materialized.graph.dangling_references().into_iter().next() {
        return Err(TopologyError::DanglingReference { resource, reference });
    }

    debug!(
        stack = %stack,
        topology = topology.label(),
        resources = materialized.graph.len(),
        target = %materialized.target,
        "materialized topology"
    );
    Ok(materialized)
}

struct Builder<'a> {
    stack: &'a StackIdentity,
    profile: &'a ComputeProfile,
    graph: ResourceGraph,
}

impl<'a> Builder<'a> {
    fn new(stack: &'a StackIdentity, profile: &'a ComputeProfile) -> Self {
        Self {
            stack,
            profile,
            graph: ResourceGraph::new(),
        }
    }

    fn name(&self, kind: &str) -> TopologyResult<String> {
        Ok(self.stack.resource_name(kind)?)
    }

    fn add(&mut self, resource: Resource) -> TopologyResult<()> {
        let name = resource.name.clone();
        if !self.graph.insert(resource) {
            return Err(TopologyError::DuplicateName(name));
        }
        Ok(())
    }

    fn target_tags(&self, role: &str) -> BTreeMap<String, String> {
        let mut tags = self.stack.tags();
        tags.insert(TARGET_TAG.to_string(), self.stack.deployment_group_name());
        tags.insert("launchpad:role".to_string(), role.to_string());
        tags
    }

    fn tag_target(&self) -> DeploymentTarget {
        DeploymentTarget::TagFilter {
            key: TARGET_TAG.to_string(),
            value: self.stack.deployment_group_name(),
        }
    }

    fn management_rule(&self) -> FirewallRule {
        FirewallRule::tcp(
            self.profile.management_port,
            TrafficSource::Cidr(self.profile.management_cidr.clone()),
            "management",
        )
    }

    fn instance(&self, name: String, security_group: &str) -> Resource {
        Resource::new(
            name,
            ResourceSpec::Instance {
                image: self.profile.image.clone(),
                instance_type: self.profile.instance_type.clone(),
                security_group: security_group.to_string(),
                instance_profile: self.profile.instance_profile.clone(),
                user_data: Some(self.profile.bootstrap_script.clone()),
                tags: self.target_tags("web"),
            },
        )
        .depends_on(&[security_group])
    }

    fn single_instance(mut self) -> TopologyResult<Materialized> {
        let web_sg = self.name("web-sg")?;
        self.add(Resource::new(
            web_sg.clone(),
            ResourceSpec::SecurityGroup {
                ingress: vec![
                    FirewallRule::tcp(
                        self.profile.app_port,
                        TrafficSource::Cidr(PUBLIC.to_string()),
                        "application",
                    ),
                    self.management_rule(),
                ],
                egress: vec![FirewallRule::allow_all_egress()],
            },
        ))?;

        let web = self.instance(self.name("web")?, &web_sg);
        self.add(web)?;

        Ok(Materialized {
            target: self.tag_target(),
            graph: self.graph,
            load_balancer: None,
            target_group: None,
        })
    }

    /// Load balancer, its listener and target group, and the two security
    /// groups. Returns `(web_sg, load_balancer, target_group)`.
    fn load_balanced_front(&mut self) -> TopologyResult<(String, String, String)> {
        let lb_sg = self.name("lb-sg")?;
        let web_sg = self.name("web-sg")?;
        let lb = self.name("lb")?;
        let tg = self.name("tg")?;
        let listener = self.name("listener")?;

        self.add(Resource::new(
            lb_sg.clone(),
            ResourceSpec::SecurityGroup {
                ingress: vec![FirewallRule::tcp(
                    LISTENER_PORT,
                    TrafficSource::Cidr(PUBLIC.to_string()),
                    "public http",
                )],
                egress: vec![FirewallRule::allow_all_egress()],
            },
        ))?;

        self.add(
            Resource::new(
                web_sg.clone(),
                ResourceSpec::SecurityGroup {
                    ingress: vec![
                        FirewallRule::tcp(
                            self.profile.app_port,
                            TrafficSource::SecurityGroup(lb_sg.clone()),
                            "application from load balancer",
                        ),
                        self.management_rule(),
                    ],
                    egress: vec![FirewallRule::allow_all_egress()],
                },
            )
            .depends_on(&[&lb_sg]),
        )?;

        self.add(
            Resource::new(
                lb.clone(),
                ResourceSpec::LoadBalancer {
                    security_group: lb_sg.clone(),
                    internet_facing: true,
                },
            )
            .depends_on(&[&lb_sg]),
        )?;

        self.add(Resource::new(
            tg.clone(),
            ResourceSpec::TargetGroup {
                port: self.profile.app_port,
                health_check: self.profile.health_check.clone(),
            },
        ))?;

        self.add(
            Resource::new(
                listener,
                ResourceSpec::Listener {
                    load_balancer: lb.clone(),
                    target_group: tg.clone(),
                    port: LISTENER_PORT,
                },
            )
            .depends_on(&[&lb, &tg]),
        )?;

        Ok((web_sg, lb, tg))
    }

    fn fixed_fleet(mut self, count: u32) -> TopologyResult<Materialized> {
        let (web_sg, lb, tg) = self.load_balanced_front()?;

        for i in 1..=count {
            let web = self.name(&format!("web{i}"))?;
            let attach = self.name(&format!("web{i}-attach"))?;
            let instance = self.instance(web.clone(), &web_sg);
            self.add(instance)?;
            self.add(
                Resource::new(
                    attach,
                    ResourceSpec::TargetAttachment {
                        target_group: tg.clone(),
                        instance: web.clone(),
                        port: self.profile.app_port,
                    },
                )
                .depends_on(&[&tg, &web]),
            )?;
        }

        Ok(Materialized {
            target: self.tag_target(),
            graph: self.graph,
            load_balancer: Some(lb),
            target_group: Some(tg),
        })
    }

    fn auto_scaled(mut self, min: u32, max: u32, desired: u32) -> TopologyResult<Materialized> {
        let (web_sg, lb, tg) = self.load_balanced_front()?;
        let lt = self.name("lt")?;
        let asg = self.name("asg")?;

        self.add(
            Resource::new(
                lt.clone(),
                ResourceSpec::LaunchTemplate {
                    image: self.profile.image.clone(),
                    instance_type: self.profile.instance_type.clone(),
                    security_group: web_sg.clone(),
                    instance_profile: self.profile.instance_profile.clone(),
                    bootstrap_script: self.profile.bootstrap_script.clone(),
                    tags: self.target_tags("web"),
                },
            )
            .depends_on(&[&web_sg]),
        )?;

        // Registration with the target group happens on launch.
        self.add(
            Resource::new(
                asg.clone(),
                ResourceSpec::AutoScalingGroup {
                    launch_template: lt.clone(),
                    min,
                    max,
                    desired,
                    target_groups: vec![tg.clone()],
                },
            )
            .depends_on(&[&lt, &tg]),
        )?;

        Ok(Materialized {
            graph: self.graph,
            target: DeploymentTarget::ScalingGroup { name: asg },
            load_balancer: Some(lb),
            target_group: Some(tg),
        })
    }
}

/// Read deployment facts back out of a materialized graph.
pub trait GraphExt {
    /// The target the rollout coordinator addresses for this graph.
    fn deployment_target(&self) -> Option<DeploymentTarget>;

    /// Target group compute targets register with, if any.
    fn target_group(&self) -> Option<&str>;
}

impl GraphExt for ResourceGraph {
    fn deployment_target(&self) -> Option<DeploymentTarget> {
        if let Some(asg) = self.of_kind(ResourceKind::AutoScalingGroup).next() {
            return Some(DeploymentTarget::ScalingGroup {
                name: asg.name.clone(),
            });
        }
        self.of_kind(ResourceKind::Instance).find_map(|r| match &r.spec {
            ResourceSpec::Instance { tags, .. } => tags.get(TARGET_TAG).map(|value| {
                DeploymentTarget::TagFilter {
                    key: TARGET_TAG.to_string(),
                    value: value.clone(),
                }
            }),
            _ => None,
        })
    }

    fn target_group(&self) -> Option<&str> {
        self.of_kind(ResourceKind::TargetGroup)
            .next()
            .map(|r| r.name.as_str())
    }
}
