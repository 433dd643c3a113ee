//! Whole-stack planning: one resource graph per stack identity.

use tracing::debug;

use launchpad_artifacts::{BucketSettings, bucket_resource};
use launchpad_core::config::FederationConfig;
use launchpad_core::{
    CoreError, DeploymentTarget, LaunchpadConfig, Resource, ResourceGraph, ResourceSpec,
    RolloutPolicy, StackIdentity, Topology,
};
use launchpad_iam::binding::{BUILD_PROJECT_KIND, PIPELINE_KIND};
use launchpad_iam::{ActorKind, FederatedTrust, TrustBinding, grant};
use launchpad_topology::{ComputeProfile, TopologyError, materialize};

use crate::error::{ProvisionError, ProvisionResult};

/// Kind segment of the instance profile wrapping the compute role.
pub const COMPUTE_PROFILE_KIND: &str = "compute-profile";

/// Everything that determines a stack's resources.
#[derive(Debug, Clone)]
pub struct StackInputs {
    pub stack: StackIdentity,
    pub application: String,
    /// Source repository (`org/repo`), used for the pipeline and federation.
    pub repository: Option<String>,
    pub topology: Topology,
    pub compute: ComputeProfile,
    pub policy: RolloutPolicy,
    pub bucket: BucketSettings,
    pub federation: Option<FederationConfig>,
}

impl StackInputs {
    pub fn from_config(config: &LaunchpadConfig) -> ProvisionResult<Self> {
        config.validate()?;
        let stack = config.stack_identity()?;
        let profile = stack.resource_name(COMPUTE_PROFILE_KIND)?;
        Ok(Self {
            compute: ComputeProfile::from_config(config, &profile)?,
            application: config.application.name.clone(),
            repository: config.application.repository.clone(),
            topology: config.topology,
            policy: config.rollout_policy(),
            bucket: BucketSettings::from_config(config),
            federation: config.federation.clone(),
            stack,
        })
    }
}

/// The desired state of one stack.
#[derive(Debug, Clone)]
pub struct StackPlan {
    pub graph: ResourceGraph,
    pub target: DeploymentTarget,
    pub load_balancer: Option<String>,
    pub target_group: Option<String>,
    /// Grants for the pipeline, build, deploy and compute actors.
    pub bindings: Vec<TrustBinding>,
    pub federation: Option<FederatedTrust>,
}

impl StackPlan {
    pub fn binding(&self, actor: ActorKind) -> Option<&TrustBinding> {
        self.bindings.iter().find(|b| b.actor_kind == actor)
    }
}

/// Build the complete resource graph for a stack.
///
/// The topology is validated before anything else is derived, so an
/// impossible shape produces an error and no plan.
pub fn plan_stack(inputs: &StackInputs) -> ProvisionResult<StackPlan> {
    let stack = &inputs.stack;
    let app = inputs.application.as_str();

    inputs.policy.validate()?;
    let materialized = materialize(&inputs.topology, stack, &inputs.compute)?;
    if inputs.policy.traffic_control && materialized.target_group.is_none() {
        return Err(CoreError::InvalidConfig(format!(
            "traffic control needs a load balancer, but topology is {}",
            inputs.topology.label()
        ))
        .into());
    }

    let mut graph = ResourceGraph::new();

    let bucket = bucket_resource(stack, &inputs.bucket)?;
    let bucket_name = bucket.name.clone();
    add(&mut graph, bucket)?;

    let bindings = ActorKind::ALL
        .iter()
        .map(|actor| grant(*actor, stack, app))
        .collect::<Result<Vec<_>, _>>()?;
    for binding in &bindings {
        add(
            &mut graph,
            Resource::new(
                binding.role_name.clone(),
                ResourceSpec::Role {
                    trust_policy: binding.trust_policy(),
                    policy: binding.policy_document(),
                },
            ),
        )?;
    }
    let role = |actor: ActorKind| {
        bindings
            .iter()
            .find(|b| b.actor_kind == actor)
            .map(|b| b.role_name.clone())
            .unwrap_or_default()
    };

    let profile = inputs.compute.instance_profile.clone();
    let compute_role = role(ActorKind::Compute);
    add(
        &mut graph,
        Resource::new(
            profile.clone(),
            ResourceSpec::InstanceProfile {
                role: compute_role.clone(),
            },
        )
        .depends_on(&[&compute_role]),
    )?;

    for mut resource in materialized.graph {
        if matches!(
            resource.spec,
            ResourceSpec::Instance { .. } | ResourceSpec::LaunchTemplate { .. }
        ) {
            resource.depends_on.push(profile.clone());
        }
        add(&mut graph, resource)?;
    }

    let deploy_app = stack.deploy_application_name();
    add(
        &mut graph,
        Resource::new(
            deploy_app.clone(),
            ResourceSpec::DeployApplication {
                application: app.to_string(),
            },
        ),
    )?;

    let deploy_role = role(ActorKind::Deploy);
    let group = stack.deployment_group_name();
    let mut group_deps = vec![deploy_app.clone(), deploy_role.clone()];
    group_deps.extend(materialized.target_group.clone());
    add(
        &mut graph,
        Resource::new(
            group.clone(),
            ResourceSpec::DeploymentGroup {
                application: deploy_app.clone(),
                service_role: deploy_role,
                target: materialized.target.clone(),
                deployment_config: inputs.policy.config_name(),
                traffic_control: inputs.policy.traffic_control,
                target_group: materialized.target_group.clone(),
            },
        )
        .depends_on(&group_deps[..]),
    )?;

    let build_role = role(ActorKind::Build);
    let build = stack.resource_name(BUILD_PROJECT_KIND)?;
    add(
        &mut graph,
        Resource::new(
            build.clone(),
            ResourceSpec::BuildProject {
                service_role: build_role.clone(),
                artifact_bucket: bucket_name.clone(),
            },
        )
        .depends_on(&[&build_role, &bucket_name]),
    )?;

    let pipeline_role = role(ActorKind::Pipeline);
    add(
        &mut graph,
        Resource::new(
            stack.resource_name(PIPELINE_KIND)?,
            ResourceSpec::Pipeline {
                service_role: pipeline_role.clone(),
                artifact_bucket: bucket_name.clone(),
                build_project: build.clone(),
                deploy_application: deploy_app.clone(),
                deployment_group: group.clone(),
                repository: inputs.repository.clone(),
            },
        )
        .depends_on(&[&pipeline_role, &bucket_name, &build, &deploy_app, &group]),
    )?;

    let federation = match &inputs.federation {
        Some(config) => {
            let trust = FederatedTrust::from_config(stack, config, inputs.repository.as_deref())?;
            let ci = trust.ci_binding(stack, app)?;
            debug!(role = %ci.role_name, subject = %trust.subject_condition(), "planning CI role");
            add(
                &mut graph,
                Resource::new(
                    ci.role_name.clone(),
                    ResourceSpec::Role {
                        trust_policy: trust.trust_policy(),
                        policy: ci.policy_document(),
                    },
                ),
            )?;
            Some(trust)
        }
        None => None,
    };

    if let Some((resource, reference)) = graph.dangling_references().into_iter().next() {
        return Err(TopologyError::DanglingReference { resource, reference }.into());
    }

    debug!(
        stack = %stack,
        topology = inputs.topology.label(),
        resources = graph.len(),
        "planned stack"
    );
    Ok(StackPlan {
        graph,
        target: materialized.target,
        load_balancer: materialized.load_balancer,
        target_group: materialized.target_group,
        bindings,
        federation,
    })
}

fn add(graph: &mut ResourceGraph, resource: Resource) -> ProvisionResult<()> {
    let name = resource.name.clone();
    if !graph.insert(resource) {
        return Err(ProvisionError::DuplicateResource(name));
    }
    Ok(())
}
