use serde_json::{Map, Value, json};

use launchpad_iam::{ActorKind, FederatedTrust, grant};

use super::Workspace;

/// Policy and trust documents for one actor, or for every actor plus the
/// federated CI role when `actor` is `None`. Keyed by role name.
pub fn documents(ws: &Workspace, actor: Option<ActorKind>) -> anyhow::Result<Value> {
    let stack = ws.config.stack_identity()?;
    let app = &ws.config.application.name;
    let actors = match actor {
        Some(a) => vec![a],
        None => ActorKind::ALL.to_vec(),
    };

    let mut roles = Map::new();
    for actor in actors {
        let binding = grant(actor, &stack, app)?;
        roles.insert(
            binding.role_name.clone(),
            json!({
                "actor": actor.as_str(),
                "arn": binding.role_arn,
                "trust_policy": binding.trust_policy(),
                "policy": binding.policy_document(),
            }),
        );
    }

    if actor.is_none()
        && let Some(federation) = &ws.config.federation
    {
        let trust =
            FederatedTrust::from_config(&stack, federation, ws.config.application.repository.as_deref())?;
        let ci = trust.ci_binding(&stack, app)?;
        roles.insert(
            ci.role_name.clone(),
            json!({
                "actor": "ci",
                "arn": ci.role_arn,
                "subject": trust.subject_condition(),
                "trust_policy": trust.trust_policy(),
                "policy": ci.policy_document(),
            }),
        );
    }

    Ok(Value::Object(roles))
}

pub fn grant_cmd(ws: &Workspace, actor: Option<ActorKind>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&documents(ws, actor)?)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::workspace;
    use launchpad_core::Topology;
    use launchpad_core::config::FederationConfig;

    #[test]
    fn every_actor_gets_a_role() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Topology::SingleInstance);

        let docs = documents(&ws, None).unwrap();
        let roles = docs.as_object().unwrap();
        assert_eq!(roles.len(), 4);
        let compute = &roles["srv-staging-ap-southeast-1-compute-role-123"];
        assert_eq!(compute["actor"], "compute");
        assert_eq!(compute["policy"]["Version"], "2012-10-17");
    }

    #[test]
    fn single_actor_filter() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Topology::SingleInstance);
        let docs = documents(&ws, Some(ActorKind::Deploy)).unwrap();
        assert_eq!(docs.as_object().unwrap().len(), 1);
    }

    #[test]
    fn federation_adds_the_ci_role() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(dir.path(), Topology::SingleInstance);
        ws.config.application.repository = Some("org/repo".to_string());
        ws.config.federation = Some(FederationConfig {
            repository: None,
            branch: None,
            environment: Some("staging".to_string()),
            audience: None,
            session_duration: None,
        });

        let docs = documents(&ws, None).unwrap();
        let ci = &docs["srv-staging-ap-southeast-1-ci-role-123"];
        assert_eq!(ci["subject"], "repo:org/repo:environment:staging");
    }
}
