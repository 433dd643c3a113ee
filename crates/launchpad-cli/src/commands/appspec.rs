use std::path::Path;

use launchpad_rollout::AppSpec;

use super::Workspace;

pub fn descriptor(ws: &Workspace) -> anyhow::Result<AppSpec> {
    let config = ws.config.descriptor.clone().unwrap_or_default();
    Ok(AppSpec::from_config(&ws.config.application.name, &config)?)
}

/// Render `appspec.yml`, to `output` or stdout.
pub fn appspec(ws: &Workspace, output: Option<&Path>) -> anyhow::Result<()> {
    let yaml = descriptor(ws)?.to_yaml()?;
    match output {
        Some(path) => {
            std::fs::write(path, &yaml)?;
            println!("✓ Wrote {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
