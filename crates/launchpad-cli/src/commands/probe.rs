use anyhow::bail;

use launchpad_health::{ProbeResult, http_probe};

use super::Workspace;

/// Probe the configured health endpoint once. `address` defaults to the
/// application port on localhost.
pub async fn probe(
    ws: &Workspace,
    address: Option<&str>,
    path: Option<&str>,
) -> anyhow::Result<()> {
    let health = ws.config.health_check()?;
    let address = address
        .map(str::to_string)
        .unwrap_or_else(|| format!("127.0.0.1:{}", health.port));
    let path = path.unwrap_or(&health.path);

    match http_probe(&address, path, health.timeout()).await {
        ProbeResult::Healthy => {
            println!("✓ http://{address}{path} is healthy");
            Ok(())
        }
        other => bail!("http://{address}{path} is not healthy: {other:?}"),
    }
}
