//! Local hook runner: executes lifecycle scripts from an unpacked revision.

use std::path::PathBuf;

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::debug;

use crate::descriptor::RunAs;
use crate::hooks::{BoxFuture, HookContext, HookRunner};

/// Runs `sh <root>/<location>` for each hook.
///
/// With `sudo` set, hooks that declare a non-root user run through
/// `sudo -u <user>`. Scripts see the deployment context in `LAUNCHPAD_*`
/// environment variables. A timed-out hook's process is killed when the
/// coordinator drops its future.
#[derive(Debug, Clone)]
pub struct ScriptHookRunner {
    root: PathBuf,
    sudo: bool,
}

impl ScriptHookRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sudo: false,
        }
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    async fn execute(&self, ctx: &HookContext) -> anyhow::Result<()> {
        let script = self.root.join(&ctx.hook.location);
        if !script.is_file() {
            bail!("hook script {} does not exist", script.display());
        }

        let mut command = match (&ctx.hook.run_as, self.sudo) {
            (RunAs::User(user), true) => {
                let mut c = Command::new("sudo");
                c.arg("-E").arg("-u").arg(user).arg("sh");
                c
            }
            _ => Command::new("sh"),
        };
        command
            .arg(&script)
            .current_dir(&self.root)
            .env("LAUNCHPAD_DEPLOYMENT_ID", &ctx.deployment_id)
            .env("LAUNCHPAD_TARGET", &ctx.target_id)
            .env("LAUNCHPAD_LIFECYCLE_EVENT", ctx.event.as_str())
            .env("LAUNCHPAD_ARTIFACT", ctx.artifact.s3_uri())
            .kill_on_drop(true);

        debug!(script = %script.display(), event = %ctx.event, target = %ctx.target_id, "running hook");
        let output = command
            .output()
            .await
            .with_context(|| format!("spawning {}", script.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} exited with {}: {}",
                ctx.hook.location,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

impl HookRunner for ScriptHookRunner {
    fn run<'a>(&'a self, ctx: &'a HookContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.execute(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{HookSpec, LifecycleEvent};
    use launchpad_core::ArtifactRef;
    use std::time::Duration;

    fn context(location: &str) -> HookContext {
        HookContext {
            deployment_id: "d-1".to_string(),
            target_id: "web1".to_string(),
            event: LifecycleEvent::ValidateService,
            hook: HookSpec {
                location: location.to_string(),
                timeout: Duration::from_secs(5),
                run_as: RunAs::Root,
            },
            artifact: ArtifactRef::new("bucket", "backend/abc123/dist.zip"),
        }
    }

    #[tokio::test]
    async fn successful_script_sees_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("validate.sh"),
            "echo \"$LAUNCHPAD_LIFECYCLE_EVENT $LAUNCHPAD_TARGET\" > seen.txt\n",
        )
        .unwrap();

        let runner = ScriptHookRunner::new(dir.path());
        runner.run(&context("validate.sh")).await.unwrap();

        let seen = std::fs::read_to_string(dir.path().join("seen.txt")).unwrap();
        assert_eq!(seen.trim(), "ValidateService web1");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fail.sh"), "echo broken >&2\nexit 3\n").unwrap();

        let err = ScriptHookRunner::new(dir.path())
            .run(&context("fail.sh"))
            .await
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("fail.sh"), "{message}");
        assert!(message.contains("broken"), "{message}");
    }

    #[tokio::test]
    async fn missing_script_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScriptHookRunner::new(dir.path())
            .run(&context("scripts/nope.sh"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
