use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use launchpad_artifacts::{ArtifactStore, BucketSettings};
use launchpad_core::{ArtifactKey, ArtifactRef};

use super::Workspace;

fn store(ws: &Workspace) -> anyhow::Result<ArtifactStore> {
    let state = ws.open_state()?;
    let stack = ws.config.stack_identity()?;
    Ok(ArtifactStore::resolve_or_create(
        &state,
        &stack,
        BucketSettings::from_config(&ws.config),
    )?)
}

/// Store `file` under `{application}/{build_id}/{archive}.zip`.
pub fn upload(ws: &Workspace, file: &Path, build_id: &str, archive: &str) -> anyhow::Result<ArtifactRef> {
    let content = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let key = ArtifactKey::new(&ws.config.application.name, build_id, archive)?;
    let artifact = store(ws)?.put_object(&key, &content)?;

    println!("✓ Uploaded {} ({} bytes)", artifact.s3_uri(), content.len());
    if let Some(version) = &artifact.version_id {
        println!("  Version: {version}");
    }
    Ok(artifact)
}

/// Expire noncurrent versions past the retention window.
pub fn gc(ws: &Workspace) -> anyhow::Result<usize> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let store = store(ws)?;
    let removed = store.expire_noncurrent(now)?;
    println!(
        "✓ Expired {removed} noncurrent version(s) from {} (retention {} days)",
        store.bucket(),
        store.settings().noncurrent_retention_days
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::workspace;
    use launchpad_core::Topology;

    #[test]
    fn upload_lands_in_the_stack_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Topology::SingleInstance);
        let file = dir.path().join("dist.zip");
        std::fs::write(&file, b"revision").unwrap();

        let first = upload(&ws, &file, "abc123", "dist").unwrap();
        assert_eq!(first.bucket, "srv-staging-ap-southeast-1-artifacts-123");
        assert_eq!(first.key, "backend/abc123/dist.zip");

        let second = upload(&ws, &file, "abc123", "dist").unwrap();
        assert_ne!(first.version_id, second.version_id);
    }

    #[test]
    fn invalid_build_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Topology::SingleInstance);
        let file = dir.path().join("dist.zip");
        std::fs::write(&file, b"revision").unwrap();
        assert!(upload(&ws, &file, "a/b", "dist").is_err());
    }

    #[test]
    fn gc_keeps_recent_versions() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path(), Topology::SingleInstance);
        let file = dir.path().join("dist.zip");
        std::fs::write(&file, b"revision").unwrap();
        upload(&ws, &file, "abc123", "dist").unwrap();
        upload(&ws, &file, "abc123", "dist").unwrap();

        assert_eq!(gc(&ws).unwrap(), 0);
    }
}
