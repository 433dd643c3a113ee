//! Artifact bucket resolution and object versions.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use launchpad_core::config::DEFAULT_RETENTION_DAYS;
use launchpad_core::{
    ArtifactKey, ArtifactRef, Encryption, LaunchpadConfig, Resource, ResourceSpec, StackIdentity,
};
use launchpad_state::{LedgerChange, ObjectVersion, ResourceRecord, StateStore};

use crate::error::{ArtifactError, ArtifactResult};

const SECS_PER_DAY: u64 = 86_400;

/// Per-deployment bucket settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSettings {
    /// Days a version is kept after a newer one replaces it.
    pub noncurrent_retention_days: u32,
    pub encryption: Encryption,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            noncurrent_retention_days: DEFAULT_RETENTION_DAYS,
            encryption: Encryption::Aes256,
        }
    }
}

impl BucketSettings {
    pub fn from_config(config: &LaunchpadConfig) -> Self {
        Self {
            noncurrent_retention_days: config.retention_days(),
            encryption: config
                .artifacts
                .as_ref()
                .and_then(|a| a.encryption.clone())
                .unwrap_or_default(),
        }
    }
}

/// The bucket resource for a stack. Versioning and the public access block
/// are always on.
pub fn bucket_resource(stack: &StackIdentity, settings: &BucketSettings) -> ArtifactResult<Resource> {
    let name = stack.bucket_name()?;
    Ok(Resource::new(
        name,
        ResourceSpec::Bucket {
            versioning: true,
            encryption: settings.encryption.clone(),
            block_public_access: true,
            noncurrent_version_expiration_days: settings.noncurrent_retention_days,
            tags: stack.tags(),
        },
    ))
}

/// Handle to a stack's artifact bucket.
#[derive(Clone)]
pub struct ArtifactStore {
    state: StateStore,
    stack: StackIdentity,
    bucket: String,
    settings: BucketSettings,
}

impl ArtifactStore {
    /// Resolve the stack's bucket, creating or converging it in the ledger.
    ///
    /// Fails with `NameConflict` before writing anything if the name is
    /// recorded under another owner.
    pub fn resolve_or_create(
        state: &StateStore,
        stack: &StackIdentity,
        settings: BucketSettings,
    ) -> ArtifactResult<Self> {
        let desired = bucket_resource(stack, &settings)?;
        let owner = stack.key();

        match state.get_resource(&desired.name)? {
            Some(existing) if existing.owner != owner => {
                return Err(ArtifactError::NameConflict {
                    bucket: desired.name,
                    owner: existing.owner,
                });
            }
            Some(existing) if existing.fingerprint == desired.fingerprint() => {
                debug!(bucket = %desired.name, "bucket already exists");
            }
            _ => {
                let record = ResourceRecord::new(&owner, desired.clone(), epoch_secs());
                state.commit_changes(&owner, &[LedgerChange::Put(record)])?;
                info!(
                    bucket = %desired.name,
                    retention_days = settings.noncurrent_retention_days,
                    "artifact bucket converged"
                );
            }
        }

        Ok(Self {
            state: state.clone(),
            stack: stack.clone(),
            bucket: desired.name,
            settings,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn stack(&self) -> &StackIdentity {
        &self.stack
    }

    pub fn settings(&self) -> &BucketSettings {
        &self.settings
    }

    /// Upload content under `key`, returning a versioned reference.
    pub fn put_object(&self, key: &ArtifactKey, content: &[u8]) -> ArtifactResult<ArtifactRef> {
        self.put_object_at(key, content, epoch_secs())
    }

    /// Upload with an explicit timestamp (seconds since the epoch).
    pub fn put_object_at(
        &self,
        key: &ArtifactKey,
        content: &[u8],
        now: u64,
    ) -> ArtifactResult<ArtifactRef> {
        let key_str = key.to_string();
        let etag = hex::encode(Sha256::digest(content));
        let generation = self
            .state
            .get_object(&self.bucket, &key_str)?
            .map(|r| r.versions.len())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(self.bucket.as_bytes());
        hasher.update(key_str.as_bytes());
        hasher.update(etag.as_bytes());
        hasher.update(generation.to_le_bytes());
        hasher.update(now.to_le_bytes());
        let version_id = hex::encode(&hasher.finalize()[..16]);

        self.state.append_object_version(
            &self.bucket,
            &key_str,
            ObjectVersion {
                version_id: version_id.clone(),
                etag,
                size: content.len() as u64,
                created_at: now,
                superseded_at: None,
            },
        )?;

        info!(bucket = %self.bucket, key = %key_str, version = %version_id, "artifact stored");
        Ok(ArtifactRef::new(&self.bucket, &key_str).with_version(&version_id))
    }

    /// Resolve a reference to a stored version.
    ///
    /// Without a `version_id` the current version is returned.
    pub fn head(&self, artifact: &ArtifactRef) -> ArtifactResult<ObjectVersion> {
        let not_found = |reason: &str| ArtifactError::ArtifactNotFound {
            bucket: artifact.bucket.clone(),
            key: artifact.key.clone(),
            reason: reason.to_string(),
        };

        if artifact.bucket != self.bucket {
            return Err(not_found("bucket is not bound to this stack"));
        }
        if artifact.artifact_key().is_err() {
            return Err(not_found(
                "key does not follow {application}/{build-id}/{archive}.zip",
            ));
        }

        let record = self
            .state
            .get_object(&self.bucket, &artifact.key)?
            .ok_or_else(|| not_found("no such key"))?;

        let version = match &artifact.version_id {
            Some(v) => record.version(v).ok_or_else(|| not_found("no such version"))?,
            None => record.current().ok_or_else(|| not_found("no current version"))?,
        };
        Ok(version.clone())
    }

    /// Apply the retention policy: drop noncurrent versions superseded more
    /// than `noncurrent_retention_days` before `now`.
    pub fn expire_noncurrent(&self, now: u64) -> ArtifactResult<usize> {
        let window = u64::from(self.settings.noncurrent_retention_days) * SECS_PER_DAY;
        let removed = self.state.retain_object_versions(&self.bucket, |v| match v.superseded_at {
            Some(at) => at.saturating_add(window) > now,
            None => true,
        })?;
        if removed > 0 {
            info!(bucket = %self.bucket, removed, "expired noncurrent versions");
        }
        Ok(removed)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
