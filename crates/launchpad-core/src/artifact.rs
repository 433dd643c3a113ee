//! Artifact references and the shared key layout.
//!
//! CI uploads archives under `{application}/{build-id}/{archive}.zip`, and
//! the rollout coordinator resolves exactly that layout at deploy time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Archive extension every artifact key must carry.
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// A parsed artifact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub application: String,
    pub build_id: String,
    /// Archive name without the `.zip` extension.
    pub archive: String,
}

impl ArtifactKey {
    /// Build a key from its parts. `archive` may be given with or without `.zip`.
    pub fn new(application: &str, build_id: &str, archive: &str) -> CoreResult<Self> {
        let archive = archive.strip_suffix(ARCHIVE_EXTENSION).unwrap_or(archive);
        let key = Self {
            application: application.to_string(),
            build_id: build_id.to_string(),
            archive: archive.to_string(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Parse a full object key such as `backend/abc123/dist.zip`.
    pub fn parse(key: &str) -> CoreResult<Self> {
        let invalid = || CoreError::InvalidArtifactKey {
            key: key.to_string(),
        };

        let mut parts = key.split('/');
        let (Some(application), Some(build_id), Some(file), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let archive = file.strip_suffix(ARCHIVE_EXTENSION).ok_or_else(invalid)?;

        let parsed = Self {
            application: application.to_string(),
            build_id: build_id.to_string(),
            archive: archive.to_string(),
        };
        parsed.validate().map_err(|_| invalid())?;
        Ok(parsed)
    }

    /// Prefix shared by every build of the application.
    pub fn application_prefix(&self) -> String {
        format!("{}/", self.application)
    }

    fn validate(&self) -> CoreResult<()> {
        let ok = |s: &str| {
            !s.is_empty()
                && !s.contains('/')
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if ok(&self.application) && ok(&self.build_id) && ok(&self.archive) {
            Ok(())
        } else {
            Err(CoreError::InvalidArtifactKey {
                key: self.to_string(),
            })
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}{}",
            self.application, self.build_id, self.archive, ARCHIVE_EXTENSION
        )
    }
}

/// Location of a build artifact in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub bucket: String,
    pub key: String,
    /// Present only when the store is versioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

impl ArtifactRef {
    pub fn new(bucket: &str, key: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version_id: None,
        }
    }

    pub fn with_version(mut self, version_id: &str) -> Self {
        self.version_id = Some(version_id.to_string());
        self
    }

    /// Parse the key against the shared layout.
    pub fn artifact_key(&self) -> CoreResult<ArtifactKey> {
        ArtifactKey::parse(&self.key)
    }

    pub fn s3_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(v) => write!(f, "{}?versionId={v}", self.s3_uri()),
            None => write!(f, "{}", self.s3_uri()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_layout() {
        let key = ArtifactKey::parse("backend/abc123/dist.zip").unwrap();
        assert_eq!(key.application, "backend");
        assert_eq!(key.build_id, "abc123");
        assert_eq!(key.archive, "dist");
        assert_eq!(key.to_string(), "backend/abc123/dist.zip");
    }

    #[test]
    fn new_accepts_archive_with_or_without_extension() {
        let a = ArtifactKey::new("backend", "abc123", "dist").unwrap();
        let b = ArtifactKey::new("backend", "abc123", "dist.zip").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        for bad in [
            "backend/dist.zip",
            "backend/abc123/dist.tar.gz",
            "backend/abc123/nested/dist.zip",
            "/abc123/dist.zip",
            "backend/abc 123/dist.zip",
        ] {
            assert!(ArtifactKey::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn artifact_ref_display_includes_version() {
        let r = ArtifactRef::new("bucket", "backend/abc123/dist.zip").with_version("v1");
        assert_eq!(r.to_string(), "s3://bucket/backend/abc123/dist.zip?versionId=v1");
        assert_eq!(r.artifact_key().unwrap().build_id, "abc123");
    }

    #[test]
    fn version_is_omitted_from_json_when_absent() {
        let r = ArtifactRef::new("bucket", "a/b/c.zip");
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("version_id"));
    }
}
