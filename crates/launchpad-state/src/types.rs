//! Record types persisted in the ledger.

use serde::{Deserialize, Serialize};

use launchpad_core::{Resource, ResourceKind};

// ── Resources ─────────────────────────────────────────────────────

/// A resource the ledger believes exists, and who owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceRecord {
    pub name: String,
    /// Ownership key of the stack (see `StackIdentity::key`).
    pub owner: String,
    pub kind: ResourceKind,
    pub resource: Resource,
    pub fingerprint: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ResourceRecord {
    pub fn new(owner: &str, resource: Resource, now: u64) -> Self {
        Self {
            name: resource.name.clone(),
            owner: owner.to_string(),
            kind: resource.kind(),
            fingerprint: resource.fingerprint(),
            resource,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single mutation inside a changeset.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerChange {
    /// Create or replace the record under its name.
    Put(ResourceRecord),
    /// Remove the named record.
    Delete { name: String },
}

impl LedgerChange {
    pub fn name(&self) -> &str {
        match self {
            LedgerChange::Put(record) => &record.name,
            LedgerChange::Delete { name } => name,
        }
    }
}

// ── Objects ───────────────────────────────────────────────────────

/// One stored version of an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectVersion {
    pub version_id: String,
    /// Hex SHA-256 of the content.
    pub etag: String,
    pub size: u64,
    pub created_at: u64,
    /// When a newer version replaced this one; `None` for the current version.
    pub superseded_at: Option<u64>,
}

/// Version history of a single key, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRecord {
    pub bucket: String,
    pub key: String,
    pub versions: Vec<ObjectVersion>,
}

impl ObjectRecord {
    pub fn table_key(&self) -> String {
        object_key(&self.bucket, &self.key)
    }

    pub fn current(&self) -> Option<&ObjectVersion> {
        self.versions.iter().rev().find(|v| v.superseded_at.is_none())
    }

    pub fn version(&self, version_id: &str) -> Option<&ObjectVersion> {
        self.versions.iter().find(|v| v.version_id == version_id)
    }
}

/// Build the composite key for the objects table.
pub fn object_key(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}
