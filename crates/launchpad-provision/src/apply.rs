//! Diff a stack plan against the ledger and commit it atomically.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use launchpad_core::{ResourceGraph, ResourceKind, StackIdentity};
use launchpad_state::{LedgerChange, ResourceRecord, StateStore};

use crate::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Unchanged,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ChangeAction::Create => "+",
            ChangeAction::Update => "~",
            ChangeAction::Unchanged => "=",
            ChangeAction::Delete => "-",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub name: String,
    pub kind: ResourceKind,
    pub action: ChangeAction,
}

/// Difference between a stack plan and what the ledger records.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub owner: String,
    pub changes: Vec<ResourceChange>,
    ledger: Vec<LedgerChange>,
}

impl ChangeSet {
    /// True when applying would write nothing.
    pub fn is_noop(&self) -> bool {
        self.ledger.is_empty()
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn action_for(&self, name: &str) -> Option<ChangeAction> {
        self.changes.iter().find(|c| c.name == name).map(|c| c.action)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub changes: ChangeSet,
    /// Ledger writes committed.
    pub applied: usize,
}

/// Converges the ledger onto stack plans.
#[derive(Clone)]
pub struct Provisioner {
    state: StateStore,
}

impl Provisioner {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Compare `graph` with the resources the ledger holds for `stack`.
    ///
    /// Fails with `NameConflict` if any desired name is owned by another stack.
    pub fn plan(&self, stack: &StackIdentity, graph: &ResourceGraph) -> ProvisionResult<ChangeSet> {
        self.diff(stack, graph, epoch_secs())
    }

    /// Plan, then commit every change in one ledger transaction.
    ///
    /// Resources the stack owns that are no longer in `graph` are deleted.
    /// On any conflict nothing is written.
    pub fn apply(&self, stack: &StackIdentity, graph: &ResourceGraph) -> ProvisionResult<ApplyReport> {
        let changes = self.diff(stack, graph, epoch_secs())?;
        if changes.is_noop() {
            info!(stack = %stack, resources = graph.len(), "stack already converged");
            return Ok(ApplyReport {
                changes,
                applied: 0,
            });
        }

        let applied = self.state.commit_changes(&changes.owner, &changes.ledger)?;
        info!(
            stack = %stack,
            created = changes.count(ChangeAction::Create),
            updated = changes.count(ChangeAction::Update),
            deleted = changes.count(ChangeAction::Delete),
            "stack applied"
        );
        Ok(ApplyReport { changes, applied })
    }

    fn diff(&self, stack: &StackIdentity, graph: &ResourceGraph, now: u64) -> ProvisionResult<ChangeSet> {
        let owner = stack.key();
        let mut changes = Vec::new();
        let mut ledger = Vec::new();

        for resource in graph.iter() {
            let existing = self.state.get_resource(&resource.name)?;
            let action = match &existing {
                Some(record) if record.owner != owner => {
                    return Err(ProvisionError::NameConflict {
                        name: resource.name.clone(),
                        owner: record.owner.clone(),
                    });
                }
                Some(record) if record.fingerprint == resource.fingerprint() => ChangeAction::Unchanged,
                Some(_) => ChangeAction::Update,
                None => ChangeAction::Create,
            };
            debug!(name = %resource.name, %action, "diffed resource");

            if action != ChangeAction::Unchanged {
                ledger.push(LedgerChange::Put(ResourceRecord::new(&owner, resource.clone(), now)));
            }
            changes.push(ResourceChange {
                name: resource.name.clone(),
                kind: resource.kind(),
                action,
            });
        }

        let desired: BTreeSet<&str> = graph.names();
        for record in self.state.list_resources_owned_by(&owner)? {
            if desired.contains(record.name.as_str()) {
                continue;
            }
            ledger.push(LedgerChange::Delete {
                name: record.name.clone(),
            });
            changes.push(ResourceChange {
                name: record.name,
                kind: record.kind,
                action: ChangeAction::Delete,
            });
        }

        Ok(ChangeSet {
            owner,
            changes,
            ledger,
        })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
