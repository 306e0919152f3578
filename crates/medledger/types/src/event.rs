use crate::action::AccessAction;
use crate::ids::{ActorId, LedgerReference, ResourceId};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One access to a tracked resource.
///
/// `confirmed_at` is empty until the record has been read back from the ledger; the
/// timestamp is always the ledger's block time, never the local creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Per-event nonce so identical accesses still produce distinct records.
    pub event_id: Uuid,
    pub actor: ActorId,
    pub resource: ResourceId,
    pub action: AccessAction,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl AccessEvent {
    pub fn new(actor: ActorId, action: AccessAction, resource: ResourceId) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor,
            resource,
            action,
            confirmed_at: None,
        }
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn confirmed(mut self, at: DateTime<Utc>) -> Self {
        self.confirmed_at = Some(at);
        self
    }
}

/// A resource whose accesses are mirrored to the ledger.
///
/// `references` is append-only: entries are never reordered or pruned here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub id: ResourceId,
    #[serde(default)]
    pub references: Vec<LedgerReference>,
}

impl TrackedResource {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            references: Vec::new(),
        }
    }
}

/// Display-ready projection of a confirmed access event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub actor: String,
    pub action: String,
    pub reference: LedgerReference,
}
