use crate::error::RecordError;
use medledger_client::{LedgerClient, SubmissionError};
use medledger_codec::RecordCodec;
use medledger_identity::SigningIdentity;
use medledger_store::ResourceStore;
use medledger_types::{AccessAction, AccessEvent, ActorId, LedgerReference, ResourceId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Writes access events to the ledger and links them to their resource.
///
/// A reference is appended to the resource only after the ledger confirmed the record,
/// so every stored reference points at something fetchable.
pub struct AccessRecorder {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ResourceStore>,
    codec: RecordCodec,
    identity: Option<Arc<SigningIdentity>>,
    submit_timeout: Duration,
}

impl AccessRecorder {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ResourceStore>,
        codec: RecordCodec,
        identity: Arc<SigningIdentity>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            codec,
            identity: Some(identity),
            submit_timeout,
        }
    }

    /// A recorder that accepts every call and touches neither the ledger nor the store.
    pub fn disabled(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ResourceStore>,
        codec: RecordCodec,
    ) -> Self {
        Self {
            ledger,
            store,
            codec,
            identity: None,
            submit_timeout: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.identity.is_some() && self.ledger.is_enabled()
    }

    /// Record one access.
    ///
    /// Returns `Ok(None)` when mirroring is disabled. Submission failures are logged and
    /// returned; nothing is stored for them and nothing is retried.
    pub async fn record(
        &self,
        actor: ActorId,
        action: AccessAction,
        resource: ResourceId,
    ) -> Result<Option<LedgerReference>, RecordError> {
        let identity = match &self.identity {
            Some(identity) if self.ledger.is_enabled() => identity,
            _ => {
                debug!(%resource, "ledger mirror disabled; access not recorded");
                return Ok(None);
            }
        };

        if !self.store.exists(&resource).await.map_err(RecordError::Store)? {
            return Err(RecordError::UnknownResource(resource));
        }

        let event = AccessEvent::new(actor, action, resource);
        let payload = self.codec.encode(&event)?;

        let submission = self.ledger.submit(&payload, identity);
        let submitted = tokio::time::timeout(self.submit_timeout, submission)
            .await
            .unwrap_or(Err(SubmissionError::Timeout(self.submit_timeout)));
        let reference = match submitted {
            Ok(reference) => reference,
            Err(e) => {
                error!(
                    resource = %event.resource,
                    actor = %event.actor,
                    action = %event.action,
                    event_id = %event.event_id,
                    error = %e,
                    "access record was not confirmed on the ledger"
                );
                return Err(e.into());
            }
        };

        match self.store.append_reference(&event.resource, reference.clone()).await {
            Ok(count) => {
                info!(
                    %reference,
                    resource = %event.resource,
                    references = count,
                    "access recorded"
                );
                Ok(Some(reference))
            }
            Err(source) => {
                error!(
                    %reference,
                    resource = %event.resource,
                    error = %source,
                    "ledger record orphaned: reference could not be stored"
                );
                Err(RecordError::Persist { reference, source })
            }
        }
    }
}
