use crate::error::ReconstructError;
use chrono::{FixedOffset, Offset, Utc};
use futures::stream::{self, StreamExt};
use medledger_client::{FetchError, LedgerClient};
use medledger_codec::{DecodeError, RecordCodec};
use medledger_store::ResourceStore;
use medledger_types::{AccessEvent, AuditTrailEntry, LedgerReference, ResourceId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a trail is rebuilt and presented.
#[derive(Debug, Clone)]
pub struct TrailOptions {
    /// Offset applied to every entry timestamp.
    pub utc_offset: FixedOffset,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
}

impl Default for TrailOptions {
    fn default() -> Self {
        Self {
            utc_offset: FixedOffset::east_opt(0).unwrap_or_else(|| Utc.fix()),
            max_concurrent_fetches: 8,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a stored reference did not make it into the trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OmissionReason {
    Fetch(FetchError),
    Decode(DecodeError),
    /// The record describes a different resource than the one whose list holds it.
    ResourceMismatch(ResourceId),
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Decode(e) => write!(f, "undecodable record: {e}"),
            Self::ResourceMismatch(other) => write!(f, "record belongs to resource {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmittedReference {
    pub reference: LedgerReference,
    pub reason: OmissionReason,
}

/// A rebuilt trail plus what had to be left out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditTrail {
    /// Newest first.
    pub entries: Vec<AuditTrailEntry>,
    pub omitted: Vec<OmittedReference>,
}

/// Rebuilds a resource's access history from the ledger.
///
/// The ledger is the only source of entry content and time. Individual references that
/// cannot be fetched or decoded are dropped from the trail and reported in
/// [`AuditTrail::omitted`]; they never fail the whole reconstruction.
pub struct AccessLogReconstructor {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn ResourceStore>,
    codec: RecordCodec,
    options: TrailOptions,
}

impl AccessLogReconstructor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ResourceStore>,
        codec: RecordCodec,
        options: TrailOptions,
    ) -> Self {
        Self {
            ledger,
            store,
            codec,
            options,
        }
    }

    /// Entries for `resource`, newest first.
    pub async fn reconstruct(
        &self,
        resource: &ResourceId,
    ) -> Result<Vec<AuditTrailEntry>, ReconstructError> {
        Ok(self.reconstruct_report(resource).await?.entries)
    }

    pub async fn reconstruct_report(
        &self,
        resource: &ResourceId,
    ) -> Result<AuditTrail, ReconstructError> {
        if !self.ledger.is_enabled() {
            debug!(%resource, "ledger mirror disabled; empty trail");
            return Ok(AuditTrail::default());
        }

        let references = self.store.references(resource).await.map_err(|e| {
            if e.is_not_found() {
                ReconstructError::UnknownResource(resource.clone())
            } else {
                ReconstructError::Store(e)
            }
        })?;

        let mut seen = HashSet::new();
        let unique: Vec<LedgerReference> = references
            .into_iter()
            .filter(|reference| seen.insert(reference.clone()))
            .collect();

        // `buffered` keeps input order, so equal timestamps stay in append order
        let loaded: Vec<(LedgerReference, Result<AccessEvent, OmissionReason>)> =
            stream::iter(unique)
                .map(|reference| async move {
                    let outcome = self.load(&reference, resource).await;
                    (reference, outcome)
                })
                .buffered(self.options.max_concurrent_fetches.max(1))
                .collect()
                .await;

        let mut trail = AuditTrail::default();
        let mut event_ids: HashSet<Uuid> = HashSet::new();

        for (reference, outcome) in loaded {
            let event = match outcome {
                Ok(event) => event,
                Err(reason) => {
                    warn!(%resource, %reference, %reason, "omitting trail entry");
                    trail.omitted.push(OmittedReference { reference, reason });
                    continue;
                }
            };

            if !event_ids.insert(event.event_id) {
                debug!(%resource, %reference, event_id = %event.event_id, "duplicate event collapsed");
                continue;
            }

            let Some(confirmed_at) = event.confirmed_at else {
                trail.omitted.push(OmittedReference {
                    reference,
                    reason: OmissionReason::Decode(DecodeError::MissingBlockTime),
                });
                continue;
            };

            trail.entries.push(AuditTrailEntry {
                timestamp: confirmed_at.with_timezone(&self.options.utc_offset),
                actor: event.actor.to_string(),
                action: event.action.label(),
                reference,
            });
        }

        trail.entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(
            %resource,
            entries = trail.entries.len(),
            omitted = trail.omitted.len(),
            "trail reconstructed"
        );
        Ok(trail)
    }

    async fn load(
        &self,
        reference: &LedgerReference,
        resource: &ResourceId,
    ) -> Result<AccessEvent, OmissionReason> {
        let raw = tokio::time::timeout(self.options.fetch_timeout, self.ledger.fetch(reference))
            .await
            .unwrap_or(Err(FetchError::Timeout(self.options.fetch_timeout)))
            .map_err(OmissionReason::Fetch)?;

        let event = self.codec.decode(&raw).map_err(OmissionReason::Decode)?;
        if &event.resource != resource {
            return Err(OmissionReason::ResourceMismatch(event.resource));
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use medledger_client::{DisabledLedgerClient, InMemoryLedger};
    use medledger_codec::{InstructionData, RawInstruction, RawRecord};
    use medledger_store::InMemoryResourceStore;
    use medledger_types::{AccessAction, ActorId, Address, MEMO_PROGRAM_ID};

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        store: Arc<InMemoryResourceStore>,
        resource: ResourceId,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(InMemoryResourceStore::new());
            let resource = ResourceId::new("xray-2024.png");
            store.register(&resource).await.unwrap();
            Self {
                ledger: Arc::new(InMemoryLedger::default()),
                store,
                resource,
            }
        }

        fn reconstructor(&self, options: TrailOptions) -> AccessLogReconstructor {
            AccessLogReconstructor::new(
                self.ledger.clone(),
                self.store.clone(),
                RecordCodec::new(Address::memo_program()),
                options,
            )
        }

        /// Place a memo record directly on the ledger and link it.
        async fn put(&self, reference: &str, block_time: Option<i64>, memo: String) {
            let reference = LedgerReference::new(reference);
            self.ledger
                .insert_raw(RawRecord {
                    reference: reference.clone(),
                    slot: 1,
                    block_time,
                    failed: false,
                    instructions: vec![RawInstruction {
                        program_id: MEMO_PROGRAM_ID.to_string(),
                        data: InstructionData::Text(memo),
                    }],
                })
                .await;
            self.store
                .append_reference(&self.resource, reference)
                .await
                .unwrap();
        }

        fn memo(&self, actor: &str, action: AccessAction) -> String {
            let event = AccessEvent::new(ActorId::new(actor), action, self.resource.clone());
            String::from_utf8(
                RecordCodec::new(Address::memo_program())
                    .encode(&event)
                    .unwrap(),
            )
            .unwrap()
        }
    }

    #[tokio::test]
    async fn empty_resource_has_empty_trail() {
        let fx = Fixture::new().await;
        let trail = fx
            .reconstructor(TrailOptions::default())
            .reconstruct_report(&fx.resource)
            .await
            .unwrap();
        assert_eq!(trail, AuditTrail::default());
        assert_eq!(fx.ledger.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_resource_is_an_error() {
        let fx = Fixture::new().await;
        let err = fx
            .reconstructor(TrailOptions::default())
            .reconstruct(&ResourceId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconstructError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn entries_are_newest_first_with_offset() {
        let fx = Fixture::new().await;
        fx.put("r1", Some(1_000), fx.memo("a@x", AccessAction::Uploaded)).await;
        fx.put("r2", Some(3_000), fx.memo("b@x", AccessAction::SharedWith("c@x".into())))
            .await;
        fx.put("r3", Some(2_000), fx.memo("c@x", AccessAction::Downloaded)).await;

        let options = TrailOptions {
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            ..TrailOptions::default()
        };
        let entries = fx.reconstructor(options).reconstruct(&fx.resource).await.unwrap();

        let refs: Vec<_> = entries.iter().map(|e| e.reference.as_str()).collect();
        assert_eq!(refs, vec!["r2", "r3", "r1"]);
        assert_eq!(entries[0].action, "shared with c@x");
        assert_eq!(entries[0].actor, "b@x");
        assert_eq!(entries[0].timestamp.offset().local_minus_utc(), 7200);
        assert_eq!(
            entries[0].timestamp,
            DateTime::<Utc>::from_timestamp(3_000, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn ties_keep_append_order() {
        let fx = Fixture::new().await;
        for reference in ["first", "second", "third"] {
            fx.put(reference, Some(500), fx.memo("a@x", AccessAction::Downloaded)).await;
        }
        let entries = fx
            .reconstructor(TrailOptions::default())
            .reconstruct(&fx.resource)
            .await
            .unwrap();
        let refs: Vec<_> = entries.iter().map(|e| e.reference.as_str()).collect();
        assert_eq!(refs, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn bad_references_are_omitted_not_fatal() {
        let fx = Fixture::new().await;
        fx.put("good", Some(10), fx.memo("a@x", AccessAction::Downloaded)).await;
        fx.put("garbage", Some(20), "???".to_string()).await;
        fx.put("no-time", None, fx.memo("a@x", AccessAction::Downloaded)).await;
        fx.store
            .append_reference(&fx.resource, LedgerReference::new("pruned"))
            .await
            .unwrap();

        let trail = fx
            .reconstructor(TrailOptions::default())
            .reconstruct_report(&fx.resource)
            .await
            .unwrap();

        assert_eq!(trail.entries.len(), 1);
        assert_eq!(trail.entries[0].reference.as_str(), "good");

        let reasons: Vec<_> = trail
            .omitted
            .iter()
            .map(|o| (o.reference.as_str(), &o.reason))
            .collect();
        assert_eq!(reasons.len(), 3);
        assert!(matches!(reasons[0], ("garbage", OmissionReason::Decode(DecodeError::InvalidPayload(_)))));
        assert!(matches!(reasons[1], ("no-time", OmissionReason::Decode(DecodeError::MissingBlockTime))));
        assert!(matches!(reasons[2], ("pruned", OmissionReason::Fetch(FetchError::NotFound(_)))));
    }

    #[tokio::test]
    async fn foreign_resource_records_are_omitted() {
        let fx = Fixture::new().await;
        let foreign = AccessEvent::new(
            ActorId::new("mallory@x"),
            AccessAction::Downloaded,
            ResourceId::new("other-file"),
        );
        let memo = String::from_utf8(
            RecordCodec::new(Address::memo_program())
                .encode(&foreign)
                .unwrap(),
        )
        .unwrap();
        fx.put("foreign", Some(10), memo).await;

        let trail = fx
            .reconstructor(TrailOptions::default())
            .reconstruct_report(&fx.resource)
            .await
            .unwrap();
        assert!(trail.entries.is_empty());
        assert_eq!(
            trail.omitted[0].reason,
            OmissionReason::ResourceMismatch(ResourceId::new("other-file"))
        );
    }

    #[tokio::test]
    async fn duplicates_collapse() {
        let fx = Fixture::new().await;
        let memo = fx.memo("a@x", AccessAction::Downloaded);
        fx.put("once", Some(10), memo.clone()).await;
        // same reference listed twice
        fx.store
            .append_reference(&fx.resource, LedgerReference::new("once"))
            .await
            .unwrap();
        // same event under a second reference
        fx.put("replayed", Some(11), memo).await;

        let trail = fx
            .reconstructor(TrailOptions::default())
            .reconstruct_report(&fx.resource)
            .await
            .unwrap();
        assert_eq!(trail.entries.len(), 1);
        assert!(trail.omitted.is_empty());
        assert_eq!(fx.ledger.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetches_time_out_individually() {
        let fx = Fixture::new().await;
        fx.put("slow", Some(10), fx.memo("a@x", AccessAction::Downloaded)).await;
        fx.ledger.set_latency(Duration::from_secs(30));

        let options = TrailOptions {
            fetch_timeout: Duration::from_secs(1),
            ..TrailOptions::default()
        };
        let trail = fx
            .reconstructor(options)
            .reconstruct_report(&fx.resource)
            .await
            .unwrap();
        assert!(trail.entries.is_empty());
        assert_eq!(
            trail.omitted[0].reason,
            OmissionReason::Fetch(FetchError::Timeout(Duration::from_secs(1)))
        );
    }

    #[tokio::test]
    async fn disabled_ledger_yields_empty_trail() {
        let fx = Fixture::new().await;
        fx.store
            .append_reference(&fx.resource, LedgerReference::new("r"))
            .await
            .unwrap();
        let reconstructor = AccessLogReconstructor::new(
            Arc::new(DisabledLedgerClient),
            fx.store.clone(),
            RecordCodec::new(Address::memo_program()),
            TrailOptions::default(),
        );
        assert!(reconstructor.reconstruct(&fx.resource).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_ledger_is_never_fetched_from() {
        let fx = Fixture::new().await;
        let memo = fx.memo("a@example.com", AccessAction::Uploaded);
        fx.put("r", Some(1_700_000_000), memo).await;
        fx.ledger.set_enabled(false);

        let trail = fx
            .reconstructor(TrailOptions::default())
            .reconstruct_report(&fx.resource)
            .await
            .unwrap();
        assert_eq!(trail, AuditTrail::default());
        assert_eq!(fx.ledger.fetch_calls(), 0);
        assert_eq!(fx.ledger.submit_calls(), 0);
    }
}
