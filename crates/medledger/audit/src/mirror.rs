use crate::config::AuditConfig;
use crate::error::{MirrorError, ReconstructError, RecordError, SettingsError};
use crate::reconstructor::{AccessLogReconstructor, AuditTrail, TrailOptions};
use crate::recorder::AccessRecorder;
use medledger_client::{DisabledLedgerClient, LedgerClient, RpcLedgerClient};
use medledger_codec::RecordCodec;
use medledger_identity::{load_identity, SigningIdentity};
use medledger_store::{ResourceStore, StoreResult};
use medledger_types::{
    AccessAction, ActorId, AuditTrailEntry, LedgerReference, ResourceId, TrackedResource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

/// Result of a record call that the caller waited on for a bounded time.
#[derive(Debug)]
pub enum DispatchOutcome {
    Recorded(LedgerReference),
    /// Mirroring is switched off; nothing was sent.
    Disabled,
    Failed(RecordError),
    /// Still running when the wait ended. The outcome is logged when it completes.
    Pending,
    /// The recording task panicked or was cancelled.
    Aborted(String),
}

/// Entry point for the application: record accesses and read trails back.
pub struct AccessMirror {
    recorder: Arc<AccessRecorder>,
    reconstructor: AccessLogReconstructor,
    store: Arc<dyn ResourceStore>,
    dispatch_timeout: Duration,
}

impl AccessMirror {
    /// Build the mirror for production use.
    ///
    /// With `enabled = false` no credentials are read and no ledger is contacted. When
    /// enabled, a missing or unusable signing secret fails here rather than at the first
    /// access.
    pub fn from_config(
        config: &AuditConfig,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self, MirrorError> {
        config.validate()?;
        if !config.enabled {
            info!("ledger mirror disabled by configuration");
            return Self::disabled(config, store);
        }

        let identity = load_identity(&config.secret_source())?;
        let ledger = RpcLedgerClient::new(config.rpc_client_config(), config.memo_program()?)
            .map_err(MirrorError::Client)?;
        info!(
            endpoint = %config.ledger.endpoint,
            commitment = %config.ledger.commitment,
            "ledger mirror enabled"
        );
        Self::with_ledger(config, Arc::new(ledger), store, Arc::new(identity))
    }

    /// Build the mirror around an explicit ledger client and identity.
    pub fn with_ledger(
        config: &AuditConfig,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ResourceStore>,
        identity: Arc<SigningIdentity>,
    ) -> Result<Self, MirrorError> {
        let codec = codec_for(config)?;
        let recorder = AccessRecorder::new(
            ledger.clone(),
            store.clone(),
            codec.clone(),
            identity,
            config.submit_timeout(),
        );
        Ok(Self::assemble(config, recorder, ledger, store, codec))
    }

    pub fn disabled(
        config: &AuditConfig,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self, MirrorError> {
        let codec = codec_for(config)?;
        let ledger: Arc<dyn LedgerClient> = Arc::new(DisabledLedgerClient);
        let recorder = AccessRecorder::disabled(ledger.clone(), store.clone(), codec.clone());
        Ok(Self::assemble(config, recorder, ledger, store, codec))
    }

    fn assemble(
        config: &AuditConfig,
        recorder: AccessRecorder,
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn ResourceStore>,
        codec: RecordCodec,
    ) -> Self {
        let options = TrailOptions {
            utc_offset: config.utc_offset(),
            max_concurrent_fetches: config.trail.max_concurrent_fetches,
            fetch_timeout: config.fetch_timeout(),
        };
        Self {
            recorder: Arc::new(recorder),
            reconstructor: AccessLogReconstructor::new(ledger, store.clone(), codec, options),
            store,
            dispatch_timeout: config.dispatch_timeout(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.recorder.is_enabled()
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Start tracking a resource.
    pub async fn register(&self, resource: &ResourceId) -> StoreResult<TrackedResource> {
        self.store.register(resource).await
    }

    /// Record an access and wait for the full outcome.
    pub async fn record(
        &self,
        actor: ActorId,
        action: AccessAction,
        resource: ResourceId,
    ) -> Result<Option<LedgerReference>, RecordError> {
        self.recorder.record(actor, action, resource).await
    }

    /// Record an access, waiting at most the configured dispatch timeout.
    ///
    /// The submission keeps running after the wait ends; it is never cancelled half-way.
    pub async fn record_bounded(
        &self,
        actor: ActorId,
        action: AccessAction,
        resource: ResourceId,
    ) -> DispatchOutcome {
        if !self.recorder.is_enabled() {
            return DispatchOutcome::Disabled;
        }

        let recorder = self.recorder.clone();
        let mut handle =
            tokio::spawn(async move { recorder.record(actor, action, resource).await });

        match tokio::time::timeout(self.dispatch_timeout, &mut handle).await {
            Ok(joined) => into_outcome(joined),
            Err(_) => {
                debug!(timeout = ?self.dispatch_timeout, "access record still in flight");
                tokio::spawn(async move {
                    log_outcome(into_outcome(handle.await));
                });
                DispatchOutcome::Pending
            }
        }
    }

    /// Record an access in the background. The outcome is only logged.
    pub fn record_detached(
        &self,
        actor: ActorId,
        action: AccessAction,
        resource: ResourceId,
    ) -> JoinHandle<()> {
        let recorder = self.recorder.clone();
        tokio::spawn(async move {
            let outcome = recorder.record(actor, action, resource).await;
            log_outcome(into_outcome(Ok(outcome)));
        })
    }

    /// Audit trail for `resource`, newest first.
    pub async fn reconstruct(
        &self,
        resource: &ResourceId,
    ) -> Result<Vec<AuditTrailEntry>, ReconstructError> {
        self.reconstructor.reconstruct(resource).await
    }

    pub async fn reconstruct_report(
        &self,
        resource: &ResourceId,
    ) -> Result<AuditTrail, ReconstructError> {
        self.reconstructor.reconstruct_report(resource).await
    }
}

fn codec_for(config: &AuditConfig) -> Result<RecordCodec, SettingsError> {
    Ok(RecordCodec::new(config.memo_program()?)
        .with_missing_block_time(config.trail.missing_block_time))
}

fn into_outcome(
    joined: Result<Result<Option<LedgerReference>, RecordError>, JoinError>,
) -> DispatchOutcome {
    match joined {
        Ok(Ok(Some(reference))) => DispatchOutcome::Recorded(reference),
        Ok(Ok(None)) => DispatchOutcome::Disabled,
        Ok(Err(e)) => DispatchOutcome::Failed(e),
        Err(e) => DispatchOutcome::Aborted(e.to_string()),
    }
}

// Failures were already logged by the recorder.
fn log_outcome(outcome: DispatchOutcome) {
    match outcome {
        DispatchOutcome::Recorded(reference) => debug!(%reference, "background access record completed"),
        DispatchOutcome::Aborted(reason) => error!(%reason, "background access record aborted"),
        DispatchOutcome::Failed(_) | DispatchOutcome::Disabled | DispatchOutcome::Pending => {}
    }
}
