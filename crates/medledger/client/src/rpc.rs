//! JSON-RPC ledger client.

use crate::error::{FetchError, SubmissionError};
use crate::wire;
use crate::LedgerClient;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use medledger_codec::{InstructionData, RawInstruction, RawRecord};
use medledger_identity::SigningIdentity;
use medledger_types::{Address, Commitment, LedgerReference};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// JSON-RPC "invalid params"; a malformed signature string lands here.
const INVALID_PARAMS: i64 = -32602;

/// Connection settings for [`RpcLedgerClient`].
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub endpoint: String,
    /// Level a submission must reach before it counts as confirmed.
    pub commitment: Commitment,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// How long to poll for confirmation after sending.
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub skip_preflight: bool,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8899".to_string(),
            commitment: Commitment::Confirmed,
            request_timeout: Duration::from_secs(10),
            confirm_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            skip_preflight: false,
        }
    }
}

/// Ledger client speaking JSON-RPC over HTTP.
pub struct RpcLedgerClient {
    http: Client,
    config: RpcClientConfig,
    memo_program: Address,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    pub fn new(config: RpcClientConfig, memo_program: Address) -> Result<Self, SubmissionError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            memo_program,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32], SubmissionError> {
        let response: Contextual<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.config.commitment.as_str() }]),
            )
            .await?;

        let bytes = bs58::decode(&response.value.blockhash)
            .into_vec()
            .map_err(|e| SubmissionError::Malformed(format!("blockhash: {e}")))?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            SubmissionError::Malformed(format!(
                "blockhash is {} bytes, expected 32",
                bytes.len()
            ))
        })
    }

    async fn await_confirmation(&self, reference: &LedgerReference) -> Result<(), SubmissionError> {
        let started = Instant::now();
        let deadline = started + self.config.confirm_timeout;

        loop {
            match self.signature_status(reference).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err.as_ref().filter(|e| !e.is_null()) {
                        return Err(SubmissionError::Rejected(err.to_string()));
                    }
                    if self.config.commitment.is_satisfied_by(status.observed()) {
                        debug!(%reference, slot = status.slot, "transaction confirmed");
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    debug!(%reference, %error, "signature status poll failed");
                }
            }

            if Instant::now() >= deadline {
                return Err(SubmissionError::ConfirmationTimeout {
                    reference: reference.clone(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn signature_status(
        &self,
        reference: &LedgerReference,
    ) -> Result<Option<SignatureStatus>, RpcCallError> {
        let response: Contextual<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[reference.as_str()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(response.value.into_iter().next().flatten())
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcCallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcCallError::from_reqwest(e, self.config.request_timeout))?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RpcCallError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RpcCallError::Transport(format!("HTTP {status}: {message}")));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| RpcCallError::Decode(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(RpcCallError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(envelope.result).map_err(|e| RpcCallError::Decode(e.to_string()))
    }

    fn fetch_commitment(&self) -> Commitment {
        // getTransaction does not serve processed-level lookups
        self.config.commitment.max(Commitment::Confirmed)
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn submit(
        &self,
        payload: &[u8],
        identity: &SigningIdentity,
    ) -> Result<LedgerReference, SubmissionError> {
        let blockhash = self.latest_blockhash().await?;
        let tx = wire::sign_memo_transaction(identity, &self.memo_program, &blockhash, payload)
            .ok_or_else(|| {
                SubmissionError::Signing(format!(
                    "payload of {} bytes does not fit a transaction",
                    payload.len()
                ))
            })?;
        let expected = tx.reference();

        let returned: String = self
            .call(
                "sendTransaction",
                json!([
                    BASE64_STANDARD.encode(&tx.bytes),
                    {
                        "encoding": "base64",
                        "skipPreflight": self.config.skip_preflight,
                        "preflightCommitment": self.config.commitment.as_str(),
                    }
                ]),
            )
            .await?;

        let reference = LedgerReference::new(returned);
        if reference != expected {
            warn!(%reference, %expected, "ledger returned an unexpected transaction signature");
        }

        info!(%reference, "access record sent; awaiting confirmation");
        self.await_confirmation(&reference).await?;
        info!(%reference, "access record confirmed on ledger");
        Ok(reference)
    }

    async fn fetch(&self, reference: &LedgerReference) -> Result<RawRecord, FetchError> {
        let result: Result<Option<TransactionResponse>, RpcCallError> = self
            .call(
                "getTransaction",
                json!([
                    reference.as_str(),
                    {
                        "encoding": "jsonParsed",
                        "commitment": self.fetch_commitment().as_str(),
                        "maxSupportedTransactionVersion": 0,
                    }
                ]),
            )
            .await;

        match result {
            Ok(Some(tx)) => Ok(tx.into_raw_record(reference.clone())),
            Ok(None) => Err(FetchError::NotFound(reference.clone())),
            Err(RpcCallError::Rpc { code, .. }) if code == INVALID_PARAMS => {
                Err(FetchError::NotFound(reference.clone()))
            }
            Err(other) => Err(other.into()),
        }
    }
}

#[derive(Debug)]
enum RpcCallError {
    Transport(String),
    Timeout(Duration),
    Rpc { code: i64, message: String },
    Decode(String),
}

impl RpcCallError {
    fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl std::fmt::Display for RpcCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Timeout(after) => write!(f, "timed out after {after:?}"),
            Self::Rpc { code, message } => write!(f, "rpc error {code}: {message}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
        }
    }
}

impl From<RpcCallError> for SubmissionError {
    fn from(error: RpcCallError) -> Self {
        match error {
            RpcCallError::Transport(msg) => Self::Transport(msg),
            RpcCallError::Timeout(after) => Self::Timeout(after),
            RpcCallError::Rpc { code, message } => Self::Rpc { code, message },
            RpcCallError::Decode(msg) => Self::Malformed(msg),
        }
    }
}

impl From<RpcCallError> for FetchError {
    fn from(error: RpcCallError) -> Self {
        match error {
            RpcCallError::Transport(msg) => Self::Transport(msg),
            RpcCallError::Timeout(after) => Self::Timeout(after),
            RpcCallError::Rpc { code, message } => Self::Rpc { code, message },
            RpcCallError::Decode(msg) => Self::Malformed(msg),
        }
    }
}

// ========== Wire types ==========

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Contextual<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct LatestBlockhash {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    #[serde(default)]
    confirmations: Option<u64>,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default)]
    confirmation_status: Option<Commitment>,
}

impl SignatureStatus {
    fn observed(&self) -> Commitment {
        match (self.confirmation_status, self.confirmations) {
            (Some(level), _) => level,
            // older nodes omit the status; no confirmation count means rooted
            (None, None) => Commitment::Finalized,
            (None, Some(_)) => Commitment::Processed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponse {
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<TransactionMeta>,
    transaction: ParsedTransaction,
}

#[derive(Debug, Deserialize)]
struct TransactionMeta {
    #[serde(default)]
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ParsedTransaction {
    message: ParsedMessage,
}

#[derive(Debug, Deserialize)]
struct ParsedMessage {
    #[serde(default)]
    instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedInstruction {
    program_id: String,
    #[serde(default)]
    parsed: Option<Value>,
    #[serde(default)]
    data: Option<String>,
}

impl TransactionResponse {
    fn into_raw_record(self, reference: LedgerReference) -> RawRecord {
        let failed = self
            .meta
            .and_then(|meta| meta.err)
            .is_some_and(|err| !err.is_null());

        let instructions = self
            .transaction
            .message
            .instructions
            .into_iter()
            .filter_map(|ix| {
                let data = match (ix.parsed, ix.data) {
                    (Some(Value::String(text)), _) => InstructionData::Text(text),
                    (_, Some(encoded)) => InstructionData::Base58(encoded),
                    _ => return None,
                };
                Some(RawInstruction {
                    program_id: ix.program_id,
                    data,
                })
            })
            .collect();

        RawRecord {
            reference,
            slot: self.slot,
            block_time: self.block_time,
            failed,
            instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medledger_types::MEMO_PROGRAM_ID;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rpc_result(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
    }

    fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": code, "message": message }
        }))
    }

    fn client_for(server: &MockServer) -> RpcLedgerClient {
        let config = RpcClientConfig {
            endpoint: server.uri(),
            confirm_timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
            ..RpcClientConfig::default()
        };
        RpcLedgerClient::new(config, Address::memo_program()).expect("client")
    }

    async fn mount_blockhash(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getLatestBlockhash" })))
            .respond_with(rpc_result(json!({
                "context": { "slot": 1 },
                "value": { "blockhash": bs58::encode([3u8; 32]).into_string(), "lastValidBlockHeight": 100 }
            })))
            .mount(server)
            .await;
    }

    async fn mount_send(server: &MockServer, signature: &str) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "sendTransaction" })))
            .respond_with(rpc_result(json!(signature)))
            .mount(server)
            .await;
    }

    async fn mount_status(server: &MockServer, status: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getSignatureStatuses" })))
            .respond_with(rpc_result(json!({ "context": { "slot": 5 }, "value": [status] })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn submit_returns_reference_once_confirmed() {
        let server = MockServer::start().await;
        mount_blockhash(&server).await;
        mount_send(&server, "5sig").await;
        mount_status(
            &server,
            json!({ "slot": 5, "confirmations": 1, "err": null, "confirmationStatus": "confirmed" }),
        )
        .await;

        let client = client_for(&server);
        let identity = SigningIdentity::generate();
        let reference = client.submit(b"payload", &identity).await.expect("submit");
        assert_eq!(reference, LedgerReference::new("5sig"));
    }

    #[tokio::test]
    async fn submit_surfaces_rpc_errors() {
        let server = MockServer::start().await;
        mount_blockhash(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "sendTransaction" })))
            .respond_with(rpc_error(-32002, "insufficient funds for fee"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .submit(b"payload", &SigningIdentity::generate())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Rpc {
                code: -32002,
                message: "insufficient funds for fee".to_string()
            }
        );
    }

    #[tokio::test]
    async fn submit_reports_failed_execution_as_rejected() {
        let server = MockServer::start().await;
        mount_blockhash(&server).await;
        mount_send(&server, "5sig").await;
        mount_status(
            &server,
            json!({ "slot": 5, "confirmations": 1, "err": { "InstructionError": [0, "InvalidAccountData"] }, "confirmationStatus": "confirmed" }),
        )
        .await;

        let client = client_for(&server);
        let err = client
            .submit(b"payload", &SigningIdentity::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected(_)));
    }

    #[tokio::test]
    async fn submit_times_out_when_never_confirmed() {
        let server = MockServer::start().await;
        mount_blockhash(&server).await;
        mount_send(&server, "5sig").await;
        mount_status(&server, Value::Null).await;

        let client = client_for(&server);
        let err = client
            .submit(b"payload", &SigningIdentity::generate())
            .await
            .unwrap_err();
        match err {
            SubmissionError::ConfirmationTimeout { reference, .. } => {
                assert_eq!(reference, LedgerReference::new("5sig"));
            }
            other => panic!("expected confirmation timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_waits_for_stronger_commitment() {
        let server = MockServer::start().await;
        mount_blockhash(&server).await;
        mount_send(&server, "5sig").await;
        mount_status(
            &server,
            json!({ "slot": 5, "confirmations": 0, "err": null, "confirmationStatus": "processed" }),
        )
        .await;

        let client = client_for(&server);
        let err = client
            .submit(b"payload", &SigningIdentity::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::ConfirmationTimeout { .. }));
    }

    #[tokio::test]
    async fn http_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("node is behind"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .submit(b"payload", &SigningIdentity::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Transport(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn fetch_parses_memo_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getTransaction" })))
            .respond_with(rpc_result(json!({
                "slot": 42,
                "blockTime": 1_700_000_000,
                "meta": { "err": null, "fee": 5000 },
                "transaction": {
                    "signatures": ["5sig"],
                    "message": {
                        "accountKeys": [],
                        "instructions": [
                            { "program": "spl-memo", "programId": MEMO_PROGRAM_ID, "parsed": "hello", "stackHeight": null },
                            { "programId": "11111111111111111111111111111111", "accounts": [], "data": "3Bxs" }
                        ]
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reference = LedgerReference::new("5sig");
        let record = client.fetch(&reference).await.expect("fetch");

        assert_eq!(record.reference, reference);
        assert_eq!(record.slot, 42);
        assert_eq!(record.block_time, Some(1_700_000_000));
        assert!(!record.failed);
        assert_eq!(record.instructions.len(), 2);
        assert_eq!(record.instructions[0].program_id, MEMO_PROGRAM_ID);
        assert_eq!(record.instructions[0].data, InstructionData::Text("hello".into()));
        assert_eq!(record.instructions[1].data, InstructionData::Base58("3Bxs".into()));
    }

    #[tokio::test]
    async fn fetch_marks_failed_transactions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getTransaction" })))
            .respond_with(rpc_result(json!({
                "slot": 7,
                "blockTime": null,
                "meta": { "err": { "InstructionError": [0, "Custom"] } },
                "transaction": { "message": { "instructions": [] } }
            })))
            .mount(&server)
            .await;

        let record = client_for(&server)
            .fetch(&LedgerReference::new("x"))
            .await
            .expect("fetch");
        assert!(record.failed);
        assert_eq!(record.block_time, None);
    }

    #[tokio::test]
    async fn fetch_null_result_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getTransaction" })))
            .respond_with(rpc_result(Value::Null))
            .mount(&server)
            .await;

        let reference = LedgerReference::new("gone");
        let err = client_for(&server).fetch(&reference).await.unwrap_err();
        assert_eq!(err, FetchError::NotFound(reference));
    }

    #[tokio::test]
    async fn fetch_invalid_reference_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_error(INVALID_PARAMS, "Invalid param: WrongSize"))
            .mount(&server)
            .await;

        let reference = LedgerReference::new("not-a-signature");
        let err = client_for(&server).fetch(&reference).await.unwrap_err();
        assert_eq!(err, FetchError::NotFound(reference));
    }

    #[test]
    fn legacy_status_without_level_is_rooted() {
        let status: SignatureStatus =
            serde_json::from_value(json!({ "slot": 1, "confirmations": null, "err": null })).unwrap();
        assert_eq!(status.observed(), Commitment::Finalized);
    }
}
