//! The remote conversion endpoint and its wire messages.
//!
//! A request carries the root id and every record the remote side has not
//! seen yet, dependencies first. The endpoint answers once, either with a
//! bare success or with `{"isException": true, "message": ..., "trace": [...]}`.

use async_trait::async_trait;
use graphport_ir::{ObjectId, SourceAttribution};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

// ──────────────────────────────────────────────
// Messages
// ──────────────────────────────────────────────

/// One batch submitted for conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub root_id: ObjectId,
    /// Serialized records in dependency-first order.
    #[serde(rename = "idToSerializedRecord")]
    pub records: IndexMap<ObjectId, serde_json::Value>,
}

impl ConversionRequest {
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.records.keys().copied()
    }
}

/// What the endpoint answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResponse {
    Success,
    Exception {
        message: String,
        trace: Vec<SourceAttribution>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    is_exception: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    trace: Vec<SourceAttribution>,
}

impl RemoteResponse {
    /// Parse the endpoint's JSON answer. Anything without a true
    /// `isException` flag is a success.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TransportError> {
        let wire = WireResponse::deserialize(value)?;
        if !wire.is_exception {
            return Ok(RemoteResponse::Success);
        }
        Ok(RemoteResponse::Exception {
            message: wire.message,
            trace: wire.trace,
        })
    }
}

// ──────────────────────────────────────────────
// TransportError
// ──────────────────────────────────────────────

/// The request never got an answer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("conversion endpoint is not running")]
    Closed,

    #[error("conversion endpoint dropped the request without answering")]
    NoReply,

    #[error("malformed endpoint response: {0}")]
    Malformed(#[from] serde_json::Error),
}

// ──────────────────────────────────────────────
// RemoteConverter
// ──────────────────────────────────────────────

/// Anything that can run a conversion request to completion.
///
/// Timeouts and cancellation belong to the implementation; callers await
/// the single answer.
#[async_trait]
pub trait RemoteConverter: Send + Sync {
    async fn convert(&self, request: ConversionRequest) -> Result<RemoteResponse, TransportError>;
}

/// A request waiting for the serving side to answer it.
#[derive(Debug)]
pub struct PendingConversion {
    pub request: ConversionRequest,
    reply: oneshot::Sender<RemoteResponse>,
}

impl PendingConversion {
    /// Answer the request. Returns false if the caller stopped waiting.
    pub fn respond(self, response: RemoteResponse) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// A [`RemoteConverter`] that hands requests to a serving task over a
/// channel and waits for a one-shot reply.
#[derive(Debug, Clone)]
pub struct ChannelRemote {
    tx: mpsc::Sender<PendingConversion>,
}

impl ChannelRemote {
    /// The client half, plus the receiver the serving task drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingConversion>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChannelRemote { tx }, rx)
    }
}

#[async_trait]
impl RemoteConverter for ChannelRemote {
    async fn convert(&self, request: ConversionRequest) -> Result<RemoteResponse, TransportError> {
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(PendingConversion { request, reply })
            .await
            .map_err(|_| TransportError::Closed)?;
        answer.await.map_err(|_| TransportError::NoReply)
    }
}
