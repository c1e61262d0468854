//! Shared fixtures for converter integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use graphport_convert::{ConversionRequest, RemoteConverter, RemoteResponse, TransportError};
use graphport_core::{Heap, ValueRef};
use graphport_ir::{SourceAttribution, SourcePosition};
use parking_lot::Mutex;

pub const APP: &str = "/home/me/app.py";

/// Remembers every request and answers with a fixed response.
pub struct RecordingRemote {
    requests: Mutex<Vec<ConversionRequest>>,
    rejection: Option<String>,
}

impl RecordingRemote {
    pub fn accepting() -> Arc<Self> {
        Arc::new(RecordingRemote {
            requests: Mutex::new(Vec::new()),
            rejection: None,
        })
    }

    pub fn rejecting(message: &str) -> Arc<Self> {
        Arc::new(RecordingRemote {
            requests: Mutex::new(Vec::new()),
            rejection: Some(message.to_owned()),
        })
    }

    pub fn requests(&self) -> Vec<ConversionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RemoteConverter for RecordingRemote {
    async fn convert(&self, request: ConversionRequest) -> Result<RemoteResponse, TransportError> {
        let root = request.root_id;
        self.requests.lock().push(request);
        Ok(match &self.rejection {
            None => RemoteResponse::Success,
            Some(message) => RemoteResponse::Exception {
                message: format!("{message} ({root})"),
                trace: vec![SourceAttribution::at(APP, SourcePosition::new(3, 0))],
            },
        })
    }
}

/// A heap with one user module `app` backed by source text.
pub struct Program {
    pub heap: Arc<Heap>,
    pub app: ValueRef,
}

impl Program {
    pub fn new() -> Self {
        let heap = Arc::new(Heap::new());
        heap.add_source(APP, "def f(): ...\n");
        let app = heap.load_module("app", Some(APP));
        Program { heap, app }
    }

    pub fn global(&self, name: &str, value: ValueRef) -> ValueRef {
        self.heap.set_member(self.app, name, value);
        value
    }
}
