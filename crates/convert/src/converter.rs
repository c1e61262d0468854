//! Packaging a walked root and its dependency closure into one request.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use graphport_core::{strongly_connected_components, WalkError};
use graphport_ir::{ObjectId, SourceAttribution};
use graphport_registry::{RecordLookup, RegistryError};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::{RecordForm, TransportConfig};
use crate::remote::{ConversionRequest, RemoteConverter, RemoteResponse, TransportError};

// ──────────────────────────────────────────────
// Outcomes and errors
// ──────────────────────────────────────────────

/// The remote side rejected a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFailure {
    pub message: String,
    pub trace: Vec<SourceAttribution>,
}

impl fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote conversion failed: {}", self.message)?;
        if let Some(frame) = self.trace.first() {
            if let Some(path) = frame.path.first() {
                write!(f, " ({}:{})", path, frame.range.start.line)?;
            }
        }
        Ok(())
    }
}

/// How a submitted conversion ended. A remote rejection is an outcome, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(ObjectId),
    Failed(ConversionFailure),
}

impl ConversionOutcome {
    pub fn converted(&self) -> Option<ObjectId> {
        match self {
            ConversionOutcome::Converted(id) => Some(*id),
            ConversionOutcome::Failed(_) => None,
        }
    }
}

/// Local failures, reported before or instead of a remote answer.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Only function and class definitions may refer to each other in a
    /// cycle.
    #[error("object {0} is part of a reference cycle but is not a function or class definition")]
    NonDefinitionCycle(ObjectId),

    #[error("conversion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ──────────────────────────────────────────────
// ObjectConverter
// ──────────────────────────────────────────────

/// Sends closures of sealed records to a [`RemoteConverter`].
///
/// Ids carried by a successful request are remembered; later requests leave
/// them out unless the transport is configured to resend.
pub struct ObjectConverter {
    remote: Arc<dyn RemoteConverter>,
    transmitted: Mutex<HashSet<ObjectId>>,
    resend_known: bool,
    form: RecordForm,
}

impl fmt::Debug for ObjectConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectConverter")
            .field("transmitted", &self.transmitted.lock().len())
            .field("resend_known", &self.resend_known)
            .field("form", &self.form)
            .finish()
    }
}

impl ObjectConverter {
    pub fn new(remote: Arc<dyn RemoteConverter>, transport: &TransportConfig) -> Self {
        ObjectConverter {
            remote,
            transmitted: Mutex::new(HashSet::new()),
            resend_known: transport.resend_known,
            form: transport.record_form,
        }
    }

    pub fn is_transmitted(&self, id: ObjectId) -> bool {
        self.transmitted.lock().contains(&id)
    }

    /// Build the request for `root` from the records in `records`.
    ///
    /// Records are ordered dependencies first, with each strongly connected
    /// group kept together. Fails if a reachable record is missing or if a
    /// cycle runs through anything but definitions.
    pub fn prepare<L: RecordLookup + ?Sized>(
        &self,
        records: &L,
        root: ObjectId,
    ) -> Result<ConversionRequest, ConvertError> {
        let graph: IndexMap<ObjectId, Vec<ObjectId>> =
            records.dependency_graph(root)?.into_iter().collect();
        let components = strongly_connected_components(&graph);

        let transmitted = self.transmitted.lock();
        let mut encoded = IndexMap::with_capacity(graph.len());
        for component in &components {
            let cyclic = is_cycle(&graph, component);
            for &id in component {
                let record = records
                    .definition(id)
                    .ok_or(RegistryError::MissingDefinition(id))?;
                if cyclic && !record.is_definition() {
                    return Err(ConvertError::NonDefinitionCycle(id));
                }
                if self.resend_known || !transmitted.contains(&id) {
                    encoded.insert(id, self.form.encode(record));
                }
            }
        }

        tracing::debug!(
            root = %root,
            closure = graph.len(),
            groups = components.len(),
            records = encoded.len(),
            "prepared conversion request"
        );
        Ok(ConversionRequest {
            root_id: root,
            records: encoded,
        })
    }

    /// Send a prepared request and wait for the answer.
    pub async fn submit(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutcome, ConvertError> {
        let root = request.root_id;
        let ids: Vec<ObjectId> = request.ids().collect();
        tracing::info!(root = %root, records = ids.len(), "submitting conversion");

        match self.remote.convert(request).await? {
            RemoteResponse::Success => {
                self.transmitted.lock().extend(ids);
                tracing::info!(root = %root, "conversion succeeded");
                Ok(ConversionOutcome::Converted(root))
            }
            RemoteResponse::Exception { message, trace } => {
                tracing::warn!(root = %root, %message, "remote conversion failed");
                Ok(ConversionOutcome::Failed(ConversionFailure { message, trace }))
            }
        }
    }

    /// [`prepare`](Self::prepare) then [`submit`](Self::submit).
    pub async fn convert<L: RecordLookup + Sync + ?Sized>(
        &self,
        records: &L,
        root: ObjectId,
    ) -> Result<ConversionOutcome, ConvertError> {
        let request = self.prepare(records, root)?;
        self.submit(request).await
    }
}

fn is_cycle(graph: &IndexMap<ObjectId, Vec<ObjectId>>, component: &[ObjectId]) -> bool {
    match component {
        [] => false,
        [single] => graph.get(single).is_some_and(|deps| deps.contains(single)),
        _ => true,
    }
}
