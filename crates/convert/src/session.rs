//! One shared registry, any number of concurrent conversions.

use std::sync::Arc;

use graphport_core::{Heap, ValueRef, WalkContext, Walker};
use graphport_ir::ObjectId;
use graphport_registry::{LongTermObjectRegistry, ObjectRegistry};
use parking_lot::Mutex;

use crate::config::ConverterConfig;
use crate::converter::{ConversionOutcome, ConvertError, ObjectConverter};
use crate::remote::{ConversionRequest, RemoteConverter};

/// Walks values into a long-term registry and converts them remotely.
///
/// A walk holds the registry lock from its first lookup until its increment
/// is merged, so two threads walking the same object never mint two ids for
/// it. The remote round-trip happens after the lock is released.
#[derive(Clone)]
pub struct ConversionSession {
    context: Arc<WalkContext>,
    registry: Arc<Mutex<LongTermObjectRegistry>>,
    converter: Arc<ObjectConverter>,
}

impl ConversionSession {
    pub fn new(
        context: WalkContext,
        remote: Arc<dyn RemoteConverter>,
        config: &ConverterConfig,
    ) -> Self {
        ConversionSession {
            context: Arc::new(context),
            registry: Arc::new(Mutex::new(LongTermObjectRegistry::new())),
            converter: Arc::new(ObjectConverter::new(remote, &config.transport)),
        }
    }

    /// A session over `heap` with no pure mappings.
    pub fn for_heap(
        heap: Arc<Heap>,
        remote: Arc<dyn RemoteConverter>,
        config: &ConverterConfig,
    ) -> Self {
        let context = WalkContext::new(heap, config.module_index.clone());
        Self::new(context, remote, config)
    }

    pub fn context(&self) -> &WalkContext {
        &self.context
    }

    pub fn registry(&self) -> &Arc<Mutex<LongTermObjectRegistry>> {
        &self.registry
    }

    pub fn converter(&self) -> &ObjectConverter {
        &self.converter
    }

    /// Walk `value` and merge what the walk sealed. Nothing is merged if the
    /// walk fails.
    pub fn walk(&self, value: ValueRef) -> Result<ObjectId, ConvertError> {
        let mut long_term = self.registry.lock();
        self.walk_locked(&mut long_term, value)
    }

    fn walk_locked(
        &self,
        long_term: &mut LongTermObjectRegistry,
        value: ValueRef,
    ) -> Result<ObjectId, ConvertError> {
        let mut registry = ObjectRegistry::new(long_term);
        let root = Walker::new(&self.context, &mut registry)?.walk(value)?;
        let minted = registry.minted();
        registry.commit()?;
        tracing::debug!(value = %value, root = %root, minted, "walk merged");
        Ok(root)
    }

    /// Walk `value` and build its request in one critical section.
    pub fn prepare(&self, value: ValueRef) -> Result<ConversionRequest, ConvertError> {
        let mut long_term = self.registry.lock();
        let root = self.walk_locked(&mut long_term, value)?;
        self.converter.prepare(&*long_term, root)
    }

    /// Walk, merge and convert `value`.
    ///
    /// The walk runs on the blocking pool. Local failures come back as
    /// errors; a remote rejection comes back as [`ConversionOutcome::Failed`].
    pub async fn convert_value(&self, value: ValueRef) -> Result<ConversionOutcome, ConvertError> {
        let session = self.clone();
        let request = tokio::task::spawn_blocking(move || session.prepare(value)).await??;
        self.converter.submit(request).await
    }
}
