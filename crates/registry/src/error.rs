use graphport_ir::ObjectId;

/// Registry contract violations. None of these are recoverable: they mean a
/// caller broke the allocate-then-define protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// An id was referenced (or requested) that has no record.
    #[error("object {0} has no definition")]
    MissingDefinition(ObjectId),

    /// `define` was called twice for the same id. Records are immutable once set.
    #[error("object {0} is already defined")]
    AlreadyDefined(ObjectId),

    /// `define` was called for an id this registry never handed out.
    #[error("object {0} was never allocated by this registry")]
    Unallocated(ObjectId),

    /// An increment still holds an allocated id without a record.
    #[error("increment leaves object {0} allocated but undefined")]
    IncompleteIncrement(ObjectId),

    /// Two increments carry different records under the same id.
    #[error("object {0} has conflicting definitions")]
    ConflictingDefinition(ObjectId),
}
