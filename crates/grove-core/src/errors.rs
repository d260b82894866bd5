use crate::merge::MergeConflict;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing, and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Store lifecycle
    /// Model schema could not be loaded, or the store file is unreadable
    StoreOpen,
    /// On-disk model differs incompatibly from the current model
    Migration,
    /// Operation requires a store that has not been opened yet, or vice versa
    StoreAlreadyOpen,

    // Seeding
    SeedSourceMissing,
    SeedCopy,
    SeedNotFoundInBundle,
    SeedTooLate,

    // Save
    Validation,
    MergeConflict,

    // Fetch
    InvalidPredicate,
    FetchCount,

    // Contract
    /// Invalid arguments (unknown entity, empty name, bad sort key)
    Parameter,
    /// Object id does not resolve in the context (deleted, evicted, never existed)
    NotFound,

    // Integration/IO
    Io,
    Serialization,
    Persistence,
    Config,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::StoreOpen => "ERR_STORE_OPEN",
            ExErrorKind::Migration => "ERR_MIGRATION",
            ExErrorKind::StoreAlreadyOpen => "ERR_STORE_ALREADY_OPEN",
            ExErrorKind::SeedSourceMissing => "ERR_SEED_SOURCE_MISSING",
            ExErrorKind::SeedCopy => "ERR_SEED_COPY",
            ExErrorKind::SeedNotFoundInBundle => "ERR_SEED_NOT_FOUND_IN_BUNDLE",
            ExErrorKind::SeedTooLate => "ERR_SEED_TOO_LATE",
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::MergeConflict => "ERR_MERGE_CONFLICT",
            ExErrorKind::InvalidPredicate => "ERR_INVALID_PREDICATE",
            ExErrorKind::FetchCount => "ERR_FETCH_COUNT",
            ExErrorKind::Parameter => "ERR_PARAMETER",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Kinds that signal programmer error rather than a runtime condition.
    ///
    /// Under [`crate::Strictness::Abort`] these are escalated to a panic.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::Parameter | ExErrorKind::SeedTooLate | ExErrorKind::StoreAlreadyOpen
        )
    }

    /// Kinds local to a single save attempt; the caller may fix and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExErrorKind::Validation | ExErrorKind::MergeConflict)
    }
}

/// Canonical structured error type
///
/// Carries a classification kind for programmatic handling and optional
/// context (operation, entity, object, attribute, conflicts) for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    object_id: Option<String>,
    attribute: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
    conflicts: Option<Vec<MergeConflict>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            object_id: None,
            attribute: None,
            message: String::new(),
            source: None,
            conflicts: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity name context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add object id context
    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    /// Add attribute (or relationship) name context
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach the unresolved conflicts of a failed save
    pub fn with_conflicts(mut self, conflicts: Vec<MergeConflict>) -> Self {
        self.conflicts = Some(conflicts);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity name context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the object id context, if any
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Get the attribute context, if any
    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Get the unresolved conflicts, if any (populated on MergeConflict)
    pub fn conflicts(&self) -> Option<&[MergeConflict]> {
        self.conflicts.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(object_id) = &self.object_id {
            write!(f, " (object_id: {})", object_id)?;
        }
        if let Some(attribute) = &self.attribute {
            write!(f, " (attribute: {})", attribute)?;
        }
        if let Some(conflicts) = &self.conflicts {
            write!(f, " ({} conflicts)", conflicts.len())?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Create a parameter (contract) error
pub fn parameter_error(op: &str, message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Parameter)
        .with_op(op)
        .with_message(message)
}

/// Create a not-found error for an object id
pub fn object_not_found(op: &str, object_id: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::NotFound)
        .with_op(op)
        .with_object_id(object_id)
        .with_message("Object does not exist in this context")
}
