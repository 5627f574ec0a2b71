use thiserror::Error;

/// Failure classes of the update pipeline.
///
/// Values travel as the root cause of `anyhow` chains; policy code that
/// needs to react to a specific class (for example recording an invalid
/// update in the failed-update ledger) recovers it with [`UpdateError::classify`].
/// Corruption of locally persisted state is deliberately not represented
/// here: the stores self-heal and warn instead of failing the host.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Publisher-supplied input could not be interpreted (bad URL, bad
    /// metadata document). The operation fails; nothing is recorded.
    #[error("malformed update data: {0}")]
    MalformedData(String),

    /// The update package itself is broken: no entry file, a failed
    /// integrity check, or a diff that cannot be applied. The attempted
    /// package is recorded as failed and the running package is untouched.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// Network or filesystem failure while fetching or assembling the
    /// package. Nothing gets registered as current.
    #[error("update transfer failed: {0}")]
    Transfer(String),

    /// Caller contract violation, e.g. installing a package without a
    /// content hash. These indicate a bug, not a runtime condition.
    #[error("internal update error: {0}")]
    Internal(String),
}

impl UpdateError {
    /// Finds the taxonomy value buried in an `anyhow` chain, if any.
    pub fn classify(err: &anyhow::Error) -> Option<&UpdateError> {
        err.chain().find_map(|cause| cause.downcast_ref())
    }

    pub fn is_invalid_update(err: &anyhow::Error) -> bool {
        matches!(Self::classify(err), Some(UpdateError::InvalidUpdate(_)))
    }
}
