use fprolly_types::cx::{CancelError, CancelReason};
use fprolly_types::Address;
use thiserror::Error;

/// Primary error type for frankenprolly operations.
///
/// Recoverable failures (a store miss, a cancelled read) surface as
/// variants here and propagate unchanged through the cursor. Broken
/// internal invariants are programmer errors and panic instead; the
/// [`ProllyError::Internal`] variant is reserved for states that are
/// reachable through corrupt store contents, not through bugs.
#[derive(Error, Debug)]
pub enum ProllyError {
    // === Store errors ===
    /// A referenced chunk is absent from the store (dangling ref).
    #[error("node not found: {address}")]
    NodeNotFound { address: Address },

    /// Store-side I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Node decode errors ===
    /// Node bytes failed structural validation.
    #[error("node is malformed: {detail}")]
    NodeCorrupt { detail: String },

    /// A decoded node declares more fields than this build recognises.
    ///
    /// Forward-compatibility guard: a newer writer added fields this
    /// reader would silently ignore, so the read is rejected.
    #[error("node declares {actual} fields, this build understands {expected}")]
    UnknownFields { expected: u8, actual: u8 },

    /// An encoded node would exceed the format's size limits.
    #[error("node of {bytes} bytes exceeds the maximum node size")]
    NodeTooLarge { bytes: usize },

    // === Traversal errors ===
    /// Root-to-leaf descent exceeded the height limit; the tree is
    /// cyclic or corrupt.
    #[error("tree height exceeds maximum of {max}")]
    TreeTooDeep { max: u8 },

    // === Control ===
    /// Cancellation was observed at a context checkpoint.
    #[error("operation interrupted")]
    Interrupted { reason: Option<CancelReason> },

    /// Invariant violation reachable only through corrupt inputs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProllyError {
    /// Create a node-corruption error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::NodeCorrupt {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the operation could succeed.
    ///
    /// Only interruption is transient: a fresh context can re-run the
    /// same navigation. Missing or malformed chunks will still be
    /// missing or malformed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

impl From<CancelError> for ProllyError {
    fn from(err: CancelError) -> Self {
        Self::Interrupted {
            reason: err.reason(),
        }
    }
}

/// Result type alias using `ProllyError`.
pub type Result<T> = std::result::Result<T, ProllyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use fprolly_types::Cx;

    #[test]
    fn error_display_not_found() {
        let err = ProllyError::NodeNotFound {
            address: Address::NULL,
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("node not found: 0000"), "{rendered}");
    }

    #[test]
    fn error_display_corrupt() {
        let err = ProllyError::corrupt("short header");
        assert_eq!(err.to_string(), "node is malformed: short header");
    }

    #[test]
    fn error_display_unknown_fields() {
        let err = ProllyError::UnknownFields {
            expected: 5,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "node declares 7 fields, this build understands 5"
        );
    }

    #[test]
    fn interrupted_from_checkpoint() {
        let cx = Cx::new();
        cx.cancel();
        let err: ProllyError = cx.checkpoint().expect_err("cancelled").into();
        assert!(matches!(
            err,
            ProllyError::Interrupted {
                reason: Some(fprolly_types::cx::CancelReason::UserInterrupt)
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "chunk file missing");
        let err: ProllyError = io_err.into();
        assert!(matches!(err, ProllyError::Io(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn convenience_constructors() {
        let err = ProllyError::corrupt("offset table out of range");
        assert!(matches!(err, ProllyError::NodeCorrupt { detail } if detail.contains("offset")));

        let err = ProllyError::internal("frame chain depth mismatch");
        assert!(matches!(err, ProllyError::Internal(msg) if msg.contains("depth")));
    }

    #[test]
    fn only_interruption_is_transient() {
        assert!(!ProllyError::TreeTooDeep { max: 64 }.is_transient());
        assert!(!ProllyError::corrupt("x").is_transient());
        assert!(ProllyError::Interrupted { reason: None }.is_transient());
    }
}
