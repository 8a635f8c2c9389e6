//! Error taxonomy.
//!
//! `TransportError` covers OS-level send/receive failures; `CodecError`
//! covers malformed payloads. Neither is ever surfaced out of a `tick()`
//! call - callers observe their effects only through logs.

use std::io;

/// An OS-level send/receive failure. Logged and suppressed; never tears
/// down a connection (liveness handles that independently).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport io error: {0:?}")]
    Io(io::ErrorKind),
}

impl From<io::Error> for TransportError {
    #[inline]
    fn from(err: io::Error) -> Self {
        TransportError::Io(err.kind())
    }
}

/// A malformed payload: truncation, unknown type-id, or a length that
/// does not match what the codec expects. The offending datagram is
/// dropped silently - no reply, no state change.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("packet truncated")]
    Truncated,
    #[error("unknown type id: {0}")]
    UnknownType(u64),
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Mirrors `ErrorUtils::has_failed`: distinguishes "would block, try
/// again later" from an actual failure worth logging or tearing a
/// connection down over.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

/// A master-only API called on a slave, or similar application-level
/// misuse a library cannot recover from. A fatal assertion in debug
/// builds; a logged no-op in release.
pub fn protocol_misuse(log: &slog::Logger, context: &str) {
    debug_assert!(false, "protocol misuse: {context}");
    slog::warn!(log, "protocol misuse ignored in release build"; "context" => context);
}

impl<T> ErrorUtils for Result<T, TransportError> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(TransportError::Io(io::ErrorKind::WouldBlock)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_not_a_failure() {
        let result: Result<(), TransportError> = Err(TransportError::Io(io::ErrorKind::WouldBlock));
        assert!(!result.has_failed());
    }

    #[test]
    fn other_io_errors_are_failures() {
        let result: Result<(), TransportError> = Err(TransportError::Io(io::ErrorKind::ConnectionReset));
        assert!(result.has_failed());
    }
}
