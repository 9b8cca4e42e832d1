//! Unified error type for the Terra client.

use terra_protocol::ProtocolError;
use terra_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls, so
/// the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (overrun, malformed frame, bad challenge).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration cannot be expressed on the wire.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
