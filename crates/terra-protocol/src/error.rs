//! Error types for the protocol layer.
//!
//! Each crate in Terra defines its own error enum. A `ProtocolError` always
//! means the bytes themselves were the problem: a read ran off the end of a
//! frame, a frame was empty, or a challenge carried unusable seeds.

/// Errors that can occur in the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A read or write of `requested` bits starting at bit `offset` would
    /// run past the end of a buffer holding `capacity` bits.
    ///
    /// In-game frames also use this as the signal that a frame is a private
    /// message rather than a stream of public events.
    #[error(
        "buffer overrun: {requested} bits at offset {offset} exceeds {capacity} bits"
    )]
    BufferOverrun {
        offset: usize,
        requested: u32,
        capacity: usize,
    },

    /// A single read or write asked for more than 32 bits.
    #[error("invalid bit count {0} (max 32)")]
    InvalidBitCount(u32),

    /// The top-level frame could not be interpreted at all.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The server's challenge seeds cannot be solved (zero modulus).
    #[error("invalid challenge seeds ({0}, {1})")]
    InvalidChallenge(u32, u32),
}

impl ProtocolError {
    /// Returns `true` for [`ProtocolError::BufferOverrun`].
    pub fn is_overrun(&self) -> bool {
        matches!(self, Self::BufferOverrun { .. })
    }
}
