//! Error types for the frame codec and for session control.
//!
//! Codec errors never cross the channel boundary: the endpoint absorbs them and treats the
//! offending frame as lost. Session errors are returned to the caller of a session control
//! function.

use crate::endpoint::State;
use crate::frame::FrameKind;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("checksum mismatch: frame carries {received:08X}, computed {computed:08X}")]
    ChecksumMismatch { received: u32, computed: u32 },

    #[error("truncated frame: {needed} bytes needed, {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("unexpected frame kind: expected {expected:?}, got {actual:?}")]
    UnexpectedFrameKind {
        expected: FrameKind,
        actual: Option<FrameKind>,
    },

    #[error("invalid {field} value: {value:#X}")]
    InvalidField { field: &'static str, value: u32 },
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid state: expected {expected:?}, got {actual:?}")]
    InvalidState { expected: State, actual: State },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("retry limit exhausted for block {sequence} after {retries} retries")]
    RetryExhausted { sequence: u8, retries: u32 },

    #[error("herald unacknowledged after {retries} retries")]
    HeraldUnacknowledged { retries: u32 },

    #[error("no outstanding block with sequence number {sequence}")]
    InvalidSequence { sequence: u8 },

    #[error("checksum failure tolerance exceeded ({failures} consecutive failures)")]
    ChecksumTolerance { failures: u32 },

    #[error("data rate can only be changed while idle")]
    RateLocked,

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}
