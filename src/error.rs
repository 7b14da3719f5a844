//! Error types for the chat service
//!
//! Defines frame decoding errors, application-level errors and
//! message send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Frame decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Header is not six decimal digits, or a decoded length exceeds its maximum
    #[error("Malformed header: {0:?}")]
    MalformedHeader(String),

    /// Type byte is none of the known frame types
    #[error("Unknown frame type: {0:#04x}")]
    UnknownType(u8),

    /// Buffer is shorter than the frame its header declares
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Application-level errors
///
/// All of these are fatal for the connection they occur on and
/// never affect other connections.
#[derive(Debug, Error)]
pub enum AppError {
    /// Frame protocol violation (fatal)
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// IO error: read/write failure or peer closed mid-frame (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
