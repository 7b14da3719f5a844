//! Participant struct definition
//!
//! Represents one live connection as seen by the room: its handle and
//! the sending end of its outbound frame queue.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::frame::Frame;
use crate::types::ClientId;

/// Connected participant
///
/// The room only holds this handle. The socket and the lifetime of the
/// connection belong to the connection handler task.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Room → connection outbound queue
    sender: mpsc::UnboundedSender<Frame>,
}

impl Participant {
    /// Create a new participant with the given ID and outbound queue
    pub fn new(id: ClientId, sender: mpsc::UnboundedSender<Frame>) -> Self {
        Self { id, sender }
    }

    /// Append a frame to this participant's outbound queue
    ///
    /// Returns an error if the queue is closed (connection gone).
    pub fn deliver(&self, frame: Frame) -> Result<(), SendError> {
        self.sender
            .send(frame)
            .map_err(|_| SendError::ChannelClosed)
    }
}
