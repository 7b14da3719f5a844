//! ChatServer Actor implementation
//!
//! The central actor that owns the room. Connection handlers talk to it
//! through an mpsc channel, so every room mutation is processed one at a
//! time: a nickname bind and its history replay can never interleave with
//! a broadcast.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::frame::Frame;
use crate::participant::Participant;
use crate::room::Room;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted
    Connect {
        client_id: ClientId,
        sender: mpsc::UnboundedSender<Frame>,
    },
    /// Connection closed
    Disconnect {
        client_id: ClientId,
    },
    /// Client claims a nickname
    Query {
        client_id: ClientId,
        nickname: Bytes,
    },
    /// Client sent a chat message
    Broadcast {
        client_id: ClientId,
        frame: Frame,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// The single room of this server
    room: Room,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            room: Room::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerCommand::Query { client_id, nickname } => {
                self.handle_query(client_id, nickname);
            }
            ServerCommand::Broadcast { client_id, frame } => {
                self.handle_broadcast(client_id, frame);
            }
        }
    }

    /// Handle new connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::UnboundedSender<Frame>) {
        self.room.join(Participant::new(client_id, sender));
        debug!("Total participants: {}", self.room.participant_count());
    }

    /// Handle connection teardown
    fn handle_disconnect(&mut self, client_id: ClientId) {
        if self.room.contains(client_id) {
            info!(
                "Client {} ({}) left",
                client_id,
                self.room.display_name(client_id)
            );
        }
        self.room.leave(client_id);
        debug!("Total participants: {}", self.room.participant_count());
    }

    /// Handle nickname claim
    fn handle_query(&mut self, client_id: ClientId, nickname: Bytes) {
        let shown = String::from_utf8_lossy(&nickname).into_owned();

        if self.room.try_bind_nickname(client_id, nickname) {
            info!("Client {} is now '{}'", client_id, shown);
        } else {
            info!("Client {} refused nickname '{}'", client_id, shown);
            self.room.send_to(client_id, Frame::negative());
        }
    }

    /// Handle chat message
    fn handle_broadcast(&mut self, client_id: ClientId, frame: Frame) {
        debug!(
            "Broadcast from {} as '{}' to {} participants",
            client_id,
            frame.display_nickname(),
            self.room.participant_count()
        );
        self.room.broadcast(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        cmd_tx
    }

    async fn connect(cmd_tx: &mpsc::Sender<ServerCommand>) -> (ClientId, mpsc::UnboundedReceiver<Frame>) {
        let client_id = ClientId::new();
        let (sender, rx) = mpsc::unbounded_channel();
        cmd_tx
            .send(ServerCommand::Connect { client_id, sender })
            .await
            .unwrap();
        (client_id, rx)
    }

    #[tokio::test]
    async fn test_taken_nickname_gets_negative() {
        let cmd_tx = start().await;
        let (a, mut a_rx) = connect(&cmd_tx).await;
        let (b, mut b_rx) = connect(&cmd_tx).await;

        for client_id in [a, b] {
            cmd_tx
                .send(ServerCommand::Query {
                    client_id,
                    nickname: Bytes::from_static(b"bob"),
                })
                .await
                .unwrap();
        }
        let m = Frame::message("bob", "marker");
        cmd_tx
            .send(ServerCommand::Broadcast {
                client_id: a,
                frame: m.clone(),
            })
            .await
            .unwrap();

        // Accepted query: no reply, only the broadcast
        assert_eq!(a_rx.recv().await.unwrap(), m);
        assert_eq!(b_rx.recv().await.unwrap(), Frame::negative());
        assert_eq!(b_rx.recv().await.unwrap(), m);
    }

    #[tokio::test]
    async fn test_disconnect_releases_nickname() {
        let cmd_tx = start().await;
        let (a, _a_rx) = connect(&cmd_tx).await;
        let (b, mut b_rx) = connect(&cmd_tx).await;

        cmd_tx
            .send(ServerCommand::Query {
                client_id: a,
                nickname: Bytes::from_static(b"alice"),
            })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::Disconnect { client_id: a })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::Query {
                client_id: b,
                nickname: Bytes::from_static(b"alice"),
            })
            .await
            .unwrap();
        let m = Frame::message("alice", "it is me now");
        cmd_tx
            .send(ServerCommand::Broadcast {
                client_id: b,
                frame: m.clone(),
            })
            .await
            .unwrap();

        assert_eq!(b_rx.recv().await.unwrap(), m);
    }
}
