//! TCP connection handler
//!
//! Handles individual client connections: registration with the
//! ChatServer, the frame read loop and the outbound write loop.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::frame::{Frame, FrameType};
use crate::server::ServerCommand;
use crate::stream::{drain_outbound, FrameReader};
use crate::types::ClientId;

/// Handle a new TCP connection
///
/// Registers the connection with the ChatServer, runs the read and write
/// loops, and unregisters exactly once when either loop ends.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    serve_connection(stream, &peer_addr, cmd_tx).await
}

/// Run one connection over any byte stream
pub async fn serve_connection<S>(
    stream: S,
    peer_addr: &str,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);

    // Generate client ID
    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Outbound queue: room -> connection
    let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Frame>();

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: frame_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (frames -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        let frames = FrameReader::new(read_half).into_stream();
        tokio::pin!(frames);

        while let Some(frame_result) = frames.next().await {
            match frame_result {
                Ok(frame) => {
                    let Some(cmd) = frame_to_command(client_id, frame) else {
                        continue;
                    };
                    if cmd_tx_read.send(cmd).await.is_err() {
                        debug!("Server closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Read error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (outbound queue -> socket)
    let mut write_task = tokio::spawn(async move {
        if let Err(e) = drain_outbound(write_half, frame_rx).await {
            warn!("Write error for {}: {}", client_id, e);
        }
        debug!("Write task ended for {}", client_id);
    });

    // Wait for either task to complete, then cancel the other
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
            write_task.abort();
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
        }
    }

    // Send disconnect command
    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Convert an inbound frame to a ServerCommand
///
/// Negative frames are never sent by clients and are dropped.
fn frame_to_command(client_id: ClientId, frame: Frame) -> Option<ServerCommand> {
    match frame.frame_type() {
        FrameType::Message => Some(ServerCommand::Broadcast { client_id, frame }),
        FrameType::Query => Some(ServerCommand::Query {
            client_id,
            nickname: frame.nickname().clone(),
        }),
        FrameType::Negative => {
            debug!("Ignoring negative frame from {}", client_id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::duplex;
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::server::ChatServer;
    use crate::stream::testing::WriteFails;
    use crate::stream::write_frame;

    const WAIT: Duration = Duration::from_secs(2);

    async fn query(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        client_id: ClientId,
        nickname: &'static str,
    ) {
        cmd_tx
            .send(ServerCommand::Query {
                client_id,
                nickname: Bytes::from_static(nickname.as_bytes()),
            })
            .await
            .unwrap();
    }

    async fn broadcast(cmd_tx: &mpsc::Sender<ServerCommand>, client_id: ClientId, frame: Frame) {
        cmd_tx
            .send(ServerCommand::Broadcast { client_id, frame })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_closes_connection_and_releases_nickname() {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        tokio::spawn(ChatServer::new(cmd_rx).run());

        // The peer stays open, so only the failed write can end the connection
        let (mut peer, conn) = duplex(4096);
        let connection = tokio::spawn(serve_connection(
            WriteFails(conn),
            "test",
            cmd_tx.clone(),
        ));

        write_frame(&mut peer, &Frame::query("dave")).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let observer = ClientId::new();
        let (sender, mut observer_rx) = mpsc::unbounded_channel();
        cmd_tx
            .send(ServerCommand::Connect {
                client_id: observer,
                sender,
            })
            .await
            .unwrap();

        query(&cmd_tx, observer, "dave").await;
        assert_eq!(observer_rx.recv().await.unwrap(), Frame::negative());

        // Delivery to dave's connection fails its write
        let first = Frame::message("watcher", "first");
        broadcast(&cmd_tx, observer, first.clone()).await;
        assert_eq!(observer_rx.recv().await.unwrap(), first);

        let result = timeout(WAIT, connection)
            .await
            .expect("connection did not close after write failure")
            .unwrap();
        assert!(result.is_ok());

        // The bind succeeds now: history replay instead of a Negative
        query(&cmd_tx, observer, "dave").await;
        let second = Frame::message("dave", "second");
        broadcast(&cmd_tx, observer, second.clone()).await;
        assert_eq!(observer_rx.recv().await.unwrap(), first);
        assert_eq!(observer_rx.recv().await.unwrap(), second);

        drop(peer);
    }

    #[test]
    fn test_frame_to_command() {
        let client_id = ClientId::new();

        match frame_to_command(client_id, Frame::query("bob")) {
            Some(ServerCommand::Query { nickname, .. }) => assert_eq!(nickname.as_ref(), b"bob"),
            other => panic!("Wrong command: {:?}", other),
        }

        match frame_to_command(client_id, Frame::message("bob", "hi")) {
            Some(ServerCommand::Broadcast { frame, .. }) => {
                assert_eq!(frame, Frame::message("bob", "hi"))
            }
            other => panic!("Wrong command: {:?}", other),
        }

        assert!(frame_to_command(client_id, Frame::negative()).is_none());
    }
}
