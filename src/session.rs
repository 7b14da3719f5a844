//! Client session
//!
//! Drives one server connection from the client side: the frame read loop,
//! the outbound write loop and nickname negotiation.
//!
//! Negotiation has no positive acknowledgment. The client sends a `Query`
//! and arms a timer; a `Negative` from the server cancels the timer and the
//! next input line becomes the new candidate. A candidate whose timer runs
//! out is accepted.
//!
//! Console code never touches the connection: it posts input through a
//! [`ClientHandle`] and renders the [`ClientEvent`]s the session emits.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppError, SendError};
use crate::frame::{Frame, FrameType};
use crate::stream::{drain_outbound, FrameReader};

/// Default time a nickname claim must go unanswered to be accepted
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_millis(3000);

/// Client session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Silence window after a `Query`; must exceed one round trip
    pub negotiation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: NEGOTIATION_TIMEOUT,
        }
    }
}

/// Where the client stands in nickname negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
enum NicknameStatus {
    /// No claim in flight; the next input line is the candidate
    Unset,
    /// `Query` sent, timer armed
    Negotiating(Bytes),
    /// Timer ran out uncancelled; messages go out under this nickname
    Accepted(Bytes),
}

/// Input posted to the session loop
#[derive(Debug)]
enum ClientCommand {
    /// One line of user input
    Line(String),
    /// Close the connection after flushing queued frames
    Close,
}

/// Output of the session loop for presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Nickname claim survived the negotiation window
    NicknameAccepted(Bytes),
    /// Server refused the nickname; a new candidate is needed
    NicknameRejected,
    /// Chat message from someone else
    Message { nickname: Bytes, body: Bytes },
    /// Connection ended without a close request
    Disconnected,
}

/// Thread-safe handle posting input to a running session
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientHandle {
    /// Post one input line
    pub fn submit_line(&self, line: impl Into<String>) -> Result<(), SendError> {
        self.commands
            .send(ClientCommand::Line(line.into()))
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Ask the session to close the connection
    pub fn close(&self) -> Result<(), SendError> {
        self.commands
            .send(ClientCommand::Close)
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Start a session over a connected stream
///
/// Returns the input handle, the event receiver and the session task.
pub fn spawn_session<S>(
    stream: S,
    config: SessionConfig,
) -> (
    ClientHandle,
    mpsc::UnboundedReceiver<ClientEvent>,
    JoinHandle<Result<(), AppError>>,
)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();

    let session = ClientSession::new(config, frame_tx, event_tx);
    let task = tokio::spawn(session.run(stream, cmd_rx, frame_rx));

    (ClientHandle { commands: cmd_tx }, event_rx, task)
}

/// Why the session loop stopped
enum Exit {
    CloseRequested,
    PeerClosed,
    ReadFailed(AppError),
    WriterEnded(Result<(), AppError>),
}

/// Client protocol state
struct ClientSession {
    config: SessionConfig,
    status: NicknameStatus,
    /// Negotiation timer, armed while `Negotiating`
    deadline: Option<Instant>,
    /// Input lines not yet consumed
    input: VecDeque<String>,
    outbound: mpsc::UnboundedSender<Frame>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientSession {
    fn new(
        config: SessionConfig,
        outbound: mpsc::UnboundedSender<Frame>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            config,
            status: NicknameStatus::Unset,
            deadline: None,
            input: VecDeque::new(),
            outbound,
            events,
        }
    }

    async fn run<S>(
        mut self,
        stream: S,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
        frame_rx: mpsc::UnboundedReceiver<Frame>,
    ) -> Result<(), AppError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);

        let frames = FrameReader::new(read_half).into_stream();
        tokio::pin!(frames);

        let mut write_task = tokio::spawn(drain_outbound(write_half, frame_rx));

        let exit = loop {
            let deadline = self.deadline;

            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(frame)) => self.on_frame(frame),
                    Some(Err(e)) => break Exit::ReadFailed(e),
                    None => break Exit::PeerClosed,
                },
                cmd = commands.recv() => match cmd {
                    Some(ClientCommand::Line(line)) => self.on_line(line),
                    Some(ClientCommand::Close) | None => break Exit::CloseRequested,
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timeout();
                }
                written = &mut write_task => {
                    break Exit::WriterEnded(written.unwrap_or_else(|e| Err(std::io::Error::other(e).into())));
                }
            }
        };

        let Self { events, outbound, .. } = self;

        match exit {
            Exit::CloseRequested => {
                // Closing the queue lets the writer flush and shut down
                drop(outbound);
                info!("Closing connection");
                write_task
                    .await
                    .unwrap_or_else(|e| Err(std::io::Error::other(e).into()))
            }
            Exit::PeerClosed => {
                write_task.abort();
                info!("Server closed the connection");
                let _ = events.send(ClientEvent::Disconnected);
                Ok(())
            }
            Exit::ReadFailed(e) => {
                write_task.abort();
                warn!("Read error: {}", e);
                let _ = events.send(ClientEvent::Disconnected);
                Err(e)
            }
            Exit::WriterEnded(result) => {
                if let Err(e) = &result {
                    warn!("Write error: {}", e);
                }
                let _ = events.send(ClientEvent::Disconnected);
                result
            }
        }
    }

    fn on_line(&mut self, line: String) {
        self.input.push_back(line);
        self.pump_input();
    }

    /// Consume queued input as far as the nickname status allows
    fn pump_input(&mut self) {
        match &self.status {
            NicknameStatus::Unset => {
                let Some(line) = self.input.pop_front() else {
                    return;
                };
                let query = Frame::query(line);
                let candidate = query.nickname().clone();
                debug!("Claiming nickname '{}'", query.display_nickname());

                self.send(query);
                self.deadline = Some(Instant::now() + self.config.negotiation_timeout);
                self.status = NicknameStatus::Negotiating(candidate);
            }
            NicknameStatus::Negotiating(_) => {}
            NicknameStatus::Accepted(nickname) => {
                let nickname = nickname.clone();
                while let Some(line) = self.input.pop_front() {
                    self.send(Frame::message(&nickname, line));
                }
            }
        }
    }

    fn on_timeout(&mut self) {
        self.deadline = None;

        let status = std::mem::replace(&mut self.status, NicknameStatus::Unset);
        let NicknameStatus::Negotiating(candidate) = status else {
            self.status = status;
            return;
        };

        info!(
            "Nickname '{}' accepted",
            String::from_utf8_lossy(&candidate)
        );
        self.status = NicknameStatus::Accepted(candidate.clone());
        self.emit(ClientEvent::NicknameAccepted(candidate));
        self.pump_input();
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame.frame_type() {
            FrameType::Message => {
                if self.is_own(frame.nickname()) {
                    return;
                }
                self.emit(ClientEvent::Message {
                    nickname: frame.nickname().clone(),
                    body: frame.body().clone(),
                });
            }
            FrameType::Negative => {
                if self.deadline.take().is_none() {
                    debug!("Ignoring negative frame, no claim in flight");
                    return;
                }
                info!("Nickname refused");
                self.status = NicknameStatus::Unset;
                self.emit(ClientEvent::NicknameRejected);
                self.pump_input();
            }
            FrameType::Query => {
                debug!("Ignoring query frame from server");
            }
        }
    }

    /// Whether a message nickname is the accepted one (exact bytes)
    fn is_own(&self, nickname: &[u8]) -> bool {
        matches!(&self.status, NicknameStatus::Accepted(own) if own.as_ref() == nickname)
    }

    fn send(&self, frame: Frame) {
        if self.outbound.send(frame).is_err() {
            debug!("Outbound queue closed, frame dropped");
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
