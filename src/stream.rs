//! Frame stream over a byte transport
//!
//! `FrameReader` drives the per-connection read state machine and
//! `drain_outbound` is the per-connection writer loop. Both sides of the
//! protocol use them.

use bytes::BytesMut;
use futures_util::stream::{self, Stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{AppError, FrameError};
use crate::frame::{decode_header, Frame, Header, HEADER_LENGTH, MAX_NICK_LENGTH, TYPE_LENGTH};

/// Read states of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Next read: header digits and type byte
    AwaitingHeader,
    /// Next read: the fixed nickname field
    AwaitingNickname(Header),
    /// Next read: `body_length` bytes of body
    AwaitingBody(Header),
    /// Terminal: failure, peer close or malformed frame
    Closed,
}

/// Reads frames off a byte stream, one section at a time
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    state: ReadState,
    prefix: [u8; HEADER_LENGTH + TYPE_LENGTH],
    nick_field: [u8; MAX_NICK_LENGTH],
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ReadState::AwaitingHeader,
            prefix: [0; HEADER_LENGTH + TYPE_LENGTH],
            nick_field: [0; MAX_NICK_LENGTH],
        }
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` once the peer has closed the stream at a frame
    /// boundary or the reader is already closed. Frames with an unknown
    /// type byte are consumed and skipped. Any error closes the reader.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, AppError> {
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    if let Err(e) = self.reader.read_exact(&mut self.prefix).await {
                        self.state = ReadState::Closed;
                        if e.kind() == std::io::ErrorKind::UnexpectedEof {
                            return Ok(None);
                        }
                        return Err(e.into());
                    }
                    match decode_header(&self.prefix[..HEADER_LENGTH]) {
                        Ok(header) => self.state = ReadState::AwaitingNickname(header),
                        Err(e) => {
                            self.state = ReadState::Closed;
                            return Err(e.into());
                        }
                    }
                }
                ReadState::AwaitingNickname(header) => {
                    if let Err(e) = self.reader.read_exact(&mut self.nick_field).await {
                        self.state = ReadState::Closed;
                        return Err(e.into());
                    }
                    self.state = ReadState::AwaitingBody(header);
                }
                ReadState::AwaitingBody(header) => {
                    let mut body = BytesMut::zeroed(header.body_length);
                    if let Err(e) = self.reader.read_exact(&mut body).await {
                        self.state = ReadState::Closed;
                        return Err(e.into());
                    }
                    self.state = ReadState::AwaitingHeader;

                    let type_byte = self.prefix[HEADER_LENGTH];
                    match Frame::from_sections(header, type_byte, &self.nick_field, body.freeze()) {
                        Ok(frame) => {
                            trace!(?header, "Frame read");
                            return Ok(Some(frame));
                        }
                        Err(FrameError::UnknownType(byte)) => {
                            warn!("Skipping frame with unknown type {:#04x}", byte);
                        }
                        Err(e) => {
                            self.state = ReadState::Closed;
                            return Err(e.into());
                        }
                    }
                }
                ReadState::Closed => return Ok(None),
            }
        }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> FrameReader<R> {
    /// Turn the reader into a stream of frames
    ///
    /// The stream yields at most one error, then ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<Frame, AppError>> + Send {
        stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            match reader.read_frame().await {
                Ok(Some(frame)) => Some((Ok(frame), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Write one encoded frame
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> std::io::Result<()> {
    writer.write_all(&frame.encode()).await?;
    writer.flush().await
}

/// Writer loop: pop the outbound queue one frame at a time
///
/// Ends when every sender is dropped (then shuts the writer down) or on
/// the first write failure. Frames go out strictly in queue order.
pub async fn drain_outbound<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) -> Result<(), AppError> {
    while let Some(frame) = outbound.recv().await {
        write_frame(&mut writer, &frame).await?;
    }
    writer.shutdown().await?;
    Ok(())
}
