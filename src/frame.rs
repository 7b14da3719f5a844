//! Frame codec
//!
//! Fixed-layout wire message shared by client and server:
//!
//! ```text
//! +-----------+------+------------------+---------------------+
//! | header    | type | nickname field   | body                |
//! | 6 digits  | 1    | 16 (fixed)       | body_length bytes   |
//! +-----------+------+------------------+---------------------+
//! ```
//!
//! The header is the zero-padded decimal text of
//! `body_length * 100 + nick_length`. Only the first `nick_length` bytes
//! of the nickname field are meaningful.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Header size: six ASCII decimal digits
pub const HEADER_LENGTH: usize = 6;
/// Type size: one byte
pub const TYPE_LENGTH: usize = 1;
/// Fixed size of the nickname field
pub const MAX_NICK_LENGTH: usize = 16;
/// Maximum body size
pub const MAX_BODY_LENGTH: usize = 1024;

/// Offset of the type byte
pub const TYPE_OFFSET: usize = HEADER_LENGTH;
/// Offset of the nickname field
pub const NICK_OFFSET: usize = TYPE_OFFSET + TYPE_LENGTH;
/// Offset of the body
pub const BODY_OFFSET: usize = NICK_OFFSET + MAX_NICK_LENGTH;

/// Frame types, carried as a single ASCII byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Client claims a nickname
    Query = b'q',
    /// Chat text, broadcast to every participant
    Message = b'm',
    /// Server rejects a claimed nickname
    Negative = b'n',
}

impl FrameType {
    /// Convert from the wire byte, returns None for unknown types
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'q' => Some(FrameType::Query),
            b'm' => Some(FrameType::Message),
            b'n' => Some(FrameType::Negative),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded header: the two section lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub body_length: usize,
    pub nick_length: usize,
}

impl Header {
    /// Total encoded size of the frame this header announces
    pub fn frame_length(&self) -> usize {
        BODY_OFFSET + self.body_length
    }
}

/// Encode the two lengths as six zero-padded decimal digits
///
/// Lengths above their maximum are clamped first.
pub fn encode_header(body_length: usize, nick_length: usize) -> [u8; HEADER_LENGTH] {
    let value = body_length.min(MAX_BODY_LENGTH) * 100 + nick_length.min(MAX_NICK_LENGTH);
    let text = format!("{:06}", value);
    let mut header = [0u8; HEADER_LENGTH];
    header.copy_from_slice(text.as_bytes());
    header
}

/// Decode a six-digit header
///
/// Fails with `MalformedHeader` when the bytes are not six decimal digits
/// or when either derived length exceeds its maximum.
pub fn decode_header(bytes: &[u8]) -> Result<Header, FrameError> {
    let malformed = || FrameError::MalformedHeader(String::from_utf8_lossy(bytes).into_owned());

    if bytes.len() != HEADER_LENGTH || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    let value = bytes
        .iter()
        .fold(0usize, |acc, digit| acc * 10 + usize::from(digit - b'0'));

    let header = Header {
        body_length: value / 100,
        nick_length: value % 100,
    };

    if header.body_length > MAX_BODY_LENGTH || header.nick_length > MAX_NICK_LENGTH {
        return Err(malformed());
    }

    Ok(header)
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    nickname: Bytes,
    body: Bytes,
}

impl Frame {
    /// Build a frame, silently truncating the nickname to 16 bytes
    /// and the body to 1024 bytes
    pub fn new(frame_type: FrameType, nickname: impl AsRef<[u8]>, body: impl AsRef<[u8]>) -> Self {
        let nickname = nickname.as_ref();
        let body = body.as_ref();
        Self {
            frame_type,
            nickname: Bytes::copy_from_slice(&nickname[..nickname.len().min(MAX_NICK_LENGTH)]),
            body: Bytes::copy_from_slice(&body[..body.len().min(MAX_BODY_LENGTH)]),
        }
    }

    /// Nickname claim with an empty body
    pub fn query(nickname: impl AsRef<[u8]>) -> Self {
        Self::new(FrameType::Query, nickname, b"")
    }

    /// Chat text sent under `nickname`
    pub fn message(nickname: impl AsRef<[u8]>, body: impl AsRef<[u8]>) -> Self {
        Self::new(FrameType::Message, nickname, body)
    }

    /// Rejection reply: empty nickname, empty body
    pub fn negative() -> Self {
        Self::new(FrameType::Negative, b"", b"")
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn nickname(&self) -> &Bytes {
        &self.nickname
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn header(&self) -> Header {
        Header {
            body_length: self.body.len(),
            nick_length: self.nickname.len(),
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        self.header().frame_length()
    }

    /// Serialize to the wire layout
    ///
    /// Unused nickname field bytes are zero-filled.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&encode_header(self.body.len(), self.nickname.len()));
        buf.put_u8(self.frame_type.as_u8());
        buf.put_slice(&self.nickname);
        buf.put_bytes(0, MAX_NICK_LENGTH - self.nickname.len());
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Assemble a frame from sections read off the wire
    ///
    /// `nick_field` is the fixed 16-byte slot; only its first
    /// `header.nick_length` bytes are kept.
    pub fn from_sections(
        header: Header,
        type_byte: u8,
        nick_field: &[u8],
        body: Bytes,
    ) -> Result<Self, FrameError> {
        let frame_type = FrameType::from_u8(type_byte).ok_or(FrameError::UnknownType(type_byte))?;

        if nick_field.len() < header.nick_length || body.len() != header.body_length {
            return Err(FrameError::Truncated {
                expected: header.frame_length(),
                actual: NICK_OFFSET + nick_field.len() + body.len(),
            });
        }

        Ok(Self {
            frame_type,
            nickname: Bytes::copy_from_slice(&nick_field[..header.nick_length]),
            body,
        })
    }

    /// Decode one complete frame from the start of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < BODY_OFFSET {
            return Err(FrameError::Truncated {
                expected: BODY_OFFSET,
                actual: buf.len(),
            });
        }

        let header = decode_header(&buf[..HEADER_LENGTH])?;
        let end = header.frame_length();
        if buf.len() < end {
            return Err(FrameError::Truncated {
                expected: end,
                actual: buf.len(),
            });
        }

        Self::from_sections(
            header,
            buf[TYPE_OFFSET],
            &buf[NICK_OFFSET..BODY_OFFSET],
            Bytes::copy_from_slice(&buf[BODY_OFFSET..end]),
        )
    }

    /// Nickname for display, lossy on invalid UTF-8
    pub fn display_nickname(&self) -> String {
        String::from_utf8_lossy(&self.nickname).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Frame::message("bob", "hi");
        let encoded = frame.encode();

        assert_eq!(encoded.len(), BODY_OFFSET + 2);
        assert_eq!(&encoded[..HEADER_LENGTH], b"000203");
        assert_eq!(encoded[TYPE_OFFSET], b'm');
        assert_eq!(&encoded[NICK_OFFSET..NICK_OFFSET + 3], b"bob");
        assert_eq!(&encoded[BODY_OFFSET..], b"hi");
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            Frame::query("alice"),
            Frame::message("", ""),
            Frame::message("sixteen-bytes-xx", vec![b'z'; MAX_BODY_LENGTH]),
            Frame::negative(),
        ];

        for frame in cases {
            let decoded = Frame::decode(&frame.encode()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_header_arithmetic_covers_full_range() {
        for body_length in 0..=MAX_BODY_LENGTH {
            for nick_length in 0..=MAX_NICK_LENGTH {
                let header = decode_header(&encode_header(body_length, nick_length)).unwrap();
                assert_eq!(
                    header,
                    Header {
                        body_length,
                        nick_length
                    }
                );
            }
        }
    }

    #[test]
    fn test_body_is_clamped() {
        let body: Vec<u8> = (0..2000).map(|i| (i % 251) as u8).collect();
        let frame = Frame::message("carol", &body);

        assert_eq!(frame.body().len(), MAX_BODY_LENGTH);
        assert_eq!(&frame.body()[..], &body[..MAX_BODY_LENGTH]);

        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.header().body_length, MAX_BODY_LENGTH);
    }

    #[test]
    fn test_nickname_is_clamped() {
        let frame = Frame::query("a-very-long-nickname-indeed");
        assert_eq!(&frame.nickname()[..], b"a-very-long-nick");
    }

    #[test]
    fn test_decode_header_rejects_oversized_lengths() {
        // nick length 17
        assert!(matches!(
            decode_header(b"000017"),
            Err(FrameError::MalformedHeader(_))
        ));
        // body length 1025
        assert!(matches!(
            decode_header(b"102500"),
            Err(FrameError::MalformedHeader(_))
        ));
        assert!(decode_header(b"102416").is_ok());
    }

    #[test]
    fn test_decode_header_rejects_non_digits() {
        assert!(decode_header(b"00 003").is_err());
        assert!(decode_header(b"-00003").is_err());
        assert!(decode_header(b"0003").is_err());
    }

    #[test]
    fn test_nickname_padding_is_ignored() {
        let mut encoded = Frame::message("al", "x").encode().to_vec();
        encoded[NICK_OFFSET + 2..BODY_OFFSET].fill(b'#');

        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(&decoded.nickname()[..], b"al");
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut encoded = Frame::negative().encode().to_vec();
        encoded[TYPE_OFFSET] = b'x';
        assert_eq!(Frame::decode(&encoded), Err(FrameError::UnknownType(b'x')));
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = Frame::message("bob", "hello").encode();
        assert!(matches!(
            Frame::decode(&encoded[..encoded.len() - 1]),
            Err(FrameError::Truncated { .. })
        ));
    }
}
