//! Newline-framed line codec for tokio.
//!
//! Lines are capped at [`crate::MAX_LINE_LEN`] bytes. Oversized input is
//! an error: a peer that ships longer lines is violating the protocol
//! and the connection is torn down by the caller.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Codec-level failures.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line exceeds {max} bytes")]
    TooLong { max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Newline-terminated line codec with a hard length cap.
pub struct LineCodec {
    /// Index of the next byte to check for a newline.
    next_index: usize,
    max_len: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: crate::MAX_LINE_LEN,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, LineError> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            let s = String::from_utf8_lossy(&line);
            Ok(Some(s.trim_end_matches(['\r', '\n']).to_string()))
        } else if src.len() > self.max_len {
            Err(LineError::TooLong { max: self.max_len })
        } else {
            self.next_index = src.len();
            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = LineError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), LineError> {
        if item.len() + 2 > self.max_len {
            return Err(LineError::TooLong { max: self.max_len });
        }
        dst.reserve(item.len() + 2);
        dst.put_slice(item.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
