//! Length-prefixed JSON framing.
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | body: `len` bytes of JSON |
//! +----------------+---------------------------+
//! ```

use camctl_common::consts::FRAME_HEADER_LEN;
use serde_json::Value;
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("frame too large: max {max} got {len}")]
    Oversized { len: u32, max: u32 },

    #[error("connection closed mid-frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("malformed frame body: {0}")]
    Malformed(String),
}

/// Fill `buf` completely. Returns the number of bytes read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

pub struct FrameReader<R> {
    reader: R,
    max_frame_len: u32,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, max_frame_len: u32) -> Self {
        Self {
            reader,
            max_frame_len,
        }
    }

    /// Next frame body, or `None` on a clean EOF at a frame boundary.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            FRAME_HEADER_LEN => {}
            got => {
                return Err(ProtocolError::Truncated {
                    expected: FRAME_HEADER_LEN,
                    got,
                });
            }
        }

        let len = u32::from_be_bytes(header);
        if len > self.max_frame_len {
            return Err(ProtocolError::Oversized {
                len,
                max: self.max_frame_len,
            });
        }

        let mut body = vec![0u8; len as usize];
        let got = read_full(&mut self.reader, &mut body)?;
        if got < body.len() {
            return Err(ProtocolError::Truncated {
                expected: body.len(),
                got,
            });
        }
        Ok(Some(body))
    }
}

pub struct FrameWriter<W> {
    writer: W,
    max_frame_len: u32,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W, max_frame_len: u32) -> Self {
        Self {
            writer,
            max_frame_len,
        }
    }

    pub fn write_value(&mut self, value: &Value) -> Result<(), ProtocolError> {
        let frame = encode_frame(value, self.max_frame_len)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Serialize `value` into one complete frame.
pub fn encode_frame(value: &Value, max_frame_len: u32) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let len = u32::try_from(body.len()).unwrap_or(u32::MAX);
    if len > max_frame_len {
        return Err(ProtocolError::Oversized {
            len,
            max: max_frame_len,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn decode_body(body: &[u8]) -> Result<Value, ProtocolError> {
    serde_json::from_slice(body).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
