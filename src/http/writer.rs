use std::io::{self, Write};

use thiserror::Error;

use crate::http::response::{Body, Response};
use crate::http::status::reason_phrase;

const HTTP_VERSION: &str = "HTTP/1.1";

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("status {0} has no reason phrase")]
    UnknownStatus(u16),
    #[error("header {0:?} contains CR or LF")]
    InvalidHeader(String),
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

fn serialize_head(resp: &Response) -> Result<Vec<u8>, ResponseError> {
    let reason = reason_phrase(resp.status).ok_or(ResponseError::UnknownStatus(resp.status))?;

    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!("{} {} {}\r\n", HTTP_VERSION, resp.status, reason);
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        if has_line_break(k) || has_line_break(v) {
            return Err(ResponseError::InvalidHeader(k.clone()));
        }
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    Ok(buf)
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}

fn drain_body(body: &mut dyn Body, buf: &mut Vec<u8>) {
    while let Some(chunk) = body.next_chunk() {
        buf.extend_from_slice(&chunk);
    }
}

/// A serialized response plus how much of it has reached the peer.
///
/// Writing is resumable: on a non-blocking stream `write_to` stops at
/// `WouldBlock` and picks up where it left off on the next call.
#[derive(Debug)]
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    /// Serializes the response, consuming and closing its body.
    ///
    /// The body is closed even when the status or a header is rejected.
    pub fn new(mut response: Response) -> Result<Self, ResponseError> {
        let head = serialize_head(&response);
        let mut buffer = match head {
            Ok(head) => head,
            Err(e) => {
                response.body.close();
                return Err(e);
            }
        };
        drain_body(response.body.as_mut(), &mut buffer);
        response.body.close();

        Ok(Self { buffer, written: 0 })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.buffer.len()
    }

    /// Writes as much of the remaining response as the stream accepts.
    ///
    /// Returns `Ok(true)` once everything is written and `Ok(false)` if the
    /// stream would block.
    pub fn write_to<W: Write + ?Sized>(&mut self, stream: &mut W) -> io::Result<bool> {
        while self.written < self.buffer.len() {
            let n = match stream.write(&self.buffer[self.written..]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed while writing",
                ));
            }

            self.written += n;
        }

        match stream.flush() {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            other => other.map(|()| true),
        }
    }
}

/// Serializes `response` and writes all of it to a blocking stream.
pub fn send<W: Write + ?Sized>(stream: &mut W, response: Response) -> Result<(), ResponseError> {
    let mut writer = ResponseWriter::new(response)?;
    if !writer.write_to(stream)? {
        return Err(io::Error::from(io::ErrorKind::WouldBlock).into());
    }
    Ok(())
}
