use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

/// A finite sequence of byte chunks making up a response body.
///
/// The writer pulls chunks until `next_chunk` returns `None`, then calls
/// `close` exactly once, whether or not the response made it to the wire.
pub trait Body: Send {
    fn next_chunk(&mut self) -> Option<Bytes>;

    /// Releases whatever backs the body. Does nothing by default.
    fn close(&mut self) {}
}

/// In-memory body made of pre-built chunks.
#[derive(Debug, Default, Clone)]
pub struct Chunks {
    chunks: VecDeque<Bytes>,
}

impl Chunks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: impl Into<Bytes>) {
        self.chunks.push_back(chunk.into());
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Body for Chunks {
    fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.pop_front()
    }
}

impl From<Vec<Bytes>> for Chunks {
    fn from(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks: chunks.into(),
        }
    }
}

impl From<Bytes> for Chunks {
    fn from(chunk: Bytes) -> Self {
        Self::from(vec![chunk])
    }
}

impl From<&'static str> for Chunks {
    fn from(s: &'static str) -> Self {
        Self::from(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Chunks {
    fn from(s: String) -> Self {
        Self::from(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Chunks {
    fn from(v: Vec<u8>) -> Self {
        Self::from(Bytes::from(v))
    }
}

/// An application's answer: status code, ordered headers and a body.
///
/// Nothing is added on the way out: framing headers such as
/// `Content-Length` are the application's responsibility.
pub struct Response {
    /// The numeric HTTP status code
    pub status: u16,
    /// Headers in the order they are written
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn Body>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use tuby::http::response::Response;
/// let response = Response::builder(200)
///     .header("Content-Type", "text/plain")
///     .header("Content-Length", "5")
///     .body("hello")
///     .build();
/// assert_eq!(response.status, 200);
/// ```
pub struct ResponseBuilder {
    status: u16,
    headers: Vec<(String, String)>,
    body: Box<dyn Body>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Box::new(Chunks::new()),
        }
    }

    /// Appends a header. Repeating a name emits it twice.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Sets the response body from anything convertible to chunks.
    pub fn body(self, body: impl Into<Chunks>) -> Self {
        self.streaming_body(body.into())
    }

    /// Sets a custom body implementation.
    pub fn streaming_body(mut self, body: impl Body + 'static) -> Self {
        self.body = Box::new(body);
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    pub fn builder(status: u16) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    /// Creates a 200 response with the given body and no headers.
    pub fn ok(body: impl Into<Chunks>) -> Self {
        ResponseBuilder::new(200).body(body).build()
    }
}
