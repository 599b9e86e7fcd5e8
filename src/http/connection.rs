use std::any::Any;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::app::SharedApp;
use crate::http::environment::Environment;
use crate::http::parser::{ParseError, ParseStatus, RequestParser};
use crate::http::request::Request;
use crate::http::writer::{ResponseError, ResponseWriter};

/// Size of each read from the peer.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Byte stream a [`Connection`] runs over.
///
/// Reads and writes either block (sequential, threaded and prefork
/// strategies) or fail with `WouldBlock` until the stream is ready again
/// (reactor). The connection handles both the same way.
pub trait Transport: Read + Write {
    /// Signals end of output to the peer. The stream itself is released on drop.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Write)
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("read failed: {0}")]
    Read(io::Error),
    #[error("malformed request: {0}")]
    Parse(#[from] ParseError),
    #[error("request bodies are not supported ({method} {path})")]
    UnsupportedBody { method: String, path: String },
    #[error("application failed: {0:#}")]
    Application(anyhow::Error),
    #[error("application panicked: {0}")]
    ApplicationPanic(String),
    #[error("invalid response: {0}")]
    Response(#[from] ResponseError),
    #[error("write failed: {0}")]
    Write(io::Error),
}

impl HandlerError {
    pub fn abort(&self) -> Abort {
        match self {
            HandlerError::Read(_) => Abort::Read,
            HandlerError::Parse(_) => Abort::Parse,
            HandlerError::UnsupportedBody { .. } => Abort::UnsupportedBody,
            HandlerError::Application(_) | HandlerError::ApplicationPanic(_) => Abort::Application,
            HandlerError::Response(_) => Abort::Response,
            HandlerError::Write(_) => Abort::Write,
        }
    }
}

/// Stage at which a connection was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Read,
    Parse,
    UnsupportedBody,
    Application,
    Response,
    Write,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The full response was written.
    Responded,
    /// The peer closed before sending a complete request head.
    PeerClosed,
    /// Something failed; nothing (or nothing more) was sent.
    Aborted(Abort),
}

/// What the connection needs before it can make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait until the transport is readable, then call `advance` again.
    Read,
    /// Wait until the transport is writable, then call `advance` again.
    Write,
    /// The connection is closed; further calls return the same outcome.
    Closed(Outcome),
}

pub enum ConnectionState {
    Reading,
    Dispatching(Request),
    Writing(ResponseWriter),
    Failed(HandlerError),
    Closed(Outcome),
}

// Logged once the response is fully written
struct Handled {
    method: String,
    path: String,
    status: u16,
}

enum ReadProgress {
    Head(Request),
    Pending,
    Eof,
}

/// Handles exactly one request on one connection.
///
/// ```text
/// Reading -> Dispatching -> Writing -> Closed
///    \            \            \
///     +------------+------------+--> Failed -> Closed
/// ```
///
/// Every path ends in `Closed`, and the transport is shut down and dropped
/// exactly once when it gets there.
pub struct Connection<T: Transport> {
    transport: Option<T>,
    peer: Option<SocketAddr>,
    app: SharedApp,
    parser: RequestParser,
    state: ConnectionState,
    handled: Option<Handled>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, peer: Option<SocketAddr>, app: SharedApp) -> Self {
        Self {
            transport: Some(transport),
            peer,
            app,
            parser: RequestParser::new(),
            state: ConnectionState::Reading,
            handled: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The underlying stream, until the connection is closed.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Drives the connection as far as the transport allows.
    ///
    /// With a blocking transport this runs to `Step::Closed` in one call.
    pub fn advance(&mut self) -> Step {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Reading);
            self.state = match state {
                ConnectionState::Reading => match self.read_head() {
                    Ok(ReadProgress::Head(request)) => ConnectionState::Dispatching(request),
                    Ok(ReadProgress::Pending) => {
                        self.state = ConnectionState::Reading;
                        return Step::Read;
                    }
                    Ok(ReadProgress::Eof) => {
                        debug!(peer = ?self.peer, "peer closed before sending a request");
                        return self.close(Outcome::PeerClosed);
                    }
                    Err(e) => ConnectionState::Failed(e),
                },

                ConnectionState::Dispatching(request) => match self.dispatch(request) {
                    Ok(writer) => ConnectionState::Writing(writer),
                    Err(e) => ConnectionState::Failed(e),
                },

                ConnectionState::Writing(mut writer) => {
                    let Some(transport) = self.transport.as_mut() else {
                        return self.close(Outcome::Aborted(Abort::Write));
                    };
                    match writer.write_to(transport) {
                        Ok(true) => {
                            if let Some(Handled { method, path, status }) = self.handled.take() {
                                info!(peer = ?self.peer, %method, %path, status, "request handled");
                            }
                            return self.close(Outcome::Responded);
                        }
                        Ok(false) => {
                            self.state = ConnectionState::Writing(writer);
                            return Step::Write;
                        }
                        Err(e) => ConnectionState::Failed(HandlerError::Write(e)),
                    }
                }

                ConnectionState::Failed(err) => return self.fail(err),

                ConnectionState::Closed(outcome) => {
                    self.state = ConnectionState::Closed(outcome);
                    return Step::Closed(outcome);
                }
            };
        }
    }

    /// Abandons the connection from outside, e.g. when waiting for readiness fails.
    pub fn abort(&mut self, err: HandlerError) -> Outcome {
        if let ConnectionState::Closed(outcome) = self.state {
            return outcome;
        }
        match self.fail(err) {
            Step::Closed(outcome) => outcome,
            _ => Outcome::Aborted(Abort::Read),
        }
    }

    fn read_head(&mut self) -> Result<ReadProgress, HandlerError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(ReadProgress::Eof);
        };

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = match transport.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadProgress::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HandlerError::Read(e)),
            };

            if n == 0 {
                return Ok(ReadProgress::Eof);
            }

            match self.parser.feed(&chunk[..n]) {
                ParseStatus::Incomplete => continue,
                ParseStatus::Complete(request) => return Ok(ReadProgress::Head(request)),
                ParseStatus::Error(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Result<ResponseWriter, HandlerError> {
        if request.declares_body() {
            return Err(HandlerError::UnsupportedBody {
                method: request.method,
                path: request.path,
            });
        }

        let env = Environment::from_request(&request);
        let app = &self.app;
        let response = match panic::catch_unwind(AssertUnwindSafe(|| app.call(env))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(HandlerError::Application(e)),
            Err(payload) => return Err(HandlerError::ApplicationPanic(panic_message(payload.as_ref()))),
        };

        let status = response.status;
        let writer = ResponseWriter::new(response)?;
        self.handled = Some(Handled {
            method: request.method,
            path: request.path,
            status,
        });

        Ok(writer)
    }

    fn fail(&mut self, err: HandlerError) -> Step {
        match &err {
            HandlerError::Write(e) | HandlerError::Read(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::WriteZero
                ) =>
            {
                warn!(peer = ?self.peer, error = %err, "peer went away");
            }
            _ => error!(peer = ?self.peer, error = %err, "aborting connection"),
        }
        self.close(Outcome::Aborted(err.abort()))
    }

    fn close(&mut self, outcome: Outcome) -> Step {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.shutdown() {
                debug!(peer = ?self.peer, error = %e, "shutdown failed");
            }
        }
        self.state = ConnectionState::Closed(outcome);
        debug!(peer = ?self.peer, ?outcome, "connection closed");
        Step::Closed(outcome)
    }
}

/// Runs a connection over a blocking transport until it closes.
pub fn serve_blocking<T: Transport>(transport: T, peer: Option<SocketAddr>, app: SharedApp) -> Outcome {
    let mut conn = Connection::new(transport, peer, app);
    loop {
        if let Step::Closed(outcome) = conn.advance() {
            return outcome;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
