use std::convert::Infallible;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::task::LocalSet;
use tracing::{Instrument, debug, info_span, warn};

use crate::app::SharedApp;
use crate::http::connection::{Connection, HandlerError, Outcome, Step, Transport};
use crate::server::{AcceptError, Dispatcher, Listener, ServerError};

/// Single-threaded event loop over non-blocking sockets.
///
/// Connections only yield when their socket is not ready, so an application
/// call that blocks or burns CPU stalls every connection at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reactor;

impl Dispatcher for Reactor {
    fn run(self, listener: Listener, app: SharedApp) -> Result<Infallible, ServerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .map_err(ServerError::Runtime)?;

        LocalSet::new().block_on(&runtime, accept_loop(listener, app))
    }
}

async fn accept_loop(listener: Listener, app: SharedApp) -> Result<Infallible, ServerError> {
    let listener = listener.into_nonblocking().map_err(ServerError::Listener)?;

    loop {
        match listener.accept().await.map_err(AcceptError::from) {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                let conn = Connection::new(ReadyStream(stream), Some(peer), app.clone());
                tokio::task::spawn_local(drive(conn, peer).instrument(info_span!("conn", %peer)));
            }
            Err(AcceptError::Transient(e)) => {
                warn!(error = %e, "accept failed, continuing");
            }
            Err(AcceptError::Fatal(e)) => return Err(ServerError::Listener(e)),
        }
    }
}

/// Advances a connection each time its socket becomes ready.
async fn drive(mut conn: Connection<ReadyStream>, peer: SocketAddr) -> Outcome {
    loop {
        let interest = match conn.advance() {
            Step::Read => Interest::READABLE,
            Step::Write => Interest::WRITABLE,
            Step::Closed(outcome) => return outcome,
        };

        let ready = match conn.transport() {
            Some(stream) => stream.0.ready(interest).await,
            None => continue,
        };
        if let Err(e) = ready {
            debug!(%peer, error = %e, "readiness wait failed");
            return conn.abort(wait_failed(interest, e));
        }
    }
}

/// Attributes a failed readiness wait to the direction being waited on.
fn wait_failed(interest: Interest, err: io::Error) -> HandlerError {
    if interest.is_writable() {
        HandlerError::Write(err)
    } else {
        HandlerError::Read(err)
    }
}

/// A tokio socket presented through blocking-style `Read`/`Write`.
///
/// Operations return `WouldBlock` instead of waiting; the reactor waits for
/// readiness and calls back into the connection.
#[derive(Debug)]
pub struct ReadyStream(pub TcpStream);

impl Read for ReadyStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl Write for ReadyStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ReadyStream {
    fn shutdown(&mut self) -> io::Result<()> {
        // Dropping the tokio stream closes the descriptor
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::connection::Abort;

    #[test]
    fn wait_failure_follows_interest() {
        let err = || io::Error::from(io::ErrorKind::ConnectionReset);

        assert_eq!(wait_failed(Interest::READABLE, err()).abort(), Abort::Read);
        assert_eq!(wait_failed(Interest::WRITABLE, err()).abort(), Abort::Write);
    }
}
