//! Concurrency strategies.
//!
//! Every strategy accepts connections from a [`Listener`] and drives each one
//! with the same [`Connection`](crate::http::connection::Connection) state
//! machine. They differ only in how connections are scheduled:
//!
//! - [`Sequential`]: accept, handle to completion, repeat.
//! - [`Threaded`]: one OS thread per accepted connection, no cap.
//! - [`Prefork`]: N forked processes, each running the sequential loop on the
//!   inherited socket.
//! - [`Reactor`]: one thread, non-blocking sockets, readiness events.
//!
//! None of them implement timeouts: a client that never finishes its request
//! head, or an application that never returns, holds its connection forever.

pub mod listener;
#[cfg(unix)]
pub mod prefork;
pub mod reactor;
pub mod sequential;
pub mod threaded;

use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, TcpStream};

use thiserror::Error;
use tracing::warn;

use crate::app::SharedApp;
use crate::config::Strategy;

pub use listener::{AcceptError, Listener};
#[cfg(unix)]
pub use prefork::Prefork;
pub use reactor::Reactor;
pub use sequential::Sequential;
pub use threaded::Threaded;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listening socket unusable: {0}")]
    Listener(io::Error),
    #[error("failed to start event loop: {0}")]
    Runtime(io::Error),
    #[error("failed to fork worker: {0}")]
    Fork(io::Error),
    #[error("waiting for workers failed: {0}")]
    Wait(io::Error),
    #[error("all workers have exited")]
    WorkersExited,
    #[error("prefork needs at least one worker")]
    NoWorkers,
    #[error("{0} strategy is not supported on this platform")]
    Unsupported(Strategy),
}

/// Runs connections from a listener until the listener fails.
///
/// Only returns on a fatal error; there is no shutdown path.
pub trait Dispatcher {
    fn run(self, listener: Listener, app: SharedApp) -> Result<Infallible, ServerError>;
}

/// Runs the configured strategy.
pub fn run(
    strategy: Strategy,
    workers: usize,
    listener: Listener,
    app: SharedApp,
) -> Result<Infallible, ServerError> {
    match strategy {
        Strategy::Sequential => Sequential.run(listener, app),
        Strategy::Threaded => Threaded.run(listener, app),
        #[cfg(unix)]
        Strategy::Prefork => Prefork::new(workers)?.run(listener, app),
        #[cfg(not(unix))]
        Strategy::Prefork => {
            let _ = workers;
            Err(ServerError::Unsupported(strategy))
        }
        Strategy::Reactor => Reactor.run(listener, app),
    }
}

/// Blocking accept loop shared by the sequential, threaded and prefork strategies.
///
/// Transient accept errors are logged and skipped.
fn accept_loop<F>(listener: &Listener, mut on_accept: F) -> ServerError
where
    F: FnMut(TcpStream, SocketAddr),
{
    loop {
        match listener.accept() {
            Ok((stream, peer)) => on_accept(stream, peer),
            Err(AcceptError::Transient(e)) => {
                warn!(error = %e, "accept failed, continuing");
            }
            Err(AcceptError::Fatal(e)) => return ServerError::Listener(e),
        }
    }
}
