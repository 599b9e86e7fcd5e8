use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AcceptError {
    /// The accept failed but the socket is still usable.
    #[error("transient accept error: {0}")]
    Transient(io::Error),
    /// The listening socket itself is broken.
    #[error("listening socket unusable: {0}")]
    Fatal(io::Error),
}

impl From<io::Error> for AcceptError {
    fn from(e: io::Error) -> Self {
        if is_transient(&e) {
            AcceptError::Transient(e)
        } else {
            AcceptError::Fatal(e)
        }
    }
}

/// Errors that leave the listening socket usable.
///
/// Descriptor exhaustion counts as transient: it clears once other
/// connections close.
fn is_transient(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::OutOfMemory => true,
        _ => is_resource_exhaustion(e),
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM | libc::EPROTO | libc::EPERM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_e: &io::Error) -> bool {
    false
}

/// The bound listening socket.
///
/// Wraps a blocking std listener. The reactor converts it with
/// [`Listener::into_nonblocking`]; prefork workers inherit it across `fork`.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let inner = TcpListener::bind(addr)?;
        info!("Listening on {}", inner.local_addr()?);
        Ok(Self { inner })
    }

    pub fn from_std(inner: TcpListener) -> Self {
        Self { inner }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Blocks until a client connects.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        Ok(self.inner.accept()?)
    }

    /// Hands the socket to the current tokio runtime as a non-blocking listener.
    ///
    /// Must be called from within a runtime.
    pub fn into_nonblocking(self) -> io::Result<tokio::net::TcpListener> {
        self.inner.set_nonblocking(true)?;
        tokio::net::TcpListener::from_std(self.inner)
    }
}
