use std::convert::Infallible;
use std::thread;

use tracing::{debug, error, info_span};

use crate::app::SharedApp;
use crate::http::connection::serve_blocking;
use crate::server::{Dispatcher, Listener, ServerError, accept_loop};

/// Spawns one OS thread per accepted connection.
///
/// There is no pool and no cap, so a flood of slow clients can exhaust
/// threads or memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Threaded;

impl Dispatcher for Threaded {
    fn run(self, listener: Listener, app: SharedApp) -> Result<Infallible, ServerError> {
        Err(accept_loop(&listener, |stream, peer| {
            debug!(%peer, "accepted connection, spawning thread");
            let app = app.clone();

            let spawned = thread::Builder::new()
                .name(format!("conn-{peer}"))
                .spawn(move || {
                    let _span = info_span!("conn", %peer).entered();
                    serve_blocking(stream, Some(peer), app);
                });

            // The stream moved into the closure is dropped, closing the connection
            if let Err(e) = spawned {
                error!(%peer, error = %e, "failed to spawn connection thread");
            }
        }))
    }
}
