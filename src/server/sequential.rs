use std::convert::Infallible;

use tracing::{debug, info_span};

use crate::app::SharedApp;
use crate::http::connection::serve_blocking;
use crate::server::{Dispatcher, Listener, ServerError, accept_loop};

/// Handles one connection at a time, in accept order.
///
/// A slow application call holds up every client queued behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Dispatcher for Sequential {
    fn run(self, listener: Listener, app: SharedApp) -> Result<Infallible, ServerError> {
        Err(accept_loop(&listener, |stream, peer| {
            let _span = info_span!("conn", %peer).entered();
            debug!("accepted connection");
            serve_blocking(stream, Some(peer), app.clone());
        }))
    }
}
