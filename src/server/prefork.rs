use std::convert::Infallible;
use std::io;
use std::process;

use tracing::{error, info, warn};

use crate::app::SharedApp;
use crate::server::{Dispatcher, Listener, Sequential, ServerError};

/// Forks a fixed number of worker processes before serving.
///
/// Each worker runs the sequential accept loop on its inherited copy of the
/// listening socket; the kernel hands every incoming connection to exactly
/// one of them. The parent only waits. A worker that dies is not replaced,
/// so capacity shrinks until the last one is gone.
#[derive(Debug, Clone, Copy)]
pub struct Prefork {
    workers: usize,
}

impl Prefork {
    pub fn new(workers: usize) -> Result<Self, ServerError> {
        if workers == 0 {
            return Err(ServerError::NoWorkers);
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Dispatcher for Prefork {
    fn run(self, listener: Listener, app: SharedApp) -> Result<Infallible, ServerError> {
        let mut children = Vec::with_capacity(self.workers);

        for id in 0..self.workers {
            // SAFETY: the parent is single-threaded here, so the child does
            // not inherit locks held by other threads.
            match unsafe { libc::fork() } {
                -1 => {
                    let err = io::Error::last_os_error();
                    error!(worker = id, error = %err, "fork failed");
                    return Err(ServerError::Fork(err));
                }
                0 => worker(id, listener, app),
                pid => children.push(pid),
            }
        }

        info!(workers = children.len(), pids = ?children, "all workers started");

        let mut alive = children.len();
        while alive > 0 {
            let mut status: libc::c_int = 0;
            // SAFETY: `status` is a valid out-pointer for the duration of the call.
            let pid = unsafe { libc::waitpid(-1, &mut status, 0) };
            if pid == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Wait(err));
            }

            alive -= 1;
            warn!(pid, status, remaining = alive, "worker exited and will not be restarted");
        }

        Err(ServerError::WorkersExited)
    }
}

/// Body of a forked worker. Never returns into the parent's code.
fn worker(id: usize, listener: Listener, app: SharedApp) -> ! {
    info!(worker = id, pid = process::id(), "worker ready");

    match Sequential.run(listener, app) {
        Ok(never) => match never {},
        Err(e) => {
            error!(worker = id, error = %e, "worker stopping");
            process::exit(1)
        }
    }
}
