//! The application boundary.
//!
//! An application maps an [`Environment`] to a [`Response`]. The server never
//! synchronizes calls: under the threaded strategy the same instance is
//! called from many threads at once, so shared state inside it must bring its
//! own locking.
//!
//! Applications are installed through a plugin entry function that only gets
//! to see a [`Registrar`] and must call [`Registrar::register`] exactly once.

use std::sync::Arc;

use thiserror::Error;

use crate::http::environment::Environment;
use crate::http::response::Response;

pub trait Application: Send + Sync {
    fn call(&self, env: Environment) -> anyhow::Result<Response>;
}

impl<F> Application for F
where
    F: Fn(Environment) -> anyhow::Result<Response> + Send + Sync,
{
    fn call(&self, env: Environment) -> anyhow::Result<Response> {
        self(env)
    }
}

/// Application handle shared by every connection of a server.
pub type SharedApp = Arc<dyn Application>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("entry point did not register an application")]
    Missing,
    #[error("entry point registered more than one application")]
    Duplicate,
}

/// What an entry point is allowed to touch while it is loaded.
#[derive(Default)]
pub struct Registrar {
    app: Option<SharedApp>,
    registrations: usize,
}

impl Registrar {
    pub fn register<A: Application + 'static>(&mut self, app: A) {
        self.registrations += 1;
        if self.app.is_none() {
            self.app = Some(Arc::new(app));
        }
    }

    /// Registers a closure; same as [`Registrar::register`] but lets the
    /// compiler infer the closure's argument type.
    pub fn register_fn<F>(&mut self, f: F)
    where
        F: Fn(Environment) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.register(f);
    }
}

/// Wraps a closure as a shareable application.
pub fn from_fn<F>(f: F) -> SharedApp
where
    F: Fn(Environment) -> anyhow::Result<Response> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Runs a plugin entry point and returns the single application it registered.
///
/// # Example
///
/// ```
/// # use tuby::app::{load, Registrar};
/// # use tuby::http::response::Response;
/// let app = load(|r: &mut Registrar| r.register_fn(|_env| Ok(Response::ok("hi")))).unwrap();
/// # let _ = app;
/// ```
pub fn load<F>(entry: F) -> Result<SharedApp, RegistrationError>
where
    F: FnOnce(&mut Registrar),
{
    let mut registrar = Registrar::default();
    entry(&mut registrar);

    match (registrar.app, registrar.registrations) {
        (Some(app), 1) => Ok(app),
        (None, _) => Err(RegistrationError::Missing),
        (Some(_), _) => Err(RegistrationError::Duplicate),
    }
}
