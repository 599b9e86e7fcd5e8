use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tuby::app::{self, Registrar};
use tuby::config::Config;
use tuby::http::environment::Environment;
use tuby::http::response::Response;
use tuby::server::{self, Listener};

/// Demo application: a canned greeting, one second late on `/sleep`.
fn install(registrar: &mut Registrar) {
    registrar.register_fn(|env: Environment| {
        if env.path() == "/sleep" {
            thread::sleep(Duration::from_secs(1));
        }

        let body = "hello\n";
        Ok(Response::builder(200)
            .header("Content-Type", "text/plain")
            .header("Content-Length", body.len().to_string())
            .body(body)
            .build())
    });
}

// Not #[tokio::main]: prefork must fork before any runtime threads exist.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let app = app::load(install)?;

    let listener = Listener::bind(&cfg.listen_addr)
        .with_context(|| format!("binding {}", cfg.listen_addr))?;
    tracing::info!(strategy = %cfg.strategy, workers = cfg.workers, "Plugging Tuby into {}", cfg.listen_addr);

    match server::run(cfg.strategy, cfg.workers, listener, app) {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}
