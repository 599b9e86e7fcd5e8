use std::fmt;
use std::str::FromStr;

use anyhow::{Context, bail};
use serde::Deserialize;

/// Concurrency strategy the server runs for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One connection at a time
    #[default]
    Sequential,
    /// One OS thread per connection
    Threaded,
    /// N forked worker processes sharing the listening socket
    Prefork,
    /// Single-threaded readiness-driven event loop
    Reactor,
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Strategy::Sequential),
            "threaded" => Ok(Strategy::Threaded),
            "prefork" => Ok(Strategy::Prefork),
            "reactor" => Ok(Strategy::Reactor),
            other => bail!("unknown strategy {other:?} (expected sequential, threaded, prefork or reactor)"),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Sequential => "sequential",
            Strategy::Threaded => "threaded",
            Strategy::Prefork => "prefork",
            Strategy::Reactor => "reactor",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen_addr: String,
    pub strategy: Strategy,
    /// Worker processes under the prefork strategy
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3005".to_string(),
            strategy: Strategy::Sequential,
            workers: 4,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// `TUBY_CONFIG` names an optional YAML file; `LISTEN`, `STRATEGY` and
    /// `WORKERS` override whatever it sets.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    pub fn load_from<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("TUBY_CONFIG") {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config file {path}"))?
            }
            None => Self::default(),
        };

        if let Some(addr) = lookup("LISTEN") {
            cfg.listen_addr = addr;
        }
        if let Some(strategy) = lookup("STRATEGY") {
            cfg.strategy = strategy.parse()?;
        }
        if let Some(workers) = lookup("WORKERS") {
            cfg.workers = workers
                .trim()
                .parse()
                .with_context(|| format!("WORKERS must be a positive integer, got {workers:?}"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        Ok(())
    }
}
