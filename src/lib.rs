//! Tuby - a minimal HTTP server framework
//!
//! Parses request heads, hands an environment to an application and writes
//! its response back, under one of four interchangeable concurrency
//! strategies.

pub mod app;
pub mod config;
pub mod http;
pub mod server;
