//! HTTP protocol implementation.
//!
//! This module holds everything that touches the HTTP/1.1 wire format. None
//! of it knows which concurrency strategy is driving it.
//!
//! # Architecture
//!
//! - **`parser`**: Incremental request head parser, fed one read at a time
//! - **`request`**: Parsed request head
//! - **`environment`**: Maps a request to the key/value environment applications see
//! - **`status`**: Reason-phrase table
//! - **`response`**: Response representation with builder pattern
//! - **`writer`**: Serializes a response and writes it, resumably
//! - **`connection`**: The per-connection state machine
//!
//! # Connection State Machine
//!
//! Each client connection carries exactly one request:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Feed reads to the parser until the head is complete
//!        └──────┬──────┘
//!               │ Request head received
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Build environment, call the application
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ▼
//!        ┌──────────────────┐
//!        │     Closed       │ ← Also reached from every failure
//!        └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpListener;
//! use tuby::app;
//! use tuby::http::connection::serve_blocking;
//! use tuby::http::response::Response;
//!
//! let app = app::from_fn(|_env| Ok(Response::ok("hello\n")));
//! let listener = TcpListener::bind("127.0.0.1:8080").unwrap();
//!
//! for stream in listener.incoming() {
//!     let stream = stream.unwrap();
//!     let peer = stream.peer_addr().ok();
//!     serve_blocking(stream, peer, app.clone());
//! }
//! ```

pub mod connection;
pub mod environment;
pub mod parser;
pub mod request;
pub mod response;
pub mod status;
pub mod writer;
