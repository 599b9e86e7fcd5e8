//! Canonical request environment handed to the application.
//!
//! Each header becomes an `HTTP_<NAME>` entry, alongside `REQUEST_METHOD`,
//! `PATH_INFO`, `QUERY_STRING`, `SERVER_PROTOCOL` and the `rack.input`
//! stream placeholder.

use std::collections::BTreeMap;
use std::io::{self, Read};

use crate::http::request::Request;

pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const PATH_INFO: &str = "PATH_INFO";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";
pub const RACK_INPUT: &str = "rack.input";

/// Request body stream. Bodies are not read by the server, so it is always empty.
#[derive(Debug, Default)]
pub struct Input(());

impl Read for Input {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

/// The request as seen by the application.
///
/// String entries are reachable through [`get`](Self::get) and
/// [`iter`](Self::iter). `rack.input` is a stream, not a string: it is only
/// reachable through [`input`](Self::input), so `get(RACK_INPUT)` is `None`
/// and `iter` skips it, while `contains_key(RACK_INPUT)` is always true.
#[derive(Debug, Default)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    input: Input,
}

impl Environment {
    /// Builds the environment for a fully parsed request head.
    ///
    /// Repeated headers are joined with `", "` in arrival order.
    pub fn from_request(request: &Request) -> Self {
        let mut vars = BTreeMap::new();

        for (name, value) in &request.headers {
            vars.entry(environment_key(name))
                .and_modify(|joined: &mut String| {
                    joined.push_str(", ");
                    joined.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }

        vars.insert(REQUEST_METHOD.to_string(), request.method.clone());
        vars.insert(PATH_INFO.to_string(), request.path.clone());
        vars.insert(QUERY_STRING.to_string(), request.query().to_string());
        vars.insert(SERVER_PROTOCOL.to_string(), request.version.clone());

        Self {
            vars,
            input: Input::default(),
        }
    }

    /// A string entry. Always `None` for `rack.input`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// True for every string entry and for `rack.input`.
    pub fn contains_key(&self, key: &str) -> bool {
        key == RACK_INPUT || self.vars.contains_key(key)
    }

    /// The `rack.input` stream.
    pub fn input(&mut self) -> &mut Input {
        &mut self.input
    }

    pub fn method(&self) -> &str {
        self.get(REQUEST_METHOD).unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.get(PATH_INFO).unwrap_or_default()
    }

    /// String entries in key order; `rack.input` is not among them.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Uppercases a header name and maps '-' to '_'.
///
/// Case-insensitive and idempotent: `header_key(header_key(n)) == header_key(n)`.
pub fn header_key(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// The environment key for a header: `HTTP_` followed by [`header_key`].
pub fn environment_key(name: &str) -> String {
    format!("HTTP_{}", header_key(name))
}
