/// Represents a parsed HTTP request head from a client.
///
/// Contains everything extracted from the request line and header lines.
/// The path is kept exactly as it appeared on the wire (no percent-decoding),
/// and headers keep their arrival order, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The request method token (e.g. "GET")
    pub method: String,
    /// The raw request target (e.g. "/search?q=rust")
    pub path: String,
    /// Protocol version (e.g. "HTTP/1.1")
    pub version: String,
    /// Request headers as (name, value) pairs in arrival order
    pub headers: Vec<(String, String)>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<String>,
    path: Option<String>,
    version: Option<String>,
    headers: Vec<(String, String)>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            version: None,
            headers: Vec::new(),
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends a header; earlier headers with the same name are kept.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
        })
    }
}

impl Request {
    /// Retrieves the first header value with the given name.
    ///
    /// Header names are compared case-insensitively.
    ///
    /// # Example
    ///
    /// ```
    /// # use tuby::http::request::RequestBuilder;
    /// let req = RequestBuilder::new()
    ///     .method("GET")
    ///     .path("/")
    ///     .header("Host", "example.com")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(req.header("host"), Some("example.com"));
    /// ```
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over every value of the named header, in arrival order.
    pub fn headers_named<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Returns true when the head announces a request body.
    ///
    /// Any `Transfer-Encoding` counts, as does a `Content-Length` that is not
    /// exactly zero (an unparsable length is treated as announcing a body).
    pub fn declares_body(&self) -> bool {
        if self.header("Transfer-Encoding").is_some() {
            return true;
        }
        self.headers_named("Content-Length")
            .any(|v| v.trim().parse::<u64>().map_or(true, |n| n > 0))
    }

    /// The part of the raw path after the first `?`, or "" when absent.
    pub fn query(&self) -> &str {
        self.path.split_once('?').map_or("", |(_, q)| q)
    }
}
