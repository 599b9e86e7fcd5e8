use thiserror::Error;

use crate::http::request::Request;

/// Upper bound on the size of a request head (request line plus headers).
pub const MAX_HEAD_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("line not terminated by CRLF")]
    InvalidLineEnding,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,
    #[error("request head exceeds {} bytes", MAX_HEAD_SIZE)]
    HeadTooLarge,
    #[error("request head already complete")]
    AlreadyComplete,
}

/// Where the parser is in the request head grammar.
///
/// Moves forward only; `Error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingRequestLine,
    AwaitingHeaders,
    Complete,
    Error,
}

/// Result of feeding one chunk of bytes.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed before the head is complete.
    Incomplete,
    /// The blank line terminating the head was seen.
    Complete(Request),
    /// The input is malformed; every later feed reports the same error.
    Error(ParseError),
}

/// Incremental request head parser.
///
/// Input may be split at any byte boundary: a partial line stays buffered
/// until its CRLF arrives, so feeding `b"GE"` then `b"T / HTTP/1.1\r\n\r\n"`
/// gives the same request as feeding it whole.
#[derive(Debug)]
pub struct RequestParser {
    state: ParserState,
    buffer: Vec<u8>,
    // Offset in `buffer` already searched for '\n'
    scanned: usize,
    // Bytes of completed head lines, CRLF included
    consumed: usize,
    method: String,
    path: String,
    version: String,
    headers: Vec<(String, String)>,
    error: Option<ParseError>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::AwaitingRequestLine,
            buffer: Vec::with_capacity(1024),
            scanned: 0,
            consumed: 0,
            method: String::new(),
            path: String::new(),
            version: String::new(),
            headers: Vec::new(),
            error: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Bytes received after the end of the head (the start of a body, if any).
    pub fn remaining(&self) -> &[u8] {
        match self.state {
            ParserState::Complete => &self.buffer[..],
            _ => &[],
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> ParseStatus {
        match self.state {
            ParserState::Error => {
                return ParseStatus::Error(self.error.clone().unwrap_or(ParseError::InvalidRequestLine));
            }
            ParserState::Complete => {
                self.buffer.extend_from_slice(bytes);
                return ParseStatus::Error(ParseError::AlreadyComplete);
            }
            _ => {}
        }

        self.buffer.extend_from_slice(bytes);

        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buffer.len();
                if self.consumed + self.buffer.len() > MAX_HEAD_SIZE {
                    return self.fail(ParseError::HeadTooLarge);
                }
                return ParseStatus::Incomplete;
            };

            let newline = self.scanned + offset;
            if self.consumed + newline + 1 > MAX_HEAD_SIZE {
                return self.fail(ParseError::HeadTooLarge);
            }

            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.scanned = 0;
            self.consumed += line.len();

            let line = match line.strip_suffix(b"\r\n") {
                Some(l) if !l.contains(&b'\r') => l,
                _ => return self.fail(ParseError::InvalidLineEnding),
            };
            let Ok(line) = std::str::from_utf8(line) else {
                return self.fail(ParseError::InvalidEncoding);
            };

            let step = match self.state {
                ParserState::AwaitingRequestLine => self.request_line(line),
                _ if line.is_empty() => {
                    self.state = ParserState::Complete;
                    return ParseStatus::Complete(self.take_request());
                }
                _ => self.header_line(line),
            };
            if let Err(e) = step {
                return self.fail(e);
            }
        }
    }

    fn request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let mut parts = line.split(' ');
        let (Some(method), Some(path), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidRequestLine);
        };

        let valid_path = !path.is_empty() && !path.bytes().any(|b| b.is_ascii_control() || b == b' ');
        let valid_version = version
            .strip_prefix("HTTP/")
            .is_some_and(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit() || b == b'.'));

        if !is_token(method) || !valid_path || !valid_version {
            return Err(ParseError::InvalidRequestLine);
        }

        self.method = method.to_string();
        self.path = path.to_string();
        self.version = version.to_string();
        self.state = ParserState::AwaitingHeaders;
        Ok(())
    }

    fn header_line(&mut self, line: &str) -> Result<(), ParseError> {
        let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

        // Rejects obsolete line folding and whitespace before the colon
        if !is_token(name) {
            return Err(ParseError::InvalidHeader);
        }

        self.headers.push((
            name.to_string(),
            value.trim_matches(|c| c == ' ' || c == '\t').to_string(),
        ));
        Ok(())
    }

    fn take_request(&mut self) -> Request {
        Request {
            method: std::mem::take(&mut self.method),
            path: std::mem::take(&mut self.path),
            version: std::mem::take(&mut self.version),
            headers: std::mem::take(&mut self.headers),
        }
    }

    fn fail(&mut self, error: ParseError) -> ParseStatus {
        self.state = ParserState::Error;
        self.buffer.clear();
        self.error = Some(error.clone());
        ParseStatus::Error(error)
    }
}

/// RFC 9110 `token`: one or more tchar.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let mut parser = RequestParser::new();

        let ParseStatus::Complete(parsed) = parser.feed(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n") else {
            panic!("expected a complete head");
        };

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.header("Host"), Some("example.com"));
        assert_eq!(parser.state(), ParserState::Complete);
    }

    #[test]
    fn token_rules() {
        assert!(is_token("GET"));
        assert!(is_token("X-Custom_Header"));
        assert!(!is_token(""));
        assert!(!is_token("Bad Header"));
        assert!(!is_token("Name\t"));
    }
}
